//! Device queues and device arrays.
//!
//! A [`DeviceQueue`] is a backend's handle on its device. It contributes two
//! things that are independent of each other:
//!
//! - `create_array`, a capability only the backend itself can provide
//! - `register_overrides`, the backend's specializations of registered
//!   operations, installed while a registry is being built
//!
//! The provided `add`/`exp`/`sum`/`softmax`/`softmax_grad` methods dispatch
//! for [`DeviceQueue::backend`] through the standard registry, so a queue
//! exposes every standard operation whether or not it overrides any.
//!
//! # Example
//!
//! ```rust
//! use device_dispatch::device::DeviceQueue;
//! use device_dispatch::ops::cpu::CpuQueue;
//! use device_dispatch::tensors::{DynTensor, Tensor};
//!
//! let q = CpuQueue;
//! let m = DynTensor::from(Tensor::new(vec![2, 2], vec![1.0f32, 2.0, 3.0, 4.0]));
//! let totals = q.sum(&m, -1).unwrap();
//! assert_eq!(totals.shape(), &[2, 1]);
//! let probs = q.softmax(&m).unwrap();
//! assert_eq!(probs.shape(), &[2, 2]);
//! ```

use core::fmt;

use crate::backend::Backend;
use crate::error::Result;
use crate::ops::dispatch::{self, RegistryBuilder};
use crate::tensors::DynTensor;

/// Opaque handle to a backend-owned memory buffer.
///
/// Handles are owned exclusively by the code that requested them; the
/// registry never sees them.
pub trait DeviceArray: fmt::Debug + Send {
    /// The backend that created this array.
    fn backend(&self) -> Backend;

    /// Capacity in bytes.
    fn byte_count(&self) -> usize;
}

/// A compute backend's queue.
pub trait DeviceQueue: Send + Sync {
    fn backend(&self) -> Backend;

    /// Creates an array of `byte_count` bytes owned by the caller.
    fn create_array(&self, byte_count: usize) -> Box<dyn DeviceArray>;

    /// Installs this backend's overrides. The default registers none.
    ///
    /// # Errors
    /// Propagates registration failures.
    fn register_overrides(&self, _registry: &mut RegistryBuilder) -> Result<()> {
        Ok(())
    }

    /// Adds two tensors producing their sum.
    fn add(&self, lhs: &DynTensor, rhs: &DynTensor) -> Result<DynTensor> {
        dispatch::add(self.backend(), lhs, rhs)
    }

    /// Computes the element-wise `exp`.
    fn exp(&self, x: &DynTensor) -> Result<DynTensor> {
        dispatch::exp(self.backend(), x)
    }

    /// Sums the input along `axis`.
    fn sum(&self, x: &DynTensor, axis: isize) -> Result<DynTensor> {
        dispatch::sum(self.backend(), x, axis)
    }

    /// Softmax along the last axis.
    fn softmax(&self, x: &DynTensor) -> Result<DynTensor> {
        dispatch::softmax(self.backend(), x)
    }

    /// Softmax gradient from the forward output `y` and upstream `dy`.
    fn softmax_grad(&self, y: &DynTensor, dy: &DynTensor) -> Result<DynTensor> {
        dispatch::softmax_grad(self.backend(), y, dy)
    }
}
