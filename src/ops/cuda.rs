//! CUDA backend.
//!
//! Device arrays are handles with a process-unique id and a size; no device
//! memory is allocated. The `softmax` override uses the single-pass online
//! normalizer that fused CUDA softmax kernels use (running max with a
//! rescaled running sum), evaluated on the host.

use core::sync::atomic::{AtomicU64, Ordering};

use crate::backend::Backend;
use crate::device::{DeviceArray, DeviceQueue};
use crate::error::Result;
use crate::ops::dispatch::{Implementation, RegistryBuilder};
use crate::ops::generic::{self, float_unary};
use crate::ops::{OpAttrs, SOFTMAX};
use crate::tensors::{DynTensor, Float, Tensor};

static NEXT_ARRAY_ID: AtomicU64 = AtomicU64::new(1);

/// The CUDA device queue.
#[derive(Debug, Clone, Copy, Default)]
pub struct CudaQueue;

/// Handle to a CUDA buffer.
#[derive(Debug, PartialEq, Eq)]
pub struct CudaDeviceArray {
    id: u64,
    byte_count: usize,
}

impl CudaDeviceArray {
    /// Process-unique handle id.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl CudaQueue {
    /// Creates a handle of `byte_count` bytes with a fresh id.
    pub fn allocate(&self, byte_count: usize) -> CudaDeviceArray {
        CudaDeviceArray {
            id: NEXT_ARRAY_ID.fetch_add(1, Ordering::Relaxed),
            byte_count,
        }
    }
}

impl DeviceArray for CudaDeviceArray {
    fn backend(&self) -> Backend {
        Backend::Cuda
    }

    fn byte_count(&self) -> usize {
        self.byte_count
    }
}

impl DeviceQueue for CudaQueue {
    fn backend(&self) -> Backend {
        Backend::Cuda
    }

    fn create_array(&self, byte_count: usize) -> Box<dyn DeviceArray> {
        Box::new(self.allocate(byte_count))
    }

    fn register_overrides(&self, registry: &mut RegistryBuilder) -> Result<()> {
        registry.register_override(
            SOFTMAX.name(),
            Backend::Cuda,
            Implementation::new("cuda.softmax", softmax),
        )
    }
}

/// One row of online softmax: a single read pass computes max and normalizer.
fn online_softmax_row<T: Float>(src: &[T], dst: &mut [T]) {
    let mut max = T::NEG_INFINITY;
    let mut total = T::ZERO;
    for &v in src {
        if v > max {
            // rescale the running sum to the new max
            total = total.times((max - v).exp());
            max = v;
        }
        total = total.plus((v - max).exp());
    }
    for (d, &v) in dst.iter_mut().zip(src) {
        *d = (v - max).exp() / total;
    }
}

fn online_softmax<T: Float>(x: &Tensor<T>) -> Result<Tensor<T>> {
    let n = generic::last_axis_len(&x.shape)?;
    let mut data = vec![T::ZERO; x.len()];
    if n > 0 {
        for (src, dst) in x.data.chunks(n).zip(data.chunks_mut(n)) {
            online_softmax_row(src, dst);
        }
    }
    Ok(Tensor::new(x.shape.clone(), data))
}

/// CUDA `softmax`.
pub fn softmax(operands: &[&DynTensor], _attrs: &OpAttrs) -> Result<DynTensor> {
    float_unary!(SOFTMAX, operands, |x| online_softmax(x))
}
