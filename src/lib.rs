//! device_dispatch: backend dispatch for tensor operations.
//!
//! Operations are implemented once generically and selectively overridden
//! per compute backend, behind one call surface that takes the backend as an
//! explicit argument.
//!
//! # Features
//!
//! - A two-phase registry: open for registration, then frozen and freely shareable.
//! - Per-backend overrides that always win over the generic default for their
//!   exact (operation, backend) pair.
//! - Element-type constraints checked before any implementation runs.
//! - CPU (`rayon`-parallel) and CUDA backends for `add`, `exp`, `sum`,
//!   `softmax` and `softmax_grad`.
//!
//! # Modules
//!
//! - [`backend`]: Backend identifiers.
//! - [`tensors`]: Element types, typed and type-erased tensors.
//! - [`ops`]: Operation descriptors, the registry and the backend kernels.
//! - [`device`]: Device queues and device arrays.
//! - [`backprop`]: Softmax vector-Jacobian product.
//! - [`approx`]: Approximate equality for float results.
//! - [`error`]: Error type shared by every module.
//!
//! # Example
//!
//! ```rust
//! use device_dispatch::backend::Backend;
//! use device_dispatch::ops::dispatch;
//! use device_dispatch::tensors::{DynTensor, Tensor};
//!
//! let lhs = DynTensor::from(Tensor::new(vec![3], vec![1, 2, 3]));
//! let rhs = DynTensor::from(Tensor::new(vec![3], vec![4, 5, 6]));
//! let out = dispatch::add(Backend::Cpu, &lhs, &rhs).unwrap();
//! assert_eq!(out, DynTensor::from(Tensor::new(vec![3], vec![5, 7, 9])));
//! ```

pub mod approx;
pub mod backend;
pub mod backprop;
pub mod device;
pub mod error;
pub mod ops;
pub mod tensors;
