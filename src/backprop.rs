//! Vector-Jacobian products.
//!
//! # Softmax VJP
//!
//! [`softmax_vjp`] follows the pattern of a differentiable operation:
//! 1. **Forward Pass** dispatches `softmax` and returns its output `y`.
//! 2. **Backward Pass** returns a closure that captures `y` and maps an
//!    upstream gradient `dy` to `(dy - sum(dy * y, -1)) * y` by dispatching
//!    `softmax_grad` on the same backend.
//!
//! Nothing is recorded; the caller owns the closure and decides when (and
//! how often) to call it.

use crate::backend::Backend;
use crate::error::Result;
use crate::ops::dispatch::{self, Registry};
use crate::ops::{OpAttrs, SOFTMAX, SOFTMAX_GRAD};
use crate::tensors::DynTensor;

/// Maps an upstream gradient to the input gradient.
pub type Pullback<'a> = dyn Fn(&DynTensor) -> Result<DynTensor> + Send + Sync + 'a;

/// Softmax along the last axis with its pullback, through the standard registry.
///
/// # Errors
/// Propagates dispatch errors of the forward pass; the pullback reports its own.
///
/// # Example
/// ```rust
/// use device_dispatch::backend::Backend;
/// use device_dispatch::backprop::softmax_vjp;
/// use device_dispatch::tensors::{DynTensor, Tensor};
///
/// let x = DynTensor::from(Tensor::new(vec![3], vec![1.0f64, 2.0, 3.0]));
/// let (y, back) = softmax_vjp(Backend::Cpu, &x).unwrap();
/// // a constant upstream gradient has no effect on a softmax input
/// let dx = back(&DynTensor::from(Tensor::new(vec![3], vec![1.0f64; 3]))).unwrap();
/// let dx = dx.into_typed::<f64>().unwrap();
/// assert!(dx.data.iter().all(|g| g.abs() < 1e-12));
/// assert_eq!(y.shape(), &[3]);
/// ```
pub fn softmax_vjp(backend: Backend, x: &DynTensor) -> Result<(DynTensor, Box<Pullback<'static>>)> {
    softmax_vjp_in(dispatch::standard(), backend, x)
}

/// Softmax along the last axis with its pullback, through `registry`.
///
/// # Errors
/// Propagates dispatch errors of the forward pass; the pullback reports its own.
pub fn softmax_vjp_in<'r>(
    registry: &'r Registry,
    backend: Backend,
    x: &DynTensor,
) -> Result<(DynTensor, Box<Pullback<'r>>)> {
    let y = registry.invoke(SOFTMAX.name(), backend, &[x], &OpAttrs::default())?;
    let saved = y.clone();
    let back = move |dy: &DynTensor| {
        registry.invoke(SOFTMAX_GRAD.name(), backend, &[&saved, dy], &OpAttrs::default())
    };
    Ok((y, Box::new(back)))
}
