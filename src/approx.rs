//! Approximate equality of floating-point values and tensors.
//!
//! Backend overrides may reorder floating-point work (a fused softmax, for
//! example), so their results are compared with a tolerance rather than
//! bit-for-bit.

use crate::tensors::{DynTensor, Tensor};

/// The max epsilon accepted on `f32`s.
pub const F32_MAX_ERROR: f32 = 1e-3;

/// The expected epsilon accepted on `f32`s.
pub const F32_AVG_ERROR: f32 = 1e-5;

/// The best expected epsilon accepted on `f32`s.
pub const F32_MIN_ERROR: f32 = 1e-6;

/// The max epsilon accepted on `f64`s.
pub const F64_MAX_ERROR: f64 = 1e-3;

/// The expected epsilon accepted on `f64`s.
pub const F64_AVG_ERROR: f64 = 1e-6;

/// The best expected epsilon accepted on `f64`s.
pub const F64_MIN_ERROR: f64 = 1e-13;

/// How close two values are, from best to worst.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ApproxEquality {
    /// Very strong epsilon.
    Precise = 0,

    /// Good epsilon.
    Partial = 1,

    /// Acceptable epsilon
    Relative = 2,

    /// No relative equality.
    Scarce = 3,
}

/// Rates the distance between two values.
pub trait RelativeEq<Rhs: ?Sized = Self> {
    fn approx_eq(&self, rhs: &Rhs) -> ApproxEquality;
}

macro_rules! impl_relative_eq {
    ($ty:ty, $min:expr, $avg:expr, $max:expr) => {
        impl RelativeEq for $ty {
            fn approx_eq(&self, rhs: &Self) -> ApproxEquality {
                let dif = (self - rhs).abs();
                if dif < $min {
                    ApproxEquality::Precise
                } else if dif < $avg {
                    ApproxEquality::Partial
                } else if dif < $max {
                    ApproxEquality::Relative
                } else {
                    ApproxEquality::Scarce
                }
            }
        }
    };
}

impl_relative_eq!(f32, F32_MIN_ERROR, F32_AVG_ERROR, F32_MAX_ERROR);
impl_relative_eq!(f64, F64_MIN_ERROR, F64_AVG_ERROR, F64_MAX_ERROR);

/// Slices rate as their worst pair; differing lengths are `Scarce`.
impl<T: RelativeEq> RelativeEq for [T] {
    fn approx_eq(&self, rhs: &Self) -> ApproxEquality {
        if self.len() != rhs.len() {
            return ApproxEquality::Scarce;
        }
        self.iter()
            .zip(rhs)
            .map(|(a, b)| a.approx_eq(b))
            .max()
            .unwrap_or(ApproxEquality::Precise)
    }
}

/// Tensors rate as their data; differing shapes are `Scarce`.
impl<T: RelativeEq> RelativeEq for Tensor<T> {
    fn approx_eq(&self, rhs: &Self) -> ApproxEquality {
        if self.shape != rhs.shape {
            return ApproxEquality::Scarce;
        }
        self.data[..].approx_eq(&rhs.data[..])
    }
}

/// Float tensors compare by value; anything else must match exactly.
impl RelativeEq for DynTensor {
    fn approx_eq(&self, rhs: &Self) -> ApproxEquality {
        match (self, rhs) {
            (Self::F32(a), Self::F32(b)) => a.approx_eq(b),
            (Self::F64(a), Self::F64(b)) => a.approx_eq(b),
            (a, b) if a == b => ApproxEquality::Precise,
            _ => ApproxEquality::Scarce,
        }
    }
}

/// Whether `a` and `b` are at least `Relative`ly equal.
///
/// # Example
/// ```
/// use device_dispatch::approx::approx_eq;
/// assert!(approx_eq(&[1.0f64, 2.0][..], &[1.0, 2.0 + 1e-9][..]));
/// assert!(!approx_eq(&1.0f32, &1.1));
/// ```
pub fn approx_eq<T: RelativeEq + ?Sized>(a: &T, b: &T) -> bool {
    a.approx_eq(b) <= ApproxEquality::Relative
}
