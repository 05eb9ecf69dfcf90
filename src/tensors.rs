//! Operand types: element tags, typed tensors and type-erased tensors.
//!
//! # Operand Model
//!
//! Operations are registered once and called with operands of many element
//! types, so the dispatch surface works on [`DynTensor`], an enum over the
//! supported typed [`Tensor<T>`]s. Every `DynTensor` reports an
//! [`ElementType`] tag which the registry checks against the operation's
//! declared constraint before any implementation runs.
//!
//! ## Design Highlights
//! - `Tensor<T>` is a shape plus flat row-major data, nothing more
//! - The [`Element`], [`Numeric`] and [`Float`] traits give kernels a generic
//!   view over the concrete element types
//! - Well-formedness (shape product equals data length) is enforced through
//!   `briny`'s [`Validate`] trait
//!
//! ## Example
//!
//! ```rust
//! use device_dispatch::tensors::{DynTensor, ElementType, Tensor};
//! let t = Tensor::new(vec![2, 3], vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]);
//! let d = DynTensor::from(t);
//! assert_eq!(d.element_type(), ElementType::F32);
//! assert_eq!(d.shape(), &[2, 3]);
//! ```

use core::fmt;
use core::ops::{Div, Mul, Sub};

use briny::prelude::{TrustedData, Validate, ValidationError};

use crate::error::{DispatchError, Result};

/// Tag naming the element type of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    Bool,
    I32,
    I64,
    F32,
    F64,
}

impl ElementType {
    /// Whether arithmetic is defined on this type.
    pub const fn is_numeric(self) -> bool {
        !matches!(self, Self::Bool)
    }

    /// Whether this is an IEEE floating-point type.
    pub const fn is_floating_point(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    /// Size of one element in bytes.
    pub const fn size_in_bytes(self) -> usize {
        match self {
            Self::Bool => 1,
            Self::I32 | Self::F32 => 4,
            Self::I64 | Self::F64 => 8,
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bool => "bool",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
        })
    }
}

/// Represents an N-dimensional tensor with a shape and flat row-major data.
///
/// - `shape` defines the structure, e.g., `[2, 3]` for a 2×3 matrix.
/// - `data` holds the flattened content in row-major order.
/// - An empty shape denotes a scalar holding exactly one element.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor<T> {
    pub shape: Vec<usize>,
    pub data: Vec<T>,
}

impl<T> Tensor<T> {
    /// Creates a new tensor with the given shape and flat data.
    ///
    /// # Panics
    /// Panics if the number of elements in `data` does not match the shape product.
    pub fn new(shape: impl Into<Vec<usize>>, data: Vec<T>) -> Self {
        let shape = shape.into();
        assert_eq!(
            element_count(&shape),
            Some(data.len()),
            "shape {:?} is incompatible with {} data elements",
            shape,
            data.len()
        );
        Self { shape, data }
    }

    /// Creates a tensor, rejecting a shape that does not match the data.
    ///
    /// # Errors
    /// Returns [`DispatchError::MalformedTensor`] on mismatch.
    ///
    /// # Example
    /// ```
    /// use device_dispatch::tensors::Tensor;
    /// assert!(Tensor::try_new(vec![2, 2], vec![1, 2, 3, 4]).is_ok());
    /// assert!(Tensor::try_new(vec![2, 2], vec![1, 2, 3]).is_err());
    /// ```
    pub fn try_new(shape: impl Into<Vec<usize>>, data: Vec<T>) -> Result<Self> {
        let raw = Self {
            shape: shape.into(),
            data,
        };
        let (shape, len) = (raw.shape.clone(), raw.data.len());
        let trusted = TrustedData::new(raw).map_err(|_| DispatchError::MalformedTensor { shape, len })?;
        Ok(trusted.into_inner())
    }

    /// Number of stored elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the tensor stores no elements.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.shape.len()
    }
}

/// Number of elements a tensor of `shape` holds.
///
/// Returns `None` when the product of the non-zero dimensions overflows
/// `usize`, so every partial product of an accepted shape fits as well.
///
/// # Example
/// ```
/// use device_dispatch::tensors::element_count;
/// assert_eq!(element_count(&[2, 3]), Some(6));
/// assert_eq!(element_count(&[]), Some(1));
/// assert_eq!(element_count(&[4, 0]), Some(0));
/// assert_eq!(element_count(&[usize::MAX, 2, 0]), None);
/// ```
pub fn element_count(shape: &[usize]) -> Option<usize> {
    let nonzero = shape
        .iter()
        .filter(|&&d| d != 0)
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))?;
    Some(if shape.contains(&0) { 0 } else { nonzero })
}

impl<T> Validate for Tensor<T> {
    fn validate(&self) -> core::result::Result<(), ValidationError> {
        if element_count(&self.shape) != Some(self.data.len()) {
            return Err(ValidationError);
        }
        Ok(())
    }
}

/// A scalar type that can live inside a [`DynTensor`].
pub trait Element: Copy + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// The tag reported for tensors of this type.
    const TYPE: ElementType;

    /// Erases the element type.
    fn wrap(tensor: Tensor<Self>) -> DynTensor;

    /// Borrows the typed tensor if `tensor` holds this element type.
    fn peek(tensor: &DynTensor) -> Option<&Tensor<Self>>;

    /// Recovers the typed tensor, handing the original back on mismatch.
    fn unwrap(tensor: DynTensor) -> core::result::Result<Tensor<Self>, DynTensor>;
}

/// Element types closed under addition and multiplication.
pub trait Numeric: Element {
    const ZERO: Self;

    /// Addition; wraps on integer overflow.
    fn plus(self, rhs: Self) -> Self;

    /// Multiplication; wraps on integer overflow.
    fn times(self, rhs: Self) -> Self;
}

/// Floating-point element types.
pub trait Float:
    Numeric + PartialOrd + Sub<Output = Self> + Mul<Output = Self> + Div<Output = Self>
{
    const NEG_INFINITY: Self;

    fn exp(self) -> Self;
}

macro_rules! impl_element {
    ($ty:ty, $variant:ident) => {
        impl Element for $ty {
            const TYPE: ElementType = ElementType::$variant;

            fn wrap(tensor: Tensor<Self>) -> DynTensor {
                DynTensor::$variant(tensor)
            }

            fn peek(tensor: &DynTensor) -> Option<&Tensor<Self>> {
                match tensor {
                    DynTensor::$variant(t) => Some(t),
                    _ => None,
                }
            }

            fn unwrap(tensor: DynTensor) -> core::result::Result<Tensor<Self>, DynTensor> {
                match tensor {
                    DynTensor::$variant(t) => Ok(t),
                    other => Err(other),
                }
            }
        }
    };
}

impl_element!(bool, Bool);
impl_element!(i32, I32);
impl_element!(i64, I64);
impl_element!(f32, F32);
impl_element!(f64, F64);

macro_rules! impl_integer {
    ($($ty:ty),*) => {$(
        impl Numeric for $ty {
            const ZERO: Self = 0;

            fn plus(self, rhs: Self) -> Self {
                self.wrapping_add(rhs)
            }

            fn times(self, rhs: Self) -> Self {
                self.wrapping_mul(rhs)
            }
        }
    )*};
}

macro_rules! impl_float {
    ($($ty:ident),*) => {$(
        impl Numeric for $ty {
            const ZERO: Self = 0.0;

            fn plus(self, rhs: Self) -> Self {
                self + rhs
            }

            fn times(self, rhs: Self) -> Self {
                self * rhs
            }
        }

        impl Float for $ty {
            const NEG_INFINITY: Self = $ty::NEG_INFINITY;

            fn exp(self) -> Self {
                $ty::exp(self)
            }
        }
    )*};
}

impl_integer!(i32, i64);
impl_float!(f32, f64);

/// A tensor whose element type is known only at runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum DynTensor {
    Bool(Tensor<bool>),
    I32(Tensor<i32>),
    I64(Tensor<i64>),
    F32(Tensor<f32>),
    F64(Tensor<f64>),
}

/// Applies `$body` to the typed tensor inside any `DynTensor` variant.
macro_rules! each_variant {
    ($value:expr, $t:ident => $body:expr) => {
        match $value {
            DynTensor::Bool($t) => $body,
            DynTensor::I32($t) => $body,
            DynTensor::I64($t) => $body,
            DynTensor::F32($t) => $body,
            DynTensor::F64($t) => $body,
        }
    };
}

impl DynTensor {
    pub fn element_type(&self) -> ElementType {
        match self {
            Self::Bool(_) => ElementType::Bool,
            Self::I32(_) => ElementType::I32,
            Self::I64(_) => ElementType::I64,
            Self::F32(_) => ElementType::F32,
            Self::F64(_) => ElementType::F64,
        }
    }

    pub fn shape(&self) -> &[usize] {
        each_variant!(self, t => &t.shape)
    }

    pub fn len(&self) -> usize {
        each_variant!(self, t => t.data.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrows the typed tensor, or `None` if the element type differs.
    pub fn downcast_ref<T: Element>(&self) -> Option<&Tensor<T>> {
        T::peek(self)
    }

    /// Converts back into a typed tensor.
    ///
    /// # Errors
    /// Returns [`DispatchError::UnexpectedElementType`] if the element type differs.
    ///
    /// # Example
    /// ```
    /// use device_dispatch::tensors::{DynTensor, Tensor};
    /// let d = DynTensor::from(Tensor::new(vec![2], vec![1i64, 2]));
    /// assert!(d.clone().into_typed::<f32>().is_err());
    /// assert_eq!(d.into_typed::<i64>().unwrap().data, vec![1, 2]);
    /// ```
    pub fn into_typed<T: Element>(self) -> Result<Tensor<T>> {
        T::unwrap(self).map_err(|other| DispatchError::UnexpectedElementType {
            expected: T::TYPE,
            found: other.element_type(),
        })
    }
}

impl<T: Element> From<Tensor<T>> for DynTensor {
    fn from(tensor: Tensor<T>) -> Self {
        T::wrap(tensor)
    }
}

impl Validate for DynTensor {
    fn validate(&self) -> core::result::Result<(), ValidationError> {
        each_variant!(self, t => t.validate())
    }
}

/// Defines a tensor from nested literal arrays.
///
/// Supports arbitrary dimensionality as long as sublists are uniform in shape.
///
/// # Example
/// ```
/// use device_dispatch::tensor;
/// let t = tensor!([[1.0, 2.0], [3.0, 4.0]]);
/// assert_eq!(t.shape, vec![2, 2]);
/// ```
#[macro_export]
macro_rules! tensor {
    ($lit:literal) => {
        $crate::tensors::Tensor::new(Vec::<usize>::new(), vec![$lit])
    };

    ([ $( $inner:tt ),+ $(,)? ]) => {{
        let children = vec![ $( $crate::tensor!($inner) ),+ ];
        let first_shape = children[0].shape.clone();
        assert!(children.iter().all(|c| c.shape == first_shape),
            "ragged tensor literal (rows have mismatched shapes)");
        let mut shape = vec![children.len()];
        shape.extend_from_slice(&first_shape);
        let mut data = Vec::with_capacity(children.len() * children[0].data.len());
        for c in children { data.extend(c.data); }
        $crate::tensors::Tensor::new(shape, data)
    }};
}
