//! Device-agnostic default implementations.
//!
//! These kernels are what every backend runs unless it registers an
//! override. They are plain sequential Rust and are the numeric reference
//! the backend overrides are tested against.
//!
//! The `*_typed` functions hold the arithmetic; the erased entry points
//! (`add`, `exp`, ...) unpack [`DynTensor`] operands and match on the
//! element type. The unpacking macros are shared with the backend modules.
//!
//! # Panics
//!
//! The entry points assume well-formed operands and may panic on a tensor
//! whose shape does not match its data. [`Registry::invoke`] rejects those
//! with [`DispatchError::MalformedTensor`] before any kernel runs.
//!
//! [`Registry::invoke`]: crate::ops::dispatch::Registry::invoke

use crate::error::{DispatchError, Result};
use crate::ops::{ADD, EXP, OpAttrs, OpDescriptor, SOFTMAX, SOFTMAX_GRAD, SUM};
use crate::tensors::{DynTensor, ElementType, Float, Numeric, Tensor};

/// Unpacks one numeric operand and evaluates `$body` with it bound to `$t`.
macro_rules! numeric_unary {
    ($desc:expr, $operands:expr, |$t:ident| $body:expr) => {{
        let desc = &$desc;
        match $crate::ops::generic::unary_operand(desc, $operands)? {
            $crate::tensors::DynTensor::I32($t) => ($body).map($crate::tensors::DynTensor::from),
            $crate::tensors::DynTensor::I64($t) => ($body).map($crate::tensors::DynTensor::from),
            $crate::tensors::DynTensor::F32($t) => ($body).map($crate::tensors::DynTensor::from),
            $crate::tensors::DynTensor::F64($t) => ($body).map($crate::tensors::DynTensor::from),
            other => Err($crate::ops::generic::constraint_violation(
                desc,
                other.element_type(),
            )),
        }
    }};
}

/// Unpacks one floating-point operand and evaluates `$body` with it bound to `$t`.
macro_rules! float_unary {
    ($desc:expr, $operands:expr, |$t:ident| $body:expr) => {{
        let desc = &$desc;
        match $crate::ops::generic::unary_operand(desc, $operands)? {
            $crate::tensors::DynTensor::F32($t) => ($body).map($crate::tensors::DynTensor::from),
            $crate::tensors::DynTensor::F64($t) => ($body).map($crate::tensors::DynTensor::from),
            other => Err($crate::ops::generic::constraint_violation(
                desc,
                other.element_type(),
            )),
        }
    }};
}

/// Unpacks two numeric operands of one element type.
macro_rules! numeric_binary {
    ($desc:expr, $operands:expr, |$a:ident, $b:ident| $body:expr) => {{
        use $crate::tensors::DynTensor;
        let desc = &$desc;
        match $crate::ops::generic::binary_operands(desc, $operands)? {
            (DynTensor::I32($a), DynTensor::I32($b)) => ($body).map(DynTensor::from),
            (DynTensor::I64($a), DynTensor::I64($b)) => ($body).map(DynTensor::from),
            (DynTensor::F32($a), DynTensor::F32($b)) => ($body).map(DynTensor::from),
            (DynTensor::F64($a), DynTensor::F64($b)) => ($body).map(DynTensor::from),
            (lhs, rhs) => Err($crate::ops::generic::operand_type_error(desc, lhs, rhs)),
        }
    }};
}

/// Unpacks two floating-point operands of one element type.
macro_rules! float_binary {
    ($desc:expr, $operands:expr, |$a:ident, $b:ident| $body:expr) => {{
        use $crate::tensors::DynTensor;
        let desc = &$desc;
        match $crate::ops::generic::binary_operands(desc, $operands)? {
            (DynTensor::F32($a), DynTensor::F32($b)) => ($body).map(DynTensor::from),
            (DynTensor::F64($a), DynTensor::F64($b)) => ($body).map(DynTensor::from),
            (lhs, rhs) => Err($crate::ops::generic::operand_type_error(desc, lhs, rhs)),
        }
    }};
}

pub(crate) use float_binary;
pub(crate) use float_unary;
pub(crate) use numeric_binary;
pub(crate) use numeric_unary;

pub(crate) fn unary_operand<'a>(
    desc: &OpDescriptor,
    operands: &[&'a DynTensor],
) -> Result<&'a DynTensor> {
    match operands {
        [x] => Ok(*x),
        _ => Err(arity_error(desc, operands.len())),
    }
}

pub(crate) fn binary_operands<'a>(
    desc: &OpDescriptor,
    operands: &[&'a DynTensor],
) -> Result<(&'a DynTensor, &'a DynTensor)> {
    match operands {
        [lhs, rhs] => Ok((*lhs, *rhs)),
        _ => Err(arity_error(desc, operands.len())),
    }
}

fn arity_error(desc: &OpDescriptor, found: usize) -> DispatchError {
    DispatchError::ArityMismatch {
        op: desc.name().to_owned(),
        expected: desc.arity(),
        found,
    }
}

pub(crate) fn constraint_violation(desc: &OpDescriptor, found: ElementType) -> DispatchError {
    DispatchError::TypeConstraintViolation {
        op: desc.name().to_owned(),
        constraint: desc.constraint(),
        found,
    }
}

/// Picks the error for a binary operand pair no kernel arm accepted.
pub(crate) fn operand_type_error(
    desc: &OpDescriptor,
    lhs: &DynTensor,
    rhs: &DynTensor,
) -> DispatchError {
    let (lhs, rhs) = (lhs.element_type(), rhs.element_type());
    if !desc.constraint().admits(lhs) {
        constraint_violation(desc, lhs)
    } else if !desc.constraint().admits(rhs) {
        constraint_violation(desc, rhs)
    } else {
        DispatchError::ElementTypeMismatch {
            op: desc.name().to_owned(),
            lhs,
            rhs,
        }
    }
}

pub(crate) fn check_same_shape(desc: &OpDescriptor, lhs: &[usize], rhs: &[usize]) -> Result<()> {
    if lhs != rhs {
        return Err(DispatchError::ShapeMismatch {
            op: desc.name().to_owned(),
            lhs: lhs.to_vec(),
            rhs: rhs.to_vec(),
        });
    }
    Ok(())
}

/// Resolves a possibly negative axis against `rank`.
pub(crate) fn normalize_axis(axis: isize, rank: usize) -> Result<usize> {
    let signed_rank = rank as isize;
    let resolved = if axis < 0 { axis + signed_rank } else { axis };
    if (0..signed_rank).contains(&resolved) {
        Ok(resolved as usize)
    } else {
        Err(DispatchError::InvalidAxis { axis, rank })
    }
}

/// Length of the last axis; rank-0 tensors have none.
pub(crate) fn last_axis_len(shape: &[usize]) -> Result<usize> {
    normalize_axis(-1, shape.len()).map(|axis| shape[axis])
}

pub(crate) fn add_typed<T: Numeric>(lhs: &Tensor<T>, rhs: &Tensor<T>) -> Result<Tensor<T>> {
    check_same_shape(&ADD, &lhs.shape, &rhs.shape)?;
    let data = lhs
        .data
        .iter()
        .zip(&rhs.data)
        .map(|(&a, &b)| a.plus(b))
        .collect();
    Ok(Tensor::new(lhs.shape.clone(), data))
}

pub(crate) fn exp_typed<T: Float>(x: &Tensor<T>) -> Result<Tensor<T>> {
    Ok(Tensor::new(
        x.shape.clone(),
        x.data.iter().map(|&v| v.exp()).collect(),
    ))
}

pub(crate) fn sum_typed<T: Numeric>(x: &Tensor<T>, axis: Option<isize>) -> Result<Tensor<T>> {
    let axis = normalize_axis(axis.unwrap_or(-1), x.rank())?;
    let outer: usize = x.shape[..axis].iter().product();
    let n = x.shape[axis];
    let inner: usize = x.shape[axis + 1..].iter().product();

    let mut data = vec![T::ZERO; outer * inner];
    for (o, acc_row) in data.chunks_mut(inner.max(1)).enumerate().take(outer) {
        for k in 0..n {
            let start = (o * n + k) * inner;
            for (acc, &v) in acc_row.iter_mut().zip(&x.data[start..start + inner]) {
                *acc = acc.plus(v);
            }
        }
    }

    let mut shape = x.shape.clone();
    shape[axis] = 1;
    Ok(Tensor::new(shape, data))
}

/// Writes the max-subtracted softmax of `src` into `dst`.
pub(crate) fn softmax_row<T: Float>(src: &[T], dst: &mut [T]) {
    let max = src
        .iter()
        .copied()
        .fold(T::NEG_INFINITY, |m, v| if v > m { v } else { m });
    let mut total = T::ZERO;
    for (d, &v) in dst.iter_mut().zip(src) {
        *d = (v - max).exp();
        total = total.plus(*d);
    }
    for d in dst.iter_mut() {
        *d = *d / total;
    }
}

/// `dst = (dy - sum(dy * y)) * y` for one row.
pub(crate) fn softmax_grad_row<T: Float>(y: &[T], dy: &[T], dst: &mut [T]) {
    let dot = y
        .iter()
        .zip(dy)
        .fold(T::ZERO, |acc, (&a, &b)| acc.plus(a.times(b)));
    for ((d, &a), &b) in dst.iter_mut().zip(y).zip(dy) {
        *d = (b - dot) * a;
    }
}

pub(crate) fn softmax_typed<T: Float>(x: &Tensor<T>) -> Result<Tensor<T>> {
    let n = last_axis_len(&x.shape)?;
    let mut data = vec![T::ZERO; x.len()];
    if n > 0 {
        for (src, dst) in x.data.chunks(n).zip(data.chunks_mut(n)) {
            softmax_row(src, dst);
        }
    }
    Ok(Tensor::new(x.shape.clone(), data))
}

pub(crate) fn softmax_grad_typed<T: Float>(y: &Tensor<T>, dy: &Tensor<T>) -> Result<Tensor<T>> {
    check_same_shape(&SOFTMAX_GRAD, &y.shape, &dy.shape)?;
    let n = last_axis_len(&y.shape)?;
    let mut data = vec![T::ZERO; y.len()];
    if n > 0 {
        for ((y_row, dy_row), dst) in y.data.chunks(n).zip(dy.data.chunks(n)).zip(data.chunks_mut(n)) {
            softmax_grad_row(y_row, dy_row, dst);
        }
    }
    Ok(Tensor::new(y.shape.clone(), data))
}

/// Generic `add`.
pub fn add(operands: &[&DynTensor], _attrs: &OpAttrs) -> Result<DynTensor> {
    numeric_binary!(ADD, operands, |a, b| add_typed(a, b))
}

/// Generic `exp`.
pub fn exp(operands: &[&DynTensor], _attrs: &OpAttrs) -> Result<DynTensor> {
    float_unary!(EXP, operands, |x| exp_typed(x))
}

/// Generic `sum` along `attrs.axis`.
pub fn sum(operands: &[&DynTensor], attrs: &OpAttrs) -> Result<DynTensor> {
    numeric_unary!(SUM, operands, |x| sum_typed(x, attrs.axis))
}

/// Generic `softmax` along the last axis.
pub fn softmax(operands: &[&DynTensor], _attrs: &OpAttrs) -> Result<DynTensor> {
    float_unary!(SOFTMAX, operands, |x| softmax_typed(x))
}

/// Generic `softmax_grad` from `(y, dy)`.
pub fn softmax_grad(operands: &[&DynTensor], _attrs: &OpAttrs) -> Result<DynTensor> {
    float_binary!(SOFTMAX_GRAD, operands, |y, dy| softmax_grad_typed(y, dy))
}
