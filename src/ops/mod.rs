//! # Operation Dispatch Layer
//!
//! This module describes dispatchable tensor operations and dispatches them
//! across compute backends through a [`dispatch::Registry`].
//!
//! ## Submodules
//!
//! - [`generic`]: Device-agnostic default implementations
//! - [`cpu`]: `rayon`-parallel CPU overrides and the CPU device queue
//! - [`cuda`] *(feature `cuda`)*: CUDA device queue and overrides
//! - [`dispatch`]: The registry, the process-wide standard registry and
//!   unified operation entry points
//!
//! ## Extending the Backend
//!
//! To add a new operation:
//!
//! 1. Declare an [`OpDescriptor`] naming its element-type constraint and arity
//! 2. Register a generic implementation with
//!    [`RegistryBuilder::register_default`](dispatch::RegistryBuilder::register_default)
//! 3. Let backends specialize it with
//!    [`RegistryBuilder::register_override`](dispatch::RegistryBuilder::register_override)
//!
//! A backend can only override operations that already have a default, so
//! every operation is resolvable on every backend.
//!
//! ## Feature Flags
//!
//! - `cuda`: Enables the CUDA backend module (on by default)

use core::fmt;

use crate::error::{DispatchError, Result};
use crate::tensors::{DynTensor, ElementType};

pub mod cpu;
#[cfg(feature = "cuda")]
pub mod cuda;
pub mod dispatch;
pub mod generic;

/// Element types an operation accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeConstraint {
    /// Any element type.
    Any,
    /// Integers and floats.
    Numeric,
    /// Floats only.
    FloatingPoint,
}

impl TypeConstraint {
    /// Whether `ty` satisfies this constraint.
    pub const fn admits(self, ty: ElementType) -> bool {
        match self {
            Self::Any => true,
            Self::Numeric => ty.is_numeric(),
            Self::FloatingPoint => ty.is_floating_point(),
        }
    }
}

impl fmt::Display for TypeConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Any => "any",
            Self::Numeric => "numeric",
            Self::FloatingPoint => "floating-point",
        })
    }
}

/// Identifies a dispatchable operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpDescriptor {
    name: &'static str,
    constraint: TypeConstraint,
    arity: usize,
}

impl OpDescriptor {
    pub const fn new(name: &'static str, constraint: TypeConstraint, arity: usize) -> Self {
        Self {
            name,
            constraint,
            arity,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub const fn constraint(&self) -> TypeConstraint {
        self.constraint
    }

    pub const fn arity(&self) -> usize {
        self.arity
    }

    /// # Errors
    /// [`DispatchError::ArityMismatch`] on a wrong operand count.
    pub fn check_arity(&self, found: usize) -> Result<()> {
        if found != self.arity {
            return Err(DispatchError::ArityMismatch {
                op: self.name.to_owned(),
                expected: self.arity,
                found,
            });
        }
        Ok(())
    }

    /// # Errors
    /// [`DispatchError::TypeConstraintViolation`] on the first operand whose
    /// element type the constraint does not admit.
    pub fn check_types(&self, operands: &[&DynTensor]) -> Result<()> {
        match operands
            .iter()
            .map(|t| t.element_type())
            .find(|&ty| !self.constraint.admits(ty))
        {
            Some(found) => Err(DispatchError::TypeConstraintViolation {
                op: self.name.to_owned(),
                constraint: self.constraint,
                found,
            }),
            None => Ok(()),
        }
    }
}

/// Non-tensor arguments of an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpAttrs {
    /// Reduction axis; negative values count from the end. `None` means the last axis.
    pub axis: Option<isize>,
}

impl OpAttrs {
    pub const fn along(axis: isize) -> Self {
        Self { axis: Some(axis) }
    }
}

/// Elementwise sum of two tensors.
pub const ADD: OpDescriptor = OpDescriptor::new("add", TypeConstraint::Numeric, 2);
/// Elementwise `e^x`.
pub const EXP: OpDescriptor = OpDescriptor::new("exp", TypeConstraint::FloatingPoint, 1);
/// Sum along one axis, keeping it with size 1.
pub const SUM: OpDescriptor = OpDescriptor::new("sum", TypeConstraint::Numeric, 1);
/// Softmax along the last axis.
pub const SOFTMAX: OpDescriptor = OpDescriptor::new("softmax", TypeConstraint::FloatingPoint, 1);
/// Softmax input gradient from `(y, dy)` where `y` is the softmax output.
pub const SOFTMAX_GRAD: OpDescriptor =
    OpDescriptor::new("softmax_grad", TypeConstraint::FloatingPoint, 2);

/// Every operation with a built-in generic implementation.
pub const STANDARD_OPS: [OpDescriptor; 5] = [ADD, EXP, SUM, SOFTMAX, SOFTMAX_GRAD];

/// Installs the generic implementation of every [`STANDARD_OPS`] entry.
///
/// # Errors
/// Returns [`DispatchError::DuplicateRegistration`] if any of them already
/// has a default in `builder`.
pub fn register_defaults(builder: &mut dispatch::RegistryBuilder) -> Result<()> {
    use dispatch::Implementation;

    builder.register_default(ADD, Implementation::new("generic.add", generic::add))?;
    builder.register_default(EXP, Implementation::new("generic.exp", generic::exp))?;
    builder.register_default(SUM, Implementation::new("generic.sum", generic::sum))?;
    builder.register_default(
        SOFTMAX,
        Implementation::new("generic.softmax", generic::softmax),
    )?;
    builder.register_default(
        SOFTMAX_GRAD,
        Implementation::new("generic.softmax_grad", generic::softmax_grad),
    )?;
    Ok(())
}
