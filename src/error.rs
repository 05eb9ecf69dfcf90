//! Error types for operation registration and dispatch.

use core::fmt;

use thiserror::Error;

use crate::backend::Backend;
use crate::ops::TypeConstraint;
use crate::tensors::ElementType;

/// Which registry slot a registration targeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// The generic implementation shared by every backend.
    Default,
    /// A backend-specific override.
    Override(Backend),
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("the default implementation"),
            Self::Override(backend) => write!(f, "the `{backend}` override"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Fatal at startup: a half-registered registry must not serve reads.
    #[error("duplicate registration of {slot} for operation `{op}`")]
    DuplicateRegistration { op: String, slot: Slot },

    #[error("unknown operation `{0}`")]
    UnknownOperation(String),

    #[error("operation `{op}` requires {constraint} operands, got `{found}`")]
    TypeConstraintViolation {
        op: String,
        constraint: TypeConstraint,
        found: ElementType,
    },

    #[error("operation `{op}` takes {expected} operand(s), got {found}")]
    ArityMismatch {
        op: String,
        expected: usize,
        found: usize,
    },

    #[error("operation `{op}` mixes element types `{lhs}` and `{rhs}`")]
    ElementTypeMismatch {
        op: String,
        lhs: ElementType,
        rhs: ElementType,
    },

    #[error("shape mismatch in `{op}`: {lhs:?} vs {rhs:?}")]
    ShapeMismatch {
        op: String,
        lhs: Vec<usize>,
        rhs: Vec<usize>,
    },

    #[error("axis {axis} is out of range for a tensor of rank {rank}")]
    InvalidAxis { axis: isize, rank: usize },

    #[error("shape {shape:?} is incompatible with {len} data elements")]
    MalformedTensor { shape: Vec<usize>, len: usize },

    #[error("unknown backend `{0}`")]
    UnknownBackend(String),

    #[error("expected a `{expected}` tensor, found `{found}`")]
    UnexpectedElementType {
        expected: ElementType,
        found: ElementType,
    },
}

pub type Result<T> = core::result::Result<T, DispatchError>;
