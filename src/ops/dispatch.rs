//! Operation Dispatch Layer
//!
//! This module resolves, for an (operation, backend) pair, the most specific
//! registered implementation and calls it.
//!
//! Resolution is strictly two-level:
//! 1. The backend's override for the operation, if one was registered
//! 2. Otherwise the operation's generic default
//!
//! # Design Highlights
//! - **Frozen after build**: registration happens on a [`RegistryBuilder`];
//!   [`RegistryBuilder::build`] turns it into an immutable [`Registry`] that
//!   any number of threads may read
//! - **No partial matches**: overrides share the default's descriptor, so an
//!   operand check that passes for one backend passes for all of them
//! - **Checked before called**: arity, well-formedness and element-type
//!   constraints are verified before any implementation runs
//!
//! # Example
//! ```rust
//! use device_dispatch::backend::Backend;
//! use device_dispatch::ops::dispatch::{Implementation, RegistryBuilder};
//! use device_dispatch::ops::{self, OpAttrs, SUM};
//! use device_dispatch::tensors::{DynTensor, Tensor};
//!
//! let mut builder = RegistryBuilder::new();
//! ops::register_defaults(&mut builder).unwrap();
//! builder
//!     .register_override("sum", Backend::Cuda, Implementation::new("tuned.sum", ops::generic::sum))
//!     .unwrap();
//! let registry = builder.build();
//!
//! assert_eq!(registry.resolve("sum", Backend::Cpu).unwrap().label(), "generic.sum");
//! assert_eq!(registry.resolve("sum", Backend::Cuda).unwrap().label(), "tuned.sum");
//!
//! let x = DynTensor::from(Tensor::new(vec![2, 2], vec![1, 2, 3, 4]));
//! let out = registry.invoke(SUM.name(), Backend::Cpu, &[&x], &OpAttrs::along(0)).unwrap();
//! assert_eq!(out, DynTensor::from(Tensor::new(vec![1, 2], vec![4, 6])));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use briny::prelude::Validate;
use lazy_static::lazy_static;
use log::{debug, trace};

use crate::backend::Backend;
use crate::device::DeviceQueue;
use crate::error::{DispatchError, Result, Slot};
use crate::ops::{self, OpAttrs, OpDescriptor};
use crate::tensors::DynTensor;

/// Signature shared by every implementation.
pub type KernelFn = dyn Fn(&[&DynTensor], &OpAttrs) -> Result<DynTensor> + Send + Sync;

/// A labelled, shareable implementation of one operation.
///
/// Cloning is cheap and preserves identity: clones compare equal under
/// [`Implementation::same_as`].
#[derive(Clone)]
pub struct Implementation {
    label: &'static str,
    kernel: Arc<KernelFn>,
}

impl Implementation {
    pub fn new<F>(label: &'static str, kernel: F) -> Self
    where
        F: Fn(&[&DynTensor], &OpAttrs) -> Result<DynTensor> + Send + Sync + 'static,
    {
        Self {
            label,
            kernel: Arc::new(kernel),
        }
    }

    /// Human-readable origin, e.g. `"cpu.add"`.
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Calls the kernel without any operand checks.
    pub(crate) fn call(&self, operands: &[&DynTensor], attrs: &OpAttrs) -> Result<DynTensor> {
        (self.kernel)(operands, attrs)
    }

    /// Whether both handles refer to the same registered kernel.
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.kernel, &other.kernel)
    }
}

impl fmt::Debug for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Implementation")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Everything registered for one operation.
#[derive(Debug, Clone)]
struct OpEntry {
    descriptor: OpDescriptor,
    default: Implementation,
    overrides: HashMap<Backend, Implementation>,
}

impl OpEntry {
    fn pick(&self, backend: Backend) -> &Implementation {
        self.overrides.get(&backend).unwrap_or(&self.default)
    }
}

/// A registry that is still open for registration.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    entries: HashMap<&'static str, OpEntry>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the generic implementation for `op`.
    ///
    /// # Errors
    /// Returns [`DispatchError::DuplicateRegistration`] if `op` already has a default.
    pub fn register_default(&mut self, op: OpDescriptor, imp: Implementation) -> Result<()> {
        if self.entries.contains_key(op.name()) {
            return Err(DispatchError::DuplicateRegistration {
                op: op.name().to_owned(),
                slot: Slot::Default,
            });
        }
        debug!(
            "registered default `{}` for operation `{}` ({} operand(s), {})",
            imp.label(),
            op.name(),
            op.arity(),
            op.constraint()
        );
        self.entries.insert(
            op.name(),
            OpEntry {
                descriptor: op,
                default: imp,
                overrides: HashMap::new(),
            },
        );
        Ok(())
    }

    /// Installs a backend-specific implementation of an existing operation.
    ///
    /// # Errors
    /// - [`DispatchError::UnknownOperation`] if `op` has no default
    /// - [`DispatchError::DuplicateRegistration`] if `backend` already overrides `op`
    pub fn register_override(&mut self, op: &str, backend: Backend, imp: Implementation) -> Result<()> {
        let entry = self
            .entries
            .get_mut(op)
            .ok_or_else(|| DispatchError::UnknownOperation(op.to_owned()))?;
        if entry.overrides.contains_key(&backend) {
            return Err(DispatchError::DuplicateRegistration {
                op: op.to_owned(),
                slot: Slot::Override(backend),
            });
        }
        debug!("registered `{backend}` override `{}` for operation `{op}`", imp.label());
        entry.overrides.insert(backend, imp);
        Ok(())
    }

    /// Registers every override `queue` provides.
    ///
    /// # Errors
    /// Propagates the first failing registration.
    pub fn install(&mut self, queue: &dyn DeviceQueue) -> Result<()> {
        queue.register_overrides(self)
    }

    /// Closes registration.
    pub fn build(self) -> Registry {
        Registry {
            entries: self.entries,
        }
    }
}

/// An immutable operation registry.
#[derive(Debug, Clone)]
pub struct Registry {
    entries: HashMap<&'static str, OpEntry>,
}

impl Registry {
    fn entry(&self, op: &str) -> Result<&OpEntry> {
        self.entries
            .get(op)
            .ok_or_else(|| DispatchError::UnknownOperation(op.to_owned()))
    }

    /// Returns the override for (`op`, `backend`) if present, else the default.
    ///
    /// # Errors
    /// Returns [`DispatchError::UnknownOperation`] if `op` was never registered.
    pub fn resolve(&self, op: &str, backend: Backend) -> Result<&Implementation> {
        self.entry(op).map(|entry| entry.pick(backend))
    }

    /// Resolves `op` for `backend`, checks the operands, then calls it.
    ///
    /// Operands are only borrowed, so a failed call leaves them untouched.
    ///
    /// # Errors
    /// - [`DispatchError::UnknownOperation`] if `op` was never registered
    /// - [`DispatchError::ArityMismatch`] on a wrong operand count
    /// - [`DispatchError::MalformedTensor`] if an operand's shape and data disagree
    /// - [`DispatchError::TypeConstraintViolation`] if an operand's element
    ///   type is not admitted by the operation
    /// - whatever the implementation itself reports
    pub fn invoke(
        &self,
        op: &str,
        backend: Backend,
        operands: &[&DynTensor],
        attrs: &OpAttrs,
    ) -> Result<DynTensor> {
        let entry = self.entry(op)?;
        let desc = &entry.descriptor;
        desc.check_arity(operands.len())?;
        for operand in operands {
            if operand.validate().is_err() {
                return Err(DispatchError::MalformedTensor {
                    shape: operand.shape().to_vec(),
                    len: operand.len(),
                });
            }
        }
        desc.check_types(operands)?;
        entry.pick(backend).call(operands, attrs)
    }

    pub fn descriptor(&self, op: &str) -> Option<&OpDescriptor> {
        self.entries.get(op).map(|entry| &entry.descriptor)
    }

    /// Descriptors of every registered operation, sorted by name.
    pub fn operations(&self) -> Vec<&OpDescriptor> {
        let mut ops: Vec<_> = self.entries.values().map(|e| &e.descriptor).collect();
        ops.sort_by_key(|d| d.name());
        ops
    }

    pub fn has_override(&self, op: &str, backend: Backend) -> bool {
        self.entries
            .get(op)
            .is_some_and(|entry| entry.overrides.contains_key(&backend))
    }

    /// Names of the operations `backend` overrides, sorted.
    pub fn overridden_by(&self, backend: Backend) -> Vec<&'static str> {
        let mut names: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.overrides.contains_key(&backend))
            .map(|(&name, _)| name)
            .collect();
        names.sort_unstable();
        names
    }
}

/// Builds a registry with the generic defaults and every compiled-in backend's overrides.
///
/// # Errors
/// Propagates any registration failure.
pub fn standard_registry() -> Result<Registry> {
    let mut builder = RegistryBuilder::new();
    ops::register_defaults(&mut builder)?;
    builder.install(&super::cpu::CpuQueue)?;
    #[cfg(feature = "cuda")]
    builder.install(&super::cuda::CudaQueue)?;
    Ok(builder.build())
}

lazy_static! {
    static ref STANDARD: Registry = {
        trace!("building the standard operation registry");
        match standard_registry() {
            Ok(registry) => registry,
            Err(err) => panic!("standard operation registry is inconsistent: {err}"),
        }
    };
}

/// The process-wide standard registry, built on first use.
pub fn standard() -> &'static Registry {
    &*STANDARD
}

/// Dispatches `add` for `backend` through the [`standard`] registry.
pub fn add(backend: Backend, lhs: &DynTensor, rhs: &DynTensor) -> Result<DynTensor> {
    standard().invoke(ops::ADD.name(), backend, &[lhs, rhs], &OpAttrs::default())
}

/// Dispatches `exp` for `backend` through the [`standard`] registry.
pub fn exp(backend: Backend, x: &DynTensor) -> Result<DynTensor> {
    standard().invoke(ops::EXP.name(), backend, &[x], &OpAttrs::default())
}

/// Dispatches `sum` along `axis` for `backend` through the [`standard`] registry.
pub fn sum(backend: Backend, x: &DynTensor, axis: isize) -> Result<DynTensor> {
    standard().invoke(ops::SUM.name(), backend, &[x], &OpAttrs::along(axis))
}

/// Dispatches `softmax` for `backend` through the [`standard`] registry.
pub fn softmax(backend: Backend, x: &DynTensor) -> Result<DynTensor> {
    standard().invoke(ops::SOFTMAX.name(), backend, &[x], &OpAttrs::default())
}

/// Dispatches `softmax_grad` for `backend` through the [`standard`] registry.
pub fn softmax_grad(backend: Backend, y: &DynTensor, dy: &DynTensor) -> Result<DynTensor> {
    standard().invoke(ops::SOFTMAX_GRAD.name(), backend, &[y, dy], &OpAttrs::default())
}
