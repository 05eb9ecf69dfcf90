//! Parallel CPU backend
//!
//! # CPU Backend
//!
//! This module provides the CPU device queue and the CPU overrides of the
//! standard operations.
//!
//! ## Features
//!
//! - Parallel execution using [`rayon`](https://docs.rs/rayon)
//! - Host-memory device arrays
//!
//! ## Overridden Ops
//!
//! - `add`: parallel elementwise sum
//! - `exp`: parallel elementwise exponential
//! - `softmax`: one parallel task per row of the last axis
//!
//! `sum` and `softmax_grad` run the generic implementation.
//!
//! ## Design Goals
//!
//! - Results equal to the generic kernels for the same input
//! - Deterministic results: no cross-thread reductions

use rayon::prelude::*;

use crate::backend::Backend;
use crate::device::{DeviceArray, DeviceQueue};
use crate::error::Result;
use crate::ops::dispatch::{Implementation, RegistryBuilder};
use crate::ops::generic::{self, float_unary, numeric_binary};
use crate::ops::{ADD, EXP, OpAttrs, SOFTMAX};
use crate::tensors::{DynTensor, Float, Numeric, Tensor};

/// The CPU device queue.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuQueue;

/// A zero-initialized host buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuDeviceArray {
    bytes: Vec<u8>,
}

impl CpuDeviceArray {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

impl CpuQueue {
    /// Allocates `byte_count` zeroed bytes of host memory.
    pub fn allocate(&self, byte_count: usize) -> CpuDeviceArray {
        CpuDeviceArray {
            bytes: vec![0; byte_count],
        }
    }
}

impl DeviceArray for CpuDeviceArray {
    fn backend(&self) -> Backend {
        Backend::Cpu
    }

    fn byte_count(&self) -> usize {
        self.bytes.len()
    }
}

impl DeviceQueue for CpuQueue {
    fn backend(&self) -> Backend {
        Backend::Cpu
    }

    fn create_array(&self, byte_count: usize) -> Box<dyn DeviceArray> {
        Box::new(self.allocate(byte_count))
    }

    fn register_overrides(&self, registry: &mut RegistryBuilder) -> Result<()> {
        registry.register_override(ADD.name(), Backend::Cpu, Implementation::new("cpu.add", add))?;
        registry.register_override(EXP.name(), Backend::Cpu, Implementation::new("cpu.exp", exp))?;
        registry.register_override(
            SOFTMAX.name(),
            Backend::Cpu,
            Implementation::new("cpu.softmax", softmax),
        )?;
        Ok(())
    }
}

fn par_add<T: Numeric>(lhs: &Tensor<T>, rhs: &Tensor<T>) -> Result<Tensor<T>> {
    generic::check_same_shape(&ADD, &lhs.shape, &rhs.shape)?;
    let data = lhs
        .data
        .par_iter()
        .zip(rhs.data.par_iter())
        .map(|(&a, &b)| a.plus(b))
        .collect();
    Ok(Tensor::new(lhs.shape.clone(), data))
}

fn par_exp<T: Float>(x: &Tensor<T>) -> Result<Tensor<T>> {
    let data = x.data.par_iter().map(|&v| v.exp()).collect();
    Ok(Tensor::new(x.shape.clone(), data))
}

fn par_softmax<T: Float>(x: &Tensor<T>) -> Result<Tensor<T>> {
    let n = generic::last_axis_len(&x.shape)?;
    let mut data = vec![T::ZERO; x.len()];
    if n > 0 {
        data.par_chunks_mut(n)
            .zip(x.data.par_chunks(n))
            .for_each(|(dst, src)| generic::softmax_row(src, dst));
    }
    Ok(Tensor::new(x.shape.clone(), data))
}

/// CPU `add`.
pub fn add(operands: &[&DynTensor], _attrs: &OpAttrs) -> Result<DynTensor> {
    numeric_binary!(ADD, operands, |a, b| par_add(a, b))
}

/// CPU `exp`.
pub fn exp(operands: &[&DynTensor], _attrs: &OpAttrs) -> Result<DynTensor> {
    float_unary!(EXP, operands, |x| par_exp(x))
}

/// CPU `softmax`.
pub fn softmax(operands: &[&DynTensor], _attrs: &OpAttrs) -> Result<DynTensor> {
    float_unary!(SOFTMAX, operands, |x| par_softmax(x))
}
