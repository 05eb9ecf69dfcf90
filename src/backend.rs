//! Backend identifiers.
//!
//! This module defines the compute backends an operation can be dispatched
//! to. A [`Backend`] is a plain tag: it carries no state and is passed
//! explicitly at every call site, so dispatch is driven by data rather than
//! by which queue type happens to be in scope.
//!
//! # Supported Backends
//!
//! - `Cpu`: Pure Rust backend, parallelized with `rayon` (default).
//! - `Cuda`: CUDA backend; its kernels currently run on the host.
//!
//! # Configuration
//!
//! [`Backend::from_env`] reads `DEVICE_DISPATCH_BACKEND` so applications can
//! pick a backend at startup without hard-coding it.

use core::fmt;
use core::str::FromStr;

use crate::error::{DispatchError, Result};

/// Environment variable consulted by [`Backend::from_env`].
pub const BACKEND_ENV_VAR: &str = "DEVICE_DISPATCH_BACKEND";

/// Enumeration of supported computation backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum Backend {
    /// Pure CPU-based backend (default).
    #[default]
    Cpu = 0,
    /// NVIDIA CUDA backend.
    Cuda,
}

impl Backend {
    /// Every known backend, in discriminant order.
    pub const ALL: [Backend; 2] = [Backend::Cpu, Backend::Cuda];

    /// The lowercase name used for parsing and display.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Cuda => "cuda",
        }
    }

    /// Reads the backend from [`BACKEND_ENV_VAR`].
    ///
    /// An unset variable selects [`Backend::Cpu`].
    ///
    /// # Errors
    /// Returns [`DispatchError::UnknownBackend`] if the variable names no
    /// known backend.
    pub fn from_env() -> Result<Self> {
        let value = std::env::var(BACKEND_ENV_VAR).ok();
        Self::from_setting(value.as_deref())
    }

    /// Interprets an optional configuration value as a backend.
    ///
    /// `None` and blank strings fall back to the default backend.
    ///
    /// # Example
    ///
    /// ```
    /// use device_dispatch::backend::Backend;
    /// assert_eq!(Backend::from_setting(None).unwrap(), Backend::Cpu);
    /// assert_eq!(Backend::from_setting(Some("CUDA")).unwrap(), Backend::Cuda);
    /// assert!(Backend::from_setting(Some("tpu")).is_err());
    /// ```
    pub fn from_setting(value: Option<&str>) -> Result<Self> {
        match value.map(str::trim) {
            None | Some("") => Ok(Self::default()),
            Some(name) => name.parse(),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Backend {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|b| b.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| DispatchError::UnknownBackend(s.to_owned()))
    }
}

impl TryFrom<u8> for Backend {
    type Error = DispatchError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Cpu),
            1 => Ok(Self::Cuda),
            _ => Err(DispatchError::UnknownBackend(value.to_string())),
        }
    }
}
