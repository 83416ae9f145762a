//! Execution engine boundary.
//!
//! The session drives an external graph runtime through the [`Engine`]
//! trait: load a program into a variable scope, prepare a plan for a block,
//! and run that plan with named feeds and fetches. With the `native`
//! feature, [`NativeEngine`] implements it over the C bridge library.

#[cfg(feature = "native")]
mod ffi;
#[cfg(feature = "native")]
mod native;

#[cfg(feature = "native")]
pub use native::NativeEngine;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::config::ProgramSource;
use crate::error::{InferError, Result};
use crate::tensor::NativeTensor;

/// Native input tensors keyed by feed target name.
pub type FeedTargets = HashMap<String, NativeTensor>;

/// Native output tensors keyed by fetch target name, filled by the engine.
pub type FetchTargets = HashMap<String, NativeTensor>;

/// Memory placement for an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Place {
    /// Host memory.
    Cpu,
    /// Accelerator with index.
    Gpu(usize),
}

impl Place {
    /// Map a device selector: negative means host, otherwise accelerator index.
    pub fn from_device_id(device: i32) -> Self {
        match usize::try_from(device) {
            Ok(index) => Self::Gpu(index),
            Err(_) => Self::Cpu,
        }
    }

    /// Inverse of [`Place::from_device_id`].
    pub fn device_id(self) -> i32 {
        match self {
            Self::Cpu => -1,
            Self::Gpu(index) => index as i32,
        }
    }
}

impl FromStr for Place {
    type Err = InferError;

    /// Parse a device string like "cpu", "gpu", "gpu:0", "cuda:1".
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_lowercase();
        if s == "cpu" {
            return Ok(Self::Cpu);
        }
        if s == "gpu" || s == "cuda" {
            return Ok(Self::Gpu(0));
        }
        let idx = s
            .strip_prefix("gpu:")
            .or_else(|| s.strip_prefix("cuda:"))
            .ok_or_else(|| InferError::config(format!("Invalid device: {}", s)))?;
        let index: usize = idx
            .parse()
            .map_err(|_| InferError::config(format!("Invalid device index: {}", idx)))?;
        Ok(Self::Gpu(index))
    }
}

impl fmt::Display for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Gpu(idx) => write!(f, "gpu:{}", idx),
        }
    }
}

/// A program loaded by an engine.
pub trait Program {
    /// Names of the input slots, in declaration order.
    fn feed_target_names(&self) -> Vec<String>;

    /// Names of the output slots, in declaration order.
    fn fetch_target_names(&self) -> Vec<String>;
}

/// Graph execution engine.
///
/// One engine instance is bound to one placement. Scopes, programs and plans
/// are opaque to the session; it only threads them back into the engine.
pub trait Engine: Sized + Send {
    /// Mutable variable storage.
    type Scope: Send;
    /// Loaded program.
    type Program: Program + Send;
    /// Execution plan prepared for one program block.
    type Plan: Send;

    /// Apply process-wide `--key=value` flags. Called at most once per process.
    fn init_global_flags(flags: &[String]) -> Result<()>;

    /// Create an engine bound to `place`.
    fn new(place: Place) -> Result<Self>;

    /// Create an empty variable scope.
    fn new_scope(&self) -> Result<Self::Scope>;

    /// Load a program and its parameters into `scope`.
    fn load_program(&self, scope: &mut Self::Scope, source: &ProgramSource)
        -> Result<Self::Program>;

    /// Prepare an execution plan for block `block` of `program`.
    fn prepare(&self, program: &Self::Program, block: usize) -> Result<Self::Plan>;

    /// Materialize every variable of block `block` in `scope`.
    fn create_variables(
        &self,
        program: &Self::Program,
        scope: &mut Self::Scope,
        block: usize,
    ) -> Result<()>;

    /// Run a prepared plan, reading `feeds` and inserting one tensor per
    /// fetch target into `fetches`.
    fn run_prepared(
        &self,
        plan: &Self::Plan,
        scope: &mut Self::Scope,
        feeds: &FeedTargets,
        fetches: &mut FetchTargets,
        create_vars: bool,
    ) -> Result<()>;
}
