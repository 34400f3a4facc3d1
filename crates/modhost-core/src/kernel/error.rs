//! # Modhost Kernel Errors
//!
//! Defines the top-level error type for the kernel.
//!
//! [`Error`] wraps the typed errors of each subsystem (module system, event
//! bus, dependency resolution) and adds [`Error::KernelLifecycleError`] for
//! failures that are attributable to a specific bootstrap phase.
use std::result::Result as StdResult;

use thiserror::Error as ThisError;

use crate::event::error::EventSystemError;
use crate::module_system::dependency::DependencyError;
use crate::module_system::error::ModuleSystemError;

/// Custom error type for the orchestration kernel
#[derive(Debug, ThisError)]
pub enum Error {
    /// Structural problem in the module descriptor set (cycles, missing or duplicate names)
    #[error("Dependency resolution failed: {0}")]
    DependencyResolution(#[from] DependencyError),

    /// Typed module system error (lifecycle, registry)
    #[error("Module system error: {0}")]
    ModuleSystem(#[from] ModuleSystemError),

    /// Typed event system error (request/response, payloads)
    #[error("Event system error: {0}")]
    EventSystem(#[from] EventSystemError),

    /// Error occurring during a specific kernel lifecycle phase.
    #[error("Kernel lifecycle error during {phase}: {message}")]
    KernelLifecycleError {
        phase: KernelLifecyclePhase,
        module_name: Option<String>,
        message: String,
        #[source]
        source: Option<Box<Error>>,
    },

    /// Generic error with message
    #[error("Error: {0}")]
    Other(String),
}

/// Represents a specific phase in the kernel's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ThisError)]
pub enum KernelLifecyclePhase {
    #[error("Resolve")]
    Resolve,
    #[error("Initialize")]
    Initialize,
    #[error("Start")]
    Start,
    #[error("RunPreCheck")]
    RunPreCheck,
    #[error("PhaseHook")]
    PhaseHook,
}

/// Shorthand for Result with our Error type
pub type Result<T> = StdResult<T, Error>;

impl Error {
    /// Wraps `source` as the cause of a lifecycle failure for `module_name`.
    pub fn lifecycle(
        phase: KernelLifecyclePhase,
        module_name: impl Into<String>,
        source: Error,
    ) -> Self {
        let module_name = module_name.into();
        Error::KernelLifecycleError {
            phase,
            message: format!("module '{}' failed: {}", module_name, source),
            module_name: Some(module_name),
            source: Some(Box::new(source)),
        }
    }

    /// Name of the module this error is attributed to, if any.
    pub fn module_name(&self) -> Option<&str> {
        match self {
            Error::KernelLifecycleError { module_name, .. } => module_name.as_deref(),
            Error::ModuleSystem(e) => e.module_name(),
            _ => None,
        }
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}
