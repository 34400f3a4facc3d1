//! # Modhost Module System Errors
//!
//! Defines error types for module lifecycle and registration.
//!
//! [`ModuleSystemError`] covers failures raised while driving a module through
//! its lifecycle (initialize with retries, start, state transitions) and while
//! registering it. Structural problems in the descriptor set live in
//! [`DependencyError`](crate::module_system::dependency::DependencyError).
use crate::kernel::error::Error;
use crate::module_system::lifecycle::ModuleState;

#[derive(Debug, thiserror::Error)]
pub enum ModuleSystemError {
    #[error("Module '{module}' failed to initialize after {attempts} attempt(s): {source}")]
    InitializationFailed {
        module: String,
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    #[error("Module '{module}' {operation} timed out after {timeout_ms}ms")]
    OperationTimedOut {
        module: String,
        operation: String,
        timeout_ms: u64,
    },

    #[error("Module '{module}' failed to start: {source}")]
    StartFailed {
        module: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Module '{module}' cannot {operation} while {from}")]
    InvalidStateTransition {
        module: String,
        from: ModuleState,
        operation: &'static str,
    },

    #[error("Module '{module}' is already registered")]
    DuplicateRegistration { module: String },

    #[error("Module '{module}' failed: {message}")]
    ModuleFailed { module: String, message: String },

    #[error("Module '{module}' requires '{dependency}', which is not loaded")]
    DependencyUnavailable { module: String, dependency: String },

    #[error("Invalid settings for module '{module}': {source}")]
    InvalidSettings {
        module: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ModuleSystemError {
    /// Convenience constructor for errors raised from a module's own hooks.
    pub fn failed(module: impl Into<String>, message: impl Into<String>) -> Self {
        ModuleSystemError::ModuleFailed {
            module: module.into(),
            message: message.into(),
        }
    }

    /// Name of the module the error concerns.
    pub fn module_name(&self) -> Option<&str> {
        match self {
            ModuleSystemError::InitializationFailed { module, .. }
            | ModuleSystemError::OperationTimedOut { module, .. }
            | ModuleSystemError::StartFailed { module, .. }
            | ModuleSystemError::InvalidStateTransition { module, .. }
            | ModuleSystemError::DuplicateRegistration { module }
            | ModuleSystemError::ModuleFailed { module, .. }
            | ModuleSystemError::DependencyUnavailable { module, .. }
            | ModuleSystemError::InvalidSettings { module, .. } => Some(module),
        }
    }

    /// Number of initialize attempts made, for initialization failures.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            ModuleSystemError::InitializationFailed { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}
