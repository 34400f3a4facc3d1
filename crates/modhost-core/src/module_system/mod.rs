//! # Modhost Module System
//!
//! Everything needed to take a static set of module declarations to a set of
//! running instances.
//!
//! ## Key Submodules and Responsibilities:
//!
//! - **[`traits`]**: The [`Module`] contract and the [`ModuleContext`] handed
//!   to each module at initialize time.
//! - **[`descriptor`]**: [`ModuleDescriptor`] and the [`ModuleCatalog`] static
//!   registration table; modules are constructed by factory, never loaded at runtime.
//! - **[`dependency`]**: The [`DependencyResolver`], which validates a
//!   descriptor set and produces a deterministic load order.
//! - **[`lifecycle`]**: The [`LifecycleManager`], which applies timeouts,
//!   initialize retries and health probes.
//! - **[`registry`]**: The [`ModuleRegistry`] of loaded instances.
//! - **[`error`]**: [`ModuleSystemError`].
pub mod dependency;
pub mod descriptor;
pub mod error;
pub mod lifecycle;
pub mod registry;
pub mod traits;

pub use dependency::{DependencyError, DependencyResolver};
pub use descriptor::{ModuleCatalog, ModuleDescriptor, ModuleFactory};
pub use error::ModuleSystemError;
pub use lifecycle::{
    HealthStatus, InitializeReport, LifecycleConfig, LifecycleManager, ManagedModule, ModuleState,
};
pub use registry::{ModuleRegistry, SharedModuleRegistry};
pub use traits::{HealthState, Module, ModuleContext, ModuleExports, ModuleHealthReport};

#[cfg(test)]
mod tests;
