//! # Modhost Kernel
//!
//! The `kernel` module composes the module system and the event bus into a
//! bootable host.
//!
//! ## Key Responsibilities & Components:
//!
//! - **Bootstrap Orchestration**: [`Orchestrator`](bootstrap::Orchestrator)
//!   resolves the module graph, drives every module through initialize and
//!   start in dependency order, and shuts them down in reverse.
//! - **Phases**: bootstrap runs through the named phases in
//!   [`BootstrapPhase`](phase::BootstrapPhase), each announced on the event bus
//!   with its duration. Embedding processes can attach
//!   [`PhaseHook`](phase::PhaseHook)s to the `http_server` and
//!   `module_discovery` phases.
//! - **Configuration**: [`KernelConfig`](config::KernelConfig) carries timeouts,
//!   retry budgets and per-module overrides. The kernel itself never reads files.
//! - **Core Constants**: defaults and well-known topic names in `constants`.
//! - **Error Handling**: the kernel [`Error`](error::Error) type and `Result` alias.
pub mod bootstrap;
pub mod config;
pub mod constants;
pub mod error;
pub mod phase;

pub use bootstrap::{BootstrapReport, Orchestrator, ShutdownReport};
pub use config::{KernelConfig, ModuleOverrides};
pub use error::{Error, KernelLifecyclePhase, Result};
pub use phase::{BootstrapPhase, PhaseContext, PhaseHook, PhaseRecord};
// Test module declaration
#[cfg(test)]
mod tests;
