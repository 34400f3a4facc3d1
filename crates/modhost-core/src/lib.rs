pub mod event;
pub mod kernel;
pub mod module_system;

// Re-export key public types for the binary and for module authors
pub use event::{Event, EventBus, EventBusConfig, EventSystemError, RequestOptions};
pub use kernel::error::Error as KernelError;
pub use kernel::{BootstrapPhase, BootstrapReport, KernelConfig, Orchestrator, ShutdownReport};
pub use module_system::{
    HealthStatus, Module, ModuleCatalog, ModuleContext, ModuleDescriptor, ModuleHealthReport,
};
