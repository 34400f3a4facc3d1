use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::event::{EventBus, SystemEvent};
use crate::kernel::error::Result;
use crate::module_system::SharedModuleRegistry;

/// Named bootstrap phases, in the order they run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapPhase {
    Init,
    CoreModules,
    HttpServer,
    ModuleDiscovery,
    Ready,
}

impl BootstrapPhase {
    pub const ALL: [BootstrapPhase; 5] = [
        BootstrapPhase::Init,
        BootstrapPhase::CoreModules,
        BootstrapPhase::HttpServer,
        BootstrapPhase::ModuleDiscovery,
        BootstrapPhase::Ready,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BootstrapPhase::Init => "init",
            BootstrapPhase::CoreModules => "core_modules",
            BootstrapPhase::HttpServer => "http_server",
            BootstrapPhase::ModuleDiscovery => "module_discovery",
            BootstrapPhase::Ready => "ready",
        }
    }

    /// Phases the embedding process may attach hooks to
    pub fn accepts_hooks(&self) -> bool {
        matches!(self, BootstrapPhase::HttpServer | BootstrapPhase::ModuleDiscovery)
    }
}

impl fmt::Display for BootstrapPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entered phase. `duration_ms` is `None` until the phase completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub phase: BootstrapPhase,
    pub duration_ms: Option<u64>,
}

impl PhaseRecord {
    pub fn is_complete(&self) -> bool {
        self.duration_ms.is_some()
    }
}

/// Records phase transitions and announces them on the bus.
pub(crate) struct PhaseTracker {
    bus: EventBus,
    history: Vec<PhaseRecord>,
    current: Option<(BootstrapPhase, Instant)>,
}

impl PhaseTracker {
    pub(crate) fn new(bus: EventBus) -> Self {
        Self {
            bus,
            history: Vec::new(),
            current: None,
        }
    }

    pub(crate) fn enter(&mut self, phase: BootstrapPhase) {
        log::info!("Entering bootstrap phase '{}'", phase);
        self.current = Some((phase, Instant::now()));
        self.history.push(PhaseRecord {
            phase,
            duration_ms: None,
        });
        self.bus.publish_system(&SystemEvent::PhaseStarted {
            phase: phase.to_string(),
        });
    }

    pub(crate) fn complete(&mut self) {
        let Some((phase, started)) = self.current.take() else {
            return;
        };
        let duration_ms = started.elapsed().as_millis() as u64;
        if let Some(record) = self.history.last_mut() {
            record.duration_ms = Some(duration_ms);
        }
        log::info!("Bootstrap phase '{}' completed in {}ms", phase, duration_ms);
        self.bus.publish_system(&SystemEvent::PhaseCompleted {
            phase: phase.to_string(),
            duration_ms,
        });
    }

    pub(crate) fn current(&self) -> Option<BootstrapPhase> {
        self.current.map(|(phase, _)| phase)
    }

    pub(crate) fn history(&self) -> &[PhaseRecord] {
        &self.history
    }
}

/// What a phase hook gets to work with
#[derive(Clone)]
pub struct PhaseContext {
    pub phase: BootstrapPhase,
    pub bus: EventBus,
    pub registry: SharedModuleRegistry,
}

/// Work the embedding process runs inside the `http_server` or
/// `module_discovery` phase, after core modules are up. A failing hook
/// aborts bootstrap.
#[async_trait]
pub trait PhaseHook: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, ctx: &PhaseContext) -> Result<()>;
}
