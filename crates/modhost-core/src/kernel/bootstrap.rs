use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

use crate::event::{EventBus, SystemEvent};
use crate::kernel::config::KernelConfig;
use crate::kernel::constants;
use crate::kernel::error::{Error, KernelLifecyclePhase, Result};
use crate::kernel::phase::{BootstrapPhase, PhaseContext, PhaseHook, PhaseRecord, PhaseTracker};
use crate::module_system::{
    DependencyResolver, HealthStatus, LifecycleManager, ManagedModule, Module, ModuleCatalog,
    ModuleContext, ModuleDescriptor, ModuleRegistry, ModuleSystemError, SharedModuleRegistry,
};

/// Outcome of a successful bootstrap
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BootstrapReport {
    /// Resolved load order of enabled modules
    pub order: Vec<String>,
    /// Registered modules, in load order
    pub loaded: Vec<String>,
    /// Non-critical modules left out, with the cause
    pub failed: BTreeMap<String, String>,
    /// Modules switched off by descriptor or configuration
    pub disabled: Vec<String>,
}

/// Outcome of a shutdown
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// Modules stopped, in stop order
    pub stopped: Vec<String>,
    /// Modules whose stop failed or timed out
    pub unclean: Vec<String>,
    /// In-flight handlers aborted at the end of the drain
    pub forced_handlers: usize,
    /// Pending requests rejected as cleared
    pub cleared_requests: usize,
}

/// Composes the resolver, lifecycle manager, registry and event bus into a
/// phased bootstrap and a reverse-order shutdown.
pub struct Orchestrator {
    config: KernelConfig,
    catalog: ModuleCatalog,
    bus: EventBus,
    lifecycle: LifecycleManager,
    registry: SharedModuleRegistry,
    tracker: PhaseTracker,
    hooks: HashMap<BootstrapPhase, Vec<Arc<dyn PhaseHook>>>,
    failed: BTreeMap<String, String>,
    bootstrapped: bool,
}

impl Orchestrator {
    /// Create an orchestrator with a fresh bus and registry built from `config`.
    pub fn new(catalog: ModuleCatalog, config: KernelConfig) -> Self {
        let bus = EventBus::with_config(config.event_bus.clone());
        Self::with_event_bus(catalog, config, bus)
    }

    /// Create an orchestrator around an existing bus, e.g. one the caller has
    /// already subscribed telemetry listeners on.
    pub fn with_event_bus(catalog: ModuleCatalog, config: KernelConfig, bus: EventBus) -> Self {
        Self {
            lifecycle: LifecycleManager::new(config.lifecycle.clone()),
            registry: Arc::new(RwLock::new(ModuleRegistry::new())),
            tracker: PhaseTracker::new(bus.clone()),
            hooks: HashMap::new(),
            failed: BTreeMap::new(),
            bootstrapped: false,
            config,
            catalog,
            bus,
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn registry(&self) -> SharedModuleRegistry {
        Arc::clone(&self.registry)
    }

    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn catalog(&self) -> &ModuleCatalog {
        &self.catalog
    }

    /// Attach a hook to the `http_server` or `module_discovery` phase.
    pub fn add_phase_hook(&mut self, phase: BootstrapPhase, hook: Arc<dyn PhaseHook>) -> Result<()> {
        if !phase.accepts_hooks() {
            return Err(Error::Other(format!(
                "phase '{}' does not accept hooks",
                phase
            )));
        }
        self.hooks.entry(phase).or_default().push(hook);
        Ok(())
    }

    /// Phases entered so far, with durations for completed ones
    pub fn phase_history(&self) -> Vec<PhaseRecord> {
        self.tracker.history().to_vec()
    }

    pub fn current_phase(&self) -> Option<BootstrapPhase> {
        self.tracker.current()
    }

    pub fn is_ready(&self) -> bool {
        self.tracker
            .history()
            .last()
            .is_some_and(|r| r.phase == BootstrapPhase::Ready && r.is_complete())
    }

    /// Non-critical modules that failed to load, with the cause
    pub fn failed_modules(&self) -> &BTreeMap<String, String> {
        &self.failed
    }

    /// Resolve the load order of the enabled modules without loading anything.
    pub fn resolve_order(&self) -> Result<Vec<String>> {
        let descriptors = self.config.apply(&self.catalog);
        Ok(DependencyResolver::resolve(descriptors.iter().filter(|d| d.enabled))?)
    }

    /// Run every phase from `init` to `ready`.
    ///
    /// Structural errors and critical module failures abort the bootstrap;
    /// modules already brought up are stopped again before the error is
    /// returned. Non-critical failures are recorded in the report.
    pub async fn bootstrap(&mut self) -> Result<BootstrapReport> {
        if self.bootstrapped {
            return Err(Error::KernelLifecycleError {
                phase: KernelLifecyclePhase::RunPreCheck,
                module_name: None,
                message: "bootstrap has already run on this orchestrator".to_string(),
                source: None,
            });
        }
        self.bootstrapped = true;
        log::info!("Bootstrapping {} v{}", constants::APP_NAME, constants::APP_VERSION);

        self.tracker.enter(BootstrapPhase::Init);
        let descriptors = self.config.apply(&self.catalog);
        let disabled: Vec<String> = descriptors
            .iter()
            .filter(|d| !d.enabled)
            .map(|d| d.name.clone())
            .collect();
        for name in &disabled {
            log::info!("Module '{}' is disabled", name);
        }
        let order = DependencyResolver::resolve(descriptors.iter().filter(|d| d.enabled))
            .map_err(|e| {
                log::error!("Module graph is invalid: {}", e);
                Error::KernelLifecycleError {
                    phase: KernelLifecyclePhase::Resolve,
                    module_name: None,
                    message: e.to_string(),
                    source: Some(Box::new(e.into())),
                }
            })?;
        log::info!("Resolved load order: {}", order.join(", "));
        self.tracker.complete();

        self.tracker.enter(BootstrapPhase::CoreModules);
        let loaded = self.load_modules(&descriptors, &order).await?;
        self.tracker.complete();

        for phase in [BootstrapPhase::HttpServer, BootstrapPhase::ModuleDiscovery] {
            self.tracker.enter(phase);
            if let Err(e) = self.run_hooks(phase).await {
                self.shutdown().await;
                return Err(e);
            }
            self.tracker.complete();
        }

        self.tracker.enter(BootstrapPhase::Ready);
        self.tracker.complete();
        log::info!(
            "Bootstrap complete: {} loaded, {} failed, {} disabled",
            loaded.len(),
            self.failed.len(),
            disabled.len()
        );

        Ok(BootstrapReport {
            order,
            loaded,
            failed: self.failed.clone(),
            disabled,
        })
    }

    /// Initialize every module in order, start the initialized ones in order,
    /// then register the started ones.
    async fn load_modules(
        &mut self,
        descriptors: &[ModuleDescriptor],
        order: &[String],
    ) -> Result<Vec<String>> {
        let by_name: HashMap<&str, &ModuleDescriptor> =
            descriptors.iter().map(|d| (d.name.as_str(), d)).collect();

        let mut initialized: Vec<ManagedModule> = Vec::new();
        let mut available: BTreeMap<String, Arc<dyn Module>> = BTreeMap::new();
        for name in order {
            let Some(descriptor) = by_name.get(name.as_str()).copied() else {
                continue;
            };
            match self.initialize_module(descriptor, &available).await {
                Ok(managed) => {
                    available.insert(name.clone(), Arc::clone(managed.instance()));
                    initialized.push(managed);
                }
                Err(e) => {
                    if let Err(fatal) = self.record_failure(
                        descriptor,
                        "initialize",
                        KernelLifecyclePhase::Initialize,
                        e,
                    ) {
                        self.roll_back(initialized).await;
                        return Err(fatal);
                    }
                }
            }
        }

        let mut started: Vec<ManagedModule> = Vec::new();
        let mut remaining = initialized.into_iter();
        while let Some(mut managed) = remaining.next() {
            let critical = managed.is_critical();
            let descriptor = by_name.get(managed.name()).copied();
            let blocked = descriptor.and_then(|d| {
                d.dependencies
                    .iter()
                    .find(|dep| !started.iter().any(|m| m.name() == dep.as_str()))
                    .cloned()
            });

            let outcome = match blocked {
                Some(dependency) => Err(Error::from(ModuleSystemError::DependencyUnavailable {
                    module: managed.name().to_string(),
                    dependency,
                })),
                None => self.lifecycle.start(&mut managed).await.map_err(Error::from),
            };

            match outcome {
                Ok(()) => {
                    self.bus.publish_system(&SystemEvent::ModuleStarted {
                        module: managed.name().to_string(),
                    });
                    started.push(managed);
                }
                Err(e) => {
                    // Release whatever initialize acquired
                    self.lifecycle.stop(&mut managed).await;
                    let failure = match descriptor {
                        Some(d) => self.record_failure(d, "start", KernelLifecyclePhase::Start, e),
                        None if critical => Err(Error::lifecycle(
                            KernelLifecyclePhase::Start,
                            managed.name(),
                            e,
                        )),
                        None => Ok(()),
                    };
                    if let Err(fatal) = failure {
                        started.extend(remaining);
                        self.roll_back(started).await;
                        return Err(fatal);
                    }
                }
            }
        }

        let mut registry = self.registry.write().await;
        let mut loaded = Vec::with_capacity(started.len());
        for managed in started {
            loaded.push(managed.name().to_string());
            registry.register(managed)?;
        }
        Ok(loaded)
    }

    async fn initialize_module(
        &self,
        descriptor: &ModuleDescriptor,
        available: &BTreeMap<String, Arc<dyn Module>>,
    ) -> Result<ManagedModule> {
        let mut ctx = ModuleContext::new(descriptor.name.clone(), self.bus.clone())
            .with_settings(self.config.settings_for(&descriptor.name));
        for dependency in &descriptor.dependencies {
            match available.get(dependency) {
                Some(instance) => ctx = ctx.with_dependency(Arc::clone(instance)),
                None => {
                    return Err(ModuleSystemError::DependencyUnavailable {
                        module: descriptor.name.clone(),
                        dependency: dependency.clone(),
                    }
                    .into());
                }
            }
        }

        let instance = descriptor.instantiate();
        if instance.name() != descriptor.name {
            return Err(ModuleSystemError::failed(
                descriptor.name.clone(),
                format!("factory produced a module named '{}'", instance.name()),
            )
            .into());
        }

        let mut managed = ManagedModule::new(instance, descriptor.critical);
        let report = self.lifecycle.initialize(&mut managed, &ctx).await?;
        self.bus.publish_system(&SystemEvent::ModuleInitialized {
            module: descriptor.name.clone(),
            attempts: report.attempts,
        });
        Ok(managed)
    }

    /// Announce a module failure. Critical modules turn it into a fatal
    /// error; others are remembered and skipped.
    fn record_failure(
        &mut self,
        descriptor: &ModuleDescriptor,
        operation: &str,
        phase: KernelLifecyclePhase,
        error: Error,
    ) -> Result<()> {
        self.bus.publish_system(&SystemEvent::ModuleFailed {
            module: descriptor.name.clone(),
            operation: operation.to_string(),
            error: error.to_string(),
        });

        if descriptor.critical {
            log::error!(
                "Critical module '{}' failed to {}: {}",
                descriptor.name,
                operation,
                error
            );
            return Err(Error::lifecycle(phase, descriptor.name.clone(), error));
        }

        log::warn!(
            "Module '{}' failed to {} and will be unavailable: {}",
            descriptor.name,
            operation,
            error
        );
        self.failed.insert(descriptor.name.clone(), error.to_string());
        Ok(())
    }

    /// Stop modules that were brought up before a fatal failure, newest first.
    async fn roll_back(&self, mut modules: Vec<ManagedModule>) {
        if modules.is_empty() {
            return;
        }
        log::warn!("Rolling back {} module(s) after a fatal bootstrap error", modules.len());
        for managed in modules.iter_mut().rev() {
            self.lifecycle.stop(managed).await;
            self.bus.publish_system(&SystemEvent::ModuleStopped {
                module: managed.name().to_string(),
            });
        }
    }

    async fn run_hooks(&self, phase: BootstrapPhase) -> Result<()> {
        let Some(hooks) = self.hooks.get(&phase) else {
            return Ok(());
        };
        let ctx = PhaseContext {
            phase,
            bus: self.bus.clone(),
            registry: self.registry(),
        };
        for hook in hooks {
            log::info!("Running {} hook '{}'", phase, hook.name());
            hook.run(&ctx).await.map_err(|e| {
                log::error!("Hook '{}' failed during {}: {}", hook.name(), phase, e);
                Error::KernelLifecycleError {
                    phase: KernelLifecyclePhase::PhaseHook,
                    module_name: None,
                    message: format!("hook '{}' failed during {}", hook.name(), phase),
                    source: Some(Box::new(e)),
                }
            })?;
        }
        Ok(())
    }

    /// Health of every registered module, plus an unhealthy entry for each
    /// non-critical module that failed to load.
    pub async fn health(&self) -> BTreeMap<String, HealthStatus> {
        let registry = self.registry.read().await;
        let mut health = self.lifecycle.health_all(registry.iter()).await;
        for (name, cause) in &self.failed {
            health.insert(
                name.clone(),
                HealthStatus::unhealthy(format!("module not loaded: {}", cause)),
            );
        }
        health
    }

    /// Stop registered modules in reverse load order, clear the registry,
    /// drain in-flight handlers and reject any pending requests.
    ///
    /// Never fails; individual stop failures are logged. Safe to call twice.
    pub async fn shutdown(&mut self) -> ShutdownReport {
        log::info!("Shutting down modules...");
        let mut report = ShutdownReport::default();
        {
            let mut registry = self.registry.write().await;
            for managed in registry.iter_reverse_mut() {
                if !self.lifecycle.stop(managed).await {
                    report.unclean.push(managed.name().to_string());
                }
                report.stopped.push(managed.name().to_string());
                self.bus.publish_system(&SystemEvent::ModuleStopped {
                    module: managed.name().to_string(),
                });
            }
            registry.clear();
        }

        report.forced_handlers = self
            .bus
            .wait_for_active_handlers(self.config.event_bus.drain_timeout())
            .await;
        report.cleared_requests = self.bus.clear_pending();
        log::info!(
            "Shutdown complete: {} stopped ({} unclean), {} handler(s) forced, {} request(s) cleared",
            report.stopped.len(),
            report.unclean.len(),
            report.forced_handlers,
            report.cleared_requests
        );
        report
    }
}
