use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::{Instant, timeout};

use crate::kernel::constants::{
    DEFAULT_HEALTH_TIMEOUT_MS, DEFAULT_INIT_TIMEOUT_MS, DEFAULT_RETRY_ATTEMPTS,
    DEFAULT_RETRY_DELAY_MS, DEFAULT_START_TIMEOUT_MS, DEFAULT_STOP_TIMEOUT_MS,
};
use crate::kernel::error::{Error, Result as KernelResult};
use crate::module_system::error::ModuleSystemError;
use crate::module_system::traits::{HealthState, Module, ModuleContext};

/// Lifecycle state of one module instance. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleState {
    Unloaded,
    Initialized,
    Running,
    Stopped,
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModuleState::Unloaded => "unloaded",
            ModuleState::Initialized => "initialized",
            ModuleState::Running => "running",
            ModuleState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Timeouts and retry budget applied to every module operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub init_timeout_ms: u64,
    pub start_timeout_ms: u64,
    pub stop_timeout_ms: u64,
    pub health_timeout_ms: u64,
    /// Total initialize attempts (0 behaves as 1)
    pub retry_attempts: u32,
    /// Fixed delay between initialize attempts
    pub retry_delay_ms: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            init_timeout_ms: DEFAULT_INIT_TIMEOUT_MS,
            start_timeout_ms: DEFAULT_START_TIMEOUT_MS,
            stop_timeout_ms: DEFAULT_STOP_TIMEOUT_MS,
            health_timeout_ms: DEFAULT_HEALTH_TIMEOUT_MS,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

impl LifecycleConfig {
    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    fn total_attempts(&self) -> u32 {
        self.retry_attempts.max(1)
    }
}

/// A module instance together with its lifecycle state
pub struct ManagedModule {
    name: String,
    critical: bool,
    instance: Arc<dyn Module>,
    state: ModuleState,
}

impl ManagedModule {
    pub fn new(instance: Arc<dyn Module>, critical: bool) -> Self {
        Self {
            name: instance.name().to_string(),
            critical,
            instance,
            state: ModuleState::Unloaded,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_critical(&self) -> bool {
        self.critical
    }

    pub fn state(&self) -> ModuleState {
        self.state
    }

    pub fn instance(&self) -> &Arc<dyn Module> {
        &self.instance
    }

    fn invalid(&self, operation: &'static str) -> ModuleSystemError {
        ModuleSystemError::InvalidStateTransition {
            module: self.name.clone(),
            from: self.state,
            operation,
        }
    }
}

impl fmt::Debug for ManagedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedModule")
            .field("name", &self.name)
            .field("critical", &self.critical)
            .field("state", &self.state)
            .finish()
    }
}

/// Outcome of a successful initialize
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitializeReport {
    /// The attempt that succeeded, starting at 1
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Health of one module as seen by the kernel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub healthy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl HealthStatus {
    pub fn healthy(message: Option<String>) -> Self {
        Self {
            healthy: true,
            message,
            details: None,
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            healthy: false,
            message: Some(message.into()),
            details: None,
        }
    }
}

/// Drives module instances through `Unloaded -> Initialized -> Running -> Stopped`.
///
/// Every operation is bounded by its configured timeout. Only initialize is
/// retried; stop and health never return an error.
#[derive(Debug, Clone, Default)]
pub struct LifecycleManager {
    config: LifecycleConfig,
}

impl LifecycleManager {
    pub fn new(config: LifecycleConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Initialize `module`, retrying on error or timeout.
    ///
    /// Each attempt re-runs the module's full initialize. After the last
    /// failed attempt the module stays `Unloaded` and the error carries the
    /// attempt count and the last cause.
    pub async fn initialize(
        &self,
        module: &mut ManagedModule,
        ctx: &ModuleContext,
    ) -> Result<InitializeReport, ModuleSystemError> {
        if module.state != ModuleState::Unloaded {
            return Err(module.invalid("initialize"));
        }

        let attempts = self.config.total_attempts();
        let started = Instant::now();
        let instance = Arc::clone(&module.instance);
        let name = module.name.clone();
        let mut attempt = 0;

        loop {
            attempt += 1;
            log::debug!("Initializing module '{}' (attempt {}/{})", module.name, attempt, attempts);

            let attempt_fut = contained(&name, "initialize", instance.initialize(ctx));
            let failure = match timeout(self.config.init_timeout(), attempt_fut).await {
                Ok(Ok(())) => {
                    module.state = ModuleState::Initialized;
                    let report = InitializeReport {
                        attempts: attempt,
                        elapsed: started.elapsed(),
                    };
                    log::info!(
                        "Module '{}' initialized on attempt {}/{} in {:?}",
                        module.name,
                        attempt,
                        attempts,
                        report.elapsed
                    );
                    return Ok(report);
                }
                Ok(Err(e)) => e,
                Err(_) => Error::from(ModuleSystemError::OperationTimedOut {
                    module: module.name.clone(),
                    operation: "initialize".to_string(),
                    timeout_ms: self.config.init_timeout_ms,
                }),
            };

            if attempt >= attempts {
                log::error!(
                    "Module '{}' failed to initialize after {} attempt(s): {}",
                    module.name,
                    attempt,
                    failure
                );
                return Err(ModuleSystemError::InitializationFailed {
                    module: module.name.clone(),
                    attempts: attempt,
                    source: Box::new(failure),
                });
            }

            log::warn!(
                "Module '{}' initialize attempt {}/{} failed: {}; retrying in {:?}",
                module.name,
                attempt,
                attempts,
                failure,
                self.config.retry_delay()
            );
            tokio::time::sleep(self.config.retry_delay()).await;
        }
    }

    /// Start an initialized module. Runs once; failure leaves it `Initialized`.
    pub async fn start(&self, module: &mut ManagedModule) -> Result<(), ModuleSystemError> {
        if module.state != ModuleState::Initialized {
            return Err(module.invalid("start"));
        }

        let instance = Arc::clone(&module.instance);
        let name = module.name.clone();
        let started = contained(&name, "start", instance.start());
        let cause = match timeout(self.config.start_timeout(), started).await {
            Ok(Ok(())) => {
                module.state = ModuleState::Running;
                log::info!("Module '{}' started", module.name);
                return Ok(());
            }
            Ok(Err(e)) => e,
            Err(_) => Error::from(ModuleSystemError::OperationTimedOut {
                module: module.name.clone(),
                operation: "start".to_string(),
                timeout_ms: self.config.start_timeout_ms,
            }),
        };

        log::error!("Module '{}' failed to start: {}", module.name, cause);
        Err(ModuleSystemError::StartFailed {
            module: module.name.clone(),
            source: Box::new(cause),
        })
    }

    /// Stop a module. Never fails: errors and timeouts are logged and the
    /// module ends up `Stopped` either way. Returns true on a clean stop.
    pub async fn stop(&self, module: &mut ManagedModule) -> bool {
        match module.state {
            ModuleState::Initialized | ModuleState::Running => {}
            state => {
                log::debug!("Module '{}' is {}; nothing to stop", module.name, state);
                return true;
            }
        }

        let instance = Arc::clone(&module.instance);
        let name = module.name.clone();
        let stopped = contained(&name, "stop", instance.stop());
        let clean = match timeout(self.config.stop_timeout(), stopped).await {
            Ok(Ok(())) => {
                log::info!("Module '{}' stopped", module.name);
                true
            }
            Ok(Err(e)) => {
                log::error!("Module '{}' failed to stop cleanly: {}", module.name, e);
                false
            }
            Err(_) => {
                log::error!(
                    "Module '{}' stop timed out after {}ms",
                    module.name,
                    self.config.stop_timeout_ms
                );
                false
            }
        };
        module.state = ModuleState::Stopped;
        clean
    }

    /// Probe one module. Never fails; errors and timeouts fold into `healthy: false`.
    pub async fn health(&self, module: &ManagedModule) -> HealthStatus {
        if module.state != ModuleState::Running {
            return HealthStatus::unhealthy(format!("module is {}", module.state));
        }

        let probe = AssertUnwindSafe(module.instance.health()).catch_unwind();
        match timeout(self.config.health_timeout(), probe).await {
            Ok(Ok(None)) => HealthStatus::healthy(Some("no health probe".to_string())),
            Ok(Ok(Some(Ok(report)))) => HealthStatus {
                healthy: report.status == HealthState::Healthy,
                message: report.message,
                details: report.checks,
            },
            Ok(Ok(Some(Err(e)))) => HealthStatus::unhealthy(e.to_string()),
            Ok(Err(_)) => {
                log::error!("Health probe of module '{}' panicked", module.name);
                HealthStatus::unhealthy("health probe panicked")
            }
            Err(_) => HealthStatus::unhealthy(format!(
                "health check timed out after {}ms",
                self.config.health_timeout_ms
            )),
        }
    }

    /// Probe every module concurrently. A slow or failing probe only affects its own entry.
    pub async fn health_all<'a, I>(&self, modules: I) -> BTreeMap<String, HealthStatus>
    where
        I: IntoIterator<Item = &'a ManagedModule>,
    {
        let probes = modules.into_iter().map(|module| async move {
            (module.name.clone(), self.health(module).await)
        });
        join_all(probes).await.into_iter().collect()
    }
}

/// Runs one module hook, turning a panic inside it into a `ModuleFailed` error.
async fn contained<F>(module: &str, operation: &str, hook: F) -> KernelResult<()>
where
    F: Future<Output = KernelResult<()>>,
{
    match AssertUnwindSafe(hook).catch_unwind().await {
        Ok(result) => result,
        Err(_) => {
            log::error!("Module '{}' panicked during {}", module, operation);
            Err(ModuleSystemError::failed(module, format!("{} panicked", operation)).into())
        }
    }
}
