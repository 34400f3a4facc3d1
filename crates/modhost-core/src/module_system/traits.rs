use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::EventBus;
use crate::kernel::error::Result;
use crate::module_system::error::ModuleSystemError;

/// Capability surface a module shares with the modules that depend on it
pub type ModuleExports = Arc<dyn Any + Send + Sync>;

/// Reported state of a module's own health probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

/// What a module's health probe returns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleHealthReport {
    pub status: HealthState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checks: Option<Value>,
}

impl ModuleHealthReport {
    pub fn healthy() -> Self {
        Self {
            status: HealthState::Healthy,
            message: None,
            checks: None,
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            status: HealthState::Unhealthy,
            message: Some(message.into()),
            checks: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_checks(mut self, checks: Value) -> Self {
        self.checks = Some(checks);
        self
    }
}

/// Contract every hosted module implements.
///
/// Only `name` and `initialize` are required. A module without a `start` or
/// `stop` step keeps the default no-op, and one without a health probe keeps
/// the default `None`, which is reported as healthy.
#[async_trait]
pub trait Module: Any + Send + Sync {
    /// Stable, unique module name
    fn name(&self) -> &str;

    /// Prepare the module. May be retried, so it must be safe to call again after a failure.
    async fn initialize(&self, ctx: &ModuleContext) -> Result<()>;

    /// Begin active work. Never retried.
    async fn start(&self) -> Result<()> {
        Ok(())
    }

    /// Release resources. Failures are logged by the caller and never propagated.
    async fn stop(&self) -> Result<()> {
        Ok(())
    }

    /// Optional health probe.
    async fn health(&self) -> Option<Result<ModuleHealthReport>> {
        None
    }

    /// Capability surface handed to dependents. Opaque to the kernel.
    fn exports(&self) -> Option<ModuleExports> {
        None
    }
}

/// Everything a module receives at initialize time.
///
/// Modules talk to each other through `bus`; direct access to a dependency is
/// limited to what that dependency chose to export.
#[derive(Clone)]
pub struct ModuleContext {
    name: String,
    bus: EventBus,
    settings: Value,
    dependencies: BTreeMap<String, Arc<dyn Module>>,
}

impl ModuleContext {
    pub fn new(name: impl Into<String>, bus: EventBus) -> Self {
        Self {
            name: name.into(),
            bus,
            settings: Value::Null,
            dependencies: BTreeMap::new(),
        }
    }

    pub fn with_settings(mut self, settings: Value) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_dependency(mut self, module: Arc<dyn Module>) -> Self {
        self.dependencies.insert(module.name().to_string(), module);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Raw settings for this module (`Null` when none were configured)
    pub fn settings(&self) -> &Value {
        &self.settings
    }

    /// Decode settings into `T`. Missing settings decode from an empty object,
    /// so types with `#[serde(default)]` get their defaults.
    pub fn settings_as<T: DeserializeOwned>(&self) -> Result<T> {
        let value = match &self.settings {
            Value::Null => Value::Object(Default::default()),
            other => other.clone(),
        };
        serde_json::from_value(value).map_err(|source| {
            ModuleSystemError::InvalidSettings {
                module: self.name.clone(),
                source,
            }
            .into()
        })
    }

    /// An initialized dependency by name
    pub fn dependency(&self, name: &str) -> Option<&Arc<dyn Module>> {
        self.dependencies.get(name)
    }

    pub fn dependency_names(&self) -> impl Iterator<Item = &str> {
        self.dependencies.keys().map(String::as_str)
    }

    /// A dependency's exports, downcast to the concrete type it published.
    pub fn dependency_exports<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.dependencies.get(name)?.exports()?.downcast::<T>().ok()
    }

    /// Like [`dependency_exports`](Self::dependency_exports), failing with
    /// `DependencyUnavailable` when the export is absent or of another type.
    pub fn require_exports<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>> {
        self.dependency_exports(name).ok_or_else(|| {
            ModuleSystemError::DependencyUnavailable {
                module: self.name.clone(),
                dependency: name.to_string(),
            }
            .into()
        })
    }
}

impl fmt::Debug for ModuleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleContext")
            .field("name", &self.name)
            .field("settings", &self.settings)
            .field("dependencies", &self.dependencies.keys().collect::<Vec<_>>())
            .finish()
    }
}
