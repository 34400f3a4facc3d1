use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::EventBusConfig;
use crate::module_system::{LifecycleConfig, ModuleCatalog, ModuleDescriptor};

/// Caller-supplied kernel configuration.
///
/// The kernel never reads files or the environment itself; the embedding
/// process deserializes this from wherever it likes. Every field has a default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub lifecycle: LifecycleConfig,
    pub event_bus: EventBusConfig,
    /// Per-module overrides keyed by module name
    pub modules: BTreeMap<String, ModuleOverrides>,
}

/// Overrides for a single module
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleOverrides {
    pub enabled: Option<bool>,
    pub critical: Option<bool>,
    /// Opaque settings handed to the module at initialize
    pub settings: Value,
}

impl KernelConfig {
    pub fn module(&self, name: &str) -> Option<&ModuleOverrides> {
        self.modules.get(name)
    }

    /// Settings for `name`, `Null` when none are configured
    pub fn settings_for(&self, name: &str) -> Value {
        self.module(name)
            .map(|o| o.settings.clone())
            .unwrap_or(Value::Null)
    }

    /// The catalog's descriptors with `enabled`/`critical` overrides applied.
    /// Overrides naming modules the catalog does not know are ignored.
    pub fn apply(&self, catalog: &ModuleCatalog) -> Vec<ModuleDescriptor> {
        for name in self.modules.keys() {
            if !catalog.contains(name) {
                log::warn!("Ignoring configuration for unknown module '{}'", name);
            }
        }

        catalog
            .descriptors()
            .iter()
            .cloned()
            .map(|mut descriptor| {
                if let Some(overrides) = self.modules.get(&descriptor.name) {
                    if let Some(enabled) = overrides.enabled {
                        descriptor.enabled = enabled;
                    }
                    if let Some(critical) = overrides.critical {
                        descriptor.critical = critical;
                    }
                }
                descriptor
            })
            .collect()
    }
}
