use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::module_system::error::ModuleSystemError;
use crate::module_system::lifecycle::{ManagedModule, ModuleState};
use crate::module_system::traits::Module;

/// Registry for loaded module instances.
///
/// Entries keep registration order, which is the resolved load order; teardown
/// walks it backwards.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    entries: Vec<ManagedModule>,
    index: HashMap<String, usize>,
}

/// Registry shared between the orchestrator and its callers
pub type SharedModuleRegistry = Arc<RwLock<ModuleRegistry>>;

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module. A name may be registered only once.
    pub fn register(&mut self, module: ManagedModule) -> Result<(), ModuleSystemError> {
        if self.index.contains_key(module.name()) {
            return Err(ModuleSystemError::DuplicateRegistration {
                module: module.name().to_string(),
            });
        }
        self.index.insert(module.name().to_string(), self.entries.len());
        self.entries.push(module);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ManagedModule> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    pub fn instance(&self, name: &str) -> Option<Arc<dyn Module>> {
        self.get(name).map(|m| Arc::clone(m.instance()))
    }

    pub fn state(&self, name: &str) -> Option<ModuleState> {
        self.get(name).map(ManagedModule::state)
    }

    pub fn has(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Registered names in registration order
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|m| m.name().to_string()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ManagedModule> {
        self.entries.iter()
    }

    /// Entries newest first, for teardown
    pub fn iter_reverse_mut(&mut self) -> impl Iterator<Item = &mut ManagedModule> {
        self.entries.iter_mut().rev()
    }

    /// A module's exports downcast to the concrete type it published.
    pub fn get_exports<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.get(name)?.instance().exports()?.downcast::<T>().ok()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }
}
