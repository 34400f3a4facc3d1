use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::module_system::error::ModuleSystemError;
use crate::module_system::traits::Module;

/// Builds a fresh module instance. Each bootstrap calls it once per enabled module.
pub type ModuleFactory = Arc<dyn Fn() -> Arc<dyn Module> + Send + Sync>;

/// Static declaration of a module: name, dependencies, criticality and how to construct it.
#[derive(Clone)]
pub struct ModuleDescriptor {
    pub name: String,
    pub dependencies: BTreeSet<String>,
    /// Failure of a critical module aborts bootstrap
    pub critical: bool,
    /// Disabled modules are left out before resolution
    pub enabled: bool,
    factory: ModuleFactory,
}

impl ModuleDescriptor {
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn Module> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            dependencies: BTreeSet::new(),
            critical: false,
            enabled: true,
            factory: Arc::new(factory),
        }
    }

    pub fn depends_on(mut self, dependency: impl Into<String>) -> Self {
        self.dependencies.insert(dependency.into());
        self
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(dependencies.into_iter().map(Into::into));
        self
    }

    pub fn critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Construct a new instance.
    pub fn instantiate(&self) -> Arc<dyn Module> {
        (self.factory)()
    }
}

impl fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("critical", &self.critical)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

/// Static registration table mapping module names to their descriptors.
///
/// Insertion order is kept for listing only; load order always comes from
/// the dependency resolver.
#[derive(Debug, Clone, Default)]
pub struct ModuleCatalog {
    descriptors: Vec<ModuleDescriptor>,
}

impl ModuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a descriptor. Names must be unique within a catalog.
    pub fn register(&mut self, descriptor: ModuleDescriptor) -> Result<(), ModuleSystemError> {
        if self.contains(&descriptor.name) {
            return Err(ModuleSystemError::DuplicateRegistration {
                module: descriptor.name,
            });
        }
        self.descriptors.push(descriptor);
        Ok(())
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, descriptor: ModuleDescriptor) -> Result<Self, ModuleSystemError> {
        self.register(descriptor)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&ModuleDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ModuleDescriptor> {
        self.descriptors.iter_mut().find(|d| d.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn descriptors(&self) -> &[ModuleDescriptor] {
        &self.descriptors
    }

    pub fn names(&self) -> Vec<&str> {
        self.descriptors.iter().map(|d| d.name.as_str()).collect()
    }

    /// Descriptors that take part in resolution
    pub fn enabled(&self) -> impl Iterator<Item = &ModuleDescriptor> {
        self.descriptors.iter().filter(|d| d.enabled)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
