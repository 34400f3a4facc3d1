#[cfg(test)]
mod phase_tests;

/// Modules that write their lifecycle calls into a shared journal
#[cfg(test)]
pub(crate) mod fixtures {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use crate::kernel::config::KernelConfig;
    use crate::kernel::error::Result;
    use crate::module_system::{LifecycleConfig, Module, ModuleContext, ModuleDescriptor};

    pub type Journal = Arc<Mutex<Vec<String>>>;

    #[derive(Clone, Copy, Default)]
    pub struct Faults {
        pub init: bool,
        pub start: bool,
        /// Panic inside initialize instead of returning an error
        pub panic: bool,
    }

    pub struct Recorder {
        name: String,
        journal: Journal,
        faults: Faults,
    }

    #[async_trait]
    impl Module for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        async fn initialize(&self, ctx: &ModuleContext) -> Result<()> {
            let deps: Vec<&str> = ctx.dependency_names().collect();
            self.journal
                .lock()
                .unwrap()
                .push(format!("init:{}[{}]", self.name, deps.join(",")));
            if self.faults.panic {
                panic!("{} hit a bug", self.name);
            }
            if self.faults.init {
                return Err(format!("{} cannot initialize", self.name).into());
            }
            Ok(())
        }

        async fn start(&self) -> Result<()> {
            self.journal.lock().unwrap().push(format!("start:{}", self.name));
            if self.faults.start {
                return Err(format!("{} cannot start", self.name).into());
            }
            Ok(())
        }

        async fn stop(&self) -> Result<()> {
            self.journal.lock().unwrap().push(format!("stop:{}", self.name));
            Ok(())
        }
    }

    pub fn journal() -> Journal {
        Arc::new(Mutex::new(Vec::new()))
    }

    pub fn entries(journal: &Journal, prefix: &str) -> Vec<String> {
        journal
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn recorder(journal: &Journal, name: &str, deps: &[&str], faults: Faults) -> ModuleDescriptor {
        let journal = Arc::clone(journal);
        let module_name = name.to_string();
        ModuleDescriptor::new(name, move || -> Arc<dyn Module> {
            Arc::new(Recorder {
                name: module_name.clone(),
                journal: Arc::clone(&journal),
                faults,
            })
        })
        .with_dependencies(deps.iter().copied())
    }

    /// No retries and no delays so failure paths run instantly
    pub fn fast_config() -> KernelConfig {
        KernelConfig {
            lifecycle: LifecycleConfig {
                retry_attempts: 1,
                retry_delay_ms: 0,
                ..LifecycleConfig::default()
            },
            ..KernelConfig::default()
        }
    }
}
