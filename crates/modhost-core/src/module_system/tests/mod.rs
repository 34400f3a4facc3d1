
/// Configurable module used across the module system tests
#[cfg(test)]
pub(crate) mod fixtures {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::kernel::error::Result;
    use crate::module_system::{Module, ModuleContext, ModuleDescriptor, ModuleHealthReport};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Probe {
        None,
        Healthy,
        Unhealthy,
        Fails,
        Hangs,
        Panics,
    }

    pub struct TestModule {
        pub name: String,
        /// Number of initialize calls that fail before one succeeds
        pub init_failures: u32,
        /// Number of initialize calls that panic, counted before `init_failures`
        pub init_panics: u32,
        pub init_hangs: bool,
        pub start_fails: bool,
        pub stop_fails: bool,
        pub probe: Probe,
        pub init_calls: AtomicU32,
        pub stop_calls: AtomicU32,
    }

    impl TestModule {
        pub fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                init_failures: 0,
                init_panics: 0,
                init_hangs: false,
                start_fails: false,
                stop_fails: false,
                probe: Probe::None,
                init_calls: AtomicU32::new(0),
                stop_calls: AtomicU32::new(0),
            }
        }

        pub fn failing_init(mut self, times: u32) -> Self {
            self.init_failures = times;
            self
        }

        pub fn panicking_init(mut self, times: u32) -> Self {
            self.init_panics = times;
            self
        }

        pub fn hanging_init(mut self) -> Self {
            self.init_hangs = true;
            self
        }

        pub fn failing_start(mut self) -> Self {
            self.start_fails = true;
            self
        }

        pub fn failing_stop(mut self) -> Self {
            self.stop_fails = true;
            self
        }

        pub fn probe(mut self, probe: Probe) -> Self {
            self.probe = probe;
            self
        }

        pub fn init_calls(&self) -> u32 {
            self.init_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Module for TestModule {
        fn name(&self) -> &str {
            &self.name
        }

        async fn initialize(&self, _ctx: &ModuleContext) -> Result<()> {
            let call = self.init_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.init_panics {
                panic!("init bug #{}", call);
            }
            if self.init_hangs {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if call <= self.init_failures {
                return Err(format!("init failure #{}", call).into());
            }
            Ok(())
        }

        async fn start(&self) -> Result<()> {
            if self.start_fails {
                return Err("start refused".into());
            }
            Ok(())
        }

        async fn stop(&self) -> Result<()> {
            self.stop_calls.fetch_add(1, Ordering::SeqCst);
            if self.stop_fails {
                return Err("stop exploded".into());
            }
            Ok(())
        }

        async fn health(&self) -> Option<Result<ModuleHealthReport>> {
            match self.probe {
                Probe::None => None,
                Probe::Healthy => {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    Some(Ok(ModuleHealthReport::healthy()))
                }
                Probe::Unhealthy => Some(Ok(ModuleHealthReport::unhealthy("disk full"))),
                Probe::Fails => Some(Err("probe crashed".into())),
                Probe::Hangs => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Some(Ok(ModuleHealthReport::healthy()))
                }
                Probe::Panics => panic!("probe bug"),
            }
        }
    }

    /// Descriptor whose factory builds a plain `TestModule`
    pub fn descriptor(name: &str, deps: &[&str]) -> ModuleDescriptor {
        let module_name = name.to_string();
        ModuleDescriptor::new(name, move || -> Arc<dyn Module> {
            Arc::new(TestModule::new(&module_name))
        })
        .with_dependencies(deps.iter().copied())
    }
}
