//! End-to-end bootstrap of a small module graph through the public API.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use modhost_core::kernel::Result;
use modhost_core::{
    BootstrapPhase, EventBus, KernelConfig, Module, ModuleCatalog, ModuleContext,
    ModuleDescriptor, Orchestrator, RequestOptions,
};
use serde_json::{Value, json};

type Journal = Arc<Mutex<Vec<String>>>;
type Store = Arc<Mutex<HashMap<String, Value>>>;

struct Logger {
    journal: Journal,
}

#[async_trait]
impl Module for Logger {
    fn name(&self) -> &str {
        "logger"
    }

    async fn initialize(&self, _ctx: &ModuleContext) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.journal.lock().unwrap().push("logger".into());
        Ok(())
    }
}

struct Database {
    journal: Journal,
    store: Store,
}

#[async_trait]
impl Module for Database {
    fn name(&self) -> &str {
        "database"
    }

    async fn initialize(&self, ctx: &ModuleContext) -> Result<()> {
        let store = Arc::clone(&self.store);
        ctx.bus().on_request("database.get", move |event| {
            let store = Arc::clone(&store);
            async move {
                let key = event.payload["key"].as_str().unwrap_or_default().to_string();
                store
                    .lock()
                    .unwrap()
                    .get(&key)
                    .cloned()
                    .ok_or_else(|| format!("no such key: {}", key))
            }
        })?;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.journal.lock().unwrap().push("database".into());
        Ok(())
    }

    fn exports(&self) -> Option<modhost_core::module_system::ModuleExports> {
        Some(Arc::new(Arc::clone(&self.store)))
    }
}

struct Events {
    journal: Journal,
}

#[async_trait]
impl Module for Events {
    fn name(&self) -> &str {
        "events"
    }

    async fn initialize(&self, _ctx: &ModuleContext) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.journal.lock().unwrap().push("events".into());
        Ok(())
    }
}

struct Auth {
    journal: Journal,
}

#[async_trait]
impl Module for Auth {
    fn name(&self) -> &str {
        "auth"
    }

    async fn initialize(&self, ctx: &ModuleContext) -> Result<()> {
        // The database must be reachable through its exports before auth comes up
        ctx.require_exports::<Store>("database")?;

        let bus: EventBus = ctx.bus().clone();
        ctx.bus().on_request("auth.verify", move |event| {
            let bus = bus.clone();
            async move {
                let token = event.payload["token"].as_str().unwrap_or_default().to_string();
                let lookup = bus
                    .emit_and_wait(
                        "database.get",
                        json!({ "key": format!("token:{}", token) }),
                        RequestOptions::new().timeout_ms(1_000),
                    )
                    .await;
                match lookup {
                    Ok(user) => Ok(json!({ "valid": true, "user": user })),
                    Err(e) => Err(e.to_string()),
                }
            }
        })?;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.journal.lock().unwrap().push("auth".into());
        Ok(())
    }
}

fn catalog(journal: &Journal, store: &Store) -> ModuleCatalog {
    let (j1, j2, j3, j4) = (
        Arc::clone(journal),
        Arc::clone(journal),
        Arc::clone(journal),
        Arc::clone(journal),
    );
    let store = Arc::clone(store);
    ModuleCatalog::new()
        // Registered out of order on purpose
        .with(
            ModuleDescriptor::new("auth", move || -> Arc<dyn Module> {
                Arc::new(Auth {
                    journal: Arc::clone(&j4),
                })
            })
            .with_dependencies(["logger", "database", "events"]),
        )
        .unwrap()
        .with(
            ModuleDescriptor::new("events", move || -> Arc<dyn Module> {
                Arc::new(Events {
                    journal: Arc::clone(&j3),
                })
            })
            .depends_on("logger"),
        )
        .unwrap()
        .with(
            ModuleDescriptor::new("database", move || -> Arc<dyn Module> {
                Arc::new(Database {
                    journal: Arc::clone(&j2),
                    store: Arc::clone(&store),
                })
            })
            .depends_on("logger")
            .critical(true),
        )
        .unwrap()
        .with(
            ModuleDescriptor::new("logger", move || -> Arc<dyn Module> {
                Arc::new(Logger {
                    journal: Arc::clone(&j1),
                })
            })
            .critical(true),
        )
        .unwrap()
}

#[tokio::test]
async fn test_full_bootstrap_request_and_shutdown() {
    let journal: Journal = Arc::new(Mutex::new(Vec::new()));
    let store: Store = Arc::new(Mutex::new(HashMap::new()));
    store
        .lock()
        .unwrap()
        .insert("token:abc".into(), json!("alice"));

    let mut orchestrator = Orchestrator::new(catalog(&journal, &store), KernelConfig::default());
    let report = orchestrator.bootstrap().await.unwrap();

    assert_eq!(report.order, vec!["logger", "database", "events", "auth"]);
    assert_eq!(report.loaded, report.order);
    assert!(report.failed.is_empty());
    assert!(orchestrator.is_ready());
    assert_eq!(orchestrator.current_phase(), None);
    assert_eq!(orchestrator.phase_history().len(), BootstrapPhase::ALL.len());
    assert_eq!(
        orchestrator.registry().read().await.names(),
        vec!["logger", "database", "events", "auth"]
    );

    let health = orchestrator.health().await;
    assert_eq!(health.len(), 4);
    assert!(health.values().all(|h| h.healthy));

    // Module-to-module request through the bus
    let bus = orchestrator.bus().clone();
    let verified = bus
        .emit_and_wait("auth.verify", json!({ "token": "abc" }), RequestOptions::new().timeout_ms(1_000))
        .await
        .unwrap();
    assert_eq!(verified, json!({ "valid": true, "user": "alice" }));

    let err = bus
        .emit_and_wait("auth.verify", json!({ "token": "nope" }), RequestOptions::new().timeout_ms(1_000))
        .await
        .unwrap_err();
    assert!(err.is_responder_error());
    assert!(err.to_string().contains("no such key: token:nope"));

    let shutdown = orchestrator.shutdown().await;
    assert_eq!(shutdown.stopped, vec!["auth", "events", "database", "logger"]);
    assert!(shutdown.unclean.is_empty());
    assert_eq!(*journal.lock().unwrap(), vec!["auth", "events", "database", "logger"]);
    assert!(orchestrator.registry().read().await.is_empty());
}

#[tokio::test]
async fn test_unanswered_request_times_out() {
    let journal: Journal = Arc::new(Mutex::new(Vec::new()));
    let store: Store = Arc::new(Mutex::new(HashMap::new()));
    let mut orchestrator = Orchestrator::new(catalog(&journal, &store), KernelConfig::default());
    orchestrator.bootstrap().await.unwrap();

    let err = orchestrator
        .bus()
        .emit_and_wait("nobody.listens", json!({}), RequestOptions::new().timeout_ms(20))
        .await
        .unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(orchestrator.bus().pending_count(), 0);

    orchestrator.shutdown().await;
}
