//! In-memory key/value store reachable over the bus.
//!
//! Requests:
//! - `database.get` `{ key }` answers with the stored value, or an error when absent.
//! - `database.put` `{ key, value }` answers with `{ stored: key }`.
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use modhost_core::kernel::Result;
use modhost_core::event::decode_payload;
use modhost_core::module_system::ModuleExports;
use modhost_core::{Event, Module, ModuleContext, ModuleHealthReport};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::RwLock;

use super::Subscriptions;

pub const NAME: &str = "database";

pub const TOPIC_GET: &str = "database.get";
pub const TOPIC_PUT: &str = "database.put";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Entries loaded at initialize
    pub seed: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct GetRequest {
    key: String,
}

#[derive(Debug, Deserialize)]
struct PutRequest {
    key: String,
    value: Value,
}

/// Shared handle on the store, exported to dependents
#[derive(Debug, Default)]
pub struct DatabaseHandle {
    entries: RwLock<HashMap<String, Value>>,
}

impl DatabaseHandle {
    pub async fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn put(&self, key: impl Into<String>, value: Value) {
        self.entries.write().await.insert(key.into(), value);
    }

    pub async fn entry_count(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[derive(Default)]
pub struct DatabaseModule {
    handle: Arc<DatabaseHandle>,
    subscriptions: Subscriptions,
}

fn decode<T: DeserializeOwned>(event: &Event) -> std::result::Result<T, String> {
    decode_payload(event).map_err(|e| e.to_string())
}

#[async_trait]
impl Module for DatabaseModule {
    fn name(&self) -> &str {
        NAME
    }

    async fn initialize(&self, ctx: &ModuleContext) -> Result<()> {
        self.subscriptions.release().await;

        let settings: DatabaseSettings = ctx.settings_as()?;
        for (key, value) in settings.seed {
            self.handle.put(key, value).await;
        }

        let handle = Arc::clone(&self.handle);
        let id = ctx.bus().on_request(TOPIC_GET, move |event| {
            let handle = Arc::clone(&handle);
            async move {
                match decode::<GetRequest>(&event) {
                    Ok(request) => handle
                        .get(&request.key)
                        .await
                        .ok_or_else(|| format!("key not found: {}", request.key)),
                    Err(e) => Err(e),
                }
            }
        })?;
        self.subscriptions.hold(ctx.bus(), TOPIC_GET, id).await;

        let handle = Arc::clone(&self.handle);
        let id = ctx.bus().on_request(TOPIC_PUT, move |event| {
            let handle = Arc::clone(&handle);
            async move {
                match decode::<PutRequest>(&event) {
                    Ok(request) => {
                        handle.put(request.key.clone(), request.value).await;
                        Ok(json!({ "stored": request.key }))
                    }
                    Err(e) => Err(e),
                }
            }
        })?;
        self.subscriptions.hold(ctx.bus(), TOPIC_PUT, id).await;

        log::info!("database: {} entries loaded", self.handle.entry_count().await);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.subscriptions.release().await;
        Ok(())
    }

    async fn health(&self) -> Option<Result<ModuleHealthReport>> {
        let entries = self.handle.entry_count().await;
        Some(Ok(ModuleHealthReport::healthy().with_checks(json!({ "entries": entries }))))
    }

    fn exports(&self) -> Option<ModuleExports> {
        Some(Arc::clone(&self.handle) as ModuleExports)
    }
}
