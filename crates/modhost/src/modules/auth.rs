//! Token verification backed by the database module.
//!
//! `auth.verify` `{ token }` looks up `token:<token>` through `database.get`
//! and answers `{ valid: true, user }` or `{ valid: false }`.
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use modhost_core::kernel::Result;
use modhost_core::{Module, ModuleContext, ModuleHealthReport, RequestOptions};
use serde::Deserialize;
use serde_json::{Value, json};

use super::database::{self, DatabaseHandle};
use super::Subscriptions;

pub const NAME: &str = "auth";

pub const TOPIC_VERIFY: &str = "auth.verify";

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Timeout of each database lookup
    pub lookup_timeout_ms: u64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            lookup_timeout_ms: 5_000,
        }
    }
}

#[derive(Default)]
pub struct AuthModule {
    verified: Arc<AtomicU64>,
    subscriptions: Subscriptions,
}

#[async_trait]
impl Module for AuthModule {
    fn name(&self) -> &str {
        NAME
    }

    async fn initialize(&self, ctx: &ModuleContext) -> Result<()> {
        self.subscriptions.release().await;
        let settings: AuthSettings = ctx.settings_as()?;

        // Lookups go over the bus, but refuse to come up without a store behind it
        ctx.require_exports::<DatabaseHandle>(database::NAME)?;

        let bus = ctx.bus().clone();
        let verified = Arc::clone(&self.verified);
        let id = ctx.bus().on_request(TOPIC_VERIFY, move |event| {
            let bus = bus.clone();
            let verified = Arc::clone(&verified);
            let options = RequestOptions::new().timeout_ms(settings.lookup_timeout_ms);
            async move {
                let Some(token) = event.payload.get("token").and_then(Value::as_str) else {
                    return Err("missing token".to_string());
                };
                let key = format!("token:{}", token);
                match bus.emit_and_wait(database::TOPIC_GET, json!({ "key": key }), options).await {
                    Ok(user) => {
                        verified.fetch_add(1, Ordering::Relaxed);
                        Ok(json!({ "valid": true, "user": user }))
                    }
                    Err(e) if e.is_responder_error() => Ok(json!({ "valid": false })),
                    Err(e) => Err(format!("user lookup failed: {}", e)),
                }
            }
        })?;
        self.subscriptions.hold(ctx.bus(), TOPIC_VERIFY, id).await;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.subscriptions.release().await;
        Ok(())
    }

    async fn health(&self) -> Option<Result<ModuleHealthReport>> {
        let verified = self.verified.load(Ordering::Relaxed);
        Some(Ok(ModuleHealthReport::healthy().with_checks(json!({ "verified": verified }))))
    }
}
