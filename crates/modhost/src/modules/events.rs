use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use modhost_core::kernel::Result;
use modhost_core::module_system::ModuleExports;
use modhost_core::{Module, ModuleContext, ModuleHealthReport};
use serde_json::json;

use super::Subscriptions;

pub const NAME: &str = "events";

const WATCHED: &str = "module.*";

/// Counter of module lifecycle events, exported to dependents
#[derive(Debug, Default)]
pub struct EventStats {
    seen: AtomicU64,
}

impl EventStats {
    pub fn seen(&self) -> u64 {
        self.seen.load(Ordering::Relaxed)
    }
}

/// Keeps a running count of `module.*` traffic.
#[derive(Default)]
pub struct EventsModule {
    stats: Arc<EventStats>,
    subscriptions: Subscriptions,
}

#[async_trait]
impl Module for EventsModule {
    fn name(&self) -> &str {
        NAME
    }

    async fn initialize(&self, ctx: &ModuleContext) -> Result<()> {
        self.subscriptions.release().await;
        let stats = Arc::clone(&self.stats);
        let id = ctx.bus().on_sync(WATCHED, move |_event| {
            stats.seen.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })?;
        self.subscriptions.hold(ctx.bus(), WATCHED, id).await;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.subscriptions.release().await;
        log::info!("events: {} module event(s) observed", self.stats.seen());
        Ok(())
    }

    async fn health(&self) -> Option<Result<ModuleHealthReport>> {
        Some(Ok(ModuleHealthReport::healthy().with_checks(json!({ "seen": self.stats.seen() }))))
    }

    fn exports(&self) -> Option<ModuleExports> {
        Some(Arc::clone(&self.stats) as ModuleExports)
    }
}
