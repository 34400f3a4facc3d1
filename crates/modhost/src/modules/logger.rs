use async_trait::async_trait;
use modhost_core::kernel::Result;
use modhost_core::{Module, ModuleContext};

use super::Subscriptions;

pub const NAME: &str = "logger";

/// Mirrors every bus event into the debug log.
#[derive(Default)]
pub struct LoggerModule {
    subscriptions: Subscriptions,
}

#[async_trait]
impl Module for LoggerModule {
    fn name(&self) -> &str {
        NAME
    }

    async fn initialize(&self, ctx: &ModuleContext) -> Result<()> {
        self.subscriptions.release().await;
        let id = ctx.bus().on_sync("*", |event| {
            match &event.correlation_id {
                Some(id) => log::debug!("[bus] {} ({}) {}", event.topic, id, event.payload),
                None => log::debug!("[bus] {} {}", event.topic, event.payload),
            }
            Ok(())
        })?;
        self.subscriptions.hold(ctx.bus(), "*", id).await;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.subscriptions.release().await;
        Ok(())
    }
}
