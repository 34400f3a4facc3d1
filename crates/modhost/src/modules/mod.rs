//! The static catalog of modules this host ships with.
//!
//! `logger` and `database` are critical: the host does not come up without
//! them. `events` and `auth` are optional and are left out if they fail.
use std::sync::Arc;

use modhost_core::event::SubscriptionId;
use modhost_core::module_system::ModuleSystemError;
use modhost_core::{EventBus, Module, ModuleCatalog, ModuleDescriptor};
use tokio::sync::Mutex;

pub mod auth;
pub mod database;
pub mod events;
pub mod logger;

use auth::AuthModule;
use database::DatabaseModule;
use events::EventsModule;
use logger::LoggerModule;

/// Build the catalog of built-in modules.
pub fn catalog() -> Result<ModuleCatalog, ModuleSystemError> {
    ModuleCatalog::new()
        .with(
            ModuleDescriptor::new(logger::NAME, || -> Arc<dyn Module> { Arc::new(LoggerModule::default()) })
                .critical(true),
        )?
        .with(
            ModuleDescriptor::new(database::NAME, || -> Arc<dyn Module> {
                Arc::new(DatabaseModule::default())
            })
            .depends_on(logger::NAME)
            .critical(true),
        )?
        .with(
            ModuleDescriptor::new(events::NAME, || -> Arc<dyn Module> { Arc::new(EventsModule::default()) })
                .depends_on(logger::NAME),
        )?
        .with(
            ModuleDescriptor::new(auth::NAME, || -> Arc<dyn Module> { Arc::new(AuthModule::default()) })
                .with_dependencies([logger::NAME, database::NAME, events::NAME]),
        )
}

/// Bus subscriptions a module holds between initialize and stop.
#[derive(Default)]
pub(crate) struct Subscriptions {
    held: Mutex<Vec<(EventBus, String, SubscriptionId)>>,
}

impl Subscriptions {
    pub(crate) async fn hold(&self, bus: &EventBus, topic: &str, id: SubscriptionId) {
        self.held.lock().await.push((bus.clone(), topic.to_string(), id));
    }

    /// Drop every held subscription. Returns how many were removed.
    pub(crate) async fn release(&self) -> usize {
        let held: Vec<_> = self.held.lock().await.drain(..).collect();
        held.into_iter()
            .filter(|(bus, topic, id)| bus.off(topic, *id))
            .count()
    }
}
