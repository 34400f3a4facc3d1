use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::kernel::constants::{
    TOPIC_MODULE_LIFECYCLE, TOPIC_PHASE_COMPLETED, TOPIC_PHASE_STARTED,
};

/// Identifier returned by `on` and accepted by `off`
pub type SubscriptionId = u64;

/// Error a subscriber may report; it is logged and never stops delivery
pub type HandlerError = Box<dyn StdError + Send + Sync>;

/// Result of a single subscriber invocation
pub type HandlerResult = Result<(), HandlerError>;

/// Synchronous subscriber
pub type SyncHandlerFn = Arc<dyn Fn(&Event) -> HandlerResult + Send + Sync>;

/// Subscriber whose invocation returns an in-flight operation
pub type AsyncHandlerFn = Arc<dyn Fn(Event) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// A single emitted event
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Concrete topic (never a pattern)
    pub topic: String,
    /// JSON payload
    pub payload: Value,
    /// Set by `emit_and_wait`; responders answer on `response.<correlation_id>`
    pub correlation_id: Option<String>,
}

impl Event {
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
            correlation_id: None,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

/// A subscriber registered on the bus
#[derive(Clone)]
pub enum EventHandler {
    /// Runs to completion inside `emit`
    Sync(SyncHandlerFn),
    /// Invoked inside `emit`; the returned future is spawned and tracked until it settles
    Async(AsyncHandlerFn),
}

impl EventHandler {
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
    {
        EventHandler::Sync(Arc::new(f))
    }

    pub fn async_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = HandlerResult> + Send + 'static,
    {
        EventHandler::Async(Arc::new(move |event| -> BoxFuture<'static, HandlerResult> {
            Box::pin(f(event))
        }))
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventHandler::Sync(_) => f.write_str("EventHandler::Sync"),
            EventHandler::Async(_) => f.write_str("EventHandler::Async"),
        }
    }
}

/// Events the kernel itself publishes for operational tooling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SystemEvent {
    /// A bootstrap phase was entered
    PhaseStarted { phase: String },
    /// A bootstrap phase finished
    PhaseCompleted { phase: String, duration_ms: u64 },
    /// Module initialize succeeded
    ModuleInitialized { module: String, attempts: u32 },
    /// Module start succeeded
    ModuleStarted { module: String },
    /// Module stop ran (failures are reported through `ModuleFailed`)
    ModuleStopped { module: String },
    /// A lifecycle operation failed
    ModuleFailed {
        module: String,
        operation: String,
        error: String,
    },
}

impl SystemEvent {
    /// Topic this event is published on
    pub fn topic(&self) -> &'static str {
        match self {
            SystemEvent::PhaseStarted { .. } => TOPIC_PHASE_STARTED,
            SystemEvent::PhaseCompleted { .. } => TOPIC_PHASE_COMPLETED,
            SystemEvent::ModuleInitialized { .. }
            | SystemEvent::ModuleStarted { .. }
            | SystemEvent::ModuleStopped { .. }
            | SystemEvent::ModuleFailed { .. } => TOPIC_MODULE_LIFECYCLE,
        }
    }
}
