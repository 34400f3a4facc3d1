use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Notify;
use tokio::task::AbortHandle;

use crate::event::error::EventSystemError;
use crate::event::request::PendingRequest;
use crate::event::topic::{self, TopicPattern};
use crate::event::types::{Event, EventHandler, HandlerResult, SubscriptionId, SystemEvent};
use crate::kernel::constants::{
    DEFAULT_DRAIN_TIMEOUT_MS, DEFAULT_REQUEST_BACKOFF_MS, DEFAULT_REQUEST_RETRIES,
    DEFAULT_REQUEST_TIMEOUT_MS, RESPONSE_TOPIC_PREFIX,
};

/// Tunables for the bus and its request/response layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventBusConfig {
    /// Default `emit_and_wait` timeout per attempt
    pub request_timeout_ms: u64,
    /// Default number of `emit_and_wait` retries after the first attempt
    pub request_retries: u32,
    /// Linear backoff step between `emit_and_wait` attempts
    pub retry_backoff_ms: u64,
    /// Bound on the shutdown drain of in-flight async handlers
    pub drain_timeout_ms: u64,
}

impl EventBusConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            request_retries: DEFAULT_REQUEST_RETRIES,
            retry_backoff_ms: DEFAULT_REQUEST_BACKOFF_MS,
            drain_timeout_ms: DEFAULT_DRAIN_TIMEOUT_MS,
        }
    }
}

struct ExactSubscription {
    id: SubscriptionId,
    handler: EventHandler,
}

struct WildcardSubscription {
    id: SubscriptionId,
    pattern: TopicPattern,
    handler: EventHandler,
}

/// Exact subscriptions are keyed by topic; wildcard ones are matched per emit.
#[derive(Default)]
struct SubscriptionTable {
    exact: HashMap<String, Vec<ExactSubscription>>,
    wildcard: Vec<WildcardSubscription>,
}

impl SubscriptionTable {
    /// Exact matches first, then wildcard matches, each in subscription order.
    fn matching(&self, topic: &str) -> Vec<EventHandler> {
        let exact = self
            .exact
            .get(topic)
            .into_iter()
            .flatten()
            .map(|s| s.handler.clone());
        let wildcard = self
            .wildcard
            .iter()
            .filter(|s| s.pattern.matches(topic))
            .map(|s| s.handler.clone());
        exact.chain(wildcard).collect()
    }

    fn len(&self) -> usize {
        self.exact.values().map(Vec::len).sum::<usize>() + self.wildcard.len()
    }
}

pub(crate) struct BusInner {
    config: EventBusConfig,
    subscriptions: RwLock<SubscriptionTable>,
    pub(crate) pending: Mutex<HashMap<String, PendingRequest>>,
    // `None` until the spawned task's abort handle is known
    active: Mutex<HashMap<u64, Option<AbortHandle>>>,
    active_changed: Notify,
    next_subscription_id: AtomicU64,
    next_task_id: AtomicU64,
}

/// Removes a tracked handler from the active set when its task ends, however it ends.
struct ActiveHandlerGuard {
    id: u64,
    inner: Arc<BusInner>,
}

impl Drop for ActiveHandlerGuard {
    fn drop(&mut self) {
        lock(&self.inner.active).remove(&self.id);
        self.inner.active_changed.notify_waiters();
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Process-wide publish/subscribe channel.
///
/// Cloning is cheap and every clone refers to the same bus. No lock is held
/// while a subscriber runs, so handlers may freely call back into the bus.
#[derive(Clone)]
pub struct EventBus {
    pub(crate) inner: Arc<BusInner>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriptions", &self.subscription_count())
            .field("pending_requests", &self.pending_count())
            .field("active_handlers", &self.active_handler_count())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_config(EventBusConfig::default())
    }

    pub fn with_config(config: EventBusConfig) -> Self {
        Self {
            inner: Arc::new(BusInner {
                config,
                subscriptions: RwLock::new(SubscriptionTable::default()),
                pending: Mutex::new(HashMap::new()),
                active: Mutex::new(HashMap::new()),
                active_changed: Notify::new(),
                next_subscription_id: AtomicU64::new(1),
                next_task_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &EventBusConfig {
        &self.inner.config
    }

    /// Subscribe `handler` to an exact topic or a wildcard pattern.
    pub fn on(&self, topic: &str, handler: EventHandler) -> Result<SubscriptionId, EventSystemError> {
        let id = self.inner.next_subscription_id.fetch_add(1, Ordering::Relaxed);
        if topic::is_wildcard(topic) {
            let pattern = TopicPattern::new(topic)?;
            write(&self.inner.subscriptions)
                .wildcard
                .push(WildcardSubscription { id, pattern, handler });
        } else {
            write(&self.inner.subscriptions)
                .exact
                .entry(topic.to_string())
                .or_default()
                .push(ExactSubscription { id, handler });
        }
        log::debug!("Subscribed handler {} to '{}'", id, topic);
        Ok(id)
    }

    /// Subscribe a synchronous closure.
    pub fn on_sync<F>(&self, topic: &str, f: F) -> Result<SubscriptionId, EventSystemError>
    where
        F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
    {
        self.on(topic, EventHandler::sync(f))
    }

    /// Subscribe a closure returning a future; the future is tracked until it settles.
    pub fn on_async<F, Fut>(&self, topic: &str, f: F) -> Result<SubscriptionId, EventSystemError>
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = HandlerResult> + Send + 'static,
    {
        self.on(topic, EventHandler::async_fn(f))
    }

    /// Subscribe with a payload decoded into `T`. Payloads that fail to decode
    /// are reported as a handler error for this subscriber only.
    pub fn on_typed<T, F>(&self, topic: &str, f: F) -> Result<SubscriptionId, EventSystemError>
    where
        T: DeserializeOwned + 'static,
        F: Fn(T) -> HandlerResult + Send + Sync + 'static,
    {
        self.on_sync(topic, move |event| {
            let payload = serde_json::from_value::<T>(event.payload.clone())?;
            f(payload)
        })
    }

    /// Remove one subscription. Other subscriptions, including other patterns, are untouched.
    pub fn off(&self, topic: &str, id: SubscriptionId) -> bool {
        let mut table = write(&self.inner.subscriptions);
        if topic::is_wildcard(topic) {
            let before = table.wildcard.len();
            table
                .wildcard
                .retain(|s| !(s.id == id && s.pattern.as_str() == topic));
            return table.wildcard.len() < before;
        }
        let Some(subs) = table.exact.get_mut(topic) else {
            return false;
        };
        let before = subs.len();
        subs.retain(|s| s.id != id);
        let removed = subs.len() < before;
        if subs.is_empty() {
            table.exact.remove(topic);
        }
        removed
    }

    /// Emit `payload` on `topic`. Returns the number of subscribers invoked.
    pub fn emit(&self, topic: &str, payload: Value) -> usize {
        self.emit_event(Event::new(topic, payload))
    }

    /// Emit a serializable payload.
    pub fn emit_typed<T: Serialize>(&self, topic: &str, payload: &T) -> Result<usize, EventSystemError> {
        let value = serde_json::to_value(payload).map_err(|source| {
            EventSystemError::PayloadSerialization {
                topic: topic.to_string(),
                source,
            }
        })?;
        Ok(self.emit(topic, value))
    }

    /// Publish a kernel telemetry event on its topic.
    pub fn publish_system(&self, event: &SystemEvent) -> usize {
        match self.emit_typed(event.topic(), event) {
            Ok(count) => count,
            Err(e) => {
                log::error!("Failed to publish system event {:?}: {}", event, e);
                0
            }
        }
    }

    /// Deliver a fully formed event.
    ///
    /// A pending request waiting on this topic is resolved first, then exact
    /// subscribers, then wildcard subscribers. A failing or panicking
    /// subscriber never prevents delivery to the next one.
    pub fn emit_event(&self, event: Event) -> usize {
        let mut delivered = 0;
        if event.topic.starts_with(RESPONSE_TOPIC_PREFIX) && self.deliver_response(&event) {
            delivered += 1;
        }

        // Snapshot so no lock is held while handlers run
        let handlers = read(&self.inner.subscriptions).matching(&event.topic);
        for handler in handlers {
            self.invoke(&handler, &event);
            delivered += 1;
        }
        delivered
    }

    fn invoke(&self, handler: &EventHandler, event: &Event) {
        match handler {
            EventHandler::Sync(f) => match panic::catch_unwind(AssertUnwindSafe(|| f(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::warn!("Subscriber for '{}' failed: {}", event.topic, e),
                Err(_) => log::error!("Subscriber for '{}' panicked", event.topic),
            },
            EventHandler::Async(f) => {
                match panic::catch_unwind(AssertUnwindSafe(|| f(event.clone()))) {
                    Ok(fut) => self.track(&event.topic, fut),
                    Err(_) => log::error!("Async subscriber for '{}' panicked before returning", event.topic),
                }
            }
        }
    }

    /// Spawn an in-flight handler and keep it in the active set until it completes.
    fn track(&self, topic: &str, fut: BoxFuture<'static, HandlerResult>) {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                let err = EventSystemError::NoRuntime { topic: topic.to_string() };
                log::error!("{}", err);
                return;
            }
        };

        let id = self.inner.next_task_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.inner.active).insert(id, None);
        let guard = ActiveHandlerGuard {
            id,
            inner: Arc::clone(&self.inner),
        };
        let topic = topic.to_string();
        let join = runtime.spawn(async move {
            let _guard = guard;
            match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::warn!("Async subscriber for '{}' failed: {}", topic, e),
                Err(_) => log::error!("Async subscriber for '{}' panicked", topic),
            }
        });
        // The task may already have finished and removed its slot
        if let Some(slot) = lock(&self.inner.active).get_mut(&id) {
            *slot = Some(join.abort_handle());
        }
    }

    /// Number of async handlers still running.
    pub fn active_handler_count(&self) -> usize {
        lock(&self.inner.active).len()
    }

    /// Wait until every tracked async handler has finished or `timeout` elapses.
    ///
    /// Handlers still running at the deadline are aborted and dropped from the
    /// active set. Returns how many were force-cleared (0 on a clean drain).
    pub async fn wait_for_active_handlers(&self, timeout: Duration) -> usize {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.inner.active_changed.notified();
            tokio::pin!(notified);
            // Register interest before checking so a completion in between is not missed
            notified.as_mut().enable();
            if self.active_handler_count() == 0 {
                return 0;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                break;
            }
        }

        let remaining: Vec<Option<AbortHandle>> =
            lock(&self.inner.active).drain().map(|(_, handle)| handle).collect();
        if remaining.is_empty() {
            return 0;
        }
        log::warn!(
            "Drain timed out after {:?}; force-clearing {} active handler(s)",
            timeout,
            remaining.len()
        );
        for handle in remaining.iter().flatten() {
            handle.abort();
        }
        remaining.len()
    }

    /// Total number of subscriptions (exact and wildcard).
    pub fn subscription_count(&self) -> usize {
        read(&self.inner.subscriptions).len()
    }

    /// Number of wildcard subscriptions.
    pub fn wildcard_count(&self) -> usize {
        read(&self.inner.subscriptions).wildcard.len()
    }

    /// True if an emit on `topic` would reach at least one subscriber.
    pub fn has_subscribers(&self, topic: &str) -> bool {
        !read(&self.inner.subscriptions).matching(topic).is_empty()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Deserialize helper shared by typed responders.
pub fn decode_payload<T: DeserializeOwned>(event: &Event) -> Result<T, EventSystemError> {
    serde_json::from_value(event.payload.clone()).map_err(|source| {
        EventSystemError::PayloadSerialization {
            topic: event.topic.clone(),
            source,
        }
    })
}

