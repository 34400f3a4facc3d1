//! Request/response on top of plain pub/sub.
//!
//! `emit_and_wait` tags the outgoing event with a correlation id and parks a
//! [`PendingRequest`] until something emits on `response.<correlation_id>` or
//! the attempt times out. Correlation ids are random UUIDs: anyone who knows
//! an id can answer the request, so they must not be guessable.
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::event::bus::{EventBus, lock};
use crate::event::error::EventSystemError;
use crate::event::types::{Event, EventHandler, SubscriptionId};
use crate::kernel::constants::RESPONSE_TOPIC_PREFIX;

type ResponseSender = oneshot::Sender<Result<ResponseEnvelope, EventSystemError>>;

/// Per-call overrides for `emit_and_wait`. Unset fields fall back to the bus config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Timeout of each attempt
    pub timeout: Option<Duration>,
    /// Attempts after the first one, only taken on timeout
    pub retries: Option<u32>,
    /// Caller-owned correlation id, reused on every attempt
    pub correlation_id: Option<String>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout_ms(self, ms: u64) -> Self {
        self.timeout(Duration::from_millis(ms))
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }
}

/// The `{ data?, error? }` payload a responder emits on the response topic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseEnvelope {
    pub fn ok(data: Value) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            data: None,
            error: Some(message.into()),
        }
    }

    /// Reads an envelope out of a raw response payload.
    ///
    /// An object carrying `data` or `error` is taken as an envelope. Anything
    /// else is treated as bare data. A non-string `error` is kept as its JSON text.
    pub fn from_payload(payload: &Value) -> Self {
        match payload {
            Value::Object(map) if map.contains_key("data") || map.contains_key("error") => {
                let error = map.get("error").filter(|e| !e.is_null()).map(|e| match e {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                });
                Self {
                    data: map.get("data").cloned(),
                    error,
                }
            }
            other => Self::ok(other.clone()),
        }
    }

    pub fn into_value(self) -> Value {
        let mut map = Map::new();
        if let Some(data) = self.data {
            map.insert("data".to_string(), data);
        }
        if let Some(error) = self.error {
            map.insert("error".to_string(), Value::String(error));
        }
        Value::Object(map)
    }

    fn into_result(self, topic: &str, correlation_id: &str) -> Result<Value, EventSystemError> {
        match self.error {
            Some(message) => Err(EventSystemError::ResponderError {
                topic: topic.to_string(),
                correlation_id: correlation_id.to_string(),
                message,
            }),
            None => Ok(self.data.unwrap_or(Value::Null)),
        }
    }
}

/// A request waiting for its response topic to fire.
pub(crate) struct PendingRequest {
    topic: String,
    created_at: Instant,
    deadline: Instant,
    responder: ResponseSender,
}

/// Owns one attempt's pending entry until the attempt settles.
struct PendingEntry<'a> {
    bus: &'a EventBus,
    correlation_id: &'a str,
    armed: bool,
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        if self.armed {
            lock(&self.bus.inner.pending).remove(self.correlation_id);
        }
    }
}

/// Read-only view of a pending request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequestInfo {
    pub correlation_id: String,
    pub topic: String,
    pub age: Duration,
    pub remaining: Duration,
}

/// Derive the private response topic for a correlation id.
pub fn response_topic(correlation_id: &str) -> String {
    format!("{}{}", RESPONSE_TOPIC_PREFIX, correlation_id)
}

/// Mint an unguessable correlation id.
pub fn new_correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl EventBus {
    /// Emit `payload` on `topic` and wait for a correlated response.
    ///
    /// Each attempt waits up to the request timeout. On timeout the attempt's
    /// pending entry is removed and, while retries remain, the event is
    /// emitted again after a linearly growing backoff. Without a caller-supplied
    /// correlation id every attempt gets a fresh one, so a late answer to a
    /// superseded attempt resolves nothing. An explicit `{error}` response is
    /// returned at once and is never retried.
    pub async fn emit_and_wait(
        &self,
        topic: &str,
        payload: Value,
        options: RequestOptions,
    ) -> Result<Value, EventSystemError> {
        let timeout = options.timeout.unwrap_or_else(|| self.config().request_timeout());
        let total_attempts = options
            .retries
            .unwrap_or(self.config().request_retries)
            .saturating_add(1);

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let correlation_id = options
                .correlation_id
                .clone()
                .unwrap_or_else(new_correlation_id);
            let response = self.register_pending(topic, &correlation_id, timeout)?;
            // Removes the entry if this attempt ends without a delivery, including cancellation
            let mut entry = PendingEntry {
                bus: self,
                correlation_id: &correlation_id,
                armed: true,
            };

            log::debug!(
                "Request on '{}' (attempt {}/{}, correlation id {})",
                topic,
                attempt,
                total_attempts,
                correlation_id
            );
            self.emit_event(Event::new(topic, payload.clone()).with_correlation_id(&correlation_id));

            let outcome = tokio::time::timeout(timeout, response).await;
            if outcome.is_ok() {
                // Delivery or clear_pending already took the entry out
                entry.armed = false;
            }
            drop(entry);
            match outcome {
                Ok(Ok(Ok(envelope))) => return envelope.into_result(topic, &correlation_id),
                Ok(Ok(Err(e))) => return Err(e),
                Ok(Err(_)) => {
                    return Err(EventSystemError::RequestCleared {
                        topic: topic.to_string(),
                        correlation_id,
                    });
                }
                Err(_) => {
                    if attempt >= total_attempts {
                        log::warn!(
                            "Request on '{}' timed out after {} attempt(s)",
                            topic,
                            attempt
                        );
                        return Err(EventSystemError::RequestTimeout {
                            topic: topic.to_string(),
                            correlation_id,
                            timeout_ms: timeout.as_millis() as u64,
                            attempts: attempt,
                        });
                    }
                    let backoff = self.config().retry_backoff().saturating_mul(attempt);
                    log::info!(
                        "Request on '{}' timed out (attempt {}/{}), retrying in {:?}",
                        topic,
                        attempt,
                        total_attempts,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    /// Like `emit_and_wait`, with typed request and response payloads.
    pub async fn request<Req, Resp>(
        &self,
        topic: &str,
        request: &Req,
        options: RequestOptions,
    ) -> Result<Resp, EventSystemError>
    where
        Req: Serialize,
        Resp: serde::de::DeserializeOwned,
    {
        let to_err = |source| EventSystemError::PayloadSerialization {
            topic: topic.to_string(),
            source,
        };
        let payload = serde_json::to_value(request).map_err(to_err)?;
        let value = self.emit_and_wait(topic, payload, options).await?;
        serde_json::from_value(value).map_err(to_err)
    }

    /// Answer a pending request. Returns the number of deliveries made.
    pub fn respond(&self, correlation_id: &str, result: Result<Value, String>) -> usize {
        let envelope = match result {
            Ok(data) => ResponseEnvelope::ok(data),
            Err(message) => ResponseEnvelope::err(message),
        };
        self.emit(&response_topic(correlation_id), envelope.into_value())
    }

    /// Register a responder for `topic`.
    ///
    /// `f` runs as a tracked async handler; its result is sent back on the
    /// caller's response topic. Events emitted without a correlation id still
    /// run `f` but the result is discarded.
    pub fn on_request<F, Fut>(&self, topic: &str, f: F) -> Result<SubscriptionId, EventSystemError>
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        // Weak so the subscription does not keep the bus alive
        let inner = Arc::downgrade(&self.inner);
        self.on(
            topic,
            EventHandler::async_fn(move |event: Event| {
                let inner = inner.clone();
                let correlation_id = event.correlation_id.clone();
                let topic = event.topic.clone();
                let work = f(event);
                async move {
                    let result = work.await;
                    match (correlation_id, inner.upgrade()) {
                        (Some(id), Some(inner)) => {
                            EventBus { inner }.respond(&id, result);
                        }
                        (None, _) => {
                            log::debug!("Request on '{}' carried no correlation id; result discarded", topic);
                        }
                        (Some(_), None) => {}
                    }
                    Ok(())
                }
            }),
        )
    }

    /// Number of requests still waiting for a response.
    pub fn pending_count(&self) -> usize {
        lock(&self.inner.pending).len()
    }

    /// Snapshot of pending requests, oldest first.
    pub fn pending_requests(&self) -> Vec<PendingRequestInfo> {
        let now = Instant::now();
        let mut infos: Vec<(Instant, PendingRequestInfo)> = lock(&self.inner.pending)
            .iter()
            .map(|(id, p)| {
                (
                    p.created_at,
                    PendingRequestInfo {
                        correlation_id: id.clone(),
                        topic: p.topic.clone(),
                        age: now.saturating_duration_since(p.created_at),
                        remaining: p.deadline.saturating_duration_since(now),
                    },
                )
            })
            .collect();
        infos.sort_by_key(|(created, _)| *created);
        infos.into_iter().map(|(_, info)| info).collect()
    }

    /// Reject every pending request with `RequestCleared`. Returns how many were cleared.
    pub fn clear_pending(&self) -> usize {
        let drained: Vec<(String, PendingRequest)> = lock(&self.inner.pending).drain().collect();
        let count = drained.len();
        for (correlation_id, pending) in drained {
            let _ = pending.responder.send(Err(EventSystemError::RequestCleared {
                topic: pending.topic,
                correlation_id,
            }));
        }
        if count > 0 {
            log::warn!("Cleared {} pending request(s)", count);
        }
        count
    }

    fn register_pending(
        &self,
        topic: &str,
        correlation_id: &str,
        timeout: Duration,
    ) -> Result<oneshot::Receiver<Result<ResponseEnvelope, EventSystemError>>, EventSystemError> {
        let mut pending = lock(&self.inner.pending);
        if pending.contains_key(correlation_id) {
            return Err(EventSystemError::CorrelationIdInUse {
                correlation_id: correlation_id.to_string(),
            });
        }
        let (tx, rx) = oneshot::channel();
        let now = Instant::now();
        pending.insert(
            correlation_id.to_string(),
            PendingRequest {
                topic: topic.to_string(),
                created_at: now,
                deadline: now + timeout,
                responder: tx,
            },
        );
        Ok(rx)
    }

    /// Resolve the pending request addressed by a response topic.
    /// The entry is removed on first delivery, so later duplicates find nothing.
    pub(crate) fn deliver_response(&self, event: &Event) -> bool {
        let Some(correlation_id) = event.topic.strip_prefix(RESPONSE_TOPIC_PREFIX) else {
            return false;
        };
        let Some(pending) = lock(&self.inner.pending).remove(correlation_id) else {
            return false;
        };
        pending
            .responder
            .send(Ok(ResponseEnvelope::from_payload(&event.payload)))
            .is_ok()
    }
}
