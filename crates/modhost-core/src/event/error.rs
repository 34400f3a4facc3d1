//! # Modhost Event System Errors
//!
//! Defines error types specific to the event bus.
//!
//! [`EventSystemError`] keeps a kernel-detected absence of a responder
//! ([`EventSystemError::RequestTimeout`]) distinct from a failure reported by
//! the responder itself ([`EventSystemError::ResponderError`]).
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventSystemError {
    #[error("Request on topic '{topic}' timed out after {timeout_ms}ms ({attempts} attempt(s), last correlation id {correlation_id})")]
    RequestTimeout {
        topic: String,
        correlation_id: String,
        timeout_ms: u64,
        attempts: u32,
    },

    #[error("Responder for topic '{topic}' (correlation id {correlation_id}) reported an error: {message}")]
    ResponderError {
        topic: String,
        correlation_id: String,
        message: String,
    },

    #[error("Pending request on topic '{topic}' (correlation id {correlation_id}) was cleared")]
    RequestCleared {
        topic: String,
        correlation_id: String,
    },

    #[error("Correlation id '{correlation_id}' is already in use by a pending request")]
    CorrelationIdInUse { correlation_id: String },

    #[error("Invalid wildcard pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Failed to convert payload for topic '{topic}': {source}")]
    PayloadSerialization {
        topic: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("No async runtime available to run handler for topic '{topic}'")]
    NoRuntime { topic: String },
}

impl EventSystemError {
    /// True when no responder answered in time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, EventSystemError::RequestTimeout { .. })
    }

    /// True when a responder answered with an explicit error.
    pub fn is_responder_error(&self) -> bool {
        matches!(self, EventSystemError::ResponderError { .. })
    }
}
