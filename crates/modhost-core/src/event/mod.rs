pub mod bus;
pub mod error;
pub mod request;
pub mod topic;
pub mod types;

/// Re-export important types
pub use bus::{EventBus, EventBusConfig, decode_payload};
pub use error::EventSystemError;
pub use request::{
    PendingRequestInfo, RequestOptions, ResponseEnvelope, new_correlation_id, response_topic,
};
pub use topic::TopicPattern;
pub use types::{
    Event, EventHandler, HandlerError, HandlerResult, SubscriptionId, SystemEvent,
};

// Test module declaration
#[cfg(test)]
mod tests;
