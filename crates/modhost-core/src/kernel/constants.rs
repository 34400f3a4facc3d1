/// Application name
pub const APP_NAME: &str = "modhost";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default timeout for a module's initialize operation
pub const DEFAULT_INIT_TIMEOUT_MS: u64 = 30_000;

/// Default timeout for a module's start operation
pub const DEFAULT_START_TIMEOUT_MS: u64 = 30_000;

/// Default timeout for a module's stop operation
pub const DEFAULT_STOP_TIMEOUT_MS: u64 = 10_000;

/// Default timeout for a module's health probe
pub const DEFAULT_HEALTH_TIMEOUT_MS: u64 = 5_000;

/// Default number of initialize attempts
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Default delay between initialize attempts
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;

/// Default emit-and-wait timeout
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Default emit-and-wait retries (attempts beyond the first)
pub const DEFAULT_REQUEST_RETRIES: u32 = 0;

/// Linear backoff step between emit-and-wait attempts
pub const DEFAULT_REQUEST_BACKOFF_MS: u64 = 100;

/// Default bound on the shutdown drain of in-flight async handlers
pub const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 5_000;

/// Prefix of the private response topic derived from a correlation id
pub const RESPONSE_TOPIC_PREFIX: &str = "response.";

/// Topic emitted when a bootstrap phase is entered
pub const TOPIC_PHASE_STARTED: &str = "bootstrap.phase.started";

/// Topic emitted when a bootstrap phase completes
pub const TOPIC_PHASE_COMPLETED: &str = "bootstrap.phase.completed";

/// Topic carrying per-module lifecycle transitions
pub const TOPIC_MODULE_LIFECYCLE: &str = "module.lifecycle";
