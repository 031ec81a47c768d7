//! Crate-level error taxonomy.
//!
//! Nothing in the core throws across the `add()` boundary — these variants
//! are used internally for logging and for the handful of public
//! constructors that can fail at setup time (`ConfigError`). Transport and
//! ingestion failures never propagate to callers; they surface only via
//! `tracing` events and the Coordinator's state machine.

use thiserror::Error;

/// The four error categories the core distinguishes.
#[derive(Debug, Error)]
pub enum LiveMetricsError {
    /// Malformed telemetry input. Logged and dropped, never surfaced to the
    /// caller of [`crate::collector::Collector::add`].
    #[error("ingestion error: {0}")]
    Ingestion(String),

    /// Non-2xx response, I/O timeout, or DNS failure. Treated as
    /// `subscribed = false`; the Coordinator counts consecutive occurrences.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Missing endpoint or instrumentation key at construction time. Fatal
    /// to the core's own operation but not to the host process — the core
    /// stays disabled and quietly discards input.
    #[error("config error: {0}")]
    Config(String),

    /// Counter overflow or decode mismatch. Asserted in debug builds; in
    /// release the offending cell is logged and reset to zero.
    #[error("internal invariant violation: {0}")]
    InternalInvariantViolation(String),
}

/// Transport-layer failure detail, nested under [`LiveMetricsError::Transport`]
/// and also used directly by [`crate::transport::Transport`] implementations.
#[derive(Debug, Error, Clone)]
pub enum TransportError {
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("connection to {url} failed: {detail}")]
    Connect { url: String, detail: String },
}
