//! The opaque input type the host application feeds to [`crate::collector::Collector::add`].
//!
//! A tagged union with `Request`, `RemoteDependency`, and `Exception`
//! variants plus a catch-all `Other` for telemetry kinds the core must
//! ignore. Every variant carries the item's instrumentation key so the
//! collector can filter before doing any other work.

use std::collections::HashMap;

/// A single telemetry item produced by the host's processing pipeline.
#[derive(Debug, Clone)]
pub enum TelemetryItem {
    Request(RequestTelemetry),
    RemoteDependency(RemoteDependencyTelemetry),
    Exception(ExceptionTelemetry),
    /// Any other telemetry kind (traces, events, metrics, ...). Always
    /// ignored by the classifier — present so callers can construct a
    /// `TelemetryItem` for every kind their pipeline produces without the
    /// core needing to know about all of them.
    Other,
}

impl TelemetryItem {
    /// The instrumentation key carried by this item, or `None` for `Other`.
    pub fn instrumentation_key(&self) -> Option<&str> {
        match self {
            TelemetryItem::Request(r) => Some(&r.instrumentation_key),
            TelemetryItem::RemoteDependency(d) => Some(&d.instrumentation_key),
            TelemetryItem::Exception(e) => Some(&e.instrumentation_key),
            TelemetryItem::Other => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestTelemetry {
    pub instrumentation_key: String,
    pub name: String,
    pub timestamp_ms: u64,
    /// Raw `[d.]hh:mm:ss.fffffff` duration text.
    pub duration_text: String,
    pub response_code: String,
    pub success: bool,
    pub url: Option<String>,
    pub operation_id: Option<String>,
    pub properties: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct RemoteDependencyTelemetry {
    pub instrumentation_key: String,
    pub name: String,
    pub command: Option<String>,
    pub duration_text: String,
    pub success: bool,
    pub result_code: Option<String>,
    pub target: Option<String>,
    pub dependency_type: Option<String>,
    pub operation_id: Option<String>,
    pub properties: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ExceptionTelemetry {
    pub instrumentation_key: String,
    pub throwable_summary: String,
    pub message: String,
    pub exception_type: String,
}
