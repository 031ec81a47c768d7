//! # Module: document
//!
//! ## Responsibility
//! Per-item sample documents retained for the live view, and the bounded
//! FIFO store that holds them for one collection window.
//!
//! ## Guarantees
//! - `DocumentStore` never holds more than its configured capacity.
//! - Once full, further `push` calls are silently dropped — FIFO truncation
//!   preserves the earliest events in a burst; this is not reservoir
//!   sampling and must not be changed to such without updating the service
//!   contract.
//! - Concurrent pushes from multiple producer threads are safe; cross-
//!   producer ordering is unspecified.
//!
//! ## NOT Responsible For
//! - Deciding whether a document should be retained at all (the collector's
//!   subscription-state check happens before `push` is even called).

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;

/// One retained example event, discriminated by telemetry kind.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "__type")]
pub enum Document {
    RequestTelemetryDocument {
        name: String,
        success: bool,
        duration: u64,
        #[serde(rename = "responseCode")]
        response_code: String,
        url: Option<String>,
        #[serde(rename = "operationId")]
        operation_id: Option<String>,
        properties: HashMap<String, String>,
    },
    DependencyTelemetryDocument {
        name: String,
        command: Option<String>,
        duration: u64,
        #[serde(rename = "resultCode")]
        result_code: Option<String>,
        target: Option<String>,
        #[serde(rename = "type")]
        dependency_type: Option<String>,
        #[serde(rename = "operationId")]
        operation_id: Option<String>,
        properties: HashMap<String, String>,
    },
    ExceptionTelemetryDocument {
        #[serde(rename = "exception")]
        stack: String,
        message: String,
        #[serde(rename = "type")]
        exception_type: String,
    },
}

impl Document {
    /// The `DocumentType` field mirrored alongside `__type` in the wire
    /// envelope.
    pub fn document_type(&self) -> &'static str {
        match self {
            Document::RequestTelemetryDocument { .. } => "Request",
            Document::DependencyTelemetryDocument { .. } => "RemoteDependency",
            Document::ExceptionTelemetryDocument { .. } => "Exception",
        }
    }

    /// Truncate a properties map to the configured cap, dropping extra
    /// entries in arbitrary (hash) order — the cap exists to bound memory,
    /// not to pick a specific subset.
    pub fn capped_properties(
        properties: &HashMap<String, String>,
        cap: usize,
    ) -> HashMap<String, String> {
        properties.iter().take(cap).map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

/// A bounded, FIFO, append-only store of retained documents for one window.
#[derive(Debug)]
pub struct DocumentStore {
    capacity: usize,
    items: Mutex<Vec<Document>>,
}

impl DocumentStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: Mutex::new(Vec::new()),
        }
    }

    /// Append a document unless the window's cap has already been reached.
    /// Returns `true` if the document was retained. The capacity check and
    /// the push happen under the same lock, so a `take()` racing a `push()`
    /// can never observe a post-reset vector receiving a pre-reset append —
    /// either the push lands before the drain (and is reset with it) or
    /// after (and counts toward the new window), never both skipping the
    /// cap and missing the reset.
    pub fn push(&self, document: Document) -> bool {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        if items.len() >= self.capacity {
            return false;
        }
        items.push(document);
        true
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Non-destructive copy of the currently retained documents.
    pub fn peek(&self) -> Vec<Document> {
        self.items.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Atomically drain and reset the store, returning what was retained.
    pub fn take(&self) -> Vec<Document> {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_exception() -> Document {
        Document::ExceptionTelemetryDocument {
            stack: "stack".into(),
            message: "boom".into(),
            exception_type: "RuntimeException".into(),
        }
    }

    #[test]
    fn caps_at_configured_capacity() {
        let store = DocumentStore::new(3);
        for _ in 0..10 {
            store.push(sample_exception());
        }
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn take_resets_the_store() {
        let store = DocumentStore::new(5);
        store.push(sample_exception());
        let taken = store.take();
        assert_eq!(taken.len(), 1);
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn document_type_matches_variant() {
        assert_eq!(sample_exception().document_type(), "Exception");
    }
}
