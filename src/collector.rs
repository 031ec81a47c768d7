//! # Module: collector
//!
//! ## Responsibility
//! Classifies incoming [`TelemetryItem`]s, updates the packed [`Counters`],
//! retains a bounded sample of [`Document`]s, and produces consistent
//! snapshots for the Data Fetcher and for debugging.
//!
//! ## Guarantees
//! - `add` is non-blocking: a bounded number of atomic CAS operations plus
//!   at most one document append, no I/O, no allocation beyond the document
//!   itself.
//! - The Collector is enabled iff it holds a non-null instrumentation-key
//!   supplier; disabled, `add` is a no-op and snapshots are `None`.
//! - A snapshot either reflects a fully consistent reset boundary or is the
//!   zero/`None` snapshot — partial snapshots never escape.
//! - Items are only counted and retained while the subscription is `On`.
//!
//! ## NOT Responsible For
//! - Deciding the subscription state (the Coordinator owns that; the
//!   Collector only stores what it's told via [`Collector::set_quick_pulse_status`]).
//! - Building the outbound wire payload (see [`crate::fetcher`]).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::counters::{CounterValues, Counters};
use crate::document::{Document, DocumentStore};
use crate::duration::parse_duration_ms;
use crate::host_stats::{memory_or_zero, HostStatsSource, NullHostStats};
use crate::telemetry_item::TelemetryItem;

/// Whether the remote Live Metrics service is currently collecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Remote side is collecting; post data.
    On,
    /// Only ping keep-alives are needed.
    Off,
}

impl SubscriptionState {
    pub fn from_subscribed(subscribed: bool) -> Self {
        if subscribed {
            SubscriptionState::On
        } else {
            SubscriptionState::Off
        }
    }

    pub fn is_on(self) -> bool {
        matches!(self, SubscriptionState::On)
    }
}

/// Supplies the instrumentation key the Collector currently filters on.
/// Boxed so the host can swap keys without the Collector knowing how.
pub type KeySupplier = Arc<dyn Fn() -> String + Send + Sync>;

/// The decoded snapshot returned by [`Collector::peek`] and
/// [`Collector::get_and_restart`].
#[derive(Debug, Clone)]
pub struct FinalCounters {
    pub requests: u64,
    pub unsuccessful_requests: u64,
    pub requests_duration_ms: u64,
    pub rdds: u64,
    pub unsuccessful_rdds: u64,
    pub rdds_duration_ms: u64,
    pub exceptions: u64,
    pub memory_committed_bytes: u64,
    pub cpu_usage_percent: f64,
    pub document_list: Vec<Document>,
}

impl FinalCounters {
    fn from_parts(values: CounterValues, documents: Vec<Document>, memory: u64, cpu: f64) -> Self {
        Self {
            requests: values.requests,
            unsuccessful_requests: values.unsuccessful_requests,
            requests_duration_ms: values.requests_duration_ms,
            rdds: values.rdds,
            unsuccessful_rdds: values.unsuccessful_rdds,
            rdds_duration_ms: values.rdds_duration_ms,
            exceptions: values.exceptions,
            memory_committed_bytes: memory,
            cpu_usage_percent: cpu,
            document_list: documents,
        }
    }
}

/// Ingests telemetry, maintains rolling counters, and retains example
/// documents for one collection window at a time.
pub struct Collector {
    key_supplier: Mutex<Option<KeySupplier>>,
    subscription: AtomicBool,
    counters: Counters,
    documents: DocumentStore,
    host_stats: Arc<dyn HostStatsSource>,
    document_properties_cap: usize,
    normalize_cpu_usage: bool,
}

impl Collector {
    /// Construct a disabled Collector. Call [`Collector::enable`] before use.
    pub fn new(document_cap: usize, document_properties_cap: usize, normalize_cpu_usage: bool) -> Self {
        Self {
            key_supplier: Mutex::new(None),
            subscription: AtomicBool::new(false),
            counters: Counters::default(),
            documents: DocumentStore::new(document_cap),
            host_stats: Arc::new(NullHostStats),
            document_properties_cap,
            normalize_cpu_usage,
        }
    }

    pub fn with_host_stats(mut self, source: Arc<dyn HostStatsSource>) -> Self {
        self.host_stats = source;
        self
    }

    /// Arm the collector with an instrumentation-key supplier. Re-enabling
    /// with a different supplier is allowed (key rotation); re-enabling with
    /// the same supplier is a harmless no-op from the caller's perspective.
    pub fn enable(&self, key_supplier: KeySupplier) {
        *self.key_supplier.lock().unwrap_or_else(|e| e.into_inner()) = Some(key_supplier);
    }

    /// Disable the collector. Subsequent `add` calls become no-ops and
    /// `peek`/`get_and_restart` return `None`.
    pub fn disable(&self) {
        *self.key_supplier.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn is_enabled(&self) -> bool {
        self.key_supplier.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    /// Notification from the Coordinator. While `Off`, counters and
    /// documents stop updating but `add` remains a cheap no-op rather than
    /// an error.
    pub fn set_quick_pulse_status(&self, state: SubscriptionState) {
        self.subscription.store(state.is_on(), Ordering::Relaxed);
    }

    fn configured_key(&self) -> Option<String> {
        let guard = self.key_supplier.lock().unwrap_or_else(|e| e.into_inner());
        guard.as_ref().map(|f| f())
    }

    /// Ingest one telemetry item. Non-blocking; never panics or returns an
    /// error to the caller.
    pub fn add(&self, item: TelemetryItem) {
        let Some(configured_key) = self.configured_key() else {
            return;
        };
        let Some(item_key) = item.instrumentation_key() else {
            return;
        };
        if item_key != configured_key {
            return;
        }
        if !self.subscription.load(Ordering::Relaxed) {
            return;
        }

        match item {
            TelemetryItem::Request(r) => {
                let duration_ms = parse_duration_ms(&r.duration_text);
                self.counters.record_request(duration_ms, r.success);
                let properties = Document::capped_properties(&r.properties, self.document_properties_cap);
                self.documents.push(Document::RequestTelemetryDocument {
                    name: r.name,
                    success: r.success,
                    duration: duration_ms,
                    response_code: r.response_code,
                    url: r.url,
                    operation_id: r.operation_id,
                    properties,
                });
            }
            TelemetryItem::RemoteDependency(d) => {
                let duration_ms = parse_duration_ms(&d.duration_text);
                self.counters.record_dependency(duration_ms, d.success);
                let properties = Document::capped_properties(&d.properties, self.document_properties_cap);
                self.documents.push(Document::DependencyTelemetryDocument {
                    name: d.name,
                    command: d.command,
                    duration: duration_ms,
                    result_code: d.result_code,
                    target: d.target,
                    dependency_type: d.dependency_type,
                    operation_id: d.operation_id,
                    properties,
                });
            }
            TelemetryItem::Exception(e) => {
                self.counters.record_exception();
                self.documents.push(Document::ExceptionTelemetryDocument {
                    stack: e.throwable_summary,
                    message: e.message,
                    exception_type: e.exception_type,
                });
            }
            TelemetryItem::Other => {}
        }
    }

    /// Non-destructive snapshot, for debugging/tests. `None` when disabled.
    pub fn peek(&self) -> Option<FinalCounters> {
        if !self.is_enabled() {
            return None;
        }
        let values = self.counters.peek();
        let documents = self.documents.peek();
        let memory = memory_or_zero(self.host_stats.committed_memory_bytes());
        let cpu = self.host_stats.cpu_usage_percent(self.normalize_cpu_usage);
        Some(FinalCounters::from_parts(values, documents, memory, cpu))
    }

    /// Atomic snapshot-and-reset: decodes and zeroes the counters, drains the
    /// document store, and samples host memory/CPU. `None` when disabled.
    pub fn get_and_restart(&self) -> Option<FinalCounters> {
        if !self.is_enabled() {
            return None;
        }
        let values = self.counters.snapshot_and_reset();
        let documents = self.documents.take();
        let memory = memory_or_zero(self.host_stats.committed_memory_bytes());
        let cpu = self.host_stats.cpu_usage_percent(self.normalize_cpu_usage);
        Some(FinalCounters::from_parts(values, documents, memory, cpu))
    }
}
