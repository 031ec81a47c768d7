//! # Module: fetcher
//!
//! ## Responsibility
//! On each POST tick, atomically snapshot-and-reset the [`Collector`], turn
//! the snapshot into a [`PostEnvelope`], and hand it to the send queue.
//!
//! ## Guarantees
//! - Never blocks the caller: if the send queue is full, the envelope is
//!   dropped and the drop is counted, not escalated.
//! - A disabled collector (no snapshot available) produces no envelope and
//!   no queue write.
//!
//! ## NOT Responsible For
//! - Actually dispatching the HTTP request (see [`crate::sender`]).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::collector::Collector;
use crate::protocol::{self, build_metrics, PostEnvelope};
use crate::ping::AgentIdentity;

/// Data Fetcher: turns Collector snapshots into queued [`PostEnvelope`]s.
pub struct DataFetcher {
    collector: Arc<Collector>,
    identity: AgentIdentity,
    queue_tx: mpsc::Sender<PostEnvelope>,
    dropped: AtomicU64,
}

impl DataFetcher {
    /// `queue_tx` is the producer half of the bounded send queue shared with
    /// the [`crate::sender::DataSender`], sized by
    /// `LiveMetricsConfig::send_queue_capacity` (default 256).
    pub fn new(collector: Arc<Collector>, identity: AgentIdentity, queue_tx: mpsc::Sender<PostEnvelope>) -> Self {
        Self {
            collector,
            identity,
            queue_tx,
            dropped: AtomicU64::new(0),
        }
    }

    /// How many envelopes have been silently dropped because the queue was
    /// full. Exposed for diagnostics/tests, not part of the wire protocol.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Run one POST tick: snapshot the collector, build the envelope, try to
    /// enqueue it. Returns `true` if an envelope was produced (queued or
    /// dropped), `false` if the collector was disabled and there was nothing
    /// to send.
    pub fn tick(&self, now_epoch_ms: u64, window_secs: f64) -> bool {
        let Some(snapshot) = self.collector.get_and_restart() else {
            return false;
        };

        let metrics = build_metrics(&snapshot, window_secs);
        let documents = if snapshot.document_list.is_empty() {
            None
        } else {
            Some(snapshot.document_list)
        };

        let envelope = PostEnvelope {
            documents,
            instrumentation_key: self.identity.instrumentation_key.clone(),
            metrics,
            timestamp: protocol::format_wire_timestamp(now_epoch_ms),
            version: self.identity.version.clone(),
            machine_name: self.identity.machine_name.clone(),
            instance: self.identity.instance_name.clone(),
            role_name: self.identity.role_name.clone(),
        };

        match self.queue_tx.try_send(envelope) {
            Ok(()) => trace!("queued post envelope"),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("send queue full, dropping post envelope");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("send queue closed, dropping post envelope");
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::SubscriptionState;

    fn identity() -> AgentIdentity {
        AgentIdentity {
            instrumentation_key: "ikey".into(),
            stream_id: "stream".into(),
            version: "1.0.0".into(),
            machine_name: "host".into(),
            instance_name: "host".into(),
            role_name: None,
        }
    }

    fn enabled_collector() -> Arc<Collector> {
        let c = Arc::new(Collector::new(1000, 16, true));
        c.enable(Arc::new(|| "ikey".to_string()));
        c.set_quick_pulse_status(SubscriptionState::On);
        c
    }

    #[tokio::test]
    async fn disabled_collector_produces_nothing() {
        let collector = Arc::new(Collector::new(1000, 16, true));
        let (tx, _rx) = mpsc::channel(8);
        let fetcher = DataFetcher::new(collector, identity(), tx);
        assert!(!fetcher.tick(0, 1.0));
    }

    #[tokio::test]
    async fn enabled_collector_queues_one_envelope() {
        let collector = enabled_collector();
        let (tx, mut rx) = mpsc::channel(8);
        let fetcher = DataFetcher::new(collector, identity(), tx);
        assert!(fetcher.tick(0, 1.0));
        let envelope = rx.try_recv().expect("envelope queued");
        assert_eq!(envelope.instrumentation_key, "ikey");
        assert_eq!(fetcher.dropped_count(), 0);
    }

    #[tokio::test]
    async fn full_queue_drops_without_blocking() {
        let collector = enabled_collector();
        let (tx, _rx) = mpsc::channel(1);
        let fetcher = DataFetcher::new(collector, identity(), tx);
        assert!(fetcher.tick(0, 1.0));
        assert!(fetcher.tick(1, 1.0));
        assert_eq!(fetcher.dropped_count(), 1);
    }
}
