//! An in-process live-metrics telemetry agent (QuickPulse/Live-Metrics
//! style): lock-free counters and a bounded document sample on the hot
//! ingestion path, and a background coordinator that pings a remote
//! collection service, posts snapshots while subscribed, and backs off on
//! repeated failures.
//!
//! The crate root wires the five components — [`collector::Collector`],
//! [`ping::PingSender`], [`fetcher::DataFetcher`], [`sender::DataSender`],
//! and [`coordinator::Coordinator`] — behind a single [`LiveMetricsAgent`]
//! facade. Most callers only need [`LiveMetricsAgent::add`].

pub mod collector;
pub mod config;
pub mod coordinator;
pub mod counters;
pub mod document;
pub mod duration;
pub mod endpoint;
pub mod error;
pub mod fetcher;
pub mod host_stats;
pub mod ping;
pub mod protocol;
pub mod sender;
pub mod telemetry_item;
pub mod transport;

use std::sync::Arc;

use tokio::sync::mpsc;

use collector::Collector;
use config::LiveMetricsConfig;
use coordinator::{Coordinator, ShutdownHandle};
use endpoint::LiveEndpoint;
use error::LiveMetricsError;
use fetcher::DataFetcher;
use host_stats::HostStatsSource;
use ping::{AgentIdentity, PingSender};
use sender::DataSender;
use telemetry_item::TelemetryItem;
use transport::Transport;

/// Everything needed to run a live-metrics pipeline against a remote
/// collection endpoint. Construct with [`LiveMetricsAgent::start`].
pub struct LiveMetricsAgent {
    collector: Arc<Collector>,
    shutdown: Option<ShutdownHandle>,
    sender_task: Option<tokio::task::JoinHandle<()>>,
    coordinator_task: Option<tokio::task::JoinHandle<()>>,
}

impl LiveMetricsAgent {
    /// Wire up the Collector, Ping Sender, Data Fetcher, and Data Sender,
    /// then spawn the Coordinator's background task. Returns immediately;
    /// the agent starts in the `PING` state.
    pub fn start(
        live_endpoint: String,
        instrumentation_key: String,
        config: LiveMetricsConfig,
        transport: Arc<dyn Transport>,
        host_stats: Arc<dyn HostStatsSource>,
    ) -> Result<Self, LiveMetricsError> {
        if live_endpoint.trim().is_empty() {
            return Err(LiveMetricsError::Config("live_endpoint must not be empty".into()));
        }
        if instrumentation_key.trim().is_empty() {
            return Err(LiveMetricsError::Config("instrumentation_key must not be empty".into()));
        }

        let stream_id = uuid::Uuid::new_v4().simple().to_string();
        let identity = AgentIdentity {
            instrumentation_key: instrumentation_key.clone(),
            stream_id,
            version: config.agent_version.clone(),
            machine_name: config.machine_name.clone(),
            instance_name: config.instance_name.clone(),
            role_name: config.role_name.clone(),
        };

        let collector = Arc::new(
            Collector::new(config.document_cap, config.document_properties_cap, config.normalize_cpu_usage)
                .with_host_stats(host_stats),
        );
        collector.enable(Arc::new({
            let key = instrumentation_key.clone();
            move || key.clone()
        }));

        let live_endpoint = LiveEndpoint::new(live_endpoint);

        let ping_sender = PingSender::new(
            transport.clone(),
            live_endpoint.clone(),
            identity.clone(),
            config.http_timeout,
            config.ping_interval.as_millis() as u64,
        );

        let (queue_tx, queue_rx) = mpsc::channel(config.send_queue_capacity);
        let fetcher = DataFetcher::new(collector.clone(), identity.clone(), queue_tx);
        let data_sender = DataSender::new(transport, live_endpoint.clone(), identity, config.http_timeout);

        let coordinator = Arc::new(Coordinator::new(collector.clone(), ping_sender, fetcher, config, live_endpoint));
        let (result_tx, result_rx) = mpsc::channel(64);

        let sender_task = tokio::spawn(async move { data_sender.run(queue_rx, result_tx).await });
        let (shutdown, coordinator_task) = Coordinator::spawn(coordinator, result_rx);

        Ok(Self {
            collector,
            shutdown: Some(shutdown),
            sender_task: Some(sender_task),
            coordinator_task: Some(coordinator_task),
        })
    }

    /// The single ingestion point. Non-blocking, infallible from the
    /// caller's perspective: malformed or off-subscription items are
    /// silently dropped.
    pub fn add(&self, item: TelemetryItem) {
        self.collector.add(item);
    }

    /// Non-destructive snapshot of the current counter/document window, for
    /// diagnostics. `None` while the collector is disabled.
    pub fn peek(&self) -> Option<collector::FinalCounters> {
        self.collector.peek()
    }

    /// Stop the coordinator's background task and abort the sender task.
    pub async fn shutdown(mut self) {
        if let Some(handle) = self.shutdown.take() {
            handle.shutdown();
        }
        if let Some(task) = self.coordinator_task.take() {
            let _ = task.await;
        }
        if let Some(task) = self.sender_task.take() {
            task.abort();
        }
    }
}
