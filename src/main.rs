//! Demo CLI: stand up a [`live_metrics_agent::LiveMetricsAgent`], feed it a
//! synthetic stream of request telemetry, and let the coordinator ping/post
//! against a configured Live Metrics endpoint until interrupted.
//!
//! This binary exists for manual smoke-testing; the crate's real surface is
//! the library, not this driver.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use live_metrics_agent::config::LiveMetricsConfig;
use live_metrics_agent::telemetry_item::{RequestTelemetry, TelemetryItem};
use live_metrics_agent::transport::ReqwestTransport;
use live_metrics_agent::LiveMetricsAgent;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "live-metrics-agent", version, about = "Live metrics demo driver")]
struct Cli {
    /// Live Metrics collection endpoint, e.g. https://rt.services.visualstudio.com
    #[arg(long, default_value = "https://rt.services.visualstudio.com")]
    endpoint: String,

    /// Instrumentation key to filter and tag telemetry with.
    #[arg(long)]
    instrumentation_key: String,

    /// Number of synthetic request events to emit, one per second.
    #[arg(long, default_value_t = 60)]
    count: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let agent = LiveMetricsAgent::start(
        cli.endpoint,
        cli.instrumentation_key.clone(),
        LiveMetricsConfig::default(),
        Arc::new(ReqwestTransport::new()),
        Arc::new(live_metrics_agent::host_stats::NullHostStats),
    )?;

    info!(count = cli.count, "emitting synthetic request telemetry");
    for i in 0..cli.count {
        agent.add(TelemetryItem::Request(RequestTelemetry {
            instrumentation_key: cli.instrumentation_key.clone(),
            name: format!("GET /demo/{i}"),
            timestamp_ms: 0,
            duration_text: "00:00:00.100000".to_string(),
            response_code: "200".to_string(),
            success: true,
            url: Some(format!("https://example.invalid/demo/{i}")),
            operation_id: None,
            properties: Default::default(),
        }));
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    agent.shutdown().await;
    Ok(())
}
