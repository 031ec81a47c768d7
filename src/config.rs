//! Ambient configuration for the live-metrics core.
//!
//! The core does not parse configuration files — that belongs to the
//! surrounding agent bootstrap. This struct holds only the core's own
//! tunables, with defaults matching the documented coordinator cadence.

use std::time::Duration;

/// Tunables for the Collector/Ping/Fetcher/Sender/Coordinator pipeline.
///
/// Construct with [`LiveMetricsConfig::default`] and override only the
/// fields a particular deployment or test needs.
#[derive(Debug, Clone)]
pub struct LiveMetricsConfig {
    /// Cadence of ping probes while in `PING` state. Default: 5s.
    pub ping_interval: Duration,
    /// Cadence of post ticks while in `POST` state. Default: 1s.
    pub post_interval: Duration,
    /// Sleep duration in `ERROR_BACKOFF` before returning to `PING`. Default: 10s.
    pub wait_on_error: Duration,
    /// Consecutive POST failures before escalating to `ERROR_BACKOFF`. Default: 5.
    pub max_consecutive_post_failures: u32,
    /// Capacity of the bounded send queue between Fetcher and Sender. Default: 256.
    pub send_queue_capacity: usize,
    /// Cap on retained documents per window. Default: 1000.
    pub document_cap: usize,
    /// Cap on user-supplied properties retained per document (see
    /// DESIGN.md for the reasoning behind the chosen bound).
    pub document_properties_cap: usize,
    /// Caller-side timeout applied to every HTTP call. Default: 10s.
    pub http_timeout: Duration,
    /// Back-compat knob: when `true`, the
    /// `\Processor(_Total)\% Processor Time` metric is normalized by core
    /// count (historical behavior, matches existing dashboards). When
    /// `false`, it reports the literal non-normalized percentage implied by
    /// the metric name.
    pub normalize_cpu_usage: bool,
    /// Agent version string echoed into ping/post envelopes.
    pub agent_version: String,
    /// Machine name echoed into ping/post envelopes.
    pub machine_name: String,
    /// Instance name echoed into ping/post envelopes.
    pub instance_name: String,
    /// Optional role name echoed into ping/post envelopes.
    pub role_name: Option<String>,
}

impl Default for LiveMetricsConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(5),
            post_interval: Duration::from_secs(1),
            wait_on_error: Duration::from_secs(10),
            max_consecutive_post_failures: 5,
            send_queue_capacity: 256,
            document_cap: 1000,
            document_properties_cap: 16,
            http_timeout: Duration::from_secs(10),
            normalize_cpu_usage: true,
            agent_version: env!("CARGO_PKG_VERSION").to_string(),
            machine_name: hostname_best_effort(),
            instance_name: hostname_best_effort(),
            role_name: None,
        }
    }
}

fn hostname_best_effort() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown-host".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = LiveMetricsConfig::default();
        assert_eq!(cfg.ping_interval, Duration::from_secs(5));
        assert_eq!(cfg.post_interval, Duration::from_secs(1));
        assert_eq!(cfg.wait_on_error, Duration::from_secs(10));
        assert_eq!(cfg.max_consecutive_post_failures, 5);
        assert_eq!(cfg.send_queue_capacity, 256);
        assert_eq!(cfg.document_cap, 1000);
        assert!(cfg.normalize_cpu_usage);
    }
}
