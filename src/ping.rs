//! # Module: ping
//!
//! ## Responsibility
//! Low-rate HTTP probe that asks the remote Live Metrics service whether
//! anyone is currently subscribed, and parses its response *headers only*
//! into a [`PingResult`]. The response body is irrelevant and is never read.
//!
//! ## Guarantees
//! - On transport failure, returns a [`PingResult`] with `subscribed = false`
//!   and the caller's configured default retry delay — pings never
//!   propagate an error to the Coordinator.
//!
//! ## NOT Responsible For
//! - Deciding what to do with the result (the Coordinator does).

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::endpoint::LiveEndpoint;
use crate::error::TransportError;
use crate::protocol::{
    self, PingEnvelope, HEADER_CONFIGURATION_ETAG, HEADER_ENDPOINT_REDIRECT, HEADER_INSTANCE_NAME,
    HEADER_INVARIANT_VERSION, HEADER_MACHINE_NAME, HEADER_POLLING_INTERVAL_HINT, HEADER_ROLE_NAME,
    HEADER_STREAM_ID, HEADER_SUBSCRIBED, HEADER_TRANSMISSION_TIME, INVARIANT_VERSION,
};
use crate::transport::{OutboundRequest, Transport};

/// Outcome of one ping round-trip.
#[derive(Debug, Clone, PartialEq)]
pub struct PingResult {
    pub subscribed: bool,
    pub next_delay_ms: Option<u64>,
    pub redirect_url: Option<String>,
    pub etag: Option<String>,
}

impl PingResult {
    fn off(next_delay_ms: Option<u64>) -> Self {
        Self {
            subscribed: false,
            next_delay_ms,
            redirect_url: None,
            etag: None,
        }
    }
}

/// Identity fields echoed into every ping (and post) envelope.
#[derive(Debug, Clone)]
pub struct AgentIdentity {
    pub instrumentation_key: String,
    pub stream_id: String,
    pub version: String,
    pub machine_name: String,
    pub instance_name: String,
    pub role_name: Option<String>,
}

pub struct PingSender {
    transport: Arc<dyn Transport>,
    live_endpoint: LiveEndpoint,
    identity: AgentIdentity,
    http_timeout: Duration,
    default_retry_delay_ms: u64,
    configuration_etag: std::sync::Mutex<Option<String>>,
}

impl PingSender {
    pub fn new(
        transport: Arc<dyn Transport>,
        live_endpoint: LiveEndpoint,
        identity: AgentIdentity,
        http_timeout: Duration,
        default_retry_delay_ms: u64,
    ) -> Self {
        Self {
            transport,
            live_endpoint,
            identity,
            http_timeout,
            default_retry_delay_ms,
            configuration_etag: std::sync::Mutex::new(None),
        }
    }

    /// Send one ping and decode the response headers into a [`PingResult`].
    ///
    /// # Panics
    /// This function never panics.
    pub async fn ping(&self, now_epoch_ms: u64, monotonic_ticks: u64) -> PingResult {
        let envelope = PingEnvelope {
            documents: None,
            instrumentation_key: None,
            metrics: None,
            invariant_version: INVARIANT_VERSION,
            timestamp: protocol::format_wire_timestamp(now_epoch_ms),
            version: self.identity.version.clone(),
            stream_id: self.identity.stream_id.clone(),
            machine_name: self.identity.machine_name.clone(),
            instance: self.identity.instance_name.clone(),
            role_name: self.identity.role_name.clone(),
        };

        let body = match serde_json::to_vec(&envelope) {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "failed to encode ping envelope, skipping this tick");
                return PingResult::off(Some(self.default_retry_delay_ms));
            }
        };

        let url = format!(
            "{}/{}?ikey={}",
            self.live_endpoint.get().trim_end_matches('/'),
            protocol::PING_PATH,
            self.identity.instrumentation_key
        );

        let mut headers = std::collections::HashMap::new();
        headers.insert(HEADER_TRANSMISSION_TIME.to_string(), (monotonic_ticks * 10_000).to_string());
        headers.insert(HEADER_STREAM_ID.to_string(), self.identity.stream_id.clone());
        headers.insert(HEADER_MACHINE_NAME.to_string(), self.identity.machine_name.clone());
        headers.insert(HEADER_INSTANCE_NAME.to_string(), self.identity.instance_name.clone());
        if let Some(role) = &self.identity.role_name {
            headers.insert(HEADER_ROLE_NAME.to_string(), role.clone());
        }
        headers.insert(HEADER_INVARIANT_VERSION.to_string(), INVARIANT_VERSION.to_string());
        if let Some(etag) = self
            .configuration_etag
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
        {
            headers.insert(HEADER_CONFIGURATION_ETAG.to_string(), etag);
        }
        headers.insert("Content-Type".to_string(), "application/json".to_string());

        let request = OutboundRequest {
            url,
            headers,
            body,
            timeout: self.http_timeout,
        };

        match self.transport.send(request).await {
            Ok(response) if response.is_success() => self.decode(response),
            Ok(response) => {
                warn!(status = response.status, "ping received non-2xx response");
                PingResult::off(Some(self.default_retry_delay_ms))
            }
            Err(e) => {
                warn!(error = %e, "ping transport failure, will retry");
                PingResult::off(Some(self.default_retry_delay_ms))
            }
        }
    }

    fn decode(&self, response: crate::transport::InboundResponse) -> PingResult {
        let subscribed = response
            .header(HEADER_SUBSCRIBED)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let next_delay_ms = response
            .header(HEADER_POLLING_INTERVAL_HINT)
            .and_then(|v| v.parse::<u64>().ok());
        let redirect_url = response.header(HEADER_ENDPOINT_REDIRECT).map(|v| v.to_string());
        let etag = response.header(HEADER_CONFIGURATION_ETAG).map(|v| v.to_string());

        if let Some(etag) = &etag {
            *self.configuration_etag.lock().unwrap_or_else(|e| e.into_inner()) = Some(etag.clone());
        }

        debug!(subscribed, ?next_delay_ms, ?redirect_url, "ping decoded");
        PingResult {
            subscribed,
            next_delay_ms,
            redirect_url,
            etag,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;
    use std::collections::HashMap;

    fn identity() -> AgentIdentity {
        AgentIdentity {
            instrumentation_key: "ikey".into(),
            stream_id: "deadbeef".into(),
            version: "1.0.0".into(),
            machine_name: "host".into(),
            instance_name: "host".into(),
            role_name: None,
        }
    }

    fn endpoint() -> LiveEndpoint {
        LiveEndpoint::new("https://live.example".to_string())
    }

    #[tokio::test]
    async fn subscribed_true_header_yields_on() {
        let transport = Arc::new(MockTransport::new());
        transport.push_response(Ok(crate::transport::InboundResponse {
            status: 200,
            headers: HashMap::from([(HEADER_SUBSCRIBED.to_string(), "true".to_string())]),
        }));
        let sender = PingSender::new(
            transport,
            endpoint(),
            identity(),
            Duration::from_secs(1),
            5_000,
        );
        let result = sender.ping(0, 0).await;
        assert!(result.subscribed);
    }

    #[tokio::test]
    async fn transport_error_yields_off_with_default_delay() {
        let transport = Arc::new(MockTransport::new());
        transport.push_response(Err(TransportError::Connect {
            url: "x".into(),
            detail: "refused".into(),
        }));
        let sender = PingSender::new(
            transport,
            endpoint(),
            identity(),
            Duration::from_secs(1),
            5_000,
        );
        let result = sender.ping(0, 0).await;
        assert!(!result.subscribed);
        assert_eq!(result.next_delay_ms, Some(5_000));
    }

    #[tokio::test]
    async fn polling_interval_hint_is_parsed() {
        let transport = Arc::new(MockTransport::new());
        transport.push_response(Ok(crate::transport::InboundResponse {
            status: 200,
            headers: HashMap::from([
                (HEADER_SUBSCRIBED.to_string(), "false".to_string()),
                (HEADER_POLLING_INTERVAL_HINT.to_string(), "2500".to_string()),
            ]),
        }));
        let sender = PingSender::new(
            transport,
            endpoint(),
            identity(),
            Duration::from_secs(1),
            5_000,
        );
        let result = sender.ping(0, 0).await;
        assert!(!result.subscribed);
        assert_eq!(result.next_delay_ms, Some(2500));
    }

    #[tokio::test]
    async fn redirect_header_is_decoded_into_the_result() {
        let transport = Arc::new(MockTransport::new());
        transport.push_response(Ok(crate::transport::InboundResponse {
            status: 200,
            headers: HashMap::from([
                (HEADER_SUBSCRIBED.to_string(), "true".to_string()),
                (
                    HEADER_ENDPOINT_REDIRECT.to_string(),
                    "https://redirected.example".to_string(),
                ),
            ]),
        }));
        let sender = PingSender::new(transport, endpoint(), identity(), Duration::from_secs(1), 5_000);
        let result = sender.ping(0, 0).await;
        assert_eq!(result.redirect_url.as_deref(), Some("https://redirected.example"));
    }
}
