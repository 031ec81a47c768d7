//! # Module: sender
//!
//! ## Responsibility
//! Single-consumer drain loop over the send queue: pop each queued
//! [`PostEnvelope`], dispatch it over the configured [`Transport`], and
//! publish the decoded [`PostResult`] for the Coordinator to fold into its
//! consecutive-failure count.
//!
//! ## Guarantees
//! - Exactly one task drains the queue at a time — ordering between queued
//!   envelopes is preserved: posts are sent in the order they were queued.
//! - A transport error or non-2xx response yields `subscribed = false`
//!   rather than propagating — failures are reported, never thrown.
//!
//! ## NOT Responsible For
//! - Building envelopes (see [`crate::fetcher`]) or deciding how many
//!   consecutive failures trip ERROR_BACKOFF (see [`crate::coordinator`]).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::endpoint::LiveEndpoint;
use crate::ping::AgentIdentity;
use crate::protocol::{
    self, PostEnvelope, HEADER_ENDPOINT_REDIRECT, HEADER_POLLING_INTERVAL_HINT, HEADER_SUBSCRIBED,
};
use crate::transport::{OutboundRequest, Transport};

/// Outcome of one post dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct PostResult {
    pub subscribed: bool,
    pub next_delay_ms: Option<u64>,
    pub redirect_url: Option<String>,
}

impl PostResult {
    fn failure() -> Self {
        Self {
            subscribed: false,
            next_delay_ms: None,
            redirect_url: None,
        }
    }
}

pub struct DataSender {
    transport: Arc<dyn Transport>,
    live_endpoint: LiveEndpoint,
    identity: AgentIdentity,
    http_timeout: Duration,
}

impl DataSender {
    pub fn new(
        transport: Arc<dyn Transport>,
        live_endpoint: LiveEndpoint,
        identity: AgentIdentity,
        http_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            live_endpoint,
            identity,
            http_timeout,
        }
    }

    /// Drain `queue_rx` until it is closed, dispatching every envelope in
    /// arrival order and publishing each [`PostResult`] on `result_tx`. If
    /// `result_tx`'s receiver has been dropped, results are silently
    /// discarded rather than ending the loop — the queue must still drain.
    pub async fn run(&self, mut queue_rx: mpsc::Receiver<PostEnvelope>, result_tx: mpsc::Sender<PostResult>) {
        while let Some(envelope) = queue_rx.recv().await {
            let result = self.send_one(envelope).await;
            let _ = result_tx.send(result).await;
        }
        debug!("send queue closed, data sender loop exiting");
    }

    /// Dispatch a single envelope and decode its result. Exposed directly so
    /// tests (and the queue-shedding integration test) can drive it without
    /// running the full loop.
    pub async fn send_one(&self, envelope: PostEnvelope) -> PostResult {
        let body = match serde_json::to_vec(&envelope) {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "failed to encode post envelope");
                return PostResult::failure();
            }
        };

        let url = format!(
            "{}/{}?ikey={}",
            self.live_endpoint.get().trim_end_matches('/'),
            protocol::POST_PATH,
            self.identity.instrumentation_key
        );
        let mut headers = std::collections::HashMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());

        let request = OutboundRequest {
            url,
            headers,
            body,
            timeout: self.http_timeout,
        };

        match self.transport.send(request).await {
            Ok(response) if response.is_success() => {
                let subscribed = response
                    .header(HEADER_SUBSCRIBED)
                    .map(|v| v.eq_ignore_ascii_case("true"))
                    .unwrap_or(false);
                let next_delay_ms = response
                    .header(HEADER_POLLING_INTERVAL_HINT)
                    .and_then(|v| v.parse::<u64>().ok());
                let redirect_url = response.header(HEADER_ENDPOINT_REDIRECT).map(|v| v.to_string());
                PostResult {
                    subscribed,
                    next_delay_ms,
                    redirect_url,
                }
            }
            Ok(response) => {
                warn!(status = response.status, "post received non-2xx response");
                PostResult::failure()
            }
            Err(e) => {
                warn!(error = %e, "post transport failure");
                PostResult::failure()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::transport::mock::MockTransport;
    use std::collections::HashMap;

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

    fn endpoint() -> LiveEndpoint {
        LiveEndpoint::new("https://live.example".to_string())
    }

    fn envelope() -> PostEnvelope {
        PostEnvelope {
            documents: None,
            instrumentation_key: "ikey".into(),
            metrics: vec![],
            timestamp: protocol::format_wire_timestamp(0),
            version: "1.0.0".into(),
            machine_name: "host".into(),
            instance: "host".into(),
            role_name: None,
        }
    }

    #[tokio::test]
    async fn success_decodes_subscribed_header() {
        let transport = Arc::new(MockTransport::new());
        transport.push_response(Ok(crate::transport::InboundResponse {
            status: 200,
            headers: HashMap::from([(HEADER_SUBSCRIBED.to_string(), "true".to_string())]),
        }));
        let sender = DataSender::new(transport, endpoint(), identity(), Duration::from_secs(1));
        let result = sender.send_one(envelope()).await;
        assert!(result.subscribed);
    }

    #[tokio::test]
    async fn transport_error_yields_failure() {
        let transport = Arc::new(MockTransport::new());
        transport.push_response(Err(TransportError::Timeout {
            url: "x".into(),
        }));
        let sender = DataSender::new(transport, endpoint(), identity(), Duration::from_secs(1));
        let result = sender.send_one(envelope()).await;
        assert!(!result.subscribed);
    }

    #[tokio::test]
    async fn run_drains_queue_in_order_and_publishes_results() {
        let transport = Arc::new(MockTransport::new());
        transport.push_response(Ok(crate::transport::InboundResponse {
            status: 200,
            headers: HashMap::from([(HEADER_SUBSCRIBED.to_string(), "true".to_string())]),
        }));
        transport.push_response(Ok(crate::transport::InboundResponse {
            status: 500,
            headers: HashMap::new(),
        }));
        let sender = DataSender::new(transport, endpoint(), identity(), Duration::from_secs(1));

        let (queue_tx, queue_rx) = mpsc::channel(8);
        let (result_tx, mut result_rx) = mpsc::channel(8);
        queue_tx.send(envelope()).await.unwrap();
        queue_tx.send(envelope()).await.unwrap();
        drop(queue_tx);

        sender.run(queue_rx, result_tx).await;

        let first = result_rx.recv().await.unwrap();
        assert!(first.subscribed);
        let second = result_rx.recv().await.unwrap();
        assert!(!second.subscribed);
    }
}
