//! # Module: transport
//!
//! ## Responsibility
//! A narrow async seam between the Ping Sender / Data Sender and the actual
//! HTTP stack, so production code talks to `reqwest` while tests talk to an
//! in-process double with no network I/O. The HTTP request/response
//! transport is a configured collaborator, not part of the core's own
//! contract.
//!
//! ## Guarantees
//! - Every call takes a caller-side timeout; a timeout is reported exactly
//!   like any other [`TransportError`].
//!
//! ## NOT Responsible For
//! - Authentication policy — delegated to whatever `reqwest::Client` the
//!   host constructs.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::TransportError;

/// An outbound HTTP request the core wants dispatched.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub timeout: Duration,
}

/// The response to an [`OutboundRequest`], or the information needed to
/// build a [`TransportError`].
#[derive(Debug, Clone)]
pub struct InboundResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
}

impl InboundResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup (HTTP header names are case-insensitive;
    /// `reqwest` normalizes to lowercase, which is what the transports below
    /// produce, but callers should not depend on that).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Abstraction over "send this request, get that response" used by the Ping
/// Sender and Data Sender alike.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: OutboundRequest) -> Result<InboundResponse, TransportError>;
}

/// Production transport backed directly by a `reqwest::Client`.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: OutboundRequest) -> Result<InboundResponse, TransportError> {
        let mut builder = self
            .client
            .post(&request.url)
            .timeout(request.timeout)
            .body(request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout {
                    url: request.url.clone(),
                }
            } else {
                TransportError::Connect {
                    url: request.url.clone(),
                    detail: e.to_string(),
                }
            }
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or("").to_string()))
            .collect();
        Ok(InboundResponse { status, headers })
    }
}

#[cfg(any(test, feature = "testing"))]
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    /// A scripted in-process transport double. Each `send` pops the next
    /// queued response (or error) and records the request it received.
    #[derive(Default)]
    pub struct MockTransport {
        responses: Mutex<Vec<Result<InboundResponse, TransportError>>>,
        requests: Mutex<Vec<OutboundRequest>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a response to be returned by the next `send`, FIFO.
        pub fn push_response(&self, response: Result<InboundResponse, TransportError>) {
            self.responses.lock().unwrap().push(response);
        }

        pub fn requests(&self) -> Vec<OutboundRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&self, request: OutboundRequest) -> Result<InboundResponse, TransportError> {
            self.requests.lock().unwrap().push(request.clone());
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(TransportError::Connect {
                    url: request.url,
                    detail: "no scripted response queued".into(),
                });
            }
            responses.remove(0)
        }
    }
}
