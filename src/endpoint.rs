//! # Module: endpoint
//!
//! ## Responsibility
//! The live-metrics collection endpoint, shared between the Ping Sender and
//! the Data Sender. The service may redirect it via the
//! `x-ms-qps-service-endpoint-redirect-v2` response header on either a ping
//! or a post; per spec §4.3/§6.5 that redirect is sticky for the rest of the
//! process, so both senders must observe the same current value.
//!
//! ## Guarantees
//! - `get` always returns the most recent value `set` by the Coordinator;
//!   readers never block writers for longer than a clone of the string.
//!
//! ## NOT Responsible For
//! - Deciding when a redirect applies (the Coordinator reads
//!   `PingResult`/`PostResult` and calls `set`; this module just holds the
//!   value).

use std::sync::{Arc, Mutex};

/// A shared, mutable live-metrics endpoint. Cheap to clone — clones share
/// the same backing cell, so a `set` from one clone (the Coordinator) is
/// visible to every other clone (the Ping Sender, the Data Sender).
#[derive(Debug, Clone)]
pub struct LiveEndpoint(Arc<Mutex<String>>);

impl LiveEndpoint {
    pub fn new(initial: String) -> Self {
        Self(Arc::new(Mutex::new(initial)))
    }

    /// The current endpoint. Callers trim any trailing slash themselves
    /// before joining a path onto it.
    pub fn get(&self) -> String {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Apply a sticky redirect. Subsequent `get` calls from any clone
    /// observe the new value.
    pub fn set(&self, endpoint: String) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = endpoint;
    }
}
