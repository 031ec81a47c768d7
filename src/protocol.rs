//! Wire protocol constants and envelope shapes.
//!
//! Mirrors the remote Live Metrics service's JSON contract field-for-field.

use serde::Serialize;

use crate::collector::FinalCounters;
use crate::document::Document;

/// Protocol version the service pins; a client presenting a mismatched
/// value is rejected outright.
pub const INVARIANT_VERSION: u32 = 1;

pub const PING_PATH: &str = "QuickPulseService.svc/ping";
pub const POST_PATH: &str = "QuickPulseService.svc/post";

// ---------------------------------------------------------------------------
// Request header names
// ---------------------------------------------------------------------------

pub const HEADER_TRANSMISSION_TIME: &str = "x-ms-qps-transmission-time";
pub const HEADER_STREAM_ID: &str = "x-ms-qps-stream-id";
pub const HEADER_MACHINE_NAME: &str = "x-ms-qps-machine-name";
pub const HEADER_INSTANCE_NAME: &str = "x-ms-qps-instance-name";
pub const HEADER_ROLE_NAME: &str = "x-ms-qps-role-name";
pub const HEADER_INVARIANT_VERSION: &str = "x-ms-qps-invariant-version";
pub const HEADER_CONFIGURATION_ETAG: &str = "x-ms-qps-configuration-etag";

// ---------------------------------------------------------------------------
// Response header names
// ---------------------------------------------------------------------------

pub const HEADER_SUBSCRIBED: &str = "x-ms-qps-subscribed";
pub const HEADER_POLLING_INTERVAL_HINT: &str = "x-ms-qps-service-polling-interval-hint";
pub const HEADER_ENDPOINT_REDIRECT: &str = "x-ms-qps-service-endpoint-redirect-v2";

/// Render a Unix-epoch millisecond timestamp in the service's `/Date(ms)/`
/// wire format.
pub fn format_wire_timestamp(epoch_ms: u64) -> String {
    format!("/Date({epoch_ms})/")
}

// ---------------------------------------------------------------------------
// Ping envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PingEnvelope {
    pub documents: Option<Vec<Document>>,
    pub instrumentation_key: Option<String>,
    pub metrics: Option<Vec<MetricPoint>>,
    pub invariant_version: u32,
    pub timestamp: String,
    pub version: String,
    pub stream_id: String,
    pub machine_name: String,
    pub instance: String,
    pub role_name: Option<String>,
}

impl Serialize for PingEnvelope {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("PingEnvelope", 9)?;
        s.serialize_field("Documents", &self.documents)?;
        s.serialize_field("InstrumentationKey", &self.instrumentation_key)?;
        s.serialize_field("Metrics", &self.metrics)?;
        s.serialize_field("InvariantVersion", &self.invariant_version)?;
        s.serialize_field("Timestamp", &self.timestamp)?;
        s.serialize_field("Version", &self.version)?;
        s.serialize_field("StreamId", &self.stream_id)?;
        s.serialize_field("MachineName", &self.machine_name)?;
        s.serialize_field("Instance", &self.instance)?;
        s.serialize_field("RoleName", &self.role_name)?;
        s.end()
    }
}

// ---------------------------------------------------------------------------
// Post envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PostEnvelope {
    pub documents: Option<Vec<Document>>,
    pub instrumentation_key: String,
    pub metrics: Vec<MetricPoint>,
    pub timestamp: String,
    pub version: String,
    pub machine_name: String,
    pub instance: String,
    pub role_name: Option<String>,
}

impl Serialize for PostEnvelope {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("PostEnvelope", 10)?;
        s.serialize_field("Documents", &self.documents)?;
        s.serialize_field("InstrumentationKey", &self.instrumentation_key)?;
        s.serialize_field("Metrics", &self.metrics)?;
        s.serialize_field("InvariantVersion", &INVARIANT_VERSION)?;
        s.serialize_field("Timestamp", &self.timestamp)?;
        s.serialize_field("Version", &self.version)?;
        // Posts never carry a StreamId; only pings do.
        s.serialize_field::<Option<String>>("StreamId", &None)?;
        s.serialize_field("MachineName", &self.machine_name)?;
        s.serialize_field("Instance", &self.instance)?;
        s.serialize_field("RoleName", &self.role_name)?;
        s.end()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricPoint {
    #[serde(rename = "Name")]
    pub name: &'static str,
    #[serde(rename = "Value")]
    pub value: f64,
    #[serde(rename = "Weight")]
    pub weight: f64,
}

/// The fixed 11 metric names, in the order they must appear.
pub const METRIC_REQUESTS_PER_SEC: &str = r"\ApplicationInsights\Requests/Sec";
pub const METRIC_REQUEST_DURATION: &str = r"\ApplicationInsights\Request Duration";
pub const METRIC_REQUESTS_FAILED_PER_SEC: &str = r"\ApplicationInsights\Requests Failed/Sec";
pub const METRIC_REQUESTS_SUCCEEDED_PER_SEC: &str = r"\ApplicationInsights\Requests Succeeded/Sec";
pub const METRIC_DEPENDENCY_CALLS_PER_SEC: &str = r"\ApplicationInsights\Dependency Calls/Sec";
pub const METRIC_DEPENDENCY_CALL_DURATION: &str = r"\ApplicationInsights\Dependency Call Duration";
pub const METRIC_DEPENDENCY_CALLS_FAILED_PER_SEC: &str =
    r"\ApplicationInsights\Dependency Calls Failed/Sec";
pub const METRIC_DEPENDENCY_CALLS_SUCCEEDED_PER_SEC: &str =
    r"\ApplicationInsights\Dependency Calls Succeeded/Sec";
pub const METRIC_EXCEPTIONS_PER_SEC: &str = r"\ApplicationInsights\Exceptions/Sec";
pub const METRIC_MEMORY_COMMITTED_BYTES: &str = r"\Memory\Committed Bytes";
pub const METRIC_PROCESSOR_TIME: &str = r"\Processor(_Total)\% Processor Time";

/// Build the fixed 11-element metrics array from a collector snapshot.
/// `window_secs` is the elapsed time since the previous `getAndRestart`,
/// used as the weight for rate metrics (1.0 when unknown).
pub fn build_metrics(snapshot: &FinalCounters, window_secs: f64) -> Vec<MetricPoint> {
    let window_weight = if window_secs > 0.0 { window_secs } else { 1.0 };
    let successful_requests = snapshot.requests.saturating_sub(snapshot.unsuccessful_requests);
    let successful_rdds = snapshot.rdds.saturating_sub(snapshot.unsuccessful_rdds);

    vec![
        MetricPoint {
            name: METRIC_REQUESTS_PER_SEC,
            value: snapshot.requests as f64,
            weight: window_weight,
        },
        MetricPoint {
            name: METRIC_REQUEST_DURATION,
            value: average(snapshot.requests_duration_ms, snapshot.requests),
            weight: snapshot.requests as f64,
        },
        MetricPoint {
            name: METRIC_REQUESTS_FAILED_PER_SEC,
            value: snapshot.unsuccessful_requests as f64,
            weight: window_weight,
        },
        MetricPoint {
            name: METRIC_REQUESTS_SUCCEEDED_PER_SEC,
            value: successful_requests as f64,
            weight: window_weight,
        },
        MetricPoint {
            name: METRIC_DEPENDENCY_CALLS_PER_SEC,
            value: snapshot.rdds as f64,
            weight: window_weight,
        },
        MetricPoint {
            name: METRIC_DEPENDENCY_CALL_DURATION,
            value: average(snapshot.rdds_duration_ms, snapshot.rdds),
            weight: snapshot.rdds as f64,
        },
        MetricPoint {
            name: METRIC_DEPENDENCY_CALLS_FAILED_PER_SEC,
            value: snapshot.unsuccessful_rdds as f64,
            weight: window_weight,
        },
        MetricPoint {
            name: METRIC_DEPENDENCY_CALLS_SUCCEEDED_PER_SEC,
            value: successful_rdds as f64,
            weight: window_weight,
        },
        MetricPoint {
            name: METRIC_EXCEPTIONS_PER_SEC,
            value: snapshot.exceptions as f64,
            weight: window_weight,
        },
        MetricPoint {
            name: METRIC_MEMORY_COMMITTED_BYTES,
            value: snapshot.memory_committed_bytes as f64,
            weight: 1.0,
        },
        MetricPoint {
            name: METRIC_PROCESSOR_TIME,
            value: snapshot.cpu_usage_percent,
            weight: 1.0,
        },
    ]
}

fn average(sum: u64, count: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum as f64 / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_timestamp_format() {
        assert_eq!(format_wire_timestamp(1_700_000_000_000), "/Date(1700000000000)/");
    }

    #[test]
    fn ping_envelope_serializes_pascal_case_keys() {
        let envelope = PingEnvelope {
            documents: None,
            instrumentation_key: None,
            metrics: None,
            invariant_version: INVARIANT_VERSION,
            timestamp: format_wire_timestamp(0),
            version: "1.0.0".into(),
            stream_id: "abc123".into(),
            machine_name: "host".into(),
            instance: "host".into(),
            role_name: None,
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["InvariantVersion"], 1);
        assert_eq!(json["StreamId"], "abc123");
        assert!(json["Documents"].is_null());
    }

    #[test]
    fn post_metrics_has_eleven_entries_in_order() {
        let snapshot = FinalCounters {
            requests: 10,
            unsuccessful_requests: 2,
            requests_duration_ms: 500,
            rdds: 4,
            unsuccessful_rdds: 1,
            rdds_duration_ms: 80,
            exceptions: 3,
            memory_committed_bytes: 1024,
            cpu_usage_percent: 12.5,
            document_list: vec![],
        };
        let metrics = build_metrics(&snapshot, 1.0);
        assert_eq!(metrics.len(), 11);
        assert_eq!(metrics[0].name, METRIC_REQUESTS_PER_SEC);
        assert_eq!(metrics[0].value, 10.0);
        assert_eq!(metrics[1].value, 50.0); // 500/10
        assert_eq!(metrics[3].value, 8.0); // 10 - 2
        assert_eq!(metrics[10].name, METRIC_PROCESSOR_TIME);
    }
}
