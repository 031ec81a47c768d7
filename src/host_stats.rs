//! Best-effort host resource sampling.
//!
//! JMX and OS performance counters live outside the core — the surrounding
//! agent owns real counter plumbing. What remains here is the thin seam the
//! Collector calls into, plus a back-compat CPU normalization knob, exposed
//! as a pluggable trait so production code can supply real counters.

/// Supplies best-effort host memory/CPU readings to the Collector.
///
/// Implementations should never block or fail the caller — on any sampling
/// error, return `None` (memory) or a negative value (CPU: "may be negative
/// when unavailable").
pub trait HostStatsSource: Send + Sync {
    /// Committed memory in bytes, or `None` if unavailable.
    fn committed_memory_bytes(&self) -> Option<u64>;
    /// CPU usage as a percentage of one core across all cores. May be
    /// negative when unavailable; `normalize` controls whether the value
    /// is divided by the core count.
    fn cpu_usage_percent(&self, normalize: bool) -> f64;
}

/// A [`HostStatsSource`] that always reports "unavailable" — used when the
/// host application hasn't wired a real sampler, or in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHostStats;

impl HostStatsSource for NullHostStats {
    fn committed_memory_bytes(&self) -> Option<u64> {
        None
    }

    fn cpu_usage_percent(&self, _normalize: bool) -> f64 {
        -1.0
    }
}

/// Normalize a raw `None` memory reading to the `0` the wire format expects.
pub fn memory_or_zero(sample: Option<u64>) -> u64 {
    sample.unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_source_is_unavailable() {
        let source = NullHostStats;
        assert_eq!(source.committed_memory_bytes(), None);
        assert!(source.cpu_usage_percent(true) < 0.0);
    }

    #[test]
    fn memory_or_zero_normalizes_none() {
        assert_eq!(memory_or_zero(None), 0);
        assert_eq!(memory_or_zero(Some(42)), 42);
    }
}
