//! # Module: counters
//!
//! ## Responsibility
//! Lock-free accumulation of per-window (count, summed-duration-ms) pairs.
//! Each pair lives in a single [`AtomicU64`] cell so a reader never observes
//! a torn update between the two fields.
//!
//! ## Guarantees
//! - Wait-free on the fast path: CAS retry loop, no locks, no allocation.
//! - The duration field saturates at its 24-bit ceiling instead of wrapping.
//! - `snapshot_and_reset` atomically swaps a cell to zero and returns the
//!   pre-swap decoded value; two different cells may be sampled microseconds
//!   apart, but each cell's own (count, duration) pair is internally
//!   consistent.
//!
//! ## NOT Responsible For
//! - Deciding which cell a telemetry item updates (the collector does that).
//! - Document retention (see [`crate::document`]).

use std::sync::atomic::{AtomicU64, Ordering};

/// Bits reserved for the count in the packed cell.
const COUNT_BITS: u32 = 40;
/// Bits reserved for the summed-duration-in-milliseconds field.
const DURATION_BITS: u32 = 24;
/// Largest count representable before it would corrupt the duration field.
const COUNT_MASK: u64 = (1u64 << COUNT_BITS) - 1;
/// Largest summed duration (ms) representable; further additions saturate here.
const DURATION_MAX: u64 = (1u64 << DURATION_BITS) - 1;

/// Decode a packed cell into `(count, duration_ms)`.
#[inline]
pub fn decode(word: u64) -> (u64, u64) {
    let count = word & COUNT_MASK;
    let duration = word >> COUNT_BITS;
    (count, duration)
}

/// Encode `(count, duration_ms)` into a packed cell.
///
/// `count` is assumed to already fit in 40 bits (checked with a debug
/// assertion — exceeding it is ~10^12 events in one window, an unreachable
/// programming error) and `duration_ms` is assumed to already be saturated
/// to [`DURATION_MAX`].
#[inline]
pub fn encode(count: u64, duration_ms: u64) -> u64 {
    debug_assert!(count <= COUNT_MASK, "counter overflowed 40-bit count field");
    debug_assert!(duration_ms <= DURATION_MAX, "duration not pre-saturated");
    (duration_ms << COUNT_BITS) | (count & COUNT_MASK)
}

/// A single lock-free (count, summed-duration-ms) cell.
#[derive(Debug, Default)]
pub struct PackedCounter {
    cell: AtomicU64,
}

impl PackedCounter {
    pub const fn new() -> Self {
        Self {
            cell: AtomicU64::new(0),
        }
    }

    /// Add one occurrence with the given (already-truncated) millisecond
    /// duration. Retries the CAS loop on contention; saturates the duration
    /// field rather than wrapping.
    pub fn add(&self, duration_ms: u64) {
        let mut current = self.cell.load(Ordering::Relaxed);
        loop {
            let (count, duration) = decode(current);
            let new_count = count.wrapping_add(1) & COUNT_MASK;
            let new_duration = duration.saturating_add(duration_ms).min(DURATION_MAX);
            let new_word = encode(new_count, new_duration);
            match self.cell.compare_exchange_weak(
                current,
                new_word,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    /// Non-destructive decode of the current value.
    pub fn peek(&self) -> (u64, u64) {
        decode(self.cell.load(Ordering::Relaxed))
    }

    /// Atomically swap the cell to zero, returning the pre-swap value.
    pub fn snapshot_and_reset(&self) -> (u64, u64) {
        let previous = self.cell.swap(0, Ordering::AcqRel);
        decode(previous)
    }
}

/// The six per-window counters maintained by the [`crate::collector::Collector`].
#[derive(Debug, Default)]
pub struct Counters {
    pub requests: PackedCounter,
    pub unsuccessful_requests: PackedCounter,
    pub rdds: PackedCounter,
    pub unsuccessful_rdds: PackedCounter,
    pub exceptions: PackedCounter,
}

/// Plain scalar counters decoded from a [`Counters`] snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterValues {
    pub requests: u64,
    pub unsuccessful_requests: u64,
    pub requests_duration_ms: u64,
    pub rdds: u64,
    pub unsuccessful_rdds: u64,
    pub rdds_duration_ms: u64,
    pub exceptions: u64,
}

impl Counters {
    pub fn record_request(&self, duration_ms: u64, success: bool) {
        self.requests.add(duration_ms);
        if !success {
            self.unsuccessful_requests.add(0);
        }
    }

    pub fn record_dependency(&self, duration_ms: u64, success: bool) {
        self.rdds.add(duration_ms);
        if !success {
            self.unsuccessful_rdds.add(0);
        }
    }

    pub fn record_exception(&self) {
        self.exceptions.add(0);
    }

    pub fn peek(&self) -> CounterValues {
        let (requests, requests_duration_ms) = self.requests.peek();
        let (unsuccessful_requests, _) = self.unsuccessful_requests.peek();
        let (rdds, rdds_duration_ms) = self.rdds.peek();
        let (unsuccessful_rdds, _) = self.unsuccessful_rdds.peek();
        let (exceptions, _) = self.exceptions.peek();
        CounterValues {
            requests,
            unsuccessful_requests,
            requests_duration_ms,
            rdds,
            unsuccessful_rdds,
            rdds_duration_ms,
            exceptions,
        }
    }

    pub fn snapshot_and_reset(&self) -> CounterValues {
        let (requests, requests_duration_ms) = self.requests.snapshot_and_reset();
        let (unsuccessful_requests, _) = self.unsuccessful_requests.snapshot_and_reset();
        let (rdds, rdds_duration_ms) = self.rdds.snapshot_and_reset();
        let (unsuccessful_rdds, _) = self.unsuccessful_rdds.snapshot_and_reset();
        let (exceptions, _) = self.exceptions.snapshot_and_reset();
        CounterValues {
            requests,
            unsuccessful_requests,
            requests_duration_ms,
            rdds,
            unsuccessful_rdds,
            rdds_duration_ms,
            exceptions,
        }
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn encode_decode_is_a_bijection(count in 0u64..(1u64 << COUNT_BITS), duration in 0u64..(1u64 << DURATION_BITS)) {
            let word = encode(count, duration);
            prop_assert_eq!(decode(word), (count, duration));
        }
    }
}
