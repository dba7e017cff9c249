//! Latency sampler
//!
//! Append-only sample vector with online min/max/sum and on-demand
//! percentiles. Appends and snapshots each take the lock only for their
//! own duration; percentiles are computed on a sorted copy.

use serde::Serialize;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

#[derive(Default)]
struct SamplerInner {
    samples: Vec<u64>, // nanoseconds
    min: u64,
    max: u64,
    sum: u64,
}

pub struct LatencySampler {
    inner: Mutex<SamplerInner>,
}

/// Point-in-time view of the latency distribution. All zeros when no
/// samples have been recorded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencySnapshot {
    pub min_ms: f64,
    pub max_ms: f64,
    pub avg_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub count: u64,
}

impl LatencySnapshot {
    fn zero() -> Self {
        Self {
            min_ms: 0.0,
            max_ms: 0.0,
            avg_ms: 0.0,
            p95_ms: 0.0,
            p99_ms: 0.0,
            count: 0,
        }
    }
}

fn to_ms(nanos: u64) -> f64 {
    nanos as f64 / 1_000_000.0
}

impl LatencySampler {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SamplerInner::default()),
        }
    }

    pub fn record(&self, latency: Duration) {
        let nanos = latency.as_nanos().min(u128::from(u64::MAX)) as u64;
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.samples.is_empty() {
            inner.min = nanos;
            inner.max = nanos;
        } else {
            inner.min = inner.min.min(nanos);
            inner.max = inner.max.max(nanos);
        }
        inner.sum = inner.sum.saturating_add(nanos);
        inner.samples.push(nanos);
    }

    pub fn snapshot(&self) -> LatencySnapshot {
        let (mut sorted, min, max, sum) = {
            let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            (inner.samples.clone(), inner.min, inner.max, inner.sum)
        };
        let n = sorted.len();
        if n == 0 {
            return LatencySnapshot::zero();
        }
        sorted.sort_unstable();
        let idx = |q: f64| ((n as f64 * q) as usize).min(n - 1);
        LatencySnapshot {
            min_ms: to_ms(min),
            max_ms: to_ms(max),
            avg_ms: to_ms(sum / n as u64),
            p95_ms: to_ms(sorted[idx(0.95)]),
            p99_ms: to_ms(sorted[idx(0.99)]),
            count: n as u64,
        }
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        *inner = SamplerInner::default();
    }
}

impl Default for LatencySampler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_snapshot_is_zero() {
        let sampler = LatencySampler::new();
        let snap = sampler.snapshot();
        assert_eq!(snap.count, 0);
        assert_eq!(snap.avg_ms, 0.0);
        assert_eq!(snap.p99_ms, 0.0);
    }

    #[test]
    fn test_single_sample() {
        let sampler = LatencySampler::new();
        sampler.record(Duration::from_millis(5));
        let snap = sampler.snapshot();
        assert_eq!(snap.count, 1);
        assert_eq!(snap.min_ms, 5.0);
        assert_eq!(snap.max_ms, 5.0);
        assert_eq!(snap.p95_ms, 5.0);
        assert_eq!(snap.p99_ms, 5.0);
    }

    #[test]
    fn test_percentile_indices() {
        let sampler = LatencySampler::new();
        for ms in 1..=100u64 {
            sampler.record(Duration::from_millis(ms));
        }
        let snap = sampler.snapshot();
        // floor(100 * 0.95) = index 95 -> 96ms; floor(100 * 0.99) = 99 -> 100ms
        assert_eq!(snap.p95_ms, 96.0);
        assert_eq!(snap.p99_ms, 100.0);
        assert_eq!(snap.min_ms, 1.0);
        assert_eq!(snap.max_ms, 100.0);
        assert_eq!(snap.avg_ms, 50.5);
    }

    #[test]
    fn test_reset() {
        let sampler = LatencySampler::new();
        sampler.record(Duration::from_millis(10));
        sampler.reset();
        assert_eq!(sampler.snapshot().count, 0);
    }

    #[test]
    fn test_concurrent_recording() {
        use std::sync::Arc;
        let sampler = Arc::new(LatencySampler::new());
        let mut handles = vec![];
        for _ in 0..4 {
            let s = Arc::clone(&sampler);
            handles.push(std::thread::spawn(move || {
                for ms in 1..=250u64 {
                    s.record(Duration::from_micros(ms));
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(sampler.snapshot().count, 1000);
    }

    proptest! {
        // p95 <= p99; both >= avg is not guaranteed in general, but the
        // ordering min <= avg <= max and min <= p95 <= p99 <= max is.
        #[test]
        fn prop_percentile_ordering(samples in prop::collection::vec(1u64..10_000_000, 1..200)) {
            let sampler = LatencySampler::new();
            for nanos in &samples {
                sampler.record(Duration::from_nanos(*nanos));
            }
            let snap = sampler.snapshot();
            prop_assert!(snap.min_ms <= snap.avg_ms + 1e-9);
            prop_assert!(snap.avg_ms <= snap.max_ms + 1e-9);
            prop_assert!(snap.min_ms <= snap.p95_ms);
            prop_assert!(snap.p95_ms <= snap.p99_ms);
            prop_assert!(snap.p99_ms <= snap.max_ms);
        }
    }
}
