//! Report builder
//!
//! Freezes the aggregators and the controller's run context into a
//! self-describing, serializable record.

use crate::config::{Family, RunConfig};
use crate::controller::RunState;
use crate::sampler::{LatencySampler, LatencySnapshot};
use crate::stats::{ClassCounters, StatsAggregator};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

/// Well-known derived metrics plus the latency distribution.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_transactions: u64,
    pub successful_transactions: u64,
    pub failed_transactions: u64,
    pub deadlock_count: u64,
    pub retry_count: u64,
    pub qps: f64,
    pub tps: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tpmc: Option<f64>,
    pub efficiency: f64,
    pub success_rate: f64,
    pub latency: LatencySnapshot,
    pub per_class: BTreeMap<String, ClassCounters>,
}

impl MetricsSnapshot {
    pub fn collect(
        stats: &StatsAggregator,
        sampler: &LatencySampler,
        elapsed: Duration,
        family: Family,
    ) -> Self {
        let snap = stats.snapshot(elapsed, family == Family::Tpcc);
        let latency = sampler.snapshot();
        let per_class = snap
            .per_class
            .iter()
            .map(|(class, counters)| (class.as_str().to_string(), *counters))
            .collect();
        Self {
            total_transactions: snap.total_transactions,
            successful_transactions: snap.successful_transactions,
            failed_transactions: snap.failed_transactions,
            deadlock_count: snap.deadlock_count,
            retry_count: snap.retry_count,
            qps: snap.tps,
            tps: snap.tps,
            tpmc: snap.tpmc,
            efficiency: snap.efficiency,
            success_rate: snap.success_rate,
            latency,
            per_class,
        }
    }

    /// The same figures as a name -> tagged-value mapping.
    pub fn as_metric_map(&self) -> BTreeMap<String, Metric> {
        let mut map = BTreeMap::new();
        map.insert("total_transactions".into(), Metric::counter(self.total_transactions));
        map.insert(
            "successful_transactions".into(),
            Metric::counter(self.successful_transactions),
        );
        map.insert(
            "failed_transactions".into(),
            Metric::counter(self.failed_transactions),
        );
        map.insert("deadlock_count".into(), Metric::counter(self.deadlock_count));
        map.insert("retry_count".into(), Metric::counter(self.retry_count));
        map.insert("qps".into(), Metric::gauge(self.qps));
        map.insert("tps".into(), Metric::gauge(self.tps));
        if let Some(tpmc) = self.tpmc {
            map.insert("tpmc".into(), Metric::gauge(tpmc));
        }
        map.insert("efficiency".into(), Metric::gauge(self.efficiency));
        map.insert("latency_avg_ms".into(), Metric::gauge(self.latency.avg_ms));
        map.insert("latency_p95_ms".into(), Metric::gauge(self.latency.p95_ms));
        map.insert("latency_p99_ms".into(), Metric::gauge(self.latency.p99_ms));
        for (class, counters) in &self.per_class {
            map.insert(format!("{}_count", class), Metric::counter(counters.count));
            map.insert(format!("{}_errors", class), Metric::counter(counters.errors));
        }
        map
    }
}

/// Tagged metric value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Metric {
    Gauge {
        value: f64,
        #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
        labels: BTreeMap<String, String>,
    },
    Counter {
        value: u64,
        #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
        labels: BTreeMap<String, String>,
    },
}

impl Metric {
    pub fn gauge(value: f64) -> Self {
        Metric::Gauge {
            value,
            labels: BTreeMap::new(),
        }
    }

    pub fn counter(value: u64) -> Self {
        Metric::Counter {
            value,
            labels: BTreeMap::new(),
        }
    }
}

/// One per-report-interval observation.
#[derive(Debug, Clone, Serialize)]
pub struct IntervalSample {
    pub elapsed_secs: f64,
    pub total_transactions: u64,
    pub successful_transactions: u64,
    pub failed_transactions: u64,
    /// Successful transactions during this interval per second.
    pub interval_tps: f64,
    pub latency_p95_ms: f64,
    pub latency_p99_ms: f64,
}

/// Final run artifact.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub run_id: Uuid,
    pub name: String,
    pub family: Family,
    pub state: RunState,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_secs: f64,
    pub config: RunConfig,
    pub metrics: MetricsSnapshot,
    pub metric_map: BTreeMap<String, Metric>,
    pub intervals: Vec<IntervalSample>,
    /// Error class retained after a `Failed` terminal state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[allow(clippy::too_many_arguments)]
pub fn build_report(
    run_id: Uuid,
    config: &RunConfig,
    state: RunState,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    elapsed: Duration,
    stats: &StatsAggregator,
    sampler: &LatencySampler,
    intervals: Vec<IntervalSample>,
    last_error: Option<String>,
) -> Report {
    let metrics = MetricsSnapshot::collect(stats, sampler, elapsed, config.family());
    let metric_map = metrics.as_metric_map();
    Report {
        run_id,
        name: config.name.clone(),
        family: config.family(),
        state,
        started_at,
        ended_at,
        duration_secs: elapsed.as_secs_f64(),
        config: config.clone(),
        metrics,
        metric_map,
        intervals,
        last_error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AdhocConfig, FamilyConfig};
    use crate::distribution::TxClass;

    fn sample_report(state: RunState) -> Report {
        let stats = StatsAggregator::new();
        stats.record_success(TxClass::Adhoc);
        stats.record_success(TxClass::Adhoc);
        stats.record_failure(TxClass::Adhoc);
        let sampler = LatencySampler::new();
        sampler.record(Duration::from_millis(3));
        let config = RunConfig::new(
            "r",
            1,
            1.0,
            FamilyConfig::Adhoc(AdhocConfig::single("SELECT 1")),
        );
        build_report(
            Uuid::new_v4(),
            &config,
            state,
            Some(Utc::now()),
            Some(Utc::now()),
            Duration::from_secs(2),
            &stats,
            &sampler,
            vec![],
            None,
        )
    }

    #[test]
    fn test_report_metrics() {
        let report = sample_report(RunState::Completed);
        assert_eq!(report.metrics.total_transactions, 3);
        assert_eq!(report.metrics.successful_transactions, 2);
        assert_eq!(report.metrics.tps, 1.0);
        assert_eq!(report.metrics.tpmc, None);
        assert!(report.metrics.per_class.contains_key("adhoc"));
    }

    #[test]
    fn test_metric_map_tagging() {
        let report = sample_report(RunState::Completed);
        match report.metric_map.get("tps").unwrap() {
            Metric::Gauge { value, .. } => assert_eq!(*value, 1.0),
            other => panic!("tps should be a gauge, got {:?}", other),
        }
        match report.metric_map.get("total_transactions").unwrap() {
            Metric::Counter { value, .. } => assert_eq!(*value, 3),
            other => panic!("total should be a counter, got {:?}", other),
        }
        assert!(report.metric_map.contains_key("adhoc_count"));
    }

    #[test]
    fn test_report_serializes() {
        let report = sample_report(RunState::Failed("prepare failed".into()));
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"family\":\"adhoc\""));
        assert!(json.contains("prepare failed"));
        assert!(json.contains("\"kind\":\"gauge\""));
    }
}
