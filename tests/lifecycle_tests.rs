//! Run life-cycle tests against a passthrough mock database
//!
//! Covers completion at the deadline, fail-fast adhoc semantics, stop
//! promptness, gate exclusivity, and counter consistency.

mod common;

use common::{MockBehavior, MockDatabase};
use stampede::config::{AdhocConfig, FamilyConfig, RunConfig};
use stampede::controller::RunState;
use stampede::error::BenchError;
use stampede::registry::{ActiveRunGate, BenchmarkRegistry};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn adhoc_run(name: &str, threads: usize, duration_secs: f64) -> RunConfig {
    let mut config = RunConfig::new(
        name,
        threads,
        duration_secs,
        FamilyConfig::Adhoc(AdhocConfig::single("SELECT 1")),
    );
    config.report_interval_secs = 0.2;
    config
}

#[test]
fn test_adhoc_completes_with_throughput() {
    // One worker against a ~1ms mock for one second: Completed, full
    // progress, several hundred successes, zero failures.
    let registry = BenchmarkRegistry::with_builtin();
    let db = Arc::new(MockDatabase::new(MockBehavior::Ok(Duration::from_millis(1))));
    let controller = registry
        .create_controller(adhoc_run("s1", 1, 1.0), db)
        .unwrap();

    controller.start().unwrap();
    let state = controller.wait_for_terminal(Duration::from_secs(30));
    assert_eq!(state, RunState::Completed);
    assert_eq!(controller.progress(), 100.0);

    let report = controller.report();
    assert!(
        report.metrics.successful_transactions >= 500,
        "expected >= 500 successes, got {}",
        report.metrics.successful_transactions
    );
    assert_eq!(report.metrics.failed_transactions, 0);
    assert!(report.metrics.latency.p99_ms >= report.metrics.latency.avg_ms);
    assert!(report.metrics.tps > 0.0);
    assert!(!report.intervals.is_empty());
}

#[test]
fn test_single_query_failure_is_fatal() {
    // Every call fails with a non-deadlock error: the run fails fast
    // and records the errors.
    let registry = BenchmarkRegistry::with_builtin();
    let db = Arc::new(MockDatabase::new(MockBehavior::FailAll(
        Duration::from_millis(1),
    )));
    let controller = registry
        .create_controller(adhoc_run("s2", 4, 2.0), db)
        .unwrap();

    let started = Instant::now();
    controller.start().unwrap();
    let state = controller.wait_for_terminal(Duration::from_secs(30));
    assert!(matches!(state, RunState::Failed(_)), "got {:?}", state);
    assert!(started.elapsed() < Duration::from_secs(2));

    let report = controller.report();
    assert_eq!(report.metrics.successful_transactions, 0);
    assert!(report.metrics.failed_transactions > 0);
    assert!(report.last_error.is_some());
}

#[test]
fn test_stop_cancels_promptly() {
    let registry = BenchmarkRegistry::with_builtin();
    let db = Arc::new(MockDatabase::new(MockBehavior::Ok(Duration::from_millis(1))));
    let controller = registry
        .create_controller(adhoc_run("s3", 2, 10.0), db)
        .unwrap();

    controller.start().unwrap();
    std::thread::sleep(Duration::from_millis(200));
    let progress_at_stop = controller.progress();
    let stop_at = Instant::now();
    controller.stop();

    let state = controller.wait_for_terminal(Duration::from_secs(30));
    assert_eq!(state, RunState::Cancelled);
    assert!(
        stop_at.elapsed() < Duration::from_secs(2),
        "workers did not drain promptly after stop"
    );
    assert!(progress_at_stop < 100.0);
    assert_eq!(controller.progress(), 100.0);

    // Metrics reflect the work done up to cancellation.
    let report = controller.report();
    assert!(report.metrics.total_transactions > 0);
}

#[test]
fn test_counter_consistency_at_every_snapshot() {
    let registry = BenchmarkRegistry::with_builtin();
    let db = Arc::new(MockDatabase::new(MockBehavior::Ok(Duration::from_micros(
        200,
    ))));
    let controller = registry
        .create_controller(adhoc_run("counters", 4, 0.6), db)
        .unwrap();
    controller.start().unwrap();

    while !controller.state().is_terminal() {
        let status = controller.status();
        assert_eq!(
            status.metrics.successful_transactions + status.metrics.failed_transactions,
            status.metrics.total_transactions
        );
        std::thread::sleep(Duration::from_millis(20));
    }
    let report = controller.report();
    assert_eq!(
        report.metrics.successful_transactions + report.metrics.failed_transactions,
        report.metrics.total_transactions
    );
}

#[test]
fn test_gate_rejects_second_start_and_is_idempotent_on_stop() {
    let registry = BenchmarkRegistry::with_builtin();
    let gate = ActiveRunGate::new();

    let db = Arc::new(MockDatabase::new(MockBehavior::Ok(Duration::from_millis(1))));
    let first = registry
        .create_controller(adhoc_run("gate-a", 1, 10.0), db.clone())
        .unwrap();
    gate.launch(first.clone()).unwrap();

    let second = registry
        .create_controller(adhoc_run("gate-b", 1, 1.0), db)
        .unwrap();
    assert!(matches!(
        gate.launch(second),
        Err(BenchError::AlreadyRunning)
    ));

    gate.stop().unwrap();
    gate.stop().unwrap(); // idempotent while the controller drains
    first.wait_for_terminal(Duration::from_secs(30));
    assert!(gate.status().unwrap().state.is_terminal());
}

#[test]
fn test_warmup_resets_measurement() {
    let registry = BenchmarkRegistry::with_builtin();
    let db = Arc::new(MockDatabase::new(MockBehavior::Ok(Duration::from_micros(
        500,
    ))));
    let mut config = adhoc_run("warmup", 2, 0.5);
    config.warmup_secs = 0.3;
    let controller = registry.create_controller(config, db.clone()).unwrap();

    controller.start().unwrap();
    let state = controller.wait_for_terminal(Duration::from_secs(30));
    assert_eq!(state, RunState::Completed);

    let report = controller.report();
    // The mock saw warmup traffic too, but the report only counts the
    // measured window.
    assert!(db.call_count() > report.metrics.total_transactions);
    assert!(report.metrics.total_transactions > 0);
    assert!(report.duration_secs < 0.75);
}
