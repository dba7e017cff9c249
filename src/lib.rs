//! Stampede - Database Load-Generation and Measurement Engine
//!
//! Drives a population of concurrent virtual clients against a relational
//! database for a bounded duration, measuring throughput, latency
//! distribution, and error rate. Three workload families are built in:
//!
//! - **Adhoc**: a query template executed in a tight loop by N workers
//! - **OLTP**: sysbench-style micro-workloads against `sbtestN` tables
//! - **TPC-C**: the five-transaction OLTP benchmark with schema and loader
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stampede::config::{FamilyConfig, RunConfig, TpccConfig};
//! use stampede::db::sqlite::SqliteDatabase;
//! use stampede::registry::BenchmarkRegistry;
//!
//! let registry = BenchmarkRegistry::with_builtin();
//! let db = Arc::new(SqliteDatabase::in_memory("demo"));
//! let config = RunConfig::new("demo", 4, 30.0, FamilyConfig::Tpcc(TpccConfig::default()));
//! let controller = registry.create_controller(config, db).unwrap();
//! controller.start().unwrap();
//! let report = controller.wait_for_report();
//! println!("{}", serde_json::to_string_pretty(&report).unwrap());
//! ```

pub mod adhoc;
pub mod config;
pub mod context;
pub mod controller;
pub mod datagen;
pub mod db;
pub mod distribution;
pub mod error;
pub mod executor;
pub mod logging;
pub mod oltp;
pub mod registry;
pub mod report;
pub mod rest;
pub mod sampler;
pub mod stats;
pub mod tpcc;
pub mod value;
pub mod worker;

// Re-export core types
pub use config::{Family, RunConfig};
pub use controller::{Controller, RunState};
pub use error::{BenchError, Result};
pub use logging::{init_from_env, init_logging, LogConfig};
pub use registry::{ActiveRunGate, BenchmarkRegistry};
pub use report::Report;
