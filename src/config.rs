//! Run configuration
//!
//! Immutable once a run starts. Validation happens before any side
//! effect; a validation failure never transitions run state.

use crate::distribution::QueryDistribution;
use crate::error::{BenchError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Workload family tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    Adhoc,
    Oltp,
    Tpcc,
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Family::Adhoc => "adhoc",
            Family::Oltp => "oltp",
            Family::Tpcc => "tpcc",
        })
    }
}

fn default_report_interval() -> f64 {
    10.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub name: String,

    /// Worker count; TPC-C uses `terminals` instead.
    pub threads: usize,

    /// Measured run duration in seconds.
    pub duration_secs: f64,

    /// Spacing of interval samples in the report.
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: f64,

    /// Unmeasured lead-in; stats reset when it ends.
    #[serde(default)]
    pub warmup_secs: f64,

    #[serde(flatten)]
    pub family: FamilyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum FamilyConfig {
    Adhoc(AdhocConfig),
    Oltp(OltpConfig),
    Tpcc(TpccConfig),
}

impl RunConfig {
    pub fn new(name: &str, threads: usize, duration_secs: f64, family: FamilyConfig) -> Self {
        Self {
            name: name.to_string(),
            threads,
            duration_secs,
            report_interval_secs: default_report_interval(),
            warmup_secs: 0.0,
            family,
        }
    }

    pub fn family(&self) -> Family {
        match self.family {
            FamilyConfig::Adhoc(_) => Family::Adhoc,
            FamilyConfig::Oltp(_) => Family::Oltp,
            FamilyConfig::Tpcc(_) => Family::Tpcc,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_secs)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs_f64(self.report_interval_secs)
    }

    pub fn warmup(&self) -> Duration {
        Duration::from_secs_f64(self.warmup_secs)
    }

    /// Effective worker count: TPC-C drives one worker per terminal.
    pub fn worker_count(&self) -> usize {
        match &self.family {
            FamilyConfig::Tpcc(cfg) => cfg.terminals,
            _ => self.threads,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(BenchError::invalid_config("name", "must not be empty"));
        }
        if self.threads == 0 {
            return Err(BenchError::invalid_config("threads", "must be > 0"));
        }
        if self.duration_secs <= 0.0 {
            return Err(BenchError::invalid_config("duration", "must be > 0"));
        }
        if self.report_interval_secs <= 0.0 {
            return Err(BenchError::invalid_config("report_interval", "must be > 0"));
        }
        if self.warmup_secs < 0.0 {
            return Err(BenchError::invalid_config("warmup_duration", "must be >= 0"));
        }
        match &self.family {
            FamilyConfig::Adhoc(cfg) => cfg.validate(),
            FamilyConfig::Oltp(cfg) => cfg.validate(),
            FamilyConfig::Tpcc(cfg) => cfg.validate(),
        }
    }
}

/// Adhoc family: a query template in a tight loop, or a query list with
/// a selection distribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdhocConfig {
    /// Single-query mode template; fail-fast semantics apply.
    #[serde(default)]
    pub query_template: String,

    /// Multi-query mode; overrides `query_template` when non-empty.
    #[serde(default)]
    pub queries: Vec<String>,

    /// Weights for `queries`; required by the weighted distribution.
    #[serde(default)]
    pub weights: Vec<f64>,

    #[serde(default)]
    pub query_distribution: QueryDistribution,
}

impl AdhocConfig {
    pub fn single(query: &str) -> Self {
        Self {
            query_template: query.to_string(),
            queries: Vec::new(),
            weights: Vec::new(),
            query_distribution: QueryDistribution::Random,
        }
    }

    pub fn is_single_query(&self) -> bool {
        self.queries.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        if self.queries.is_empty() {
            if self.query_template.trim().is_empty() {
                return Err(BenchError::invalid_config(
                    "query_template",
                    "must not be empty",
                ));
            }
            return Ok(());
        }
        if self.queries.iter().any(|q| q.trim().is_empty()) {
            return Err(BenchError::invalid_config("queries", "empty query"));
        }
        if self.query_distribution == QueryDistribution::Weighted {
            if self.weights.len() != self.queries.len() {
                return Err(BenchError::invalid_config(
                    "weights",
                    "must match queries length",
                ));
            }
            if self.weights.iter().any(|w| *w < 0.0) {
                return Err(BenchError::invalid_config("weights", "must be >= 0"));
            }
            if self.weights.iter().sum::<f64>() <= 0.0 {
                return Err(BenchError::invalid_config("weights", "must sum to > 0"));
            }
        }
        Ok(())
    }
}

/// sysbench-style OLTP test types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OltpTestType {
    PointSelect,
    ReadOnly,
    WriteOnly,
    ReadWrite,
    IndexUpdate,
    NonIndexUpdate,
    DeleteInsert,
}

impl fmt::Display for OltpTestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OltpTestType::PointSelect => "point_select",
            OltpTestType::ReadOnly => "read_only",
            OltpTestType::WriteOnly => "write_only",
            OltpTestType::ReadWrite => "read_write",
            OltpTestType::IndexUpdate => "index_update",
            OltpTestType::NonIndexUpdate => "non_index_update",
            OltpTestType::DeleteInsert => "delete_insert",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OltpConfig {
    pub test_type: OltpTestType,

    /// Rows per sbtest table.
    pub table_size: i64,
    pub num_tables: i64,

    // Per-operation counts inside one transaction.
    #[serde(default = "OltpConfig::default_point_selects")]
    pub point_selects: u32,
    #[serde(default = "OltpConfig::default_range_count")]
    pub simple_ranges: u32,
    #[serde(default = "OltpConfig::default_range_count")]
    pub sum_ranges: u32,
    #[serde(default = "OltpConfig::default_range_count")]
    pub order_ranges: u32,
    #[serde(default = "OltpConfig::default_range_count")]
    pub distinct_ranges: u32,
    #[serde(default = "OltpConfig::default_update_count")]
    pub index_updates: u32,
    #[serde(default = "OltpConfig::default_update_count")]
    pub non_index_updates: u32,
    #[serde(default = "OltpConfig::default_update_count")]
    pub inserts: u32,
    #[serde(default = "OltpConfig::default_update_count")]
    pub deletes: u32,

    #[serde(default = "OltpConfig::default_range_size")]
    pub range_size: i64,

    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub write_only: bool,

    /// Run statements without BEGIN/COMMIT.
    #[serde(default)]
    pub skip_trx: bool,

    #[serde(default)]
    pub auto_inc: bool,

    #[serde(default)]
    pub use_secondary_index: bool,

    /// Target transactions/second across all workers; 0 = unbounded.
    #[serde(default)]
    pub trx_rate: f64,

    #[serde(default)]
    pub read_weight: f64,
    #[serde(default)]
    pub write_weight: f64,
}

impl OltpConfig {
    fn default_point_selects() -> u32 {
        10
    }
    fn default_range_count() -> u32 {
        1
    }
    fn default_update_count() -> u32 {
        1
    }
    fn default_range_size() -> i64 {
        100
    }

    pub fn new(test_type: OltpTestType, table_size: i64, num_tables: i64) -> Self {
        Self {
            test_type,
            table_size,
            num_tables,
            point_selects: Self::default_point_selects(),
            simple_ranges: Self::default_range_count(),
            sum_ranges: Self::default_range_count(),
            order_ranges: Self::default_range_count(),
            distinct_ranges: Self::default_range_count(),
            index_updates: Self::default_update_count(),
            non_index_updates: Self::default_update_count(),
            inserts: Self::default_update_count(),
            deletes: Self::default_update_count(),
            range_size: Self::default_range_size(),
            read_only: false,
            write_only: false,
            skip_trx: false,
            auto_inc: false,
            use_secondary_index: false,
            trx_rate: 0.0,
            read_weight: 0.0,
            write_weight: 0.0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.table_size <= 0 {
            return Err(BenchError::invalid_config("table_size", "must be > 0"));
        }
        if self.num_tables <= 0 {
            return Err(BenchError::invalid_config("num_tables", "must be > 0"));
        }
        if self.range_size <= 0 {
            return Err(BenchError::invalid_config("range_size", "must be > 0"));
        }
        if self.trx_rate < 0.0 {
            return Err(BenchError::invalid_config("trx_rate", "must be >= 0"));
        }
        if self.read_weight > 0.0 && self.write_weight > 0.0 {
            let sum = self.read_weight + self.write_weight;
            if (sum - 1.0).abs() > 1e-9 {
                return Err(BenchError::invalid_config(
                    "read_weight",
                    format!("read_weight + write_weight = {}, expected 1.0", sum),
                ));
            }
        }
        if self.read_only && self.write_only {
            return Err(BenchError::invalid_config(
                "read_only",
                "read_only and write_only are mutually exclusive",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TpccConfig {
    /// Scale factor.
    pub warehouses: i64,

    /// Virtual terminals; one worker per terminal.
    pub terminals: usize,

    // Transaction mix percentages; must sum to exactly 100.
    #[serde(default = "TpccConfig::default_new_order_pct")]
    pub new_order_pct: f64,
    #[serde(default = "TpccConfig::default_payment_pct")]
    pub payment_pct: f64,
    #[serde(default = "TpccConfig::default_minor_pct")]
    pub order_status_pct: f64,
    #[serde(default = "TpccConfig::default_minor_pct")]
    pub delivery_pct: f64,
    #[serde(default = "TpccConfig::default_minor_pct")]
    pub stock_level_pct: f64,

    #[serde(default = "TpccConfig::default_items_min")]
    pub new_order_items_min: i64,
    #[serde(default = "TpccConfig::default_items_max")]
    pub new_order_items_max: i64,

    /// Apply TPC-C keying/think pacing before each transaction. Off by
    /// default: the engine then saturates instead of simulating
    /// terminals.
    #[serde(default)]
    pub keying_and_think: bool,

    /// Seed orders/order-lines/new_order during load; the last 900 of
    /// 3000 customers per district populate `new_order`.
    #[serde(default)]
    pub load_orders: bool,

    /// Create the schema and load the dataset before running. Off means
    /// the tables are expected to exist.
    #[serde(default = "TpccConfig::default_true")]
    pub load_data: bool,
}

impl TpccConfig {
    fn default_new_order_pct() -> f64 {
        45.0
    }
    fn default_payment_pct() -> f64 {
        43.0
    }
    fn default_minor_pct() -> f64 {
        4.0
    }
    fn default_items_min() -> i64 {
        5
    }
    fn default_items_max() -> i64 {
        15
    }
    fn default_true() -> bool {
        true
    }

    pub fn validate(&self) -> Result<()> {
        if self.warehouses < 1 {
            return Err(BenchError::invalid_config("warehouses", "must be >= 1"));
        }
        if self.terminals < 1 {
            return Err(BenchError::invalid_config("terminals", "must be >= 1"));
        }
        let mix = self.new_order_pct
            + self.payment_pct
            + self.order_status_pct
            + self.delivery_pct
            + self.stock_level_pct;
        if mix != 100.0 {
            return Err(BenchError::invalid_config(
                "mix",
                format!("percentages sum to {}, expected exactly 100", mix),
            ));
        }
        if self.new_order_items_min < 1 {
            return Err(BenchError::invalid_config(
                "new_order_items_min",
                "must be >= 1",
            ));
        }
        if self.new_order_items_min > self.new_order_items_max {
            return Err(BenchError::invalid_config(
                "new_order_items_min",
                "must be <= new_order_items_max",
            ));
        }
        Ok(())
    }
}

impl Default for TpccConfig {
    fn default() -> Self {
        Self {
            warehouses: 1,
            terminals: 1,
            new_order_pct: Self::default_new_order_pct(),
            payment_pct: Self::default_payment_pct(),
            order_status_pct: Self::default_minor_pct(),
            delivery_pct: Self::default_minor_pct(),
            stock_level_pct: Self::default_minor_pct(),
            new_order_items_min: Self::default_items_min(),
            new_order_items_max: Self::default_items_max(),
            keying_and_think: false,
            load_orders: false,
            load_data: true,
        }
    }
}
