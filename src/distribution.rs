//! Transaction distribution
//!
//! Weighted selection of the next transaction class (TPC-C mix) or the
//! next adhoc query, plus the TPC-C think/keying pacing times. The RNG
//! and the realized per-class counts sit behind one mutex.

use crate::error::{BenchError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Logical transaction class; drives per-class counters and pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxClass {
    NewOrder,
    Payment,
    OrderStatus,
    Delivery,
    StockLevel,
    Oltp,
    Adhoc,
}

impl TxClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxClass::NewOrder => "new_order",
            TxClass::Payment => "payment",
            TxClass::OrderStatus => "order_status",
            TxClass::Delivery => "delivery",
            TxClass::StockLevel => "stock_level",
            TxClass::Oltp => "oltp",
            TxClass::Adhoc => "adhoc",
        }
    }

    /// Minimum think time in seconds; the sampled pause is uniform in
    /// `[min, 2*min]`.
    pub fn think_time_min_secs(&self) -> f64 {
        match self {
            TxClass::NewOrder | TxClass::Payment => 12.0,
            TxClass::OrderStatus => 10.0,
            TxClass::Delivery | TxClass::StockLevel => 5.0,
            _ => 0.0,
        }
    }

    /// Fixed pre-execution keying time in seconds.
    pub fn keying_time_secs(&self) -> f64 {
        match self {
            TxClass::NewOrder => 18.0,
            TxClass::Payment => 3.0,
            TxClass::OrderStatus | TxClass::Delivery | TxClass::StockLevel => 2.0,
            _ => 0.0,
        }
    }
}

impl fmt::Display for TxClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Samples a think time for `class`, uniform in `[min, 2*min]`.
pub fn think_time(class: TxClass, rng: &mut impl Rng) -> Duration {
    let min = class.think_time_min_secs();
    if min <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(rng.gen_range(min..=2.0 * min))
}

pub fn keying_time(class: TxClass) -> Duration {
    Duration::from_secs_f64(class.keying_time_secs())
}

struct DistInner {
    rng: StdRng,
    counts: BTreeMap<TxClass, u64>,
}

/// Weighted selector over transaction classes. Weights are percentages
/// and must sum to exactly 100.
pub struct Distribution {
    classes: Vec<(TxClass, f64)>,
    inner: Mutex<DistInner>,
}

impl Distribution {
    pub fn new(weights: &[(TxClass, f64)]) -> Result<Self> {
        if weights.is_empty() {
            return Err(BenchError::invalid_config("mix", "no transaction classes"));
        }
        for (class, w) in weights {
            if *w < 0.0 {
                return Err(BenchError::invalid_config(
                    "mix",
                    format!("negative weight for {}", class),
                ));
            }
        }
        let total: f64 = weights.iter().map(|(_, w)| w).sum();
        if total != 100.0 {
            return Err(BenchError::invalid_config(
                "mix",
                format!("weights sum to {}, expected exactly 100", total),
            ));
        }
        Ok(Self {
            classes: weights.to_vec(),
            inner: Mutex::new(DistInner {
                rng: StdRng::from_entropy(),
                counts: BTreeMap::new(),
            }),
        })
    }

    /// Draws `r` in `[0,100)` and walks the cumulative thresholds. The
    /// last class absorbs floating-point residue.
    pub fn select(&self) -> TxClass {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let r: f64 = inner.rng.gen_range(0.0..100.0);
        let mut cumulative = 0.0;
        let mut chosen = self.classes[self.classes.len() - 1].0;
        for (class, weight) in &self.classes {
            cumulative += weight;
            if r < cumulative {
                chosen = *class;
                break;
            }
        }
        *inner.counts.entry(chosen).or_insert(0) += 1;
        chosen
    }

    /// Realized selection counts so far.
    pub fn realized(&self) -> BTreeMap<TxClass, u64> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .counts
            .clone()
    }
}

/// The canonical TPC-C mix: NewOrder 45, Payment 43, OrderStatus 4,
/// Delivery 4, StockLevel 4.
pub fn tpcc_distribution(
    new_order: f64,
    payment: f64,
    order_status: f64,
    delivery: f64,
    stock_level: f64,
) -> Result<Distribution> {
    Distribution::new(&[
        (TxClass::NewOrder, new_order),
        (TxClass::Payment, payment),
        (TxClass::OrderStatus, order_status),
        (TxClass::Delivery, delivery),
        (TxClass::StockLevel, stock_level),
    ])
}

/// How the adhoc family picks the next query from its list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueryDistribution {
    #[default]
    Random,
    Weighted,
}

/// Selects the next adhoc query, uniformly or by cumulative weights.
pub struct QuerySelector {
    queries: Vec<String>,
    cumulative: Vec<f64>,
    total: f64,
    mode: QueryDistribution,
    rng: Mutex<StdRng>,
}

impl QuerySelector {
    pub fn new(
        queries: Vec<String>,
        weights: &[f64],
        mode: QueryDistribution,
    ) -> Result<Self> {
        if queries.is_empty() {
            return Err(BenchError::invalid_config("queries", "empty query list"));
        }
        let mut cumulative = Vec::new();
        let mut total = 0.0;
        if mode == QueryDistribution::Weighted {
            if weights.len() != queries.len() {
                return Err(BenchError::invalid_config(
                    "weights",
                    format!(
                        "{} weights for {} queries",
                        weights.len(),
                        queries.len()
                    ),
                ));
            }
            for w in weights {
                if *w < 0.0 {
                    return Err(BenchError::invalid_config("weights", "negative weight"));
                }
                total += w;
                cumulative.push(total);
            }
            if total <= 0.0 {
                return Err(BenchError::invalid_config("weights", "weights sum to 0"));
            }
        }
        Ok(Self {
            queries,
            cumulative,
            total,
            mode,
            rng: Mutex::new(StdRng::from_entropy()),
        })
    }

    pub fn select(&self) -> &str {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let idx = match self.mode {
            QueryDistribution::Random => rng.gen_range(0..self.queries.len()),
            QueryDistribution::Weighted => {
                let r: f64 = rng.gen_range(0.0..self.total);
                self.cumulative
                    .iter()
                    .position(|c| r < *c)
                    .unwrap_or(self.queries.len() - 1)
            }
        };
        &self.queries[idx]
    }
}
