//! Benchmark registry and active-run gate
//!
//! The registry maps a workload family to its factory; the gate holds
//! the process-wide at-most-one active controller. Both are plain
//! objects created at program start and passed explicitly.

use crate::adhoc::AdhocBenchmark;
use crate::config::{Family, FamilyConfig, RunConfig};
use crate::controller::{Benchmark, Controller, StatusSnapshot};
use crate::db::Database;
use crate::error::{BenchError, Result};
use crate::oltp::OltpBenchmark;
use crate::tpcc::TpccBenchmark;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

type Factory =
    Box<dyn Fn(&RunConfig, Arc<dyn Database>) -> Result<Box<dyn Benchmark>> + Send + Sync>;

pub struct BenchmarkRegistry {
    factories: HashMap<Family, Factory>,
}

impl BenchmarkRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with the three built-in families.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Family::Adhoc, |config, db| match &config.family {
            FamilyConfig::Adhoc(cfg) => {
                Ok(Box::new(AdhocBenchmark::new(db, cfg.clone())) as Box<dyn Benchmark>)
            }
            _ => Err(BenchError::invalid_config("family", "expected adhoc config")),
        });
        registry.register(Family::Oltp, |config, db| match &config.family {
            FamilyConfig::Oltp(cfg) => {
                Ok(Box::new(OltpBenchmark::new(db, cfg.clone())) as Box<dyn Benchmark>)
            }
            _ => Err(BenchError::invalid_config("family", "expected oltp config")),
        });
        registry.register(Family::Tpcc, |config, db| match &config.family {
            FamilyConfig::Tpcc(cfg) => {
                Ok(Box::new(TpccBenchmark::new(db, cfg.clone())) as Box<dyn Benchmark>)
            }
            _ => Err(BenchError::invalid_config("family", "expected tpcc config")),
        });
        registry
    }

    pub fn register(
        &mut self,
        family: Family,
        factory: impl Fn(&RunConfig, Arc<dyn Database>) -> Result<Box<dyn Benchmark>>
            + Send
            + Sync
            + 'static,
    ) {
        self.factories.insert(family, Box::new(factory));
    }

    /// Validates the config and wires a controller for its family.
    pub fn create_controller(
        &self,
        config: RunConfig,
        db: Arc<dyn Database>,
    ) -> Result<Arc<Controller>> {
        config.validate()?;
        let factory = self.factories.get(&config.family()).ok_or_else(|| {
            BenchError::invalid_config("family", format!("unknown family {}", config.family()))
        })?;
        let benchmark = factory(&config, db)?;
        Controller::new(config, benchmark)
    }
}

impl Default for BenchmarkRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

/// Process-wide at-most-one-active-run gate. The held controller is
/// replaced only once it has reached a terminal state.
pub struct ActiveRunGate {
    current: RwLock<Option<Arc<Controller>>>,
}

impl ActiveRunGate {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(None),
        }
    }

    /// Starts `controller` under the gate. Fails with `AlreadyRunning`
    /// while a previous run is still live.
    pub fn launch(&self, controller: Arc<Controller>) -> Result<Uuid> {
        let mut current = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(active) = current.as_ref() {
            if !active.state().is_terminal() {
                return Err(BenchError::AlreadyRunning);
            }
        }
        controller.start()?;
        let run_id = controller.run_id();
        *current = Some(controller);
        Ok(run_id)
    }

    pub fn status(&self) -> Result<StatusSnapshot> {
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        match current.as_ref() {
            Some(controller) => Ok(controller.status()),
            None => Err(BenchError::NoActiveBenchmark),
        }
    }

    pub fn stop(&self) -> Result<()> {
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        match current.as_ref() {
            Some(controller) => {
                controller.stop();
                Ok(())
            }
            None => Err(BenchError::NoActiveBenchmark),
        }
    }

    pub fn current(&self) -> Option<Arc<Controller>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for ActiveRunGate {
    fn default() -> Self {
        Self::new()
    }
}
