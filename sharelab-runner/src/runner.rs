//! Simulation runner: wires a run config, its inputs and the engine.
//!
//! Two entry points:
//! - `run_simulation()`: loads the CSV inputs a config points at, then runs. Used by CLI.
//! - `run_from_inputs()`: takes pre-loaded inputs, no I/O. Used by tests.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use sharelab_core::domain::{PortfolioEntry, TradeRecord};
use sharelab_core::error::{ConfigurationError, SimulationError};
use sharelab_core::policy::create_policy;
use sharelab_core::valuation::{Valuation, ValuationPoint};
use sharelab_core::{AssetCategory, Strategy};

use crate::config::{ConfigError, RunConfig};
use crate::data_loader::{load_inputs, LoadError, LoadedInputs};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] LoadError),
    #[error("setup error: {0}")]
    Setup(#[from] ConfigurationError),
    #[error("simulation error: {0}")]
    Simulation(#[from] SimulationError),
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// Complete result of one simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResult {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    /// Hash of the run config.
    pub run_id: String,
    /// Hash of the output tables. Identical runs produce identical fingerprints.
    pub fingerprint: String,
    pub dataset_hash: String,
    pub policy: String,
    pub init_asset: Option<String>,
    pub start_date: String,
    pub end_date: String,
    pub portfolio: Vec<PortfolioEntry>,
    pub trades: Vec<TradeRecord>,
    pub valuation: Vec<ValuationPoint>,
    #[serde(default)]
    pub duration_secs: f64,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl SimulationResult {
    /// Value on the last valuated date.
    pub fn final_value(&self) -> Option<f64> {
        self.valuation.last().map(|p| p.value)
    }

    /// Number of distinct simulated dates.
    pub fn date_count(&self) -> usize {
        let mut count = 0;
        let mut last = None;
        for entry in &self.portfolio {
            if last != Some(entry.date) {
                count += 1;
                last = Some(entry.date);
            }
        }
        count
    }
}

/// Deterministic BLAKE3 hash over the portfolio and trade tables.
///
/// Floats are hashed by bit pattern, so two fingerprints match only when
/// the tables are bit-identical. Strings are length-prefixed.
pub fn fingerprint_tables(portfolio: &[PortfolioEntry], trades: &[TradeRecord]) -> String {
    fn update_str(hasher: &mut blake3::Hasher, value: &str) {
        hasher.update(&(value.len() as u64).to_le_bytes());
        hasher.update(value.as_bytes());
    }

    let mut hasher = blake3::Hasher::new();

    hasher.update(b"portfolio");
    hasher.update(&(portfolio.len() as u64).to_le_bytes());
    for entry in portfolio {
        hasher.update(&entry.date.and_utc().timestamp().to_le_bytes());
        update_str(&mut hasher, &entry.asset);
        hasher.update(&entry.share.to_le_bytes());
    }

    hasher.update(b"trades");
    hasher.update(&(trades.len() as u64).to_le_bytes());
    for record in trades {
        hasher.update(&record.date.and_utc().timestamp().to_le_bytes());
        hasher.update(&(record.order as u64).to_le_bytes());
        hasher.update(&record.share.to_le_bytes());
        update_str(&mut hasher, &record.from);
        update_str(&mut hasher, &record.to);
        hasher.update(&record.fee.unwrap_or(f64::NAN).to_le_bytes());
        update_str(&mut hasher, &record.metadata);
    }

    hasher.finalize().to_hex().to_string()
}

/// Build a strategy from a config and loaded inputs, ready to simulate.
pub fn build_strategy(config: &RunConfig, inputs: &LoadedInputs) -> Result<Strategy, RunError> {
    let policy = create_policy(&config.policy.name)?;
    let mut strategy = Strategy::new(config.strategy.clone())?.with_policy(policy);

    strategy.add_assets(RunConfig::windows(&config.assets.reserve)?, AssetCategory::Reserve)?;
    strategy.add_assets(RunConfig::windows(&config.assets.common)?, AssetCategory::Common)?;
    strategy.set_prices(inputs.prices.iter().cloned());

    match &inputs.proportions {
        Some(rows) => strategy.set_rebalance_proportions(rows.iter().cloned()),
        None => strategy.set_equal_rebalance_proportions(),
    }

    for table in &inputs.signals {
        let name = strategy.add_signals(table.family, table.rows.iter().cloned(), table.name.as_deref())?;
        info!(family = %table.family, name = %name, rows = table.rows.len(), "signals added");
    }

    if let Some(rebalance) = &config.rebalance {
        strategy.add_periodic_rebalance(&rebalance.cron, rebalance.skip_on_init)?;
    }
    Ok(strategy)
}

/// Run a simulation from a config (loads inputs from disk).
pub fn run_simulation(config: &RunConfig) -> Result<SimulationResult, RunError> {
    let inputs = load_inputs(config)?;
    run_from_inputs(config, &inputs)
}

/// Run a simulation with pre-loaded inputs, no I/O.
pub fn run_from_inputs(config: &RunConfig, inputs: &LoadedInputs) -> Result<SimulationResult, RunError> {
    let started = Instant::now();
    let mut strategy = build_strategy(config, inputs)?;
    strategy.run()?;

    let mut valuation = Valuation::new(config.valuation.clone());
    valuation.set_fees(inputs.fees.iter().cloned());
    let series = valuation.build(strategy.portfolio(), strategy.trade_log(), strategy.prices());

    let portfolio = strategy.portfolio_table();
    let trades = strategy.trade_log().to_vec();
    let fingerprint = fingerprint_tables(&portfolio, &trades);

    let ledger = strategy.portfolio();
    let start_date = ledger.first_date().map(|d| d.to_string()).unwrap_or_default();
    let end_date = ledger.last_date().map(|d| d.to_string()).unwrap_or_default();

    let short = &fingerprint[..16];
    info!(
        policy = strategy.policy_name(),
        dates = ledger.len(),
        trades = trades.len(),
        fingerprint = short,
        "simulation finished"
    );

    Ok(SimulationResult {
        schema_version: SCHEMA_VERSION,
        run_id: config.run_id()?,
        fingerprint,
        dataset_hash: inputs.dataset_hash.clone(),
        policy: strategy.policy_name().to_string(),
        init_asset: strategy.init_asset().map(str::to_string),
        start_date,
        end_date,
        portfolio,
        trades,
        valuation: series,
        duration_secs: started.elapsed().as_secs_f64(),
    })
}
