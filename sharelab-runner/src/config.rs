//! TOML run configuration.
//!
//! A run file describes one simulation end to end: strategy parameters,
//! asset authorization windows, CSV inputs, signal tables, the periodic
//! rebalance schedule, the trade policy, valuation and output settings.
//!
//! ```toml
//! [strategy]
//! start = "2021-01-01"
//! end = "2021-06-30"
//! granularity = "1D"
//! init_asset = "dai"
//!
//! [assets.reserve]
//! dai = ["2021-01-01", "2021-12-31"]
//!
//! [assets.common]
//! eth = ["2021-01-01", "2021-12-31"]
//!
//! [inputs]
//! prices = "prices.csv"
//!
//! [[signals]]
//! family = "buy"
//! path = "buy.csv"
//! ```
//!
//! Relative input and output paths resolve against the directory of the
//! config file.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sharelab_core::config::StrategyConfig;
use sharelab_core::domain::parse_timestamp;
use sharelab_core::error::ConfigurationError;
use sharelab_core::policy::create_policy;
use sharelab_core::schedule::CronSchedule;
use sharelab_core::signals::SignalFamily;
use sharelab_core::valuation::ValuationConfig;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Unique identifier for a run configuration (content-addressable hash).
pub type RunId = String;

/// Errors from loading or validating a run configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Strategy(#[from] ConfigurationError),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// One `[[signals]]` entry: a CSV table of signal rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSource {
    pub family: SignalFamily,
    /// Signal set name. Defaults to the store's next `signals_N`.
    #[serde(default)]
    pub name: Option<String>,
    pub path: PathBuf,
}

/// Authorization windows per category, `asset = [start, end, start, end, …]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetsSection {
    #[serde(default)]
    pub reserve: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub common: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputsSection {
    #[serde(default)]
    pub prices: Option<PathBuf>,
    /// Rebalance proportions. Equal weights when absent.
    #[serde(default)]
    pub proportions: Option<PathBuf>,
    /// Fee table for valuation.
    #[serde(default)]
    pub fees: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebalanceSection {
    pub cron: String,
    #[serde(default)]
    pub skip_on_init: bool,
}

fn default_policy() -> String {
    "single_reserve_swap".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySection {
    #[serde(default = "default_policy")]
    pub name: String,
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            name: default_policy(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSection {
    #[serde(default = "default_output_dir")]
    pub directory: PathBuf,
    /// Also write Parquet copies of the portfolio and trade tables.
    #[serde(default = "default_true")]
    pub parquet: bool,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            parquet: true,
        }
    }
}

/// Everything needed to reproduce one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub assets: AssetsSection,
    #[serde(default)]
    pub inputs: InputsSection,
    #[serde(default)]
    pub signals: Vec<SignalSource>,
    #[serde(default)]
    pub rebalance: Option<RebalanceSection>,
    #[serde(default)]
    pub policy: PolicySection,
    #[serde(default)]
    pub valuation: ValuationConfig,
    #[serde(default)]
    pub output: OutputSection,

    /// Directory relative paths resolve against. Not part of the run identity.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl RunConfig {
    /// Parse and validate a run config from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: RunConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a run config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&content)?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    /// Deterministic hash of the run's parameters.
    pub fn run_id(&self) -> Result<RunId, ConfigError> {
        let json = serde_json::to_string(self)
            .map_err(|e| ConfigError::Invalid(format!("config serialization failed: {e}")))?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }

    /// Resolve a configured path against the config file's directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Authorization windows as parsed timestamps.
    pub fn windows(
        table: &BTreeMap<String, Vec<String>>,
    ) -> Result<Vec<(String, Vec<NaiveDateTime>)>, ConfigError> {
        table
            .iter()
            .map(|(asset, dates)| -> Result<_, ConfigError> {
                let parsed = dates
                    .iter()
                    .map(|d| parse_timestamp(d))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((asset.clone(), parsed))
            })
            .collect()
    }

    /// Checks that don't need the input files.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.strategy.validate()?;

        if self.assets.reserve.is_empty() && self.assets.common.is_empty() {
            return Err(ConfigurationError::NoAssets.into());
        }
        if let Some(asset) = self
            .assets
            .reserve
            .keys()
            .find(|a| self.assets.common.contains_key(*a))
        {
            return Err(ConfigurationError::AssetInBothCategories {
                asset: asset.clone(),
            }
            .into());
        }
        Self::windows(&self.assets.reserve)?;
        Self::windows(&self.assets.common)?;

        if let Some(rebalance) = &self.rebalance {
            CronSchedule::parse(&rebalance.cron)?;
        }
        create_policy(&self.policy.name)?;

        let investment = self.valuation.initial_investment;
        if !investment.is_finite() || investment <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "valuation.initial_investment must be positive, got {investment}"
            )));
        }

        let mut names = std::collections::BTreeSet::new();
        for source in &self.signals {
            if let Some(name) = &source.name {
                if !names.insert((source.family, name.as_str())) {
                    return Err(ConfigError::Invalid(format!(
                        "duplicate {} signal set name '{name}'",
                        source.family
                    )));
                }
            }
        }
        Ok(())
    }
}
