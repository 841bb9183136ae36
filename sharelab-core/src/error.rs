//! Error taxonomy for the simulation engine.
//!
//! - `ConfigurationError`: setup problems, returned immediately and fatal.
//! - `SimulationError`: a `simulate` call that cannot start (bad range, gap).
//! - `TradeError`: a single trade that cannot be applied. Logged by the
//!   orchestrator, never propagated out of the date loop.
//!
//! Data-quality issues are not errors: they go to `tracing::warn!`.

use chrono::NaiveDateTime;
use thiserror::Error;

/// Fatal configuration problems detected while setting up a strategy.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("{asset} can't be used both as reserve and common asset")]
    AssetInBothCategories { asset: String },

    #[error("unsupported date sequence for {asset}: odd amount of dates ({count})")]
    OddDateSequence { asset: String, count: usize },

    #[error("provided date {date} for {asset} is earlier than the simulation start {start}")]
    DateBeforeStart {
        asset: String,
        date: NaiveDateTime,
        start: NaiveDateTime,
    },

    #[error("authorization window for {asset} ends ({end}) before it starts ({start})")]
    InvertedWindow {
        asset: String,
        start: NaiveDateTime,
        end: NaiveDateTime,
    },

    #[error("add at least one asset to the portfolio")]
    NoAssets,

    #[error("either init_asset or a reserve asset must be set up")]
    NoInitialAsset,

    #[error("unknown signal family '{0}' (expected buy, sell or rebalance)")]
    UnknownSignalFamily(String),

    #[error("unknown asset scope '{0}' (expected common, reserve or all)")]
    UnknownAssetScope(String),

    #[error("{family} signal rows require an asset (row dated {date})")]
    MissingSignalAsset { family: String, date: NaiveDateTime },

    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),

    #[error("decision delay of {delay}s moves the signal dated {date} out of the supported time range")]
    DelayOutOfRange { date: NaiveDateTime, delay: i64 },

    #[error("invalid granularity '{0}'")]
    InvalidGranularity(String),

    #[error("invalid cron expression '{expr}': {reason}")]
    InvalidCron { expr: String, reason: String },

    #[error("accuracy must be finite and positive, got {0}")]
    InvalidAccuracy(f64),

    #[error("unknown trade policy '{0}'")]
    UnknownPolicy(String),
}

/// Errors that prevent a `simulate` call from running.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("simulation range {start}..={end} is empty")]
    EmptyRange {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },

    #[error("simulation can't start at {requested}: strategy starts at {strategy_start}")]
    StartsBeforeStrategy {
        requested: NaiveDateTime,
        strategy_start: NaiveDateTime,
    },

    #[error("no portfolio for {previous}, the step before {requested}; rebuild from an earlier date")]
    MissingPreviousStep {
        requested: NaiveDateTime,
        previous: NaiveDateTime,
    },
}

/// A trade that can't be applied to the current holdings.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TradeError {
    #[error("trade share must be finite and non-negative, got {share}")]
    InvalidShare { share: f64 },

    #[error("{asset} is not held")]
    SourceNotHeld { asset: String },

    #[error("insufficient {asset}: requested {requested}, available {available}")]
    InsufficientShare {
        asset: String,
        requested: f64,
        available: f64,
    },

    #[error("shares sum to {sum} after trades")]
    UnbalancedResult { sum: f64 },
}
