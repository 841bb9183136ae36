//! Strategy configuration.

use crate::domain::time::{deserialize_opt_timestamp, deserialize_timestamp};
use crate::domain::Granularity;
use crate::error::ConfigurationError;
use crate::prices::GapFill;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Tolerance for share sums and dust positions.
pub const DEFAULT_ACCURACY: f64 = 3e-6;

fn default_true() -> bool {
    true
}

fn default_accuracy() -> f64 {
    DEFAULT_ACCURACY
}

/// Parameters of a [`Strategy`](crate::strategy::Strategy).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// When the portfolio is initiated.
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub start: NaiveDateTime,
    #[serde(default, deserialize_with = "deserialize_opt_timestamp")]
    pub end: Option<NaiveDateTime>,
    #[serde(default)]
    pub granularity: Granularity,
    /// Default gap between a signal and the trade it causes, in seconds.
    #[serde(default)]
    pub decision_delay: i64,
    /// Asset held before the strategy starts. Defaults to the first reserve asset.
    #[serde(default)]
    pub init_asset: Option<String>,
    /// Fire a buy signal when a common asset becomes authorized.
    #[serde(default)]
    pub add_asset_once_authorized: bool,
    /// Fire a sell signal when a common asset loses authorization.
    #[serde(default = "default_true")]
    pub sell_assets_once_unauthorized: bool,
    #[serde(default = "default_accuracy")]
    pub accuracy: f64,
    #[serde(default)]
    pub gap_fill: GapFill,
}

impl StrategyConfig {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            start,
            end: None,
            granularity: Granularity::default(),
            decision_delay: 0,
            init_asset: None,
            add_asset_once_authorized: false,
            sell_assets_once_unauthorized: true,
            accuracy: DEFAULT_ACCURACY,
            gap_fill: GapFill::Disabled,
        }
    }

    pub fn with_end(mut self, end: NaiveDateTime) -> Self {
        self.end = Some(end);
        self
    }

    pub fn with_granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }

    pub fn with_decision_delay(mut self, seconds: i64) -> Self {
        self.decision_delay = seconds;
        self
    }

    pub fn with_init_asset(mut self, asset: impl Into<String>) -> Self {
        self.init_asset = Some(asset.into());
        self
    }

    pub fn with_gap_fill(mut self, gap_fill: GapFill) -> Self {
        self.gap_fill = gap_fill;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !self.accuracy.is_finite() || self.accuracy <= 0.0 {
            return Err(ConfigurationError::InvalidAccuracy(self.accuracy));
        }
        let step = self.granularity.as_duration();
        if self.start.checked_sub_signed(step).is_none() || self.start.checked_add_signed(step).is_none() {
            return Err(ConfigurationError::InvalidGranularity(self.granularity.to_string()));
        }
        if let Some(end) = self.end {
            if end < self.start {
                return Err(ConfigurationError::InvertedWindow {
                    asset: "strategy".into(),
                    start: self.start,
                    end,
                });
            }
        }
        Ok(())
    }
}
