//! Trade policies: turn the signals of a date into trades.
//!
//! The orchestrator calls the policy once per date on which at least one
//! signal is effective. Policies only propose trades; validation and
//! execution stay with the orchestrator.

pub mod reserve_swap;

pub use reserve_swap::SingleReserveSwap;

use crate::assets::AssetRegistry;
use crate::domain::{Holdings, Trade};
use crate::error::ConfigurationError;
use crate::prices::PriceTable;
use crate::proportions::RebalanceProportions;
use crate::signals::Signal;
use chrono::NaiveDateTime;

/// Signals effective on one date, split by family.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalSet {
    pub buy: Vec<Signal>,
    pub sell: Vec<Signal>,
    pub rebalance: Vec<Signal>,
}

impl SignalSet {
    pub fn len(&self) -> usize {
        self.buy.len() + self.sell.len() + self.rebalance.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything a policy may look at for one date.
#[derive(Debug, Clone, Copy)]
pub struct TradeContext<'a> {
    pub date: NaiveDateTime,
    pub prev_date: NaiveDateTime,
    pub signals: &'a SignalSet,
    /// Composition on `date` after price drift, before any trade.
    pub holdings: &'a Holdings,
    pub assets: &'a AssetRegistry,
    pub proportions: &'a RebalanceProportions,
    pub prices: &'a PriceTable,
}

/// Trait for trade-generation policies.
pub trait TradeBuilder: Send + Sync {
    /// Human-readable name (e.g., "single_reserve_swap").
    fn name(&self) -> &str;

    /// Trades to execute on `ctx.date`, in order.
    fn build_trades(&self, ctx: &TradeContext<'_>) -> Vec<Trade>;
}

/// Policy that never trades.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTrades;

impl TradeBuilder for NoTrades {
    fn name(&self) -> &str {
        "no_trades"
    }

    fn build_trades(&self, _ctx: &TradeContext<'_>) -> Vec<Trade> {
        Vec::new()
    }
}

/// Build a policy from its configured name.
pub fn create_policy(name: &str) -> Result<Box<dyn TradeBuilder>, ConfigurationError> {
    match name.trim().to_ascii_lowercase().as_str() {
        "no_trades" | "none" => Ok(Box::new(NoTrades)),
        "single_reserve_swap" | "reserve_swap" => Ok(Box::new(SingleReserveSwap)),
        other => Err(ConfigurationError::UnknownPolicy(other.to_string())),
    }
}
