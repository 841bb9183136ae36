//! Trades: moves of portfolio weight from one asset to another.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A trade produced by a policy, not yet executed.
///
/// `share` is a fraction of the whole portfolio (not of the source position).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub share: f64,
    pub from: String,
    pub to: String,
    pub fee: Option<f64>,
    pub metadata: String,
}

impl Trade {
    pub fn new(share: f64, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            share,
            from: from.into(),
            to: to.into(),
            fee: None,
            metadata: String::new(),
        }
    }

    pub fn with_fee(mut self, fee: f64) -> Self {
        self.fee = Some(fee);
        self
    }

    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = metadata.into();
        self
    }
}

/// An executed trade as stored in the trade log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    // ── Placement ──
    pub date: NaiveDateTime,
    /// Position of the trade within its date's batch, starting at 0.
    pub order: usize,

    // ── Movement ──
    pub share: f64,
    pub from: String,
    pub to: String,

    // ── Annotations ──
    pub fee: Option<f64>,
    pub metadata: String,
}

impl TradeRecord {
    pub fn from_trade(date: NaiveDateTime, order: usize, trade: Trade) -> Self {
        Self {
            date,
            order,
            share: trade.share,
            from: trade.from,
            to: trade.to,
            fee: trade.fee,
            metadata: trade.metadata,
        }
    }
}
