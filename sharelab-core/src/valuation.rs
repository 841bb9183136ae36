//! Valuation: money value of a share-based portfolio over time.
//!
//! Shares only describe the composition. Given an initial investment, the
//! portfolio's per-date price change and a flat fee per trade, this turns the
//! portfolio table into a value series.

use crate::domain::{PortfolioLedger, TradeRecord};
use crate::prices::PriceTable;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{error, warn};

pub const DEFAULT_INITIAL_INVESTMENT: f64 = 1_000_000.0;

fn default_initial_investment() -> f64 {
    DEFAULT_INITIAL_INVESTMENT
}

fn default_trades_limit() -> u32 {
    1
}

fn default_accuracy() -> f64 {
    crate::config::DEFAULT_ACCURACY
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationConfig {
    #[serde(default = "default_initial_investment")]
    pub initial_investment: f64,
    /// Fee multiplier per logged trade (one logged trade may be several transfers).
    #[serde(default = "default_trades_limit")]
    pub trades_limit: u32,
    #[serde(default = "default_accuracy")]
    pub accuracy: f64,
}

impl Default for ValuationConfig {
    fn default() -> Self {
        Self {
            initial_investment: DEFAULT_INITIAL_INVESTMENT,
            trades_limit: 1,
            accuracy: crate::config::DEFAULT_ACCURACY,
        }
    }
}

/// Flat fee per trade on a date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeRow {
    pub date: NaiveDateTime,
    pub value: f64,
}

/// One row of the value series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationPoint {
    pub date: NaiveDateTime,
    pub price_change: f64,
    pub value: f64,
    /// Charged trades on the date (`logged trades × trades_limit`).
    pub trades: u64,
}

#[derive(Debug, Clone, Default)]
pub struct Valuation {
    config: ValuationConfig,
    fees: BTreeMap<NaiveDateTime, f64>,
}

impl Valuation {
    pub fn new(config: ValuationConfig) -> Self {
        Self {
            config,
            fees: BTreeMap::new(),
        }
    }

    /// Merge fee rows, later rows win on the same date.
    pub fn set_fees<I>(&mut self, rows: I)
    where
        I: IntoIterator<Item = FeeRow>,
    {
        for row in rows {
            self.fees.insert(row.date, row.value);
        }
    }

    fn fee_on(&self, date: NaiveDateTime) -> f64 {
        match self.fees.get(&date) {
            Some(fee) => *fee,
            None => {
                warn!(%date, "fee missing for a date with trades, using 0");
                0.0
            }
        }
    }

    /// Value series over the ledger's dates.
    ///
    /// Stops at the first date on which a held asset has no usable price
    /// factor; the series up to the previous date is returned.
    pub fn build(
        &self,
        portfolio: &PortfolioLedger,
        trade_log: &[TradeRecord],
        prices: &PriceTable,
    ) -> Vec<ValuationPoint> {
        let mut trades_per_date: BTreeMap<NaiveDateTime, u64> = BTreeMap::new();
        for record in trade_log {
            *trades_per_date.entry(record.date).or_insert(0) += 1;
        }
        let charged = |date: NaiveDateTime| {
            trades_per_date.get(&date).copied().unwrap_or(0) * u64::from(self.config.trades_limit)
        };

        let mut series = Vec::with_capacity(portfolio.len());
        let mut rows = portfolio.iter();
        let Some((first_date, first_holdings)) = rows.next() else {
            return series;
        };

        let trades = charged(*first_date);
        let mut value = self.config.initial_investment;
        if trades > 0 {
            value -= self.fee_on(*first_date) * trades as f64;
        }
        series.push(ValuationPoint {
            date: *first_date,
            price_change: 1.0,
            value,
            trades,
        });

        let mut previous = first_holdings;
        for (date, holdings) in rows {
            let date = *date;
            let held_sum = previous.sum();
            if (held_sum - 1.0).abs() > self.config.accuracy {
                warn!(%date, sum = held_sum, "portfolio shares don't sum to 1");
            }

            let mut price_change = 0.0;
            for (asset, share) in previous.iter().filter(|(_, s)| *s > 0.0) {
                match prices.price_change(asset, date).filter(|f| *f > 0.0) {
                    Some(factor) => price_change += share * factor,
                    None => {
                        error!(%date, asset, "price data missing for held asset, valuation stops");
                        return series;
                    }
                }
            }

            let trades = charged(date);
            value *= price_change;
            if trades > 0 {
                value -= self.fee_on(date) * trades as f64;
            }
            series.push(ValuationPoint {
                date,
                price_change,
                value,
                trades,
            });
            previous = holdings;
        }
        series
    }
}
