//! Rebalance proportions: target weights the policy rebalances towards.
//!
//! Raw values are arbitrary non-negative weights (e.g. market caps). They are
//! normalized per date over the assets a caller asks for.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Input row for [`RebalanceProportions::set`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProportionRow {
    pub date: NaiveDateTime,
    pub asset: String,
    pub value: f64,
}

impl ProportionRow {
    pub fn new(date: NaiveDateTime, asset: impl Into<String>, value: f64) -> Self {
        Self {
            date,
            asset: asset.into(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Mode {
    /// Every asset weighs 1.
    Equal,
    Table(BTreeMap<NaiveDateTime, BTreeMap<String, f64>>),
}

/// Target weights per date.
#[derive(Debug, Clone, PartialEq)]
pub struct RebalanceProportions {
    mode: Mode,
}

impl Default for RebalanceProportions {
    fn default() -> Self {
        Self { mode: Mode::Equal }
    }
}

impl RebalanceProportions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge raw weights. Later rows win on the same `(date, asset)`.
    ///
    /// The first call switches from equal weights to table mode.
    pub fn set<I>(&mut self, rows: I)
    where
        I: IntoIterator<Item = ProportionRow>,
    {
        if self.mode == Mode::Equal {
            self.mode = Mode::Table(BTreeMap::new());
        }
        if let Mode::Table(table) = &mut self.mode {
            for row in rows {
                table.entry(row.date).or_default().insert(row.asset, row.value);
            }
        }
    }

    /// Drop any table and weigh every asset equally.
    pub fn set_equal_weights(&mut self) {
        self.mode = Mode::Equal;
    }

    pub fn is_equal_weights(&self) -> bool {
        self.mode == Mode::Equal
    }

    /// Normalized shares for `assets` on `date`. Order follows `assets`.
    pub fn shares_for(&self, date: NaiveDateTime, assets: &[String]) -> Vec<(String, f64)> {
        if assets.is_empty() {
            return Vec::new();
        }

        let weights: Vec<f64> = match &self.mode {
            Mode::Equal => vec![1.0; assets.len()],
            Mode::Table(table) => {
                let row = table.get(&date);
                if row.is_none() {
                    warn!(%date, "rebalance proportions missing for date, using weight 1");
                }
                assets
                    .iter()
                    .map(|asset| match row.and_then(|r| r.get(asset)) {
                        Some(v) if v.is_finite() && *v >= 0.0 => *v,
                        Some(v) => {
                            warn!(%date, asset = %asset, value = *v, "invalid rebalance proportion, using 0");
                            0.0
                        }
                        None => {
                            if row.is_some() {
                                warn!(%date, asset = %asset, "rebalance proportion missing for asset, using weight 1");
                            }
                            1.0
                        }
                    })
                    .collect()
            }
        };

        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            warn!(%date, "rebalance proportions sum to zero, using equal shares");
            let equal = 1.0 / assets.len() as f64;
            return assets.iter().map(|a| (a.clone(), equal)).collect();
        }
        assets
            .iter()
            .zip(weights)
            .map(|(a, w)| (a.clone(), w / total))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::parse_timestamp;

    fn ts(s: &str) -> NaiveDateTime {
        parse_timestamp(s).unwrap()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn equal_weights_by_default() {
        let p = RebalanceProportions::new();
        let shares = p.shares_for(ts("2021-01-01"), &names(&["eth", "uni"]));
        assert_eq!(shares, vec![("eth".into(), 0.5), ("uni".into(), 0.5)]);
    }

    #[test]
    fn empty_request_gives_empty_result() {
        let p = RebalanceProportions::new();
        assert!(p.shares_for(ts("2021-01-01"), &[]).is_empty());
    }

    #[test]
    fn table_weights_are_normalized_over_requested_assets() {
        let mut p = RebalanceProportions::new();
        p.set([
            ProportionRow::new(ts("2021-01-01"), "eth", 1.0),
            ProportionRow::new(ts("2021-01-01"), "uni", 1.0),
            ProportionRow::new(ts("2021-01-01"), "dai", 2.0),
        ]);
        let shares = p.shares_for(ts("2021-01-01"), &names(&["eth", "dai"]));
        assert_eq!(shares, vec![("eth".into(), 1.0 / 3.0), ("dai".into(), 2.0 / 3.0)]);
    }

    #[test]
    fn missing_asset_weighs_one() {
        let mut p = RebalanceProportions::new();
        p.set([ProportionRow::new(ts("2021-01-01"), "eth", 3.0)]);
        let shares = p.shares_for(ts("2021-01-01"), &names(&["eth", "uni"]));
        assert_eq!(shares[0].1, 0.75);
        assert_eq!(shares[1].1, 0.25);
    }

    #[test]
    fn missing_date_weighs_everything_one() {
        let mut p = RebalanceProportions::new();
        p.set([ProportionRow::new(ts("2021-01-01"), "eth", 3.0)]);
        let shares = p.shares_for(ts("2021-01-05"), &names(&["eth", "uni"]));
        assert_eq!(shares[0].1, 0.5);
    }

    #[test]
    fn zero_total_falls_back_to_equal() {
        let mut p = RebalanceProportions::new();
        p.set([
            ProportionRow::new(ts("2021-01-01"), "eth", 0.0),
            ProportionRow::new(ts("2021-01-01"), "uni", 0.0),
        ]);
        let shares = p.shares_for(ts("2021-01-01"), &names(&["eth", "uni"]));
        assert_eq!(shares[1].1, 0.5);
    }

    #[test]
    fn last_write_wins() {
        let mut p = RebalanceProportions::new();
        p.set([ProportionRow::new(ts("2021-01-01"), "eth", 3.0)]);
        p.set([
            ProportionRow::new(ts("2021-01-01"), "eth", 1.0),
            ProportionRow::new(ts("2021-01-01"), "uni", 1.0),
        ]);
        let shares = p.shares_for(ts("2021-01-01"), &names(&["eth", "uni"]));
        assert_eq!(shares[0].1, 0.5);
        assert!(!p.is_equal_weights());
    }
}
