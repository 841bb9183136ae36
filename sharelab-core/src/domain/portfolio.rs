//! Portfolio composition: asset shares per date.
//!
//! A portfolio is described by shares only (fractions summing to 1), not by
//! money amounts, so the simulation is agnostic to the invested capital.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Asset shares held on a single date.
///
/// `BTreeMap` keeps iteration order stable so reruns produce identical tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Holdings {
    shares: BTreeMap<String, f64>,
}

impl Holdings {
    pub fn new() -> Self {
        Self::default()
    }

    /// 100% in a single asset.
    pub fn single(asset: impl Into<String>) -> Self {
        let mut shares = BTreeMap::new();
        shares.insert(asset.into(), 1.0);
        Self { shares }
    }

    pub fn get(&self, asset: &str) -> Option<f64> {
        self.shares.get(asset).copied()
    }

    pub fn holds(&self, asset: &str) -> bool {
        self.shares.contains_key(asset)
    }

    pub fn set(&mut self, asset: impl Into<String>, share: f64) {
        self.shares.insert(asset.into(), share);
    }

    /// Add `share` to an asset, creating the position if needed.
    pub fn credit(&mut self, asset: &str, share: f64) {
        *self.shares.entry(asset.to_string()).or_insert(0.0) += share;
    }

    pub fn remove(&mut self, asset: &str) -> Option<f64> {
        self.shares.remove(asset)
    }

    pub fn sum(&self) -> f64 {
        self.shares.values().sum()
    }

    pub fn len(&self) -> usize {
        self.shares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shares.is_empty()
    }

    pub fn assets(&self) -> impl Iterator<Item = &str> {
        self.shares.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.shares.iter().map(|(a, s)| (a.as_str(), *s))
    }

    /// Drop positions whose share is not strictly positive.
    pub fn retain_positive(&mut self) {
        self.shares.retain(|_, share| *share > 0.0);
    }
}

impl FromIterator<(String, f64)> for Holdings {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self {
            shares: iter.into_iter().collect(),
        }
    }
}

/// One row of the portfolio table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioEntry {
    pub date: NaiveDateTime,
    pub asset: String,
    pub share: f64,
}

/// Finalized holdings per date.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortfolioLedger {
    rows: BTreeMap<NaiveDateTime, Holdings>,
}

impl PortfolioLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, date: &NaiveDateTime) -> Option<&Holdings> {
        self.rows.get(date)
    }

    pub fn contains(&self, date: &NaiveDateTime) -> bool {
        self.rows.contains_key(date)
    }

    /// Replace the row for `date`.
    pub fn insert(&mut self, date: NaiveDateTime, holdings: Holdings) {
        self.rows.insert(date, holdings);
    }

    /// Discard every row at or after `date`.
    pub fn truncate_from(&mut self, date: NaiveDateTime) {
        self.rows.split_off(&date);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn first_date(&self) -> Option<NaiveDateTime> {
        self.rows.keys().next().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDateTime> {
        self.rows.keys().next_back().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NaiveDateTime, &Holdings)> {
        self.rows.iter()
    }

    /// Flatten into `(date, asset, share)` rows, date then asset ordered.
    pub fn entries(&self) -> Vec<PortfolioEntry> {
        self.rows
            .iter()
            .flat_map(|(date, holdings)| {
                holdings.iter().map(move |(asset, share)| PortfolioEntry {
                    date: *date,
                    asset: asset.to_string(),
                    share,
                })
            })
            .collect()
    }
}
