//! Price table: per-asset observations and the step-to-step price factor.
//!
//! `price_change` at an observation is `price[t] / price[t-1]` over the asset's
//! own series (the previous observation, not the previous grid date). The first
//! observation of every asset has a factor of exactly 1.

use crate::domain::Granularity;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// How missing grid dates between two observations are filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapFill {
    /// Keep the series as observed.
    #[default]
    Disabled,
    /// Repeat the last observed price.
    #[serde(alias = "pad", alias = "ffill")]
    PadForward,
    /// Interpolate linearly in time between neighbouring observations.
    #[serde(alias = "interpolate")]
    Linear,
}

/// A derived price point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDateTime,
    pub asset: String,
    pub price: f64,
    pub price_change: f64,
    /// `true` when the price was produced by gap filling.
    pub filled: bool,
}

/// Input row for [`PriceTable::set`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRow {
    pub date: NaiveDateTime,
    pub asset: String,
    pub price: f64,
}

impl PriceRow {
    pub fn new(date: NaiveDateTime, asset: impl Into<String>, price: f64) -> Self {
        Self {
            date,
            asset: asset.into(),
            price,
        }
    }
}

/// Price observations for every asset.
#[derive(Debug, Clone)]
pub struct PriceTable {
    granularity: Granularity,
    gap_fill: GapFill,
    observed: BTreeMap<String, BTreeMap<NaiveDateTime, f64>>,
    points: BTreeMap<String, BTreeMap<NaiveDateTime, PricePoint>>,
}

impl PriceTable {
    pub fn new(granularity: Granularity) -> Self {
        Self::with_gap_fill(granularity, GapFill::Disabled)
    }

    pub fn with_gap_fill(granularity: Granularity, gap_fill: GapFill) -> Self {
        Self {
            granularity,
            gap_fill,
            observed: BTreeMap::new(),
            points: BTreeMap::new(),
        }
    }

    pub fn gap_fill(&self) -> GapFill {
        self.gap_fill
    }

    /// Merge rows into the table. Later rows win on the same `(date, asset)`.
    ///
    /// Factors are recomputed over the full series of every touched asset.
    pub fn set<I>(&mut self, rows: I)
    where
        I: IntoIterator<Item = PriceRow>,
    {
        let mut touched = BTreeSet::new();
        for row in rows {
            if !row.price.is_finite() {
                warn!(asset = %row.asset, date = %row.date, price = row.price, "skipping non-finite price");
                continue;
            }
            self.observed
                .entry(row.asset.clone())
                .or_default()
                .insert(row.date, row.price);
            touched.insert(row.asset);
        }
        for asset in touched {
            self.recompute(&asset);
        }
    }

    fn recompute(&mut self, asset: &str) {
        let Some(observed) = self.observed.get(asset) else {
            return;
        };
        let series = self.fill(observed);
        let mut points = BTreeMap::new();
        let mut previous: Option<f64> = None;
        for (date, (price, filled)) in series {
            let price_change = match previous {
                None => 1.0,
                Some(prev) if prev <= 0.0 => {
                    warn!(asset, %date, prev, "non-positive previous price, using factor 1");
                    1.0
                }
                Some(prev) => 1.0 + (price - prev) / prev,
            };
            points.insert(
                date,
                PricePoint {
                    date,
                    asset: asset.to_string(),
                    price,
                    price_change,
                    filled,
                },
            );
            previous = Some(price);
        }
        debug!(asset, points = points.len(), "price series recomputed");
        self.points.insert(asset.to_string(), points);
    }

    /// Observed series plus filled grid dates. Values are `(price, filled)`.
    fn fill(&self, observed: &BTreeMap<NaiveDateTime, f64>) -> BTreeMap<NaiveDateTime, (f64, bool)> {
        let mut series: BTreeMap<NaiveDateTime, (f64, bool)> =
            observed.iter().map(|(d, p)| (*d, (*p, false))).collect();
        if self.gap_fill == GapFill::Disabled {
            return series;
        }

        let pairs: Vec<(NaiveDateTime, f64)> = observed.iter().map(|(d, p)| (*d, *p)).collect();
        for window in pairs.windows(2) {
            let (t0, p0) = window[0];
            let (t1, p1) = window[1];
            let span = (t1 - t0).num_seconds() as f64;
            for date in self.granularity.steps(self.granularity.next(t0), t1) {
                if date >= t1 {
                    break;
                }
                let price = match self.gap_fill {
                    GapFill::Linear => {
                        let elapsed = (date - t0).num_seconds() as f64;
                        p0 + (p1 - p0) * elapsed / span
                    }
                    _ => p0,
                };
                series.entry(date).or_insert((price, true));
            }
        }
        series
    }

    /// `(asset, price_change)` for every asset with a point on `date`.
    pub fn change_on(&self, date: NaiveDateTime) -> BTreeMap<String, f64> {
        self.points
            .iter()
            .filter_map(|(asset, points)| {
                points
                    .get(&date)
                    .map(|p| (asset.clone(), p.price_change))
            })
            .collect()
    }

    pub fn price_change(&self, asset: &str, date: NaiveDateTime) -> Option<f64> {
        self.point(asset, date).map(|p| p.price_change)
    }

    pub fn price(&self, asset: &str, date: NaiveDateTime) -> Option<f64> {
        self.point(asset, date).map(|p| p.price)
    }

    pub fn point(&self, asset: &str, date: NaiveDateTime) -> Option<&PricePoint> {
        self.points.get(asset).and_then(|p| p.get(&date))
    }

    pub fn assets(&self) -> impl Iterator<Item = &str> {
        self.points.keys().map(String::as_str)
    }

    /// All derived points, asset then date ordered.
    pub fn points(&self) -> impl Iterator<Item = &PricePoint> {
        self.points.values().flat_map(|p| p.values())
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
