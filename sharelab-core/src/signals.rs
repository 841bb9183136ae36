//! Signal store: buy, sell and rebalance events.
//!
//! A signal observed at `date` becomes effective at `date + decision_delay`,
//! rounded up to the next point of the simulation grid (anchored at the
//! strategy start). The effective timestamp is the storage key; lookups by
//! date always refer to it.

use crate::domain::Granularity;
use crate::error::ConfigurationError;
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// How a signal is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalFamily {
    /// Include (or grow) an asset.
    Buy,
    /// Exclude (or shrink) an asset.
    Sell,
    /// Restore target proportions.
    Rebalance,
}

impl SignalFamily {
    pub const ALL: [SignalFamily; 3] = [Self::Buy, Self::Sell, Self::Rebalance];

    pub fn requires_asset(self) -> bool {
        !matches!(self, Self::Rebalance)
    }
}

impl fmt::Display for SignalFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
            Self::Rebalance => write!(f, "rebalance"),
        }
    }
}

impl FromStr for SignalFamily {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "b" | "buy" => Ok(Self::Buy),
            "s" | "sell" => Ok(Self::Sell),
            "r" | "rebalance" => Ok(Self::Rebalance),
            _ => Err(ConfigurationError::UnknownSignalFamily(s.to_string())),
        }
    }
}

/// Who created a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalOrigin {
    User,
    /// Periodic rebalance schedule.
    Schedule,
    /// Authorization changes (auto buy/sell).
    Authorization,
}

/// Input row for [`SignalStore::add`]. Missing fields get store defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalRow {
    pub date: NaiveDateTime,
    pub asset: Option<String>,
    pub trade_percentage: Option<f64>,
    /// Seconds.
    pub decision_delay: Option<i64>,
    pub fee: Option<f64>,
}

impl SignalRow {
    pub fn at(date: NaiveDateTime) -> Self {
        Self {
            date,
            ..Self::default()
        }
    }

    pub fn for_asset(date: NaiveDateTime, asset: impl Into<String>) -> Self {
        Self {
            date,
            asset: Some(asset.into()),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, seconds: i64) -> Self {
        self.decision_delay = Some(seconds);
        self
    }
}

/// A stored signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// When the signal was observed.
    pub date: NaiveDateTime,
    /// When the signal acts (`date + decision_delay`, ceiled to the grid).
    pub effective: NaiveDateTime,
    pub family: SignalFamily,
    pub name: String,
    pub asset: Option<String>,
    pub trade_percentage: f64,
    /// Seconds.
    pub decision_delay: i64,
    pub fee: Option<f64>,
    pub origin: SignalOrigin,
}

/// Signals for all three families, keyed by effective timestamp.
#[derive(Debug, Clone)]
pub struct SignalStore {
    anchor: NaiveDateTime,
    granularity: Granularity,
    default_delay: i64,
    default_trade_percentage: f64,
    families: BTreeMap<SignalFamily, BTreeMap<NaiveDateTime, Vec<Signal>>>,
}

impl SignalStore {
    /// Effective dates land on the grid `anchor + k·granularity`.
    /// `default_delay` is in seconds.
    pub fn new(anchor: NaiveDateTime, granularity: Granularity, default_delay: i64) -> Self {
        Self {
            anchor,
            granularity,
            default_delay,
            default_trade_percentage: 1.0,
            families: BTreeMap::new(),
        }
    }

    /// Add user signals. Returns the name the rows were stored under.
    pub fn add<I>(
        &mut self,
        family: SignalFamily,
        rows: I,
        name: Option<&str>,
    ) -> Result<String, ConfigurationError>
    where
        I: IntoIterator<Item = SignalRow>,
    {
        self.add_with_origin(family, rows, name, SignalOrigin::User)
    }

    pub fn add_with_origin<I>(
        &mut self,
        family: SignalFamily,
        rows: I,
        name: Option<&str>,
        origin: SignalOrigin,
    ) -> Result<String, ConfigurationError>
    where
        I: IntoIterator<Item = SignalRow>,
    {
        let rows: Vec<SignalRow> = rows.into_iter().collect();
        if family.requires_asset() {
            if let Some(row) = rows.iter().find(|r| r.asset.is_none()) {
                return Err(ConfigurationError::MissingSignalAsset {
                    family: family.to_string(),
                    date: row.date,
                });
            }
        }

        let name = match name {
            Some(n) => n.to_string(),
            None => self.next_default_name(family),
        };
        let mut stored = Vec::with_capacity(rows.len());
        for row in rows {
            let delay = row.decision_delay.unwrap_or(self.default_delay);
            let effective = self
                .effective_date(row.date, delay)
                .ok_or(ConfigurationError::DelayOutOfRange { date: row.date, delay })?;
            stored.push(Signal {
                date: row.date,
                effective,
                family,
                name: name.clone(),
                asset: row.asset,
                trade_percentage: row.trade_percentage.unwrap_or(self.default_trade_percentage),
                decision_delay: delay,
                fee: row.fee,
                origin,
            });
        }

        let table = self.families.entry(family).or_default();
        for signal in stored {
            table.entry(signal.effective).or_default().push(signal);
        }
        Ok(name)
    }

    /// `date + delay` ceiled to the grid, `None` when out of range.
    fn effective_date(&self, date: NaiveDateTime, delay: i64) -> Option<NaiveDateTime> {
        let delayed = date.checked_add_signed(Duration::try_seconds(delay)?)?;
        self.granularity.ceil(self.anchor, delayed)
    }

    /// `signals_N` with the lowest unused `N >= 1`.
    fn next_default_name(&self, family: SignalFamily) -> String {
        let taken = self.names(family);
        (1..)
            .map(|n| format!("signals_{n}"))
            .find(|candidate| !taken.contains(candidate))
            .unwrap_or_else(|| "signals".to_string())
    }

    /// Distinct signal names of a family.
    pub fn names(&self, family: SignalFamily) -> BTreeSet<String> {
        self.iter(family).map(|s| s.name.clone()).collect()
    }

    /// Delete signals named `name`, or the whole family. Returns the count removed.
    pub fn remove(&mut self, family: SignalFamily, name: Option<&str>) -> usize {
        let Some(table) = self.families.get_mut(&family) else {
            return 0;
        };
        match name {
            Some(name) => {
                let mut removed = 0;
                for signals in table.values_mut() {
                    let before = signals.len();
                    signals.retain(|s| s.name != name);
                    removed += before - signals.len();
                }
                table.retain(|_, signals| !signals.is_empty());
                info!(%family, name, removed, "deleted signals");
                removed
            }
            None => {
                let removed: usize = table.values().map(Vec::len).sum();
                table.clear();
                info!(%family, removed, "deleted all signals");
                removed
            }
        }
    }

    /// Signals not created by the user with an effective date at or after `date`.
    pub fn discard_generated_from(&mut self, date: NaiveDateTime) -> usize {
        let mut removed = 0;
        for table in self.families.values_mut() {
            for (_, signals) in table.range_mut(date..) {
                let before = signals.len();
                signals.retain(|s| s.origin == SignalOrigin::User);
                removed += before - signals.len();
            }
            table.retain(|_, signals| !signals.is_empty());
        }
        removed
    }

    /// Signals effective on `date`. A non-empty `assets` restricts to those assets.
    pub fn on_date(&self, date: NaiveDateTime, family: SignalFamily, assets: &[String]) -> Vec<Signal> {
        let Some(signals) = self.families.get(&family).and_then(|t| t.get(&date)) else {
            return Vec::new();
        };
        signals
            .iter()
            .filter(|s| {
                assets.is_empty()
                    || s.asset.as_ref().is_some_and(|a| assets.contains(a))
            })
            .cloned()
            .collect()
    }

    /// Assets that have a signal of `family` effective on `date`.
    pub fn asset_names_on(&self, date: NaiveDateTime, family: SignalFamily) -> BTreeSet<String> {
        self.families
            .get(&family)
            .and_then(|t| t.get(&date))
            .map(|signals| signals.iter().filter_map(|s| s.asset.clone()).collect())
            .unwrap_or_default()
    }

    /// Every stored signal of a family, ordered by effective date.
    pub fn iter(&self, family: SignalFamily) -> impl Iterator<Item = &Signal> {
        self.families
            .get(&family)
            .into_iter()
            .flat_map(|t| t.values().flatten())
    }

    pub fn len(&self, family: SignalFamily) -> usize {
        self.iter(family).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::parse_timestamp;

    fn ts(s: &str) -> NaiveDateTime {
        parse_timestamp(s).unwrap()
    }

    fn store() -> SignalStore {
        SignalStore::new(ts("2021-01-01"), Granularity::days(1), 0)
    }

    #[test]
    fn delay_is_ceiled_to_grid() {
        let mut s = store();
        s.add(
            SignalFamily::Buy,
            [SignalRow::for_asset(ts("2021-01-10"), "eth").with_delay(36 * 3600)],
            None,
        )
        .unwrap();
        assert!(s.on_date(ts("2021-01-11"), SignalFamily::Buy, &[]).is_empty());
        let hits = s.on_date(ts("2021-01-12"), SignalFamily::Buy, &[]);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].date, ts("2021-01-10"));
    }

    #[test]
    fn weekly_grid_keeps_monday_anchor() {
        // 2021-01-04 is a Monday
        let mut s = SignalStore::new(ts("2021-01-04"), Granularity::days(7), 0);
        s.add(
            SignalFamily::Buy,
            [
                SignalRow::for_asset(ts("2021-01-11"), "eth"),
                SignalRow::for_asset(ts("2021-01-13"), "uni"),
            ],
            None,
        )
        .unwrap();
        assert_eq!(s.on_date(ts("2021-01-11"), SignalFamily::Buy, &[]).len(), 1);
        let next_week = s.on_date(ts("2021-01-18"), SignalFamily::Buy, &[]);
        assert_eq!(next_week.len(), 1);
        assert_eq!(next_week[0].asset.as_deref(), Some("uni"));
    }

    #[test]
    fn overflowing_delay_is_rejected() {
        let mut s = store();
        s.add(SignalFamily::Buy, [SignalRow::for_asset(ts("2021-01-01"), "eth")], Some("keep"))
            .unwrap();
        let err = s
            .add(
                SignalFamily::Buy,
                [
                    SignalRow::for_asset(ts("2021-01-02"), "uni"),
                    SignalRow::for_asset(ts("2021-01-02"), "eth").with_delay(i64::MAX),
                ],
                None,
            )
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::DelayOutOfRange { delay: i64::MAX, .. }));
        assert_eq!(s.len(SignalFamily::Buy), 1);
    }

    #[test]
    fn store_default_delay_applies() {
        let mut s = SignalStore::new(ts("2021-01-01"), Granularity::days(1), 86_400);
        s.add(SignalFamily::Sell, [SignalRow::for_asset(ts("2021-01-01"), "eth")], None)
            .unwrap();
        assert_eq!(s.on_date(ts("2021-01-02"), SignalFamily::Sell, &[]).len(), 1);
    }

    #[test]
    fn default_names_fill_lowest_gap() {
        let mut s = store();
        let row = || [SignalRow::for_asset(ts("2021-01-01"), "eth")];
        assert_eq!(s.add(SignalFamily::Buy, row(), None).unwrap(), "signals_1");
        assert_eq!(s.add(SignalFamily::Buy, row(), None).unwrap(), "signals_2");
        assert_eq!(s.add(SignalFamily::Buy, row(), None).unwrap(), "signals_3");
        assert_eq!(s.remove(SignalFamily::Buy, Some("signals_2")), 1);
        assert_eq!(s.add(SignalFamily::Buy, row(), None).unwrap(), "signals_2");
        // names are per family
        assert_eq!(s.add(SignalFamily::Sell, row(), None).unwrap(), "signals_1");
    }

    #[test]
    fn buy_without_asset_is_rejected() {
        let mut s = store();
        let err = s
            .add(SignalFamily::Buy, [SignalRow::at(ts("2021-01-01"))], None)
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingSignalAsset { .. }));
        assert_eq!(s.len(SignalFamily::Buy), 0);
    }

    #[test]
    fn rebalance_without_asset_is_fine() {
        let mut s = store();
        s.add(SignalFamily::Rebalance, [SignalRow::at(ts("2021-01-01"))], Some("monthly"))
            .unwrap();
        let hits = s.on_date(ts("2021-01-01"), SignalFamily::Rebalance, &[]);
        assert_eq!(hits[0].trade_percentage, 1.0);
        assert_eq!(hits[0].name, "monthly");
    }

    #[test]
    fn asset_filter_restricts() {
        let mut s = store();
        s.add(
            SignalFamily::Buy,
            [
                SignalRow::for_asset(ts("2021-01-01"), "eth"),
                SignalRow::for_asset(ts("2021-01-01"), "uni"),
            ],
            None,
        )
        .unwrap();
        let hits = s.on_date(ts("2021-01-01"), SignalFamily::Buy, &["uni".to_string()]);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].asset.as_deref(), Some("uni"));
        assert_eq!(s.on_date(ts("2021-01-01"), SignalFamily::Buy, &[]).len(), 2);
    }

    #[test]
    fn remove_without_name_clears_family() {
        let mut s = store();
        s.add(SignalFamily::Buy, [SignalRow::for_asset(ts("2021-01-01"), "eth")], Some("a"))
            .unwrap();
        s.add(SignalFamily::Buy, [SignalRow::for_asset(ts("2021-01-02"), "eth")], Some("b"))
            .unwrap();
        assert_eq!(s.remove(SignalFamily::Buy, None), 2);
        assert_eq!(s.len(SignalFamily::Buy), 0);
    }

    #[test]
    fn discard_generated_keeps_user_signals() {
        let mut s = store();
        s.add(SignalFamily::Sell, [SignalRow::for_asset(ts("2021-01-03"), "eth")], None)
            .unwrap();
        s.add_with_origin(
            SignalFamily::Sell,
            [
                SignalRow::for_asset(ts("2021-01-02"), "uni"),
                SignalRow::for_asset(ts("2021-01-03"), "uni"),
            ],
            Some("authorization_sell"),
            SignalOrigin::Authorization,
        )
        .unwrap();
        assert_eq!(s.discard_generated_from(ts("2021-01-03")), 1);
        assert_eq!(s.len(SignalFamily::Sell), 2);
        assert_eq!(
            s.asset_names_on(ts("2021-01-03"), SignalFamily::Sell),
            BTreeSet::from(["eth".to_string()])
        );
    }

    #[test]
    fn family_aliases() {
        assert_eq!("B".parse::<SignalFamily>().unwrap(), SignalFamily::Buy);
        assert_eq!("sell".parse::<SignalFamily>().unwrap(), SignalFamily::Sell);
        assert_eq!("r".parse::<SignalFamily>().unwrap(), SignalFamily::Rebalance);
        assert!("hold".parse::<SignalFamily>().is_err());
    }
}
