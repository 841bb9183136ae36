//! Asset authorization: which assets may be held on which dates.
//!
//! Assets fall into two mutually exclusive categories. *Common* assets are the
//! ones the strategy invests in; *reserve* assets are the stable intermediaries
//! used when moving weight between positions. An asset being authorized on a
//! date only means it *may* be held; its share can still be zero.

use crate::domain::Granularity;
use crate::error::ConfigurationError;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Category an asset is registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetCategory {
    Common,
    Reserve,
}

impl AssetCategory {
    fn other(self) -> Self {
        match self {
            Self::Common => Self::Reserve,
            Self::Reserve => Self::Common,
        }
    }
}

impl fmt::Display for AssetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Common => write!(f, "common"),
            Self::Reserve => write!(f, "reserve"),
        }
    }
}

impl FromStr for AssetCategory {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "c" | "com" | "common" => Ok(Self::Common),
            "r" | "res" | "reserve" => Ok(Self::Reserve),
            _ => Err(ConfigurationError::UnknownAssetScope(s.to_string())),
        }
    }
}

/// Which categories a query covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetScope {
    Common,
    Reserve,
    /// Reserve names first, then common names.
    All,
}

impl From<AssetCategory> for AssetScope {
    fn from(c: AssetCategory) -> Self {
        match c {
            AssetCategory::Common => Self::Common,
            AssetCategory::Reserve => Self::Reserve,
        }
    }
}

impl FromStr for AssetScope {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a" | "all" => Ok(Self::All),
            other => other
                .parse::<AssetCategory>()
                .map(Self::from)
                .map_err(|_| ConfigurationError::UnknownAssetScope(s.to_string())),
        }
    }
}

/// Authorized grid dates per asset for one category.
#[derive(Debug, Clone, Default)]
struct CategoryTable {
    /// Registration order of names.
    order: Vec<String>,
    dates: BTreeMap<String, BTreeSet<NaiveDateTime>>,
}

impl CategoryTable {
    fn contains(&self, asset: &str) -> bool {
        self.dates.contains_key(asset)
    }

    fn entry(&mut self, asset: &str) -> &mut BTreeSet<NaiveDateTime> {
        if !self.dates.contains_key(asset) {
            self.order.push(asset.to_string());
        }
        self.dates.entry(asset.to_string()).or_default()
    }

    fn authorized_on(&self, date: NaiveDateTime) -> impl Iterator<Item = &String> {
        self.order
            .iter()
            .filter(move |name| self.dates.get(*name).is_some_and(|d| d.contains(&date)))
    }
}

/// Registry of authorization windows for common and reserve assets.
#[derive(Debug, Clone)]
pub struct AssetRegistry {
    start: NaiveDateTime,
    granularity: Granularity,
    common: CategoryTable,
    reserve: CategoryTable,
}

impl AssetRegistry {
    pub fn new(start: NaiveDateTime, granularity: Granularity) -> Self {
        Self {
            start,
            granularity,
            common: CategoryTable::default(),
            reserve: CategoryTable::default(),
        }
    }

    fn table(&self, category: AssetCategory) -> &CategoryTable {
        match category {
            AssetCategory::Common => &self.common,
            AssetCategory::Reserve => &self.reserve,
        }
    }

    fn table_mut(&mut self, category: AssetCategory) -> &mut CategoryTable {
        match category {
            AssetCategory::Common => &mut self.common,
            AssetCategory::Reserve => &mut self.reserve,
        }
    }

    /// Register authorization windows.
    ///
    /// Each asset maps to a flat list `[start, end, start, end, ...]`. Every
    /// entry is validated before anything is stored, so a failing call leaves
    /// the registry untouched.
    pub fn add<I, S>(&mut self, windows: I, category: AssetCategory) -> Result<(), ConfigurationError>
    where
        I: IntoIterator<Item = (S, Vec<NaiveDateTime>)>,
        S: Into<String>,
    {
        let windows: Vec<(String, Vec<NaiveDateTime>)> =
            windows.into_iter().map(|(a, d)| (a.into(), d)).collect();

        let other = self.table(category.other());
        for (asset, dates) in &windows {
            if other.contains(asset) {
                return Err(ConfigurationError::AssetInBothCategories {
                    asset: asset.clone(),
                });
            }
            self.validate_dates(asset, dates)?;
            if let Some(&earliest) = dates.iter().min() {
                if earliest < self.start {
                    return Err(ConfigurationError::DateBeforeStart {
                        asset: asset.clone(),
                        date: earliest,
                        start: self.start,
                    });
                }
            }
        }

        let (anchor, granularity) = (self.start, self.granularity);
        for (asset, dates) in windows {
            let authorized = self.table_mut(category).entry(&asset);
            for pair in dates.chunks_exact(2) {
                authorized.extend(granularity.anchored_steps(anchor, pair[0], pair[1]));
            }
            debug!(asset = %asset, %category, windows = dates.len() / 2, "authorized asset");
        }
        Ok(())
    }

    /// Clear authorization for the given `[start, end, ...]` windows.
    ///
    /// Unknown assets are skipped with a warning. Names stay registered even
    /// when no authorized date remains.
    pub fn remove<I, S>(&mut self, windows: I) -> Result<(), ConfigurationError>
    where
        I: IntoIterator<Item = (S, Vec<NaiveDateTime>)>,
        S: Into<String>,
    {
        let windows: Vec<(String, Vec<NaiveDateTime>)> =
            windows.into_iter().map(|(a, d)| (a.into(), d)).collect();
        for (asset, dates) in &windows {
            self.validate_dates(asset, dates)?;
        }

        let (anchor, granularity) = (self.start, self.granularity);
        for (asset, dates) in windows {
            let category = if self.common.contains(&asset) {
                AssetCategory::Common
            } else if self.reserve.contains(&asset) {
                AssetCategory::Reserve
            } else {
                warn!(asset = %asset, "can't find asset in registry, nothing removed");
                continue;
            };
            if let Some(authorized) = self.table_mut(category).dates.get_mut(&asset) {
                for pair in dates.chunks_exact(2) {
                    for date in granularity.anchored_steps(anchor, pair[0], pair[1]) {
                        authorized.remove(&date);
                    }
                }
            }
        }
        Ok(())
    }

    fn validate_dates(&self, asset: &str, dates: &[NaiveDateTime]) -> Result<(), ConfigurationError> {
        if dates.len() % 2 != 0 {
            return Err(ConfigurationError::OddDateSequence {
                asset: asset.to_string(),
                count: dates.len(),
            });
        }
        for pair in dates.chunks_exact(2) {
            if pair[1] < pair[0] {
                return Err(ConfigurationError::InvertedWindow {
                    asset: asset.to_string(),
                    start: pair[0],
                    end: pair[1],
                });
            }
        }
        Ok(())
    }

    /// Every name ever registered for the scope, in registration order.
    pub fn names_for(&self, scope: AssetScope) -> Vec<String> {
        match scope {
            AssetScope::Common => self.common.order.clone(),
            AssetScope::Reserve => self.reserve.order.clone(),
            AssetScope::All => self
                .reserve
                .order
                .iter()
                .chain(self.common.order.iter())
                .cloned()
                .collect(),
        }
    }

    /// Names whose authorization covers `date`.
    pub fn authorized_on(&self, date: NaiveDateTime, scope: AssetScope) -> Vec<String> {
        match scope {
            AssetScope::Common => self.common.authorized_on(date).cloned().collect(),
            AssetScope::Reserve => self.reserve.authorized_on(date).cloned().collect(),
            AssetScope::All => self
                .reserve
                .authorized_on(date)
                .chain(self.common.authorized_on(date))
                .cloned()
                .collect(),
        }
    }

    pub fn is_authorized(&self, asset: &str, date: NaiveDateTime) -> bool {
        [&self.common, &self.reserve]
            .iter()
            .any(|t| t.dates.get(asset).is_some_and(|d| d.contains(&date)))
    }

    pub fn category_of(&self, asset: &str) -> Option<AssetCategory> {
        if self.common.contains(asset) {
            Some(AssetCategory::Common)
        } else if self.reserve.contains(asset) {
            Some(AssetCategory::Reserve)
        } else {
            None
        }
    }

    pub fn is_empty(&self) -> bool {
        self.common.order.is_empty() && self.reserve.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::parse_timestamp;

    fn ts(s: &str) -> NaiveDateTime {
        parse_timestamp(s).unwrap()
    }

    fn registry() -> AssetRegistry {
        AssetRegistry::new(ts("2021-01-01"), Granularity::days(1))
    }

    #[test]
    fn window_end_is_inclusive() {
        let mut reg = registry();
        reg.add([("eth", vec![ts("2021-01-01"), ts("2021-01-03")])], AssetCategory::Common)
            .unwrap();
        assert_eq!(reg.authorized_on(ts("2021-01-03"), AssetScope::Common), vec!["eth"]);
        assert!(reg.authorized_on(ts("2021-01-04"), AssetScope::Common).is_empty());
    }

    #[test]
    fn same_asset_in_both_categories_fails() {
        let mut reg = registry();
        reg.add([("dai", vec![ts("2021-01-01"), ts("2021-01-10")])], AssetCategory::Reserve)
            .unwrap();
        let err = reg
            .add([("dai", vec![ts("2021-01-01"), ts("2021-01-10")])], AssetCategory::Common)
            .unwrap_err();
        assert_eq!(err, ConfigurationError::AssetInBothCategories { asset: "dai".into() });
    }

    #[test]
    fn failing_add_leaves_registry_unchanged() {
        let mut reg = registry();
        let result = reg.add(
            [
                ("eth", vec![ts("2021-01-01"), ts("2021-01-05")]),
                ("uni", vec![ts("2021-01-01")]),
            ],
            AssetCategory::Common,
        );
        assert!(matches!(result, Err(ConfigurationError::OddDateSequence { count: 1, .. })));
        assert!(reg.is_empty());
    }

    #[test]
    fn date_before_start_fails() {
        let mut reg = registry();
        let err = reg
            .add([("eth", vec![ts("2020-12-31"), ts("2021-01-05")])], AssetCategory::Common)
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::DateBeforeStart { .. }));
    }

    #[test]
    fn windows_are_unioned() {
        let mut reg = registry();
        reg.add(
            [("eth", vec![ts("2021-01-01"), ts("2021-01-03"), ts("2021-01-02"), ts("2021-01-05")])],
            AssetCategory::Common,
        )
        .unwrap();
        assert!(reg.is_authorized("eth", ts("2021-01-04")));
        assert_eq!(reg.names_for(AssetScope::Common), vec!["eth"]);
    }

    #[test]
    fn remove_clears_window_and_keeps_name() {
        let mut reg = registry();
        reg.add([("eth", vec![ts("2021-01-01"), ts("2021-01-05")])], AssetCategory::Common)
            .unwrap();
        reg.remove([("eth", vec![ts("2021-01-02"), ts("2021-01-03")])]).unwrap();
        assert!(reg.is_authorized("eth", ts("2021-01-01")));
        assert!(!reg.is_authorized("eth", ts("2021-01-02")));
        assert!(!reg.is_authorized("eth", ts("2021-01-03")));
        assert!(reg.is_authorized("eth", ts("2021-01-04")));
        assert_eq!(reg.names_for(AssetScope::Common), vec!["eth"]);
    }

    #[test]
    fn off_grid_window_snaps_to_simulation_grid() {
        // weekly grid on Mondays; the window opens on a Wednesday
        let mut reg = AssetRegistry::new(ts("2021-01-04"), Granularity::days(7));
        reg.add([("eth", vec![ts("2021-01-06"), ts("2021-01-25 12:00")])], AssetCategory::Common)
            .unwrap();
        assert!(!reg.is_authorized("eth", ts("2021-01-04")));
        assert!(reg.is_authorized("eth", ts("2021-01-11")));
        assert!(reg.is_authorized("eth", ts("2021-01-25")));
        assert!(!reg.is_authorized("eth", ts("2021-02-01")));

        reg.remove([("eth", vec![ts("2021-01-12"), ts("2021-01-19")])]).unwrap();
        assert!(reg.is_authorized("eth", ts("2021-01-11")));
        assert!(!reg.is_authorized("eth", ts("2021-01-18")));
    }

    #[test]
    fn remove_unknown_asset_is_not_fatal() {
        let mut reg = registry();
        assert!(reg.remove([("btc", vec![ts("2021-01-01"), ts("2021-01-02")])]).is_ok());
    }

    #[test]
    fn remove_odd_list_fails() {
        let mut reg = registry();
        assert!(reg.remove([("btc", vec![ts("2021-01-01")])]).is_err());
    }

    #[test]
    fn all_scope_lists_reserve_first() {
        let mut reg = registry();
        reg.add([("eth", vec![ts("2021-01-01"), ts("2021-01-02")])], AssetCategory::Common)
            .unwrap();
        reg.add([("dai", vec![ts("2021-01-01"), ts("2021-01-02")])], AssetCategory::Reserve)
            .unwrap();
        assert_eq!(reg.names_for(AssetScope::All), vec!["dai", "eth"]);
        assert_eq!(reg.authorized_on(ts("2021-01-02"), AssetScope::All), vec!["dai", "eth"]);
    }

    #[test]
    fn scope_aliases() {
        assert_eq!("c".parse::<AssetScope>().unwrap(), AssetScope::Common);
        assert_eq!("RES".parse::<AssetScope>().unwrap(), AssetScope::Reserve);
        assert_eq!("a".parse::<AssetScope>().unwrap(), AssetScope::All);
        assert!("stable".parse::<AssetScope>().is_err());
        assert!("all".parse::<AssetCategory>().is_err());
    }
}
