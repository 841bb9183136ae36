//! CSV input loading for the runner.
//!
//! Reads the tables a run config points at and turns them into core input
//! rows. Expected headers:
//! - prices: `dt,asset,price`
//! - proportions: `dt,asset,value`
//! - signals: `dt[,asset][,trade_percentage][,decision_delay][,fee]`
//! - fees: `dt,value`
//!
//! Optional signal columns may be missing entirely or left empty per row.

use crate::config::RunConfig;
use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sharelab_core::domain::parse_timestamp;
use sharelab_core::prices::PriceRow;
use sharelab_core::proportions::ProportionRow;
use sharelab_core::signals::{SignalFamily, SignalRow};
use sharelab_core::valuation::FeeRow;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{path} row {row}: invalid timestamp '{value}'")]
    Timestamp {
        path: PathBuf,
        row: usize,
        value: String,
    },

    #[error("no price table configured ([inputs] prices)")]
    MissingPrices,
}

// ── Raw CSV rows ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawPrice {
    dt: String,
    asset: String,
    price: f64,
}

#[derive(Debug, Deserialize)]
struct RawProportion {
    dt: String,
    asset: String,
    value: f64,
}

#[derive(Debug, Deserialize)]
struct RawSignal {
    dt: String,
    #[serde(default)]
    asset: Option<String>,
    #[serde(default)]
    trade_percentage: Option<f64>,
    #[serde(default)]
    decision_delay: Option<i64>,
    #[serde(default)]
    fee: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawFee {
    dt: String,
    value: f64,
}

/// Deserialize every record of a CSV file, with 1-based data row numbers.
fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<(usize, T)>, LoadError> {
    let csv_err = |source| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(csv_err)?;
    let mut rows = Vec::new();
    for (i, record) in reader.deserialize::<T>().enumerate() {
        rows.push((i + 1, record.map_err(csv_err)?));
    }
    debug!(path = %path.display(), rows = rows.len(), "csv loaded");
    Ok(rows)
}

fn timestamp(path: &Path, row: usize, value: &str) -> Result<NaiveDateTime, LoadError> {
    parse_timestamp(value).map_err(|_| LoadError::Timestamp {
        path: path.to_path_buf(),
        row,
        value: value.to_string(),
    })
}

// ── Table loaders ────────────────────────────────────────────────────

pub fn load_prices(path: &Path) -> Result<Vec<PriceRow>, LoadError> {
    read_rows::<RawPrice>(path)?
        .into_iter()
        .map(|(row, raw)| -> Result<_, LoadError> {
            Ok(PriceRow::new(timestamp(path, row, &raw.dt)?, raw.asset, raw.price))
        })
        .collect()
}

pub fn load_proportions(path: &Path) -> Result<Vec<ProportionRow>, LoadError> {
    read_rows::<RawProportion>(path)?
        .into_iter()
        .map(|(row, raw)| -> Result<_, LoadError> {
            Ok(ProportionRow::new(
                timestamp(path, row, &raw.dt)?,
                raw.asset,
                raw.value,
            ))
        })
        .collect()
}

pub fn load_signals(path: &Path) -> Result<Vec<SignalRow>, LoadError> {
    read_rows::<RawSignal>(path)?
        .into_iter()
        .map(|(row, raw)| -> Result<_, LoadError> {
            Ok(SignalRow {
                date: timestamp(path, row, &raw.dt)?,
                asset: raw.asset.filter(|a| !a.is_empty()),
                trade_percentage: raw.trade_percentage,
                decision_delay: raw.decision_delay,
                fee: raw.fee,
            })
        })
        .collect()
}

pub fn load_fees(path: &Path) -> Result<Vec<FeeRow>, LoadError> {
    read_rows::<RawFee>(path)?
        .into_iter()
        .map(|(row, raw)| -> Result<_, LoadError> {
            Ok(FeeRow {
                date: timestamp(path, row, &raw.dt)?,
                value: raw.value,
            })
        })
        .collect()
}

// ── Run inputs ───────────────────────────────────────────────────────

/// One loaded `[[signals]]` table.
#[derive(Debug, Clone)]
pub struct LoadedSignals {
    pub family: SignalFamily,
    pub name: Option<String>,
    pub rows: Vec<SignalRow>,
}

/// All input tables of a run.
#[derive(Debug, Clone)]
pub struct LoadedInputs {
    pub prices: Vec<PriceRow>,
    pub proportions: Option<Vec<ProportionRow>>,
    pub signals: Vec<LoadedSignals>,
    pub fees: Vec<FeeRow>,
    /// BLAKE3 over every loaded row, in load order.
    pub dataset_hash: String,
}

/// Load every table referenced by a run config.
pub fn load_inputs(config: &RunConfig) -> Result<LoadedInputs, LoadError> {
    let prices_path = config
        .inputs
        .prices
        .as_deref()
        .ok_or(LoadError::MissingPrices)?;
    let prices = load_prices(&config.resolve(prices_path))?;

    let proportions = config
        .inputs
        .proportions
        .as_deref()
        .map(|p| load_proportions(&config.resolve(p)))
        .transpose()?;

    let fees = match config.inputs.fees.as_deref() {
        Some(p) => load_fees(&config.resolve(p))?,
        None => Vec::new(),
    };

    let signals = config
        .signals
        .iter()
        .map(|source| -> Result<_, LoadError> {
            Ok(LoadedSignals {
                family: source.family,
                name: source.name.clone(),
                rows: load_signals(&config.resolve(&source.path))?,
            })
        })
        .collect::<Result<Vec<_>, LoadError>>()?;

    let dataset_hash = compute_dataset_hash(&prices, proportions.as_deref(), &signals, &fees);
    info!(
        prices = prices.len(),
        signal_tables = signals.len(),
        fees = fees.len(),
        "inputs loaded"
    );

    Ok(LoadedInputs {
        prices,
        proportions,
        signals,
        fees,
        dataset_hash,
    })
}

/// Compute a deterministic BLAKE3 hash over all loaded rows.
fn compute_dataset_hash(
    prices: &[PriceRow],
    proportions: Option<&[ProportionRow]>,
    signals: &[LoadedSignals],
    fees: &[FeeRow],
) -> String {
    let mut hasher = blake3::Hasher::new();

    hasher.update(b"prices");
    for row in prices {
        hasher.update(row.date.to_string().as_bytes());
        hasher.update(row.asset.as_bytes());
        hasher.update(&row.price.to_le_bytes());
    }

    hasher.update(b"proportions");
    for row in proportions.unwrap_or_default() {
        hasher.update(row.date.to_string().as_bytes());
        hasher.update(row.asset.as_bytes());
        hasher.update(&row.value.to_le_bytes());
    }

    for table in signals {
        hasher.update(table.family.to_string().as_bytes());
        hasher.update(table.name.as_deref().unwrap_or("").as_bytes());
        for row in &table.rows {
            hasher.update(row.date.to_string().as_bytes());
            hasher.update(row.asset.as_deref().unwrap_or("").as_bytes());
            hasher.update(&row.trade_percentage.unwrap_or(f64::NAN).to_le_bytes());
            hasher.update(&row.decision_delay.unwrap_or(i64::MIN).to_le_bytes());
            hasher.update(&row.fee.unwrap_or(f64::NAN).to_le_bytes());
        }
    }

    hasher.update(b"fees");
    for row in fees {
        hasher.update(row.date.to_string().as_bytes());
        hasher.update(&row.value.to_le_bytes());
    }

    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn prices_parse_mixed_timestamp_formats() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            dir.path(),
            "prices.csv",
            "dt,asset,price\n2021-01-01,eth,100\n2021-01-02T00:00:00Z,eth,105.5\n",
        );
        let rows = load_prices(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].price, 105.5);
        assert_eq!(rows[1].date, parse_timestamp("2021-01-02").unwrap());
    }

    #[test]
    fn signal_optional_columns_may_be_missing_or_empty() {
        let dir = tempfile::tempdir().unwrap();
        let minimal = write_csv(dir.path(), "rebalance.csv", "dt\n2021-01-05\n");
        let rows = load_signals(&minimal).unwrap();
        assert_eq!(rows[0].asset, None);
        assert_eq!(rows[0].decision_delay, None);

        let partial = write_csv(
            dir.path(),
            "buy.csv",
            "dt,asset,trade_percentage,decision_delay,fee\n2021-01-05,eth,,3600,\n2021-01-06,,0.5,,\n",
        );
        let rows = load_signals(&partial).unwrap();
        assert_eq!(rows[0].asset.as_deref(), Some("eth"));
        assert_eq!(rows[0].decision_delay, Some(3600));
        assert_eq!(rows[0].trade_percentage, None);
        assert_eq!(rows[1].asset, None);
        assert_eq!(rows[1].trade_percentage, Some(0.5));
    }

    #[test]
    fn bad_timestamp_reports_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            dir.path(),
            "fees.csv",
            "dt,value\n2021-01-01,1.0\nyesterday,2.0\n",
        );
        match load_fees(&path).unwrap_err() {
            LoadError::Timestamp { row, value, .. } => {
                assert_eq!(row, 2);
                assert_eq!(value, "yesterday");
            }
            other => panic!("expected timestamp error, got {other}"),
        }
    }

    #[test]
    fn missing_file_is_csv_error() {
        let err = load_prices(Path::new("/nonexistent/prices.csv")).unwrap_err();
        assert!(matches!(err, LoadError::Csv { .. }));
    }

    #[test]
    fn dataset_hash_is_deterministic_and_content_sensitive() {
        let date = parse_timestamp("2021-01-01").unwrap();
        let prices = vec![PriceRow::new(date, "eth", 100.0)];
        let a = compute_dataset_hash(&prices, None, &[], &[]);
        let b = compute_dataset_hash(&prices, None, &[], &[]);
        assert_eq!(a, b);

        let changed = vec![PriceRow::new(date, "eth", 100.5)];
        assert_ne!(a, compute_dataset_hash(&changed, None, &[], &[]));
    }
}
