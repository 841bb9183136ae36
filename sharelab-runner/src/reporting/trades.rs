//! Trade log export (CSV/JSON/Parquet).

use anyhow::{Context, Result};
use polars::prelude::{Column, DataFrame, NamedFrom, ParquetWriter, Series};
use sharelab_core::domain::TradeRecord;
use std::fs::File;
use std::path::Path;

use super::DATE_FORMAT;

pub fn write_trades_csv(path: &Path, trades: &[TradeRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create trades CSV {}", path.display()))?;
    writer.write_record(["date", "order", "share", "from", "to", "fee", "metadata"])?;
    for trade in trades {
        writer.write_record([
            trade.date.format(DATE_FORMAT).to_string(),
            trade.order.to_string(),
            trade.share.to_string(),
            trade.from.clone(),
            trade.to.clone(),
            trade.fee.map(|f| f.to_string()).unwrap_or_default(),
            trade.metadata.clone(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_trades_json(path: &Path, trades: &[TradeRecord]) -> Result<()> {
    let json = serde_json::to_string_pretty(trades)
        .context("Failed to serialize trades")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write trades JSON {}", path.display()))?;
    Ok(())
}

pub fn write_trades_parquet(path: &Path, trades: &[TradeRecord]) -> Result<()> {
    let dates: Vec<String> = trades
        .iter()
        .map(|t| t.date.format(DATE_FORMAT).to_string())
        .collect();
    let orders: Vec<u64> = trades.iter().map(|t| t.order as u64).collect();
    let shares: Vec<f64> = trades.iter().map(|t| t.share).collect();
    let from: Vec<&str> = trades.iter().map(|t| t.from.as_str()).collect();
    let to: Vec<&str> = trades.iter().map(|t| t.to.as_str()).collect();
    let fees: Vec<Option<f64>> = trades.iter().map(|t| t.fee).collect();
    let metadata: Vec<&str> = trades.iter().map(|t| t.metadata.as_str()).collect();

    let mut df = DataFrame::new(vec![
        Column::Series(Series::new("date".into(), dates).into()),
        Column::Series(Series::new("order".into(), orders).into()),
        Column::Series(Series::new("share".into(), shares).into()),
        Column::Series(Series::new("from".into(), from).into()),
        Column::Series(Series::new("to".into(), to).into()),
        Column::Series(Series::new("fee".into(), fees).into()),
        Column::Series(Series::new("metadata".into(), metadata).into()),
    ])
    .context("Failed to build trades dataframe")?;

    let mut file = File::create(path)
        .with_context(|| format!("Failed to create trades parquet {}", path.display()))?;
    ParquetWriter::new(&mut file)
        .finish(&mut df)
        .context("Failed to write trades parquet")?;
    Ok(())
}
