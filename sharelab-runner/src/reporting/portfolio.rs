//! Portfolio share table export (CSV/Parquet).

use anyhow::{Context, Result};
use polars::prelude::{Column, DataFrame, NamedFrom, ParquetWriter, Series};
use sharelab_core::domain::PortfolioEntry;
use std::fs::File;
use std::path::Path;

use super::DATE_FORMAT;

pub fn write_portfolio_csv(path: &Path, portfolio: &[PortfolioEntry]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create portfolio CSV {}", path.display()))?;
    writer.write_record(["date", "asset", "share"])?;
    for entry in portfolio {
        writer.write_record([
            entry.date.format(DATE_FORMAT).to_string(),
            entry.asset.clone(),
            entry.share.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_portfolio_parquet(path: &Path, portfolio: &[PortfolioEntry]) -> Result<()> {
    let dates: Vec<String> = portfolio
        .iter()
        .map(|e| e.date.format(DATE_FORMAT).to_string())
        .collect();
    let assets: Vec<&str> = portfolio.iter().map(|e| e.asset.as_str()).collect();
    let shares: Vec<f64> = portfolio.iter().map(|e| e.share).collect();

    let mut df = DataFrame::new(vec![
        Column::Series(Series::new("date".into(), dates).into()),
        Column::Series(Series::new("asset".into(), assets).into()),
        Column::Series(Series::new("share".into(), shares).into()),
    ])
    .context("Failed to build portfolio dataframe")?;

    let mut file = File::create(path)
        .with_context(|| format!("Failed to create portfolio parquet {}", path.display()))?;
    ParquetWriter::new(&mut file)
        .finish(&mut df)
        .context("Failed to write portfolio parquet")?;
    Ok(())
}
