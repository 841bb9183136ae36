//! Valuation series export (CSV).

use anyhow::{Context, Result};
use sharelab_core::valuation::ValuationPoint;
use std::path::Path;

use super::DATE_FORMAT;

pub fn write_valuation_csv(path: &Path, series: &[ValuationPoint]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create valuation CSV {}", path.display()))?;
    writer.write_record(["date", "price_change", "value", "trades"])?;
    for point in series {
        writer.write_record([
            point.date.format(DATE_FORMAT).to_string(),
            point.price_change.to_string(),
            format!("{:.4}", point.value),
            point.trades.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
