//! Artifact export for simulation runs.
//!
//! Every run gets its own directory named after the output fingerprint:
//! `manifest.json`, `portfolio.csv`, `trades.csv`, `trades.json`,
//! `valuation.csv` and, when enabled, Parquet copies of the portfolio and
//! trade tables.

mod manifest;
mod portfolio;
mod trades;
mod valuation;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::runner::SimulationResult;

pub use manifest::RunManifest;

/// Timestamp format used in every CSV artifact.
pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Artifact paths returned after export.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub run_dir: PathBuf,
    pub manifest: PathBuf,
    pub portfolio_csv: PathBuf,
    pub portfolio_parquet: Option<PathBuf>,
    pub trades_csv: PathBuf,
    pub trades_json: PathBuf,
    pub trades_parquet: Option<PathBuf>,
    pub valuation_csv: PathBuf,
}

/// Manages writing all artifacts for a run.
#[derive(Debug, Clone)]
pub struct ArtifactManager {
    output_dir: PathBuf,
    parquet: bool,
}

impl ArtifactManager {
    pub fn new(output_dir: impl AsRef<Path>) -> Result<Self> {
        let output_dir = output_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&output_dir)
            .context("Failed to create artifact output directory")?;
        Ok(Self {
            output_dir,
            parquet: true,
        })
    }

    pub fn with_parquet(mut self, parquet: bool) -> Self {
        self.parquet = parquet;
        self
    }

    /// Directory name for a run: the first 16 hex digits of its fingerprint.
    pub fn run_dir_name(result: &SimulationResult) -> &str {
        let len = result.fingerprint.len().min(16);
        &result.fingerprint[..len]
    }

    /// Save complete run artifacts.
    pub fn save_run(&self, result: &SimulationResult) -> Result<ArtifactPaths> {
        let run_dir = self.output_dir.join(Self::run_dir_name(result));
        std::fs::create_dir_all(&run_dir)
            .context("Failed to create run artifact directory")?;

        let portfolio_csv = run_dir.join("portfolio.csv");
        portfolio::write_portfolio_csv(&portfolio_csv, &result.portfolio)?;

        let trades_csv = run_dir.join("trades.csv");
        let trades_json = run_dir.join("trades.json");
        trades::write_trades_csv(&trades_csv, &result.trades)?;
        trades::write_trades_json(&trades_json, &result.trades)?;

        let valuation_csv = run_dir.join("valuation.csv");
        valuation::write_valuation_csv(&valuation_csv, &result.valuation)?;

        let (portfolio_parquet, trades_parquet) = if self.parquet {
            let p = run_dir.join("portfolio.parquet");
            let t = run_dir.join("trades.parquet");
            portfolio::write_portfolio_parquet(&p, &result.portfolio)?;
            trades::write_trades_parquet(&t, &result.trades)?;
            (Some(p), Some(t))
        } else {
            (None, None)
        };

        let mut files = vec![
            "portfolio.csv".to_string(),
            "trades.csv".to_string(),
            "trades.json".to_string(),
            "valuation.csv".to_string(),
        ];
        if self.parquet {
            files.push("portfolio.parquet".to_string());
            files.push("trades.parquet".to_string());
        }
        let manifest_path = run_dir.join("manifest.json");
        manifest::write_manifest(&manifest_path, result, files)?;

        tracing::info!(dir = %run_dir.display(), "artifacts saved");

        Ok(ArtifactPaths {
            run_dir,
            manifest: manifest_path,
            portfolio_csv,
            portfolio_parquet,
            trades_csv,
            trades_json,
            trades_parquet,
            valuation_csv,
        })
    }
}
