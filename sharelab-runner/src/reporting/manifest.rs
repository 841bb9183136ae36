//! Run manifest export (JSON).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::runner::SimulationResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub schema_version: u32,
    pub run_id: String,
    pub fingerprint: String,
    pub dataset_hash: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub duration_secs: f64,
    pub policy: String,
    pub init_asset: Option<String>,
    pub start_date: String,
    pub end_date: String,
    pub dates: usize,
    pub trades: usize,
    pub final_value: Option<f64>,
    pub files: Vec<String>,
}

impl RunManifest {
    pub fn from_result(result: &SimulationResult, files: Vec<String>) -> Self {
        Self {
            schema_version: result.schema_version,
            run_id: result.run_id.clone(),
            fingerprint: result.fingerprint.clone(),
            dataset_hash: result.dataset_hash.clone(),
            timestamp: chrono::Utc::now(),
            duration_secs: result.duration_secs,
            policy: result.policy.clone(),
            init_asset: result.init_asset.clone(),
            start_date: result.start_date.clone(),
            end_date: result.end_date.clone(),
            dates: result.date_count(),
            trades: result.trades.len(),
            final_value: result.final_value(),
            files,
        }
    }
}

pub fn write_manifest(path: &Path, result: &SimulationResult, files: Vec<String>) -> Result<()> {
    let manifest = RunManifest::from_result(result, files);
    let json = serde_json::to_string_pretty(&manifest)
        .context("Failed to serialize run manifest")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write manifest to {}", path.display()))?;
    Ok(())
}
