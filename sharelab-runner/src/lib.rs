//! Sharelab Runner: run orchestration on top of the simulation engine.
//!
//! This crate builds on `sharelab-core` to provide:
//! - TOML run configuration with validation
//! - CSV loading for prices, proportions, signals and fees
//! - Single-run runner with valuation and output fingerprinting
//! - Artifact export (CSV, JSON, Parquet, manifest)

pub mod config;
pub mod data_loader;
pub mod reporting;
pub mod runner;

pub use config::{ConfigError, RunConfig, RunId, SignalSource};
pub use data_loader::{load_inputs, LoadError, LoadedInputs, LoadedSignals};
pub use reporting::{ArtifactManager, ArtifactPaths, RunManifest};
pub use runner::{
    build_strategy, fingerprint_tables, run_from_inputs, run_simulation, RunError,
    SimulationResult, SCHEMA_VERSION,
};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn run_config_is_send_sync() {
        assert_send::<RunConfig>();
        assert_sync::<RunConfig>();
    }

    #[test]
    fn simulation_result_is_send_sync() {
        assert_send::<SimulationResult>();
        assert_sync::<SimulationResult>();
    }

    #[test]
    fn loaded_inputs_are_send_sync() {
        assert_send::<LoadedInputs>();
        assert_sync::<LoadedInputs>();
    }

    #[test]
    fn errors_are_send_sync() {
        assert_send::<RunError>();
        assert_sync::<RunError>();
    }
}
