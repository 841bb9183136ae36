//! Sharelab Core: share-based portfolio simulation.
//!
//! This crate contains the simulation engine:
//! - Domain types (time grid, holdings, trades)
//! - Asset authorization registry (common and reserve assets)
//! - Price table with per-step price factors
//! - Signal store with decision delay
//! - Rebalance proportions and periodic rebalance schedule
//! - Date-by-date orchestrator with pluggable trade policies
//! - Valuation of the resulting portfolio

pub mod assets;
pub mod config;
pub mod domain;
pub mod error;
pub mod execution;
pub mod policy;
pub mod prices;
pub mod proportions;
pub mod schedule;
pub mod signals;
pub mod strategy;
pub mod valuation;

pub use assets::{AssetCategory, AssetRegistry, AssetScope};
pub use config::StrategyConfig;
pub use error::{ConfigurationError, SimulationError, TradeError};
pub use policy::{NoTrades, SingleReserveSwap, TradeBuilder, TradeContext};
pub use strategy::Strategy;
