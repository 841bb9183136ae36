//! Domain types for sharelab

pub mod portfolio;
pub mod time;
pub mod trade;

pub use portfolio::{Holdings, PortfolioEntry, PortfolioLedger};
pub use time::{parse_timestamp, Granularity, GridSteps};
pub use trade::{Trade, TradeRecord};

/// Asset name alias
pub type Asset = String;
