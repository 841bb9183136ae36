//! Strategy: the time-stepping orchestrator.
//!
//! Per simulation date:
//! 1. Drift: reweigh the previous composition by the date's price factors.
//! 2. Signals: schedule and authorization triggers, then the stored signals.
//! 3. Trades: ask the policy when any signal is effective.
//! 4. Execution: apply the batch atomically or discard it.
//!
//! The orchestrator owns every store, the portfolio ledger and the trade log.

use crate::assets::{AssetCategory, AssetRegistry, AssetScope};
use crate::config::StrategyConfig;
use crate::domain::{Holdings, PortfolioEntry, PortfolioLedger, Trade, TradeRecord};
use crate::error::{ConfigurationError, SimulationError};
use crate::execution::apply_batch;
use crate::policy::{NoTrades, SignalSet, TradeBuilder, TradeContext};
use crate::prices::{PriceRow, PriceTable};
use crate::proportions::{ProportionRow, RebalanceProportions};
use crate::schedule::{CronSchedule, RebalanceCursor};
use crate::signals::{SignalFamily, SignalOrigin, SignalRow, SignalStore};
use chrono::NaiveDateTime;
use std::collections::BTreeSet;
use tracing::{debug, error, info, warn};

pub const CRON_REBALANCE_SIGNAL: &str = "cron_rebalance";
pub const AUTHORIZATION_BUY_SIGNAL: &str = "authorization_buy";
pub const AUTHORIZATION_SELL_SIGNAL: &str = "authorization_sell";

/// A share-based portfolio strategy.
pub struct Strategy {
    config: StrategyConfig,
    assets: AssetRegistry,
    prices: PriceTable,
    signals: SignalStore,
    proportions: RebalanceProportions,
    cursor: Option<RebalanceCursor>,
    policy: Box<dyn TradeBuilder>,
    /// Initial asset, resolved on initialization.
    init_asset: Option<String>,
    ledger: PortfolioLedger,
    trades: Vec<TradeRecord>,
}

impl std::fmt::Debug for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Strategy")
            .field("config", &self.config)
            .field("policy", &self.policy.name())
            .field("portfolio_dates", &self.ledger.len())
            .field("trades", &self.trades.len())
            .finish()
    }
}

impl Strategy {
    /// New strategy with the [`NoTrades`] policy.
    pub fn new(config: StrategyConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let granularity = config.granularity;
        Ok(Self {
            assets: AssetRegistry::new(config.start, granularity),
            prices: PriceTable::with_gap_fill(granularity, config.gap_fill),
            signals: SignalStore::new(config.start, granularity, config.decision_delay),
            proportions: RebalanceProportions::new(),
            cursor: None,
            policy: Box::new(NoTrades),
            init_asset: config.init_asset.clone(),
            ledger: PortfolioLedger::new(),
            trades: Vec::new(),
            config,
        })
    }

    pub fn with_policy(mut self, policy: Box<dyn TradeBuilder>) -> Self {
        self.policy = policy;
        self
    }

    pub fn set_policy(&mut self, policy: Box<dyn TradeBuilder>) {
        self.policy = policy;
    }

    pub fn policy_name(&self) -> &str {
        self.policy.name()
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn start(&self) -> NaiveDateTime {
        self.config.start
    }

    // ── Stores ───────────────────────────────────────────────────────

    pub fn assets(&self) -> &AssetRegistry {
        &self.assets
    }

    pub fn prices(&self) -> &PriceTable {
        &self.prices
    }

    pub fn signals(&self) -> &SignalStore {
        &self.signals
    }

    pub fn proportions(&self) -> &RebalanceProportions {
        &self.proportions
    }

    pub fn add_assets<I, S>(&mut self, windows: I, category: AssetCategory) -> Result<(), ConfigurationError>
    where
        I: IntoIterator<Item = (S, Vec<NaiveDateTime>)>,
        S: Into<String>,
    {
        self.assets.add(windows, category)
    }

    pub fn remove_assets<I, S>(&mut self, windows: I) -> Result<(), ConfigurationError>
    where
        I: IntoIterator<Item = (S, Vec<NaiveDateTime>)>,
        S: Into<String>,
    {
        self.assets.remove(windows)
    }

    pub fn set_prices<I>(&mut self, rows: I)
    where
        I: IntoIterator<Item = PriceRow>,
    {
        self.prices.set(rows);
    }

    pub fn add_signals<I>(
        &mut self,
        family: SignalFamily,
        rows: I,
        name: Option<&str>,
    ) -> Result<String, ConfigurationError>
    where
        I: IntoIterator<Item = SignalRow>,
    {
        self.signals.add(family, rows, name)
    }

    pub fn remove_signals(&mut self, family: SignalFamily, name: Option<&str>) -> usize {
        self.signals.remove(family, name)
    }

    pub fn set_rebalance_proportions<I>(&mut self, rows: I)
    where
        I: IntoIterator<Item = ProportionRow>,
    {
        self.proportions.set(rows);
    }

    pub fn set_equal_rebalance_proportions(&mut self) {
        self.proportions.set_equal_weights();
    }

    /// Fire a rebalance signal on every occurrence of `cron_expr`.
    ///
    /// The first signal fires on the strategy start unless `skip_on_init`.
    pub fn add_periodic_rebalance(&mut self, cron_expr: &str, skip_on_init: bool) -> Result<(), ConfigurationError> {
        let schedule = CronSchedule::parse(cron_expr)?;
        info!(cron = %schedule, skip_on_init, "periodic rebalance scheduled");
        self.cursor = Some(RebalanceCursor::new(schedule, self.config.start, skip_on_init));
        Ok(())
    }

    // ── Results ──────────────────────────────────────────────────────

    pub fn portfolio(&self) -> &PortfolioLedger {
        &self.ledger
    }

    /// Portfolio as `(date, asset, share)` rows.
    pub fn portfolio_table(&self) -> Vec<PortfolioEntry> {
        self.ledger.entries()
    }

    pub fn trade_log(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn init_asset(&self) -> Option<&str> {
        self.init_asset.as_deref()
    }

    // ── Simulation ───────────────────────────────────────────────────

    /// Simulate from the strategy start to the configured end.
    pub fn run(&mut self) -> Result<(), SimulationError> {
        let start = self.config.start;
        let end = self.config.end.unwrap_or(start);
        self.simulate(start, end, false)
    }

    /// Build the portfolio for every grid date in `[start, end]`.
    ///
    /// With `rebuild`, rows at or after `start` are discarded first. Without
    /// it, dates already computed are skipped with a warning.
    pub fn simulate(&mut self, start: NaiveDateTime, end: NaiveDateTime, rebuild: bool) -> Result<(), SimulationError> {
        let strategy_start = self.config.start;
        if start < strategy_start {
            return Err(SimulationError::StartsBeforeStrategy {
                requested: start,
                strategy_start,
            });
        }
        if end < start {
            return Err(SimulationError::EmptyRange { start, end });
        }

        let granularity = self.config.granularity;
        let prev = granularity.prev(start);
        if start != strategy_start && !self.ledger.contains(&prev) {
            return Err(SimulationError::MissingPreviousStep {
                requested: start,
                previous: prev,
            });
        }

        let needs_init = self.ledger.is_empty() || (rebuild && start == strategy_start);
        let init_asset = if needs_init {
            Some(self.resolve_init_asset()?)
        } else {
            None
        };

        if rebuild {
            self.ledger.truncate_from(start);
            self.trades.retain(|t| t.date < start);
            let discarded = self.signals.discard_generated_from(start);
            let prev_step = if start == strategy_start { start } else { prev };
            if let Some(cursor) = self.cursor.as_mut() {
                cursor.rewind(strategy_start, start, prev_step);
            }
            debug!(%start, discarded, "rebuilding portfolio");
        }

        let mut seeded = false;
        if let Some(asset) = init_asset {
            self.initialize(asset);
            seeded = true;
        }

        info!(%start, %end, policy = self.policy.name(), "simulating");
        for date in granularity.steps(start, end) {
            let prev_date = if date == strategy_start {
                date
            } else {
                granularity.prev(date)
            };

            let is_seed = seeded && date == strategy_start;
            if self.ledger.contains(&date) && !is_seed {
                warn!(%date, "portfolio already computed, skipping");
                continue;
            }

            let Some(previous) = self.ledger.get(&prev_date).cloned() else {
                return Err(SimulationError::MissingPreviousStep {
                    requested: date,
                    previous: prev_date,
                });
            };
            let drifted = self.drift(date, &previous);
            self.ledger.insert(date, drifted);

            let signals = self.gather_signals(date, prev_date);
            if !signals.is_empty() {
                let trades = self.build_trades(date, prev_date, &signals);
                self.execute_trades(date, trades);
            }
        }
        Ok(())
    }

    fn resolve_init_asset(&self) -> Result<String, ConfigurationError> {
        if self.assets.is_empty() {
            return Err(ConfigurationError::NoAssets);
        }
        if let Some(asset) = &self.config.init_asset {
            return Ok(asset.clone());
        }
        self.assets
            .names_for(AssetScope::Reserve)
            .into_iter()
            .next()
            .ok_or(ConfigurationError::NoInitialAsset)
    }

    fn initialize(&mut self, init_asset: String) {
        if self.config.init_asset.is_none() {
            info!(asset = %init_asset, "using first reserve asset as init asset");
        }
        if self.proportions.is_equal_weights() {
            info!("using default (equal) rebalance proportions");
        }
        self.ledger
            .insert(self.config.start, Holdings::single(init_asset.clone()));
        self.init_asset = Some(init_asset);
    }

    /// Reweigh `previous` by the price factors of `date`, renormalized to 1.
    fn drift(&self, date: NaiveDateTime, previous: &Holdings) -> Holdings {
        let accuracy = self.config.accuracy;
        let prev_sum = previous.sum();
        if (prev_sum - 1.0).abs() > accuracy {
            warn!(%date, sum = prev_sum, "previous asset shares don't sum to 1, prices may contain errors");
        }

        let mut drifted = Holdings::new();
        for (asset, share) in previous.iter() {
            match self.prices.price_change(asset, date) {
                Some(factor) => drifted.set(asset, share * factor),
                None => warn!(%date, asset, share, "missing price for held asset, dropping its weight"),
            }
        }

        let sum = drifted.sum();
        if drifted.is_empty() || !sum.is_finite() || sum <= 0.0 {
            warn!(%date, sum, "no usable prices for held assets, carrying composition forward");
            return previous.clone();
        }

        let mut normalized: Holdings = drifted
            .iter()
            .map(|(asset, share)| (asset.to_string(), share / sum))
            .collect();
        normalized.retain_positive();
        normalized
    }

    fn gather_signals(&mut self, date: NaiveDateTime, prev_date: NaiveDateTime) -> SignalSet {
        if let Some(cursor) = self.cursor.as_mut() {
            if cursor.is_due(date) {
                cursor.advance_past(date);
                self.add_generated(
                    SignalFamily::Rebalance,
                    vec![SignalRow::at(date).with_delay(0)],
                    CRON_REBALANCE_SIGNAL,
                    SignalOrigin::Schedule,
                );
            }
        }

        let authorized = self.assets.authorized_on(date, AssetScope::Common);
        let not_start = date != self.config.start;

        if (self.config.add_asset_once_authorized || self.config.sell_assets_once_unauthorized) && not_start {
            let before: BTreeSet<String> = self
                .assets
                .authorized_on(prev_date, AssetScope::Common)
                .into_iter()
                .collect();

            if self.config.add_asset_once_authorized {
                let has_buy = self.signals.asset_names_on(date, SignalFamily::Buy);
                let rows: Vec<SignalRow> = authorized
                    .iter()
                    .filter(|a| !before.contains(*a) && !has_buy.contains(*a))
                    .map(|a| SignalRow::for_asset(date, a.clone()).with_delay(0))
                    .collect();
                if !rows.is_empty() {
                    self.add_generated(SignalFamily::Buy, rows, AUTHORIZATION_BUY_SIGNAL, SignalOrigin::Authorization);
                }
            }

            if self.config.sell_assets_once_unauthorized {
                let has_sell = self.signals.asset_names_on(date, SignalFamily::Sell);
                let rows: Vec<SignalRow> = before
                    .iter()
                    .filter(|a| !authorized.contains(*a) && !has_sell.contains(*a))
                    .map(|a| SignalRow::for_asset(date, a.clone()).with_delay(0))
                    .collect();
                if !rows.is_empty() {
                    self.add_generated(SignalFamily::Sell, rows, AUTHORIZATION_SELL_SIGNAL, SignalOrigin::Authorization);
                }
            }
        }

        let buy = if authorized.is_empty() {
            Vec::new()
        } else {
            self.signals.on_date(date, SignalFamily::Buy, &authorized)
        };
        SignalSet {
            buy,
            sell: self.signals.on_date(date, SignalFamily::Sell, &[]),
            rebalance: self.signals.on_date(date, SignalFamily::Rebalance, &[]),
        }
    }

    fn add_generated(&mut self, family: SignalFamily, rows: Vec<SignalRow>, name: &str, origin: SignalOrigin) {
        let count = rows.len();
        match self.signals.add_with_origin(family, rows, Some(name), origin) {
            Ok(_) => debug!(%family, name, count, "generated signals"),
            Err(e) => error!(%family, name, error = %e, "failed to add generated signals"),
        }
    }

    fn build_trades(&self, date: NaiveDateTime, prev_date: NaiveDateTime, signals: &SignalSet) -> Vec<Trade> {
        let empty = Holdings::new();
        let holdings = self.ledger.get(&date).unwrap_or(&empty);
        let ctx = TradeContext {
            date,
            prev_date,
            signals,
            holdings,
            assets: &self.assets,
            proportions: &self.proportions,
            prices: &self.prices,
        };
        self.policy.build_trades(&ctx)
    }

    fn execute_trades(&mut self, date: NaiveDateTime, trades: Vec<Trade>) {
        if trades.is_empty() {
            return;
        }
        let Some(current) = self.ledger.get(&date).cloned() else {
            return;
        };
        match apply_batch(&current, &trades, self.config.accuracy) {
            Ok(result) => {
                debug!(%date, trades = trades.len(), "trades executed");
                self.trades.extend(
                    trades
                        .into_iter()
                        .enumerate()
                        .map(|(order, trade)| TradeRecord::from_trade(date, order, trade)),
                );
                self.ledger.insert(date, result);
            }
            Err(failure) => {
                error!(
                    %date,
                    order = ?failure.order,
                    error = %failure.error,
                    holdings = ?current,
                    "trades can't be performed, batch discarded"
                );
            }
        }
    }
}
