//! Single-reserve-asset swap policy.
//!
//! All weight moves through exactly one reserve asset: positions are sold
//! into the reserve and bought out of it.

use super::{TradeBuilder, TradeContext};
use crate::assets::AssetScope;
use crate::domain::Trade;
use crate::signals::Signal;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Swap policy routed through the single authorized reserve asset.
///
/// - Buy and sell signals on the same asset cancel out.
/// - Buys of held assets and sells of assets not held are ignored.
/// - A remaining buy (or a rebalance while more than one asset is held)
///   liquidates every non-reserve position into the reserve and buys the target
///   set at the date's rebalance proportions.
/// - Sells alone liquidate the sold assets and spread the freed weight over the
///   target set.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleReserveSwap;

/// Distinct assets of the signals, first-seen order.
fn unique_assets(signals: &[Signal]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for asset in signals.iter().filter_map(|s| s.asset.as_ref()) {
        if !out.contains(asset) {
            out.push(asset.clone());
        }
    }
    out
}

impl TradeBuilder for SingleReserveSwap {
    fn name(&self) -> &str {
        "single_reserve_swap"
    }

    fn build_trades(&self, ctx: &TradeContext<'_>) -> Vec<Trade> {
        let reserves = ctx.assets.authorized_on(ctx.date, AssetScope::Reserve);
        let [reserve] = reserves.as_slice() else {
            warn!(date = %ctx.date, count = reserves.len(), "policy requires a single authorized reserve asset");
            return Vec::new();
        };

        let current: BTreeMap<&str, f64> = ctx
            .holdings
            .iter()
            .filter(|(_, share)| *share > 0.0)
            .collect();

        let mut to_add = unique_assets(&ctx.signals.buy);
        let mut to_remove = unique_assets(&ctx.signals.sell);

        let both: Vec<String> = to_remove
            .iter()
            .filter(|a| to_add.contains(a))
            .cloned()
            .collect();
        to_add.retain(|a| !both.contains(a) && !current.contains_key(a.as_str()));
        to_remove.retain(|a| !both.contains(a) && current.contains_key(a.as_str()));

        let rebalance = !ctx.signals.rebalance.is_empty();
        if to_add.is_empty() && to_remove.is_empty() && !rebalance {
            return Vec::new();
        }

        let targets: Vec<String> = if current.contains_key(reserve.as_str()) {
            to_add
                .iter()
                .filter(|a| !to_remove.contains(a))
                .cloned()
                .collect()
        } else {
            current
                .keys()
                .map(|a| a.to_string())
                .chain(to_add.iter().cloned())
                .filter(|a| !to_remove.contains(a))
                .collect()
        };
        let target_shares = ctx.proportions.shares_for(ctx.date, &targets);

        let mut trades = Vec::new();
        if !to_add.is_empty() || (rebalance && current.len() > 1) {
            let reason = if to_add.is_empty() { "rebalance" } else { "buy" };
            for (asset, share) in &current {
                if *asset != reserve.as_str() {
                    trades.push(Trade::new(*share, *asset, reserve.clone()).with_metadata(reason));
                }
            }
            for (asset, share) in target_shares {
                trades.push(Trade::new(share, reserve.clone(), asset).with_metadata(reason));
            }
        } else if to_add.is_empty() && !rebalance && !to_remove.is_empty() {
            let mut sold = 0.0;
            for asset in &to_remove {
                let share = current.get(asset.as_str()).copied().unwrap_or(0.0);
                trades.push(Trade::new(share, asset.clone(), reserve.clone()).with_metadata("sell"));
                sold += share;
            }
            for (asset, share) in target_shares {
                trades.push(Trade::new(sold * share, reserve.clone(), asset).with_metadata("sell"));
            }
        }
        debug!(date = %ctx.date, trades = trades.len(), "reserve swap trades built");
        trades
    }
}
