//! Rebuild behavior: recomputing a window reproduces untouched history and
//! picks up store changes made after the first run.

use chrono::{Duration, NaiveDateTime};
use sharelab_core::domain::{parse_timestamp, Granularity};
use sharelab_core::prices::PriceRow;
use sharelab_core::signals::{SignalFamily, SignalRow};
use sharelab_core::strategy::{AUTHORIZATION_SELL_SIGNAL, CRON_REBALANCE_SIGNAL};
use sharelab_core::{AssetCategory, SimulationError, SingleReserveSwap, Strategy, StrategyConfig};

fn ts(s: &str) -> NaiveDateTime {
    parse_timestamp(s).unwrap()
}

fn day(n: i64) -> NaiveDateTime {
    ts("2021-01-01") + Duration::days(n)
}

/// 20 days, two commons, eth unauthorized after day 12, weekly rebalance.
fn strategy() -> Strategy {
    let config = StrategyConfig::new(day(0))
        .with_granularity(Granularity::days(1))
        .with_init_asset("dai");
    let mut s = Strategy::new(config)
        .unwrap()
        .with_policy(Box::new(SingleReserveSwap));
    s.add_assets([("dai", vec![day(0), day(30)])], AssetCategory::Reserve)
        .unwrap();
    s.add_assets(
        [("eth", vec![day(0), day(12)]), ("uni", vec![day(0), day(30)])],
        AssetCategory::Common,
    )
    .unwrap();

    let mut rows = Vec::new();
    for d in 0..20 {
        rows.push(PriceRow::new(day(d), "dai", 1.0));
        rows.push(PriceRow::new(day(d), "eth", 100.0 + 5.0 * (d % 4) as f64));
        rows.push(PriceRow::new(day(d), "uni", 20.0 - (d % 3) as f64));
    }
    s.set_prices(rows);
    s.add_signals(
        SignalFamily::Buy,
        [SignalRow::for_asset(day(1), "eth"), SignalRow::for_asset(day(1), "uni")],
        Some("entry"),
    )
    .unwrap();
    s.add_periodic_rebalance("0 0 * * mon", false).unwrap();
    s
}

#[test]
fn full_rebuild_reproduces_tables() {
    let mut s = strategy();
    s.simulate(day(0), day(19), false).unwrap();
    let portfolio = s.portfolio_table();
    let trades = s.trade_log().to_vec();
    assert!(!trades.is_empty());

    s.simulate(day(0), day(19), true).unwrap();
    assert_eq!(s.portfolio_table(), portfolio);
    assert_eq!(s.trade_log(), trades.as_slice());
}

#[test]
fn partial_rebuild_reproduces_tables() {
    let mut s = strategy();
    s.simulate(day(0), day(19), false).unwrap();
    let portfolio = s.portfolio_table();
    let trades = s.trade_log().to_vec();

    for from in [5, 12, 13, 19] {
        s.simulate(day(from), day(19), true).unwrap();
        assert_eq!(s.portfolio_table(), portfolio, "rebuild from day {from}");
        assert_eq!(s.trade_log(), trades.as_slice(), "rebuild from day {from}");
    }
}

#[test]
fn generated_signals_are_not_duplicated_by_rebuild() {
    let mut s = strategy();
    s.simulate(day(0), day(19), false).unwrap();
    let generated = |s: &Strategy| {
        s.signals()
            .iter(SignalFamily::Rebalance)
            .filter(|sig| sig.name == CRON_REBALANCE_SIGNAL)
            .count()
            + s.signals()
                .iter(SignalFamily::Sell)
                .filter(|sig| sig.name == AUTHORIZATION_SELL_SIGNAL)
                .count()
    };
    let before = generated(&s);
    assert!(before > 0);

    s.simulate(day(8), day(19), true).unwrap();
    assert_eq!(generated(&s), before);
}

#[test]
fn eth_is_sold_once_unauthorized() {
    let mut s = strategy();
    s.simulate(day(0), day(19), false).unwrap();
    assert!(s.portfolio().get(&day(12)).unwrap().holds("eth"));
    assert!(!s.portfolio().get(&day(13)).unwrap().holds("eth"));
    for d in 13..20 {
        assert!(!s.portfolio().get(&day(d)).unwrap().holds("eth"));
    }
}

#[test]
fn rebuild_picks_up_new_signals_and_keeps_history() {
    let mut s = strategy();
    s.simulate(day(0), day(19), false).unwrap();
    let before: Vec<_> = s
        .portfolio_table()
        .into_iter()
        .filter(|e| e.date < day(15))
        .collect();

    s.add_signals(SignalFamily::Sell, [SignalRow::for_asset(day(15), "uni")], Some("exit"))
        .unwrap();

    // without rebuild the computed dates are kept as they are
    s.simulate(day(15), day(19), false).unwrap();
    assert!(s.portfolio().get(&day(15)).unwrap().holds("uni"));

    s.simulate(day(15), day(19), true).unwrap();
    let after: Vec<_> = s
        .portfolio_table()
        .into_iter()
        .filter(|e| e.date < day(15))
        .collect();
    assert_eq!(after, before);
    let day15 = s.portfolio().get(&day(15)).unwrap();
    assert!(!day15.holds("uni"));
    assert_eq!(day15.get("dai"), Some(1.0));
}

#[test]
fn simulation_extends_existing_history() {
    let mut s = strategy();
    s.simulate(day(0), day(9), false).unwrap();
    s.simulate(day(10), day(19), false).unwrap();
    let split = s.portfolio_table();

    let mut whole = strategy();
    whole.simulate(day(0), day(19), false).unwrap();
    assert_eq!(split, whole.portfolio_table());
    assert_eq!(s.trade_log(), whole.trade_log());
}

#[test]
fn gap_before_requested_start_is_rejected() {
    let mut s = strategy();
    s.simulate(day(0), day(5), false).unwrap();
    let err = s.simulate(day(8), day(10), false).unwrap_err();
    assert!(matches!(err, SimulationError::MissingPreviousStep { .. }));
    assert_eq!(s.portfolio().len(), 6);
}
