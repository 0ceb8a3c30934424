//! Integration tests for the order-book simulator
//!
//! These tests drive the full loop: feed, adapter, matching, ledger, risk.

use std::collections::BTreeMap;
use std::sync::Mutex;

use anyhow::Result;
use approx::assert_relative_eq;

use orderbook_sim::backtest::Backtester;
use orderbook_sim::book::OrderBookSnapshot;
use orderbook_sim::data::{BookRow, MarketDataFeed};
use orderbook_sim::error::BacktestError;
use orderbook_sim::ledger::AccountLedger;
use orderbook_sim::matching::MatchingEngine;
use orderbook_sim::report::{diff_trades, BacktestReport};
use orderbook_sim::risk::RiskMonitor;
use orderbook_sim::strategies::{
    self, MemoBlob, StrategyAdapter, StrategyDecision, TradingState,
};
use orderbook_sim::{Config, Fill, IntendedOrder, Side, Symbol, Tick};

// =============================================================================
// Test Utilities
// =============================================================================

fn kelp() -> Symbol {
    Symbol::new("KELP")
}

fn resin() -> Symbol {
    Symbol::new("RAINFOREST_RESIN")
}

fn row(ts: i64, symbol: &str, bids: Vec<(f64, i64)>, asks: Vec<(f64, i64)>, mid: f64) -> BookRow {
    BookRow {
        tick: Tick::new(0, ts),
        symbol: Symbol::new(symbol),
        bids,
        asks,
        mid_price: mid,
    }
}

/// `ticks` rows of a steady book for each symbol, 100 apart
fn steady_feed(ticks: i64) -> MarketDataFeed {
    let mut rows = Vec::new();
    for i in 0..ticks {
        rows.push(row(i * 100, "KELP", vec![(99.0, 20)], vec![(101.0, 20)], 100.0));
        rows.push(row(
            i * 100,
            "RAINFOREST_RESIN",
            vec![(9_998.0, 25)],
            vec![(10_002.0, 25)],
            10_000.0,
        ));
    }
    MarketDataFeed::from_rows(rows, None).unwrap()
}

/// Adapter that submits a fixed order list at chosen ticks
#[derive(Default)]
struct Script {
    by_tick: BTreeMap<Tick, Vec<IntendedOrder>>,
}

impl Script {
    fn at(mut self, ts: i64, order: IntendedOrder) -> Self {
        self.by_tick.entry(Tick::new(0, ts)).or_default().push(order);
        self
    }
}

impl StrategyAdapter for Script {
    fn name(&self) -> &'static str {
        "script"
    }

    fn step(&self, state: &TradingState<'_>) -> Result<StrategyDecision> {
        let mut decision = StrategyDecision::new(state.memo.clone());
        for order in self.by_tick.get(&state.tick).into_iter().flatten() {
            decision.push(order.clone());
        }
        Ok(decision)
    }
}

fn run(
    strategy: impl StrategyAdapter + 'static,
    risk: RiskMonitor,
    feed: &MarketDataFeed,
) -> Result<BacktestReport, BacktestError> {
    Backtester::new(Box::new(strategy), risk).run(feed)
}

// =============================================================================
// Matching Scenarios
// =============================================================================

#[test]
fn test_scenario_a_sweep_two_levels() {
    let tick = Tick::new(0, 0);
    let mut book = OrderBookSnapshot::from_levels(Vec::new(), [(101.0, 10), (102.0, 5)]);
    let fills = MatchingEngine::new().execute(tick, &mut book, &IntendedOrder::buy("KELP", 102.0, 12));

    let executed: Vec<(f64, i64)> = fills.iter().map(|f| (f.price, f.quantity)).collect();
    assert_eq!(executed, vec![(101.0, 10), (102.0, 2)]);

    let mut ledger = AccountLedger::new([&kelp()]);
    for fill in &fills {
        ledger.apply_fill(fill);
    }
    assert_eq!(ledger.position(&kelp()), 12);
    assert_relative_eq!(ledger.cost_basis(&kelp()), -1214.0);
    assert_eq!(book.ask_volume(102.0), 3);
}

#[test]
fn test_scenario_d_orders_share_liquidity() {
    let feed = MarketDataFeed::from_rows(
        vec![row(0, "KELP", vec![], vec![(101.0, 10), (102.0, 10)], 101.5)],
        None,
    )
    .unwrap();
    let script = Script::default()
        .at(0, IntendedOrder::buy("KELP", 101.0, 10))
        .at(0, IntendedOrder::buy("KELP", 101.0, 5))
        .at(0, IntendedOrder::buy("KELP", 102.0, 4));

    let report = run(script, RiskMonitor::new(), &feed).unwrap();
    let trades: Vec<(f64, i64)> = report.trades.iter().map(|t| (t.price, t.quantity)).collect();

    // the second order finds 101 exhausted and its limit excludes 102
    assert_eq!(trades, vec![(101.0, 10), (102.0, 4)]);
    assert_eq!(report.final_position(&kelp()), 14);
}

#[test]
fn test_buy_below_every_ask_never_fills() {
    let feed = steady_feed(3);
    let script = Script::default()
        .at(0, IntendedOrder::buy("KELP", 100.0, 5))
        .at(100, IntendedOrder::sell("KELP", 100.0, 5));
    let report = run(script, RiskMonitor::new(), &feed).unwrap();
    assert!(report.trades.is_empty());
    assert!(report.positions[&kelp()].iter().all(|&p| p == 0));
}

#[test]
fn test_residual_quantity_is_not_carried() {
    let feed = steady_feed(2);
    let script = Script::default().at(0, IntendedOrder::buy("KELP", 101.0, 30));
    let report = run(script, RiskMonitor::new(), &feed).unwrap();
    // 20 available at tick 0; the remaining 10 never execute later
    assert_eq!(report.trades.len(), 1);
    assert_eq!(report.positions[&kelp()], vec![0, 20, 20]);
}

// =============================================================================
// Risk Scenarios
// =============================================================================

#[test]
fn test_scenario_b_breach_halts_with_partial_report() {
    let feed = steady_feed(4);
    let script = Script::default()
        .at(0, IntendedOrder::buy("KELP", 101.0, 20))
        .at(100, IntendedOrder::buy("KELP", 101.0, 20))
        .at(200, IntendedOrder::buy("KELP", 101.0, 15));
    let risk = RiskMonitor::new().with_limit("KELP", 50);

    let err = run(script, risk, &feed).unwrap_err();
    let BacktestError::LimitBreach { breach, report } = err else {
        panic!("expected a limit breach");
    };

    assert_eq!(breach.tick, Tick::new(0, 200));
    assert_eq!(breach.breaches.len(), 1);
    assert_eq!(breach.breaches[0].symbol, kelp());
    assert_eq!(breach.breaches[0].position, 55);
    assert!(breach.to_string().contains("KELP"));

    // audit trail includes the breaching fill, nothing after it
    assert_eq!(report.trades.len(), 3);
    assert_eq!(report.trades.records()[2].tick(), Tick::new(0, 200));
    assert_eq!(report.ticks.len(), 3);
    assert_eq!(report.positions[&kelp()], vec![0, 20, 40, 55]);
    assert_eq!(report.total_pnl.len(), 4);
}

#[test]
fn test_short_breach_detected() {
    let feed = steady_feed(2);
    let script = Script::default().at(0, IntendedOrder::sell("RAINFOREST_RESIN", 9_998.0, 25));
    let risk = RiskMonitor::new().with_limit("RAINFOREST_RESIN", 20);
    let err = run(script, risk, &feed).unwrap_err();
    assert!(matches!(
        err,
        BacktestError::LimitBreach { ref breach, .. } if breach.breaches[0].position == -25
    ));
}

#[test]
fn test_position_at_limit_is_allowed() {
    let feed = steady_feed(2);
    let script = Script::default().at(0, IntendedOrder::buy("KELP", 101.0, 20));
    let risk = RiskMonitor::new().with_limit("KELP", 20);
    assert!(run(script, risk, &feed).is_ok());
}

// =============================================================================
// Accounting Scenarios
// =============================================================================

#[test]
fn test_scenario_c_mark_uses_carried_price() {
    let feed = MarketDataFeed::from_rows(
        vec![
            row(0, "KELP", vec![], vec![(101.0, 10)], 105.0),
            row(0, "RAINFOREST_RESIN", vec![], vec![], 10_000.0),
            row(100, "RAINFOREST_RESIN", vec![], vec![], 10_000.0),
        ],
        None,
    )
    .unwrap();
    let script = Script::default().at(0, IntendedOrder::buy("KELP", 101.0, 1));

    let report = run(script, RiskMonitor::new(), &feed).unwrap();
    assert_eq!(report.ticks, vec![Tick::new(0, 0), Tick::new(0, 100)]);
    // cash -101 plus one unit marked at 105, at both ticks
    assert_relative_eq!(report.pnl[&kelp()][1], 4.0);
    assert_relative_eq!(report.pnl[&kelp()][2], 4.0);
    assert_eq!(report.reference_prices[&kelp()], vec![(Tick::new(0, 0), 105.0)]);
    assert_eq!(report.reference_prices[&resin()].len(), 2);
}

#[test]
fn test_total_pnl_is_sum_of_instruments() {
    let feed = steady_feed(3);
    let script = Script::default()
        .at(0, IntendedOrder::buy("KELP", 101.0, 5))
        .at(100, IntendedOrder::sell("RAINFOREST_RESIN", 9_998.0, 3));
    let report = run(script, RiskMonitor::new(), &feed).unwrap();

    for i in 0..report.total_pnl.len() {
        let sum: f64 = report.pnl.values().map(|s| s[i]).sum();
        assert_relative_eq!(report.total_pnl[i], sum);
    }
    // KELP: -505 + 5*100 = -5; RESIN: +29994 - 3*10000 = -6
    assert_relative_eq!(report.final_total_pnl(), -11.0);
}

#[test]
fn test_idle_strategy_is_flat() {
    let feed = steady_feed(10);
    let backtester = Backtester::from_config(&Config::default()).unwrap();
    assert_eq!(backtester.strategy_name(), "idle");

    let report = backtester.run(&feed).unwrap();
    assert!(report.trades.is_empty());
    assert_eq!(report.ticks.len(), 10);
    for series in report.positions.values() {
        assert_eq!(series.len(), 11);
        assert!(series.iter().all(|&p| p == 0));
    }
    for series in report.pnl.values() {
        assert!(series.iter().all(|&p| p == 0.0));
    }
    assert!(report.total_pnl.iter().all(|&p| p == 0.0));
}

// =============================================================================
// Loop Contract
// =============================================================================

#[test]
fn test_audit_trail_only_grows() {
    let script = || {
        Script::default()
            .at(0, IntendedOrder::buy("KELP", 101.0, 3))
            .at(200, IntendedOrder::sell("KELP", 99.0, 2))
            .at(300, IntendedOrder::buy("RAINFOREST_RESIN", 10_002.0, 1))
    };

    let mut previous = Vec::new();
    for ticks in 1..=5 {
        let report = run(script(), RiskMonitor::new(), &steady_feed(ticks)).unwrap();
        let records = report.trades.records().to_vec();
        assert!(records.len() >= previous.len());
        assert_eq!(&records[..previous.len()], &previous[..]);
        previous = records;
    }
}

/// Records what the loop hands over each tick
struct Observer {
    seen: Mutex<Vec<(Tick, usize, String)>>,
}

impl StrategyAdapter for Observer {
    fn name(&self) -> &'static str {
        "observer"
    }

    fn step(&self, state: &TradingState<'_>) -> Result<StrategyDecision> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push((state.tick, state.own_trades.len(), state.memo.as_str().to_string()));
        }
        let count = state.memo.as_str().len();
        let mut decision = StrategyDecision::new(MemoBlob("x".repeat(count + 1)));
        if state.tick == Tick::new(0, 100) {
            decision.push(IntendedOrder::buy("KELP", 101.0, 2));
            decision.push(IntendedOrder::buy("RAINFOREST_RESIN", 10_002.0, 1));
        }
        Ok(decision)
    }
}

#[test]
fn test_memo_and_own_trades_flow_to_next_tick_only() {
    let feed = steady_feed(4);
    let observer = std::sync::Arc::new(Observer {
        seen: Mutex::new(Vec::new()),
    });

    struct Shared(std::sync::Arc<Observer>);
    impl StrategyAdapter for Shared {
        fn name(&self) -> &'static str {
            "shared"
        }
        fn step(&self, state: &TradingState<'_>) -> Result<StrategyDecision> {
            self.0.step(state)
        }
    }

    run(Shared(observer.clone()), RiskMonitor::new(), &feed).unwrap();
    let seen = observer.seen.lock().unwrap().clone();

    let memos: Vec<&str> = seen.iter().map(|(_, _, m)| m.as_str()).collect();
    assert_eq!(memos, vec!["", "x", "xx", "xxx"]);

    let own: Vec<usize> = seen.iter().map(|(_, n, _)| *n).collect();
    assert_eq!(own, vec![0, 0, 2, 0]);
}

#[test]
fn test_orders_without_book_are_dropped() {
    let feed = MarketDataFeed::from_rows(
        vec![
            row(0, "KELP", vec![], vec![(101.0, 10)], 100.0),
            row(100, "RAINFOREST_RESIN", vec![], vec![(10_002.0, 5)], 10_000.0),
        ],
        None,
    )
    .unwrap();
    let script = Script::default().at(100, IntendedOrder::buy("KELP", 101.0, 1));
    let report = run(script, RiskMonitor::new(), &feed).unwrap();
    assert!(report.trades.is_empty());
    assert!(report.rejected_orders.is_empty());
}

// =============================================================================
// Registry and Built-in Adapters
// =============================================================================

fn fair_value_config() -> Config {
    let mut config = Config::default();
    config.strategy_name = "fair_value".to_string();
    config.strategy = serde_json::json!({
        "fair_values": {"RAINFOREST_RESIN": 10000.0},
        "take_edge": 1.0,
        "quote_edge": 4.0
    });
    config
}

#[test]
fn test_fair_value_respects_limits() {
    // asks deep below fair on every tick: the adapter must stop at the limit
    let rows: Vec<BookRow> = (0..20)
        .map(|i| {
            row(
                i * 100,
                "RAINFOREST_RESIN",
                vec![(9_990.0, 30)],
                vec![(9_995.0, 30)],
                9_992.5,
            )
        })
        .collect();
    let feed = MarketDataFeed::from_rows(rows, None).unwrap();

    let backtester = Backtester::from_config(&fair_value_config()).unwrap();
    let report = backtester.run(&feed).unwrap();

    let positions = &report.positions[&resin()];
    assert!(positions.iter().all(|p| p.abs() <= 50));
    assert_eq!(*positions.last().unwrap(), 50);
    assert!(report.summary().buys[&resin()] >= 2);
}

#[test]
fn test_register_custom_strategy() {
    fn create(_config: &Config) -> Result<Box<dyn StrategyAdapter>> {
        Ok(Box::new(Script::default().at(0, IntendedOrder::buy("KELP", 101.0, 1))))
    }
    strategies::register_strategy("one_lot", create);
    assert!(strategies::available_strategies().contains(&"one_lot"));

    let config = Config {
        strategy_name: "one_lot".to_string(),
        ..Config::default()
    };
    let report = Backtester::from_config(&config)
        .unwrap()
        .run(&steady_feed(2))
        .unwrap();
    assert_eq!(report.trades.len(), 1);
}

#[test]
fn test_diff_between_variants() {
    let feed = steady_feed(3);
    let a = run(
        Script::default().at(0, IntendedOrder::buy("KELP", 101.0, 1)),
        RiskMonitor::new(),
        &feed,
    )
    .unwrap();
    let b = run(
        Script::default()
            .at(0, IntendedOrder::buy("KELP", 101.0, 1))
            .at(100, IntendedOrder::sell("KELP", 99.0, 1)),
        RiskMonitor::new(),
        &feed,
    )
    .unwrap();

    let diff = diff_trades(a.trades.records(), b.trades.records());
    assert!(diff.only_left.is_empty());
    assert_eq!(diff.only_right.len(), 1);
    assert_eq!(diff.only_right[0].side, Side::Sell);
}

// =============================================================================
// End to End
// =============================================================================

const CSV: &str = "day;timestamp;product;bid_price_1;bid_volume_1;bid_price_2;bid_volume_2;bid_price_3;bid_volume_3;ask_price_1;ask_volume_1;ask_price_2;ask_volume_2;ask_price_3;ask_volume_3;mid_price;profit_and_loss
-1;0;RAINFOREST_RESIN;10002;1;9996;2;9995;29;10004;2;10005;29;;;10003.0;0.0
-1;0;KELP;2028;1;2026;2;2025;29;2029;31;;;;;2028.5;0.0
-1;100;RAINFOREST_RESIN;9996;2;9995;22;;;9998;4;10004;2;10005;22;9997.0;0.0
-1;100;KELP;2025;24;;;;;2028;2;2029;22;;;2026.5;0.0
-1;200;KELP;2025;22;;;;;2028;22;;;;;2026.5;0.0";

#[test]
fn test_csv_to_report_files() {
    let dir = std::env::temp_dir().join(format!("orderbook_sim_it_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let data_file = dir.join("prices.csv");
    std::fs::write(&data_file, CSV).unwrap();

    let mut config = fair_value_config();
    config.simulation.data_file = data_file;
    let feed = MarketDataFeed::load(&config.simulation).unwrap();
    assert_eq!(feed.timeline().len(), 3);
    assert_eq!(feed.symbols().len(), 2);

    let report = Backtester::from_config(&config).unwrap().run(&feed).unwrap();

    // resin: sells 1 into the 10002 bid at tick 0, buys 4 at 9998 at tick 100
    let resin_trades: Vec<(Side, i64, f64)> = report
        .trades
        .iter()
        .filter(|t| t.symbol == resin())
        .map(|t| (t.side, t.quantity, t.price))
        .collect();
    assert_eq!(resin_trades, vec![(Side::Sell, 1, 10_002.0), (Side::Buy, 4, 9_998.0)]);
    assert_eq!(report.final_position(&resin()), 3);

    let out = dir.join("results");
    report.write_to_dir(&out).unwrap();
    for name in ["trades.csv", "pnl.csv", "positions.csv", "summary.json"] {
        assert!(out.join(name).exists(), "missing {}", name);
    }

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_fill_records_match_ledger() {
    let feed = steady_feed(3);
    let script = Script::default()
        .at(0, IntendedOrder::buy("KELP", 101.0, 4))
        .at(100, IntendedOrder::sell("KELP", 99.0, 6));
    let report = run(script, RiskMonitor::new(), &feed).unwrap();

    let net: i64 = report
        .trades
        .iter()
        .filter(|t| t.symbol == kelp())
        .map(|t| match t.side {
            Side::Buy => t.quantity,
            Side::Sell => -t.quantity,
        })
        .sum();
    assert_eq!(net, report.final_position(&kelp()));
    assert_eq!(net, -2);

    let fill = Fill {
        tick: Tick::new(0, 0),
        symbol: kelp(),
        price: 101.0,
        quantity: 4,
        counterparty: orderbook_sim::Counterparty::Own,
    };
    assert_relative_eq!(fill.cash_flow(), -404.0);
}
