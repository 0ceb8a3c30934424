//! Back-test simulation loop
//!
//! Walks the feed's clock strictly forward. Each tick:
//! 1. Fresh snapshots for every instrument with a row
//! 2. Strategy step on positions, last tick's own fills and the carried memo
//! 3. Contract check per order; offenders are skipped with a warning
//! 4. Matching per instrument against that instrument's snapshot
//! 5. Fills booked in the ledger and appended to the audit trail
//! 6. Mark-to-market with carried-forward reference prices, then the risk check
//!
//! All run state lives in a [`RunState`] built fresh by every call to
//! [`Backtester::run`], so one `Backtester` can drive any number of runs.

use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use crate::data::{MarketDataFeed, MarketSlice};
use crate::error::{BacktestError, OrderRejection};
use crate::ledger::AccountLedger;
use crate::matching::MatchingEngine;
use crate::report::{BacktestReport, RejectedOrder, TradeLog};
use crate::risk::RiskMonitor;
use crate::strategies::{create_strategy, MemoBlob, StrategyAdapter, TradingState};
use crate::{Config, Fill, IntendedOrder, Symbol, Tick, TradeRecord};

/// Back-test engine
pub struct Backtester {
    strategy: Box<dyn StrategyAdapter>,
    risk: RiskMonitor,
    engine: MatchingEngine,
}

/// Mutable state of one run
struct RunState {
    strategy: &'static str,
    ledger: AccountLedger,
    trades: TradeLog,
    ticks: Vec<Tick>,
    reference_prices: BTreeMap<Symbol, Vec<(Tick, f64)>>,
    rejected: Vec<RejectedOrder>,
    memo: MemoBlob,
    last_fills: Vec<Fill>,
}

impl RunState {
    fn new(strategy: &'static str, feed: &MarketDataFeed) -> Self {
        RunState {
            strategy,
            ledger: AccountLedger::new(feed.symbols()),
            trades: TradeLog::new(),
            ticks: Vec::with_capacity(feed.timeline().len()),
            reference_prices: BTreeMap::new(),
            rejected: Vec::new(),
            memo: MemoBlob::empty(),
            last_fills: Vec::new(),
        }
    }

    fn into_report(self) -> BacktestReport {
        let (positions, pnl, total_pnl) = self.ledger.into_series();
        BacktestReport {
            strategy: self.strategy.to_string(),
            ticks: self.ticks,
            positions,
            pnl,
            total_pnl,
            reference_prices: self.reference_prices,
            trades: self.trades,
            rejected_orders: self.rejected,
        }
    }
}

/// Check one intended order filed under `key` against the known instruments
pub fn validate_order(
    key: &Symbol,
    order: &IntendedOrder,
    known: &BTreeSet<Symbol>,
) -> Result<(), OrderRejection> {
    if !known.contains(key) {
        return Err(OrderRejection::UnknownSymbol(key.clone()));
    }
    if &order.symbol != key {
        return Err(OrderRejection::SymbolMismatch {
            key: key.clone(),
            order: order.symbol.clone(),
        });
    }
    if !order.price.is_finite() {
        return Err(OrderRejection::InvalidPrice(order.price));
    }
    if order.quantity == 0 {
        return Err(OrderRejection::ZeroQuantity);
    }
    Ok(())
}

impl Backtester {
    pub fn new(strategy: Box<dyn StrategyAdapter>, risk: RiskMonitor) -> Self {
        Backtester {
            strategy,
            risk,
            engine: MatchingEngine::new(),
        }
    }

    /// Adapter from the registry, limits from `simulation.position_limits`
    pub fn from_config(config: &Config) -> Result<Self> {
        let strategy = create_strategy(config)?;
        Ok(Self::new(strategy, config.risk_monitor()))
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn risk(&self) -> &RiskMonitor {
        &self.risk
    }

    /// Run over the whole feed.
    ///
    /// Stops at the first tick that leaves a limited position out of bounds;
    /// the error carries the report settled up to and including that tick.
    pub fn run(&self, feed: &MarketDataFeed) -> Result<BacktestReport, BacktestError> {
        let mut run = RunState::new(self.strategy.name(), feed);
        let mut cursor = feed.replay();

        info!(
            strategy = self.strategy.name(),
            ticks = feed.timeline().len(),
            symbols = feed.symbols().len(),
            "Starting back-test"
        );

        while let Some(slice) = cursor.next() {
            let MarketSlice {
                tick,
                mut snapshots,
                observed_prices,
            } = slice;

            let decision = {
                let state = TradingState {
                    tick,
                    books: &snapshots,
                    positions: run.ledger.positions(),
                    own_trades: &run.last_fills,
                    memo: &run.memo,
                    limits: self.risk.limits(),
                };
                self.strategy
                    .step(&state)
                    .map_err(|e| BacktestError::Strategy {
                        tick,
                        message: format!("{:#}", e),
                    })?
            };
            run.memo = decision.memo;

            let mut fills = Vec::new();
            for (symbol, orders) in &decision.orders {
                let mut accepted = Vec::with_capacity(orders.len());
                for order in orders {
                    match validate_order(symbol, order, feed.symbols()) {
                        Ok(()) => accepted.push(order.clone()),
                        Err(reason) => {
                            warn!(tick = %tick, symbol = %symbol, %reason, "Skipping order");
                            run.rejected.push(RejectedOrder {
                                tick,
                                order: order.clone(),
                                reason: reason.to_string(),
                            });
                        }
                    }
                }

                let Some(book) = snapshots.get_mut(symbol) else {
                    if !accepted.is_empty() {
                        debug!(tick = %tick, symbol = %symbol, "No book this tick, orders dropped");
                    }
                    continue;
                };
                fills.extend(self.engine.execute_all(tick, book, &accepted));
            }

            for fill in &fills {
                run.ledger.apply_fill(fill);
                run.trades.append(TradeRecord::from(fill));
            }

            run.ledger.close_step(cursor.reference_prices());
            run.ticks.push(tick);
            for (symbol, price) in observed_prices {
                run.reference_prices
                    .entry(symbol)
                    .or_default()
                    .push((tick, price));
            }

            if let Err(breach) = self.risk.check(tick, run.ledger.positions()) {
                return Err(BacktestError::LimitBreach {
                    breach,
                    report: Box::new(run.into_report()),
                });
            }

            run.last_fills = fills;
        }

        let report = run.into_report();
        info!(
            strategy = self.strategy.name(),
            trades = report.trades.len(),
            pnl = format!("{:.2}", report.final_total_pnl()),
            "Back-test complete"
        );
        Ok(report)
    }
}
