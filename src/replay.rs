//! Audit replay of a raw log's trade history
//!
//! The exchange records every trade of the session; ours are the ones with
//! `SUBMISSION` on either side.

use std::collections::BTreeMap;

use crate::{Counterparty, HistoricalTrade, Symbol, Tick};

/// Party name the exchange uses for the submitted strategy
pub const SUBMISSION: &str = "SUBMISSION";

pub fn counterparty(trade: &HistoricalTrade) -> Counterparty {
    if trade.buyer == SUBMISSION || trade.seller == SUBMISSION {
        Counterparty::Own
    } else {
        Counterparty::Market
    }
}

/// Signed quantity the submission gained from one trade
fn own_delta(trade: &HistoricalTrade) -> i64 {
    let mut delta = 0;
    if trade.buyer == SUBMISSION {
        delta += trade.quantity;
    }
    if trade.seller == SUBMISSION {
        delta -= trade.quantity;
    }
    delta
}

/// Historical trades split by who took part
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OwnTradeSummary {
    pub buys: Vec<HistoricalTrade>,
    pub sells: Vec<HistoricalTrade>,
    pub market: Vec<HistoricalTrade>,
}

impl OwnTradeSummary {
    /// Net position from own trades per instrument
    pub fn positions(&self) -> BTreeMap<Symbol, i64> {
        let mut positions = BTreeMap::new();
        for trade in &self.buys {
            *positions.entry(trade.symbol.clone()).or_insert(0) += trade.quantity;
        }
        for trade in &self.sells {
            *positions.entry(trade.symbol.clone()).or_insert(0) -= trade.quantity;
        }
        positions
    }

    pub fn own_count(&self) -> usize {
        self.buys.len() + self.sells.len()
    }
}

/// Self-crossed trades land in both `buys` and `sells`
pub fn own_trade_summary(trades: &[HistoricalTrade]) -> OwnTradeSummary {
    let mut summary = OwnTradeSummary::default();
    for trade in trades {
        match counterparty(trade) {
            Counterparty::Market => summary.market.push(trade.clone()),
            Counterparty::Own => {
                if trade.buyer == SUBMISSION {
                    summary.buys.push(trade.clone());
                }
                if trade.seller == SUBMISSION {
                    summary.sells.push(trade.clone());
                }
            }
        }
    }
    summary
}

/// Submission position in `symbol` at every tick, led by a zero entry.
///
/// A trade without a day belongs to the first day of `timeline`; raw logs
/// cover one session and omit it.
pub fn own_position_series(trades: &[HistoricalTrade], symbol: &Symbol, timeline: &[Tick]) -> Vec<i64> {
    let first_day = timeline.first().map(|tick| tick.day).unwrap_or_default();
    let mut deltas: BTreeMap<Tick, i64> = BTreeMap::new();
    for trade in trades.iter().filter(|t| &t.symbol == symbol) {
        let tick = Tick::new(trade.day.unwrap_or(first_day), trade.timestamp);
        *deltas.entry(tick).or_insert(0) += own_delta(trade);
    }

    let mut series = Vec::with_capacity(timeline.len() + 1);
    let mut position = 0;
    series.push(position);
    for tick in timeline {
        if let Some(delta) = deltas.get(tick) {
            position += delta;
        }
        series.push(position);
    }
    series
}
