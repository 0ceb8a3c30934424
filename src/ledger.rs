//! Position, cost basis and mark-to-market PnL accounting
//!
//! Every mutation comes from [`AccountLedger::apply_fill`]; series are
//! extended once per tick by [`AccountLedger::close_step`].

use std::collections::BTreeMap;

use crate::{Fill, Symbol};

/// Running per-instrument accounts for one back-test run
#[derive(Debug, Clone, Default)]
pub struct AccountLedger {
    positions: BTreeMap<Symbol, i64>,
    cost_basis: BTreeMap<Symbol, f64>,
    position_series: BTreeMap<Symbol, Vec<i64>>,
    pnl_series: BTreeMap<Symbol, Vec<f64>>,
    total_pnl: Vec<f64>,
}

impl AccountLedger {
    /// Flat ledger; every series starts with a single zero entry
    pub fn new<'a>(symbols: impl IntoIterator<Item = &'a Symbol>) -> Self {
        let mut ledger = AccountLedger {
            total_pnl: vec![0.0],
            ..Default::default()
        };
        for symbol in symbols {
            ledger.open_account(symbol);
        }
        ledger
    }

    fn open_account(&mut self, symbol: &Symbol) {
        if self.positions.contains_key(symbol) {
            return;
        }
        let steps = self.total_pnl.len();
        self.positions.insert(symbol.clone(), 0);
        self.cost_basis.insert(symbol.clone(), 0.0);
        self.position_series.insert(symbol.clone(), vec![0; steps]);
        self.pnl_series.insert(symbol.clone(), vec![0.0; steps]);
    }

    /// Book one fill: buys pay `price * qty`, sells receive it
    pub fn apply_fill(&mut self, fill: &Fill) {
        self.open_account(&fill.symbol);
        if let Some(position) = self.positions.get_mut(&fill.symbol) {
            *position += fill.quantity;
        }
        if let Some(cash) = self.cost_basis.get_mut(&fill.symbol) {
            *cash += fill.cash_flow();
        }
    }

    /// Append the current position and marked PnL of every instrument.
    ///
    /// `marks` holds the last known reference price per instrument; an
    /// instrument never priced is marked at zero, which only matters for a
    /// non-zero position and cannot happen without a prior fill.
    pub fn close_step(&mut self, marks: &BTreeMap<Symbol, f64>) {
        let mut total = 0.0;
        for (symbol, &position) in &self.positions {
            let mark = marks.get(symbol).copied().unwrap_or(0.0);
            let cash = self.cost_basis.get(symbol).copied().unwrap_or(0.0);
            let pnl = cash + position as f64 * mark;
            total += pnl;

            if let Some(series) = self.position_series.get_mut(symbol) {
                series.push(position);
            }
            if let Some(series) = self.pnl_series.get_mut(symbol) {
                series.push(pnl);
            }
        }
        self.total_pnl.push(total);
    }

    pub fn position(&self, symbol: &Symbol) -> i64 {
        self.positions.get(symbol).copied().unwrap_or(0)
    }

    pub fn positions(&self) -> &BTreeMap<Symbol, i64> {
        &self.positions
    }

    pub fn cost_basis(&self, symbol: &Symbol) -> f64 {
        self.cost_basis.get(symbol).copied().unwrap_or(0.0)
    }

    /// Latest marked PnL for `symbol`
    pub fn pnl(&self, symbol: &Symbol) -> f64 {
        self.pnl_series
            .get(symbol)
            .and_then(|s| s.last())
            .copied()
            .unwrap_or(0.0)
    }

    pub fn total_pnl(&self) -> f64 {
        self.total_pnl.last().copied().unwrap_or(0.0)
    }

    pub fn position_series(&self) -> &BTreeMap<Symbol, Vec<i64>> {
        &self.position_series
    }

    pub fn pnl_series(&self) -> &BTreeMap<Symbol, Vec<f64>> {
        &self.pnl_series
    }

    pub fn total_pnl_series(&self) -> &[f64] {
        &self.total_pnl
    }

    /// Consume the ledger, yielding `(positions, pnl, total_pnl)` series
    pub fn into_series(
        self,
    ) -> (
        BTreeMap<Symbol, Vec<i64>>,
        BTreeMap<Symbol, Vec<f64>>,
        Vec<f64>,
    ) {
        (self.position_series, self.pnl_series, self.total_pnl)
    }
}
