//! Run output: series, audit trail, summary and result files

use anyhow::{Context, Result};
use ordered_float::OrderedFloat;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::{IntendedOrder, Side, Symbol, Tick, TradeRecord};

// =============================================================================
// Audit Trail
// =============================================================================

/// Append-only trade log; records cannot be changed once pushed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradeLog {
    records: Vec<TradeRecord>,
}

impl TradeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, record: TradeRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[TradeRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TradeRecord> {
        self.records.iter()
    }
}

/// Order dropped before matching
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedOrder {
    pub tick: Tick,
    pub order: IntendedOrder,
    pub reason: String,
}

// =============================================================================
// Report
// =============================================================================

/// Everything a run produced, up to its last settled tick.
///
/// Position and PnL series hold one leading zero entry followed by one
/// entry per settled tick, so `series[i + 1]` belongs to `ticks[i]`.
#[derive(Debug, Clone, Default)]
pub struct BacktestReport {
    pub strategy: String,
    pub ticks: Vec<Tick>,
    pub positions: BTreeMap<Symbol, Vec<i64>>,
    pub pnl: BTreeMap<Symbol, Vec<f64>>,
    pub total_pnl: Vec<f64>,
    /// Reference prices at the ticks they were observed
    pub reference_prices: BTreeMap<Symbol, Vec<(Tick, f64)>>,
    pub trades: TradeLog,
    pub rejected_orders: Vec<RejectedOrder>,
}

/// Headline numbers of one run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub strategy: String,
    pub ticks: usize,
    pub final_pnl: BTreeMap<Symbol, f64>,
    pub total_pnl: f64,
    pub final_positions: BTreeMap<Symbol, i64>,
    pub transactions: usize,
    pub buys: BTreeMap<Symbol, usize>,
    pub sells: BTreeMap<Symbol, usize>,
    pub max_drawdown: f64,
    pub rejected_orders: usize,
}

/// Largest peak-to-trough fall of a PnL series
pub fn max_drawdown(series: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0f64;
    for &value in series {
        peak = peak.max(value);
        worst = worst.max(peak - value);
    }
    worst
}

impl BacktestReport {
    pub fn final_total_pnl(&self) -> f64 {
        self.total_pnl.last().copied().unwrap_or(0.0)
    }

    pub fn final_position(&self, symbol: &Symbol) -> i64 {
        self.positions
            .get(symbol)
            .and_then(|s| s.last())
            .copied()
            .unwrap_or(0)
    }

    pub fn summary(&self) -> RunSummary {
        let mut buys = BTreeMap::new();
        let mut sells = BTreeMap::new();
        for record in self.trades.iter() {
            let counter = match record.side {
                Side::Buy => &mut buys,
                Side::Sell => &mut sells,
            };
            *counter.entry(record.symbol.clone()).or_insert(0) += 1;
        }

        RunSummary {
            strategy: self.strategy.clone(),
            ticks: self.ticks.len(),
            final_pnl: self
                .pnl
                .iter()
                .map(|(s, series)| (s.clone(), series.last().copied().unwrap_or(0.0)))
                .collect(),
            total_pnl: self.final_total_pnl(),
            final_positions: self
                .positions
                .keys()
                .map(|s| (s.clone(), self.final_position(s)))
                .collect(),
            transactions: self.trades.len(),
            buys,
            sells,
            max_drawdown: max_drawdown(&self.total_pnl),
            rejected_orders: self.rejected_orders.len(),
        }
    }

    /// Write `trades.csv`, `pnl.csv`, `positions.csv` and `summary.json`
    pub fn write_to_dir(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create results dir {}", dir.display()))?;

        let trades_path = dir.join("trades.csv");
        let mut writer = csv::Writer::from_path(&trades_path)
            .with_context(|| format!("Failed to create {}", trades_path.display()))?;
        for record in self.trades.iter() {
            writer.serialize(record)?;
        }
        writer.flush()?;

        let total: BTreeMap<Symbol, Vec<f64>> =
            BTreeMap::from([(Symbol::new("total"), self.total_pnl.clone())]);
        self.write_series(&dir.join("pnl.csv"), [&self.pnl, &total])?;
        self.write_series(&dir.join("positions.csv"), [&self.positions])?;

        let summary_path = dir.join("summary.json");
        let json = serde_json::to_string_pretty(&self.summary())?;
        fs::write(&summary_path, json)
            .with_context(|| format!("Failed to write {}", summary_path.display()))?;

        Ok(())
    }

    /// One row per settled tick, one column per series
    fn write_series<T: ToString, const N: usize>(
        &self,
        path: &Path,
        groups: [&BTreeMap<Symbol, Vec<T>>; N],
    ) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;

        let columns: Vec<(&Symbol, &Vec<T>)> = groups.iter().flat_map(|g| g.iter()).collect();
        let mut header = vec!["day".to_string(), "timestamp".to_string()];
        header.extend(columns.iter().map(|(s, _)| s.to_string()));
        writer.write_record(&header)?;

        for (i, tick) in self.ticks.iter().enumerate() {
            let mut row = vec![tick.day.to_string(), tick.timestamp.to_string()];
            row.extend(
                columns
                    .iter()
                    .map(|(_, series)| series.get(i + 1).map(ToString::to_string).unwrap_or_default()),
            );
            writer.write_record(&row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Strategy:       {}", self.strategy)?;
        writeln!(f, "Ticks:          {}", self.ticks)?;
        writeln!(f, "Transactions:   {}", self.transactions)?;
        writeln!(f, "Rejected:       {}", self.rejected_orders)?;
        writeln!(f, "Max drawdown:   {:.2}", self.max_drawdown)?;
        writeln!(
            f,
            "{:<20} {:>12} {:>10} {:>6} {:>6}",
            "Symbol", "PnL", "Position", "Buys", "Sells"
        )?;
        for (symbol, pnl) in &self.final_pnl {
            writeln!(
                f,
                "{:<20} {:>12.2} {:>10} {:>6} {:>6}",
                symbol.as_str(),
                pnl,
                self.final_positions.get(symbol).copied().unwrap_or(0),
                self.buys.get(symbol).copied().unwrap_or(0),
                self.sells.get(symbol).copied().unwrap_or(0)
            )?;
        }
        write!(f, "{:<20} {:>12.2}", "TOTAL", self.total_pnl)
    }
}

// =============================================================================
// Comparison
// =============================================================================

type TradeKey = (Tick, Side, i64, Symbol, OrderedFloat<f64>);

fn trade_key(record: &TradeRecord) -> TradeKey {
    (
        record.tick(),
        record.side,
        record.quantity,
        record.symbol.clone(),
        OrderedFloat(record.price),
    )
}

/// Trades found in only one of two runs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradeDiff {
    pub only_left: Vec<TradeRecord>,
    pub only_right: Vec<TradeRecord>,
}

impl TradeDiff {
    pub fn is_empty(&self) -> bool {
        self.only_left.is_empty() && self.only_right.is_empty()
    }
}

/// Multiset difference of two audit trails; repeated identical trades count separately
pub fn diff_trades(left: &[TradeRecord], right: &[TradeRecord]) -> TradeDiff {
    let mut counts: BTreeMap<TradeKey, i64> = BTreeMap::new();
    for record in left {
        *counts.entry(trade_key(record)).or_insert(0) += 1;
    }
    for record in right {
        *counts.entry(trade_key(record)).or_insert(0) -= 1;
    }

    let mut diff = TradeDiff::default();
    for record in left {
        if let Some(c) = counts.get_mut(&trade_key(record)) {
            if *c > 0 {
                *c -= 1;
                diff.only_left.push(record.clone());
            }
        }
    }
    for record in right {
        if let Some(c) = counts.get_mut(&trade_key(record)) {
            if *c < 0 {
                *c += 1;
                diff.only_right.push(record.clone());
            }
        }
    }
    diff
}
