//! Strategy adapters
//!
//! Adapters sit behind one narrow interface: they see a read-only
//! [`TradingState`] and hand back intended orders plus the next memo. They
//! hold no run state of their own; anything that must survive between ticks
//! travels through the memo.
//!
//! Implementations are selected by tag through a registry, so adding one
//! never touches the simulation loop.

pub mod fair_value;
pub mod idle;
pub mod memo;

pub use memo::{FairValueMemo, MemoBlob, StrategyMemo};

use crate::book::OrderBookSnapshot;
use crate::{Config, Fill, IntendedOrder, Symbol, Tick};
use anyhow::Result;
use std::collections::{BTreeMap, HashMap};
use std::sync::{OnceLock, PoisonError, RwLock};

// =============================================================================
// Adapter Contract
// =============================================================================

/// Everything an adapter may look at for one tick
#[derive(Debug, Clone, Copy)]
pub struct TradingState<'a> {
    pub tick: Tick,
    /// Snapshots for instruments with a row at this tick
    pub books: &'a BTreeMap<Symbol, OrderBookSnapshot>,
    pub positions: &'a BTreeMap<Symbol, i64>,
    /// Own fills from the previous tick only
    pub own_trades: &'a [Fill],
    pub memo: &'a MemoBlob,
    pub limits: &'a BTreeMap<Symbol, i64>,
}

impl TradingState<'_> {
    pub fn position(&self, symbol: &Symbol) -> i64 {
        self.positions.get(symbol).copied().unwrap_or(0)
    }

    pub fn limit(&self, symbol: &Symbol) -> Option<i64> {
        self.limits.get(symbol).copied()
    }
}

/// Orders grouped by instrument plus the memo for the next tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrategyDecision {
    pub orders: BTreeMap<Symbol, Vec<IntendedOrder>>,
    pub memo: MemoBlob,
}

impl StrategyDecision {
    pub fn new(memo: MemoBlob) -> Self {
        StrategyDecision {
            orders: BTreeMap::new(),
            memo,
        }
    }

    /// Queue an order under its own symbol, keeping presentation order
    pub fn push(&mut self, order: IntendedOrder) {
        self.orders
            .entry(order.symbol.clone())
            .or_default()
            .push(order);
    }

    pub fn order_count(&self) -> usize {
        self.orders.values().map(Vec::len).sum()
    }
}

/// Trading logic plugged into the simulation loop
pub trait StrategyAdapter: Send + Sync {
    /// Registry tag (must match config's strategy_name)
    fn name(&self) -> &'static str;

    /// Decide this tick's orders. An error aborts the run.
    fn step(&self, state: &TradingState<'_>) -> Result<StrategyDecision>;
}

// =============================================================================
// Registry
// =============================================================================

/// Factory function type for creating adapters from config
pub type StrategyFactory = fn(&Config) -> Result<Box<dyn StrategyAdapter>>;

static REGISTRY: OnceLock<RwLock<HashMap<&'static str, StrategyFactory>>> = OnceLock::new();

fn get_registry() -> &'static RwLock<HashMap<&'static str, StrategyFactory>> {
    REGISTRY.get_or_init(|| {
        let mut map = HashMap::new();
        map.insert("idle", idle::create as StrategyFactory);
        map.insert("fair_value", fair_value::create as StrategyFactory);
        RwLock::new(map)
    })
}

/// Create the adapter named by `config.strategy_name`
pub fn create_strategy(config: &Config) -> Result<Box<dyn StrategyAdapter>> {
    let registry = get_registry()
        .read()
        .unwrap_or_else(PoisonError::into_inner);

    let strategy_name = config.strategy_name();
    let factory = registry.get(strategy_name).ok_or_else(|| {
        let mut available: Vec<_> = registry.keys().copied().collect();
        available.sort_unstable();
        anyhow::anyhow!(
            "Unknown strategy: '{}'. Available: {}",
            strategy_name,
            available.join(", ")
        )
    })?;

    factory(config)
}

/// Registered tags, sorted
pub fn available_strategies() -> Vec<&'static str> {
    let mut names: Vec<_> = get_registry()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .keys()
        .copied()
        .collect();
    names.sort_unstable();
    names
}

/// Register a new adapter (for plugins or testing)
pub fn register_strategy(name: &'static str, factory: StrategyFactory) {
    get_registry()
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(name, factory);
}
