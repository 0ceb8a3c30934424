//! Core data types shared by the feed, matching engine and ledger

use serde::{Deserialize, Serialize};

/// Tradable product symbol
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Symbol(pub String);

impl Symbol {
    pub fn new(s: impl Into<String>) -> Self {
        Symbol(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Symbol(s.to_string())
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Symbol(s)
    }
}

/// Point on the global simulation clock.
///
/// Ordered by day first, then by timestamp within the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tick {
    pub day: i64,
    pub timestamp: i64,
}

impl Tick {
    pub fn new(day: i64, timestamp: i64) -> Self {
        Tick { day, timestamp }
    }
}

impl std::fmt::Display for Tick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.day, self.timestamp)
    }
}

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Side {
    #[serde(rename = "B")]
    Buy,
    #[serde(rename = "S")]
    Sell,
}

impl Side {
    /// Side implied by a signed quantity; `None` for zero
    pub fn from_quantity(quantity: i64) -> Option<Side> {
        match quantity {
            q if q > 0 => Some(Side::Buy),
            q if q < 0 => Some(Side::Sell),
            _ => None,
        }
    }
}

/// A strategy's desired immediate execution.
///
/// Positive quantity buys, negative sells. Never rests on a book: whatever
/// does not match within the current tick is dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntendedOrder {
    pub symbol: Symbol,
    pub price: f64,
    pub quantity: i64,
}

impl IntendedOrder {
    pub fn new(symbol: impl Into<Symbol>, price: f64, quantity: i64) -> Self {
        IntendedOrder {
            symbol: symbol.into(),
            price,
            quantity,
        }
    }

    pub fn buy(symbol: impl Into<Symbol>, price: f64, quantity: i64) -> Self {
        Self::new(symbol, price, quantity.abs())
    }

    pub fn sell(symbol: impl Into<Symbol>, price: f64, quantity: i64) -> Self {
        Self::new(symbol, price, -quantity.abs())
    }

    pub fn side(&self) -> Option<Side> {
        Side::from_quantity(self.quantity)
    }
}

/// Which party a trade was executed for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Counterparty {
    /// The simulated strategy ("self")
    #[serde(rename = "self")]
    Own,
    /// Any other market participant
    #[serde(rename = "other")]
    Market,
}

/// Executed quantity at one price level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub tick: Tick,
    pub symbol: Symbol,
    pub price: f64,
    /// Signed: positive bought, negative sold
    pub quantity: i64,
    pub counterparty: Counterparty,
}

impl Fill {
    pub fn side(&self) -> Option<Side> {
        Side::from_quantity(self.quantity)
    }

    /// Cash moved by this fill: negative for buys, positive for sells
    pub fn cash_flow(&self) -> f64 {
        -(self.quantity as f64) * self.price
    }
}

/// One row of the append-only audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub day: i64,
    pub timestamp: i64,
    pub side: Side,
    /// Unsigned executed quantity
    pub quantity: i64,
    pub symbol: Symbol,
    pub price: f64,
}

impl TradeRecord {
    pub fn tick(&self) -> Tick {
        Tick::new(self.day, self.timestamp)
    }
}

impl From<&Fill> for TradeRecord {
    /// Fills out of the matching engine always carry a non-zero quantity
    fn from(fill: &Fill) -> Self {
        debug_assert!(fill.quantity != 0, "zero-quantity fill");
        let side = if fill.quantity < 0 { Side::Sell } else { Side::Buy };
        TradeRecord {
            day: fill.tick.day,
            timestamp: fill.tick.timestamp,
            side,
            quantity: fill.quantity.abs(),
            symbol: fill.symbol.clone(),
            price: fill.price,
        }
    }
}

/// Trade as recorded by the exchange in a raw log's trade history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalTrade {
    /// Absent in single-day logs
    #[serde(default)]
    pub day: Option<i64>,
    pub timestamp: i64,
    #[serde(default)]
    pub buyer: String,
    #[serde(default)]
    pub seller: String,
    pub symbol: Symbol,
    #[serde(default)]
    pub currency: Option<String>,
    pub price: f64,
    pub quantity: i64,
}
