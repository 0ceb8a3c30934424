//! Historical order-book data loading
//!
//! Reads the semicolon-delimited activity table, either as a standalone CSV
//! or from the "Activities log:" section of a raw log, builds the
//! fixed-stride global clock and replays per-tick order-book snapshots.
//! Raw logs may also carry a "Trade History:" JSON array, kept for audit replay.

use itertools::Itertools;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Read;
use tracing::{debug, info, warn};

use crate::book::OrderBookSnapshot;
use crate::config::{DataFormat, SimulationConfig};
use crate::error::DataError;
use crate::{HistoricalTrade, Symbol, Tick};

// =============================================================================
// Constants
// =============================================================================

const ACTIVITIES_HEADER: &str = "Activities log:";
const TRADE_HISTORY_HEADER: &str = "Trade History:";
const SECTION_BREAK: &str = "\n\n\n\n";

/// Book depth carried by each activity row
pub const BOOK_DEPTH: usize = 3;

// =============================================================================
// Row Parsing
// =============================================================================

/// One line of the activity table as written by the exchange
#[derive(Debug, Deserialize)]
struct ActivityRow {
    day: Option<i64>,
    timestamp: Option<i64>,
    product: Option<String>,
    bid_price_1: Option<f64>,
    bid_volume_1: Option<f64>,
    bid_price_2: Option<f64>,
    bid_volume_2: Option<f64>,
    bid_price_3: Option<f64>,
    bid_volume_3: Option<f64>,
    ask_price_1: Option<f64>,
    ask_volume_1: Option<f64>,
    ask_price_2: Option<f64>,
    ask_volume_2: Option<f64>,
    ask_price_3: Option<f64>,
    ask_volume_3: Option<f64>,
    mid_price: Option<f64>,
}

/// Validated order-book row for one instrument at one tick
#[derive(Debug, Clone, PartialEq)]
pub struct BookRow {
    pub tick: Tick,
    pub symbol: Symbol,
    /// `(price, volume)`, best first, empty levels dropped
    pub bids: Vec<(f64, i64)>,
    /// `(price, magnitude)`, best first, empty levels dropped
    pub asks: Vec<(f64, i64)>,
    pub mid_price: f64,
}

impl BookRow {
    /// Fresh snapshot owned by the caller
    pub fn snapshot(&self) -> OrderBookSnapshot {
        OrderBookSnapshot::from_levels(self.bids.iter().copied(), self.asks.iter().copied())
    }
}

impl ActivityRow {
    fn validate(self, row: usize) -> Result<BookRow, DataError> {
        let day = self.day.ok_or(DataError::MissingField { row, field: "day" })?;
        let timestamp = self.timestamp.ok_or(DataError::MissingField {
            row,
            field: "timestamp",
        })?;
        let product = self
            .product
            .filter(|p| !p.trim().is_empty())
            .ok_or(DataError::MissingField {
                row,
                field: "product",
            })?;
        let mid_price = self.mid_price.ok_or(DataError::MissingField {
            row,
            field: "mid_price",
        })?;
        if !mid_price.is_finite() {
            return Err(DataError::MalformedRow {
                row,
                message: format!("mid_price {} is not finite", mid_price),
            });
        }

        let bid_levels = [
            (self.bid_price_1, self.bid_volume_1),
            (self.bid_price_2, self.bid_volume_2),
            (self.bid_price_3, self.bid_volume_3),
        ];
        let ask_levels = [
            (self.ask_price_1, self.ask_volume_1),
            (self.ask_price_2, self.ask_volume_2),
            (self.ask_price_3, self.ask_volume_3),
        ];

        let mut bids = Vec::with_capacity(BOOK_DEPTH);
        for (i, (price, volume)) in bid_levels.into_iter().enumerate() {
            if let Some(level) = parse_level(row, "bid", i + 1, price, volume)? {
                bids.push(level);
            }
        }
        let mut asks = Vec::with_capacity(BOOK_DEPTH);
        for (i, (price, volume)) in ask_levels.into_iter().enumerate() {
            if let Some(level) = parse_level(row, "ask", i + 1, price, volume)? {
                asks.push(level);
            }
        }

        Ok(BookRow {
            tick: Tick::new(day, timestamp),
            symbol: Symbol::new(product.trim()),
            bids,
            asks,
            mid_price,
        })
    }
}

/// A level is absent when its volume is zero or undefined
fn parse_level(
    row: usize,
    side: &str,
    level: usize,
    price: Option<f64>,
    volume: Option<f64>,
) -> Result<Option<(f64, i64)>, DataError> {
    let volume = match volume {
        None => return Ok(None),
        Some(v) if v.is_nan() || v == 0.0 => return Ok(None),
        Some(v) => v,
    };
    if !volume.is_finite() || volume < 0.0 || volume.fract() != 0.0 {
        return Err(DataError::MalformedRow {
            row,
            message: format!("{}_volume_{} = {} is not a whole positive volume", side, level, volume),
        });
    }
    match price {
        Some(p) if p.is_finite() => Ok(Some((p, volume as i64))),
        _ => Err(DataError::MalformedRow {
            row,
            message: format!("{}_volume_{} has no valid {}_price_{}", side, level, side, level),
        }),
    }
}

/// Convert a configured delimiter to the byte the CSV reader expects
pub fn delimiter_byte(delimiter: char) -> Result<u8, DataError> {
    if delimiter.is_ascii() {
        Ok(delimiter as u8)
    } else {
        Err(DataError::InvalidDelimiter(delimiter))
    }
}

/// Parse an activity table into validated rows
pub fn parse_activity_table<R: Read>(reader: R, delimiter: u8) -> Result<Vec<BookRow>, DataError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut rows = Vec::new();
    for (idx, result) in reader.deserialize::<ActivityRow>().enumerate() {
        // +2 for 1-indexed and header row
        let row = idx + 2;
        let record = result.map_err(|source| DataError::Csv { row, source })?;
        rows.push(record.validate(row)?);
    }
    Ok(rows)
}

// =============================================================================
// Raw Log Sections
// =============================================================================

/// Text of the "Activities log:" table, up to the next section or EOF
pub fn activities_section(text: &str) -> Result<&str, DataError> {
    let start = text
        .find(ACTIVITIES_HEADER)
        .ok_or(DataError::MissingSection(ACTIVITIES_HEADER))?
        + ACTIVITIES_HEADER.len();
    let body = text[start..].trim_start_matches([' ', '\r', '\n']);
    let end = [body.find(SECTION_BREAK), body.find(TRADE_HISTORY_HEADER)]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(body.len());
    Ok(body[..end].trim_end())
}

/// Trades listed after "Trade History:"; empty when the section is absent
pub fn parse_trade_history(text: &str) -> Result<Vec<HistoricalTrade>, DataError> {
    let Some(start) = text.find(TRADE_HISTORY_HEADER) else {
        return Ok(Vec::new());
    };
    let body = &text[start + TRADE_HISTORY_HEADER.len()..];
    // Only the first JSON value belongs to the section
    let mut values = serde_json::Deserializer::from_str(body).into_iter::<Vec<HistoricalTrade>>();
    match values.next() {
        Some(trades) => Ok(trades?),
        None => Ok(Vec::new()),
    }
}

// =============================================================================
// Global Clock
// =============================================================================

fn gcd(a: i64, b: i64) -> i64 {
    if b == 0 {
        a.abs()
    } else {
        gcd(b, a % b)
    }
}

/// Largest stride that puts every observed timestamp on the grid
fn infer_stride(days: &BTreeMap<i64, BTreeSet<i64>>) -> i64 {
    days.values()
        .flat_map(|stamps| stamps.iter().tuple_windows().map(|(a, b)| b - a))
        .fold(0, gcd)
        .max(1)
}

fn build_timeline(days: &BTreeMap<i64, BTreeSet<i64>>, stride: i64) -> Vec<Tick> {
    let mut timeline = Vec::new();
    for (&day, stamps) in days {
        let (Some(&first), Some(&last)) = (stamps.first(), stamps.last()) else {
            continue;
        };
        timeline.extend(
            (first..=last)
                .step_by(stride as usize)
                .map(|ts| Tick::new(day, ts)),
        );
    }
    timeline
}

// =============================================================================
// Market Data Feed
// =============================================================================

/// Read-only historical data indexed by the global clock
#[derive(Debug, Clone)]
pub struct MarketDataFeed {
    symbols: BTreeSet<Symbol>,
    timeline: Vec<Tick>,
    stride: i64,
    rows: BTreeMap<Tick, Vec<BookRow>>,
    trade_history: Vec<HistoricalTrade>,
}

impl MarketDataFeed {
    /// Load the configured data file
    pub fn load(config: &SimulationConfig) -> Result<Self, DataError> {
        let path = &config.data_file;
        let delimiter = delimiter_byte(config.delimiter)?;
        let text = fs::read_to_string(path).map_err(|source| DataError::Io {
            path: path.clone(),
            source,
        })?;

        let feed = match config.format.resolve(path) {
            DataFormat::Log => Self::from_log_str(&text, delimiter, config.tick_stride)?,
            DataFormat::Csv | DataFormat::Auto => {
                Self::from_reader(text.as_bytes(), delimiter, config.tick_stride)?
            }
        };

        info!(
            "Loaded {} rows for {} symbols from {:?}: {} ticks, stride {}",
            feed.row_count(),
            feed.symbols.len(),
            path.file_name().unwrap_or_default(),
            feed.timeline.len(),
            feed.stride
        );
        Ok(feed)
    }

    /// Build from a delimited activity table
    pub fn from_reader<R: Read>(
        reader: R,
        delimiter: u8,
        stride: Option<i64>,
    ) -> Result<Self, DataError> {
        let rows = parse_activity_table(reader, delimiter)?;
        Self::from_rows(rows, stride)
    }

    /// Build from a raw log, keeping its trade history
    pub fn from_log_str(text: &str, delimiter: u8, stride: Option<i64>) -> Result<Self, DataError> {
        let activities = activities_section(text)?;
        let mut feed = Self::from_reader(activities.as_bytes(), delimiter, stride)?;
        feed.trade_history = parse_trade_history(text)?;
        debug!("Parsed {} historical trades", feed.trade_history.len());
        Ok(feed)
    }

    /// Index validated rows on a fixed-stride clock.
    ///
    /// With an explicit stride, rows that fall between grid points are
    /// dropped with a warning.
    pub fn from_rows(rows: Vec<BookRow>, stride: Option<i64>) -> Result<Self, DataError> {
        if rows.is_empty() {
            return Err(DataError::Empty);
        }

        let mut days: BTreeMap<i64, BTreeSet<i64>> = BTreeMap::new();
        for row in &rows {
            days.entry(row.tick.day).or_default().insert(row.tick.timestamp);
        }

        let stride = match stride {
            Some(s) if s <= 0 => return Err(DataError::InvalidStride(s)),
            Some(s) => s,
            None => infer_stride(&days),
        };
        let timeline = build_timeline(&days, stride);
        let day_start: BTreeMap<i64, i64> = days
            .iter()
            .filter_map(|(&day, stamps)| stamps.first().map(|&first| (day, first)))
            .collect();

        let mut symbols = BTreeSet::new();
        let mut indexed: BTreeMap<Tick, Vec<BookRow>> = BTreeMap::new();
        let mut off_grid = 0usize;

        for row in rows {
            let start = day_start.get(&row.tick.day).copied().unwrap_or(0);
            if (row.tick.timestamp - start) % stride != 0 {
                off_grid += 1;
                continue;
            }
            let slot = indexed.entry(row.tick).or_default();
            if slot.iter().any(|r| r.symbol == row.symbol) {
                return Err(DataError::DuplicateSnapshot {
                    symbol: row.symbol,
                    tick: row.tick,
                });
            }
            symbols.insert(row.symbol.clone());
            slot.push(row);
        }

        if off_grid > 0 {
            warn!("Dropped {} rows that fall between {}-stride ticks", off_grid, stride);
        }

        Ok(MarketDataFeed {
            symbols,
            timeline,
            stride,
            rows: indexed,
            trade_history: Vec::new(),
        })
    }

    pub fn symbols(&self) -> &BTreeSet<Symbol> {
        &self.symbols
    }

    pub fn timeline(&self) -> &[Tick] {
        &self.timeline
    }

    pub fn stride(&self) -> i64 {
        self.stride
    }

    pub fn trade_history(&self) -> &[HistoricalTrade] {
        &self.trade_history
    }

    /// Rows observed at exactly `tick`
    pub fn rows_at(&self, tick: Tick) -> &[BookRow] {
        self.rows.get(&tick).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn row_count(&self) -> usize {
        self.rows.values().map(Vec::len).sum()
    }

    /// Walk the clock from the first tick, carrying reference prices forward
    pub fn replay(&self) -> FeedCursor<'_> {
        FeedCursor {
            feed: self,
            next: 0,
            last_prices: BTreeMap::new(),
        }
    }
}

/// Everything the feed knows about one tick
#[derive(Debug, Clone)]
pub struct MarketSlice {
    pub tick: Tick,
    /// Fresh snapshots for instruments with a row at this tick
    pub snapshots: BTreeMap<Symbol, OrderBookSnapshot>,
    /// Reference prices observed at this tick
    pub observed_prices: BTreeMap<Symbol, f64>,
}

/// Forward-only iterator over the feed's clock
#[derive(Debug)]
pub struct FeedCursor<'a> {
    feed: &'a MarketDataFeed,
    next: usize,
    last_prices: BTreeMap<Symbol, f64>,
}

impl FeedCursor<'_> {
    /// Last observed reference price, carried across ticks without a row
    pub fn reference_price(&self, symbol: &Symbol) -> Option<f64> {
        self.last_prices.get(symbol).copied()
    }

    pub fn reference_prices(&self) -> &BTreeMap<Symbol, f64> {
        &self.last_prices
    }
}

impl Iterator for FeedCursor<'_> {
    type Item = MarketSlice;

    fn next(&mut self) -> Option<MarketSlice> {
        let tick = *self.feed.timeline.get(self.next)?;
        self.next += 1;

        let mut snapshots = BTreeMap::new();
        let mut observed_prices = BTreeMap::new();
        for row in self.feed.rows_at(tick) {
            snapshots.insert(row.symbol.clone(), row.snapshot());
            observed_prices.insert(row.symbol.clone(), row.mid_price);
            self.last_prices.insert(row.symbol.clone(), row.mid_price);
        }

        Some(MarketSlice {
            tick,
            snapshots,
            observed_prices,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.feed.timeline.len().saturating_sub(self.next);
        (left, Some(left))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "day;timestamp;product;bid_price_1;bid_volume_1;bid_price_2;bid_volume_2;bid_price_3;bid_volume_3;ask_price_1;ask_volume_1;ask_price_2;ask_volume_2;ask_price_3;ask_volume_3;mid_price;profit_and_loss";

    fn table(rows: &[&str]) -> String {
        let mut s = HEADER.to_string();
        for r in rows {
            s.push('\n');
            s.push_str(r);
        }
        s
    }

    fn feed(rows: &[&str]) -> Result<MarketDataFeed, DataError> {
        MarketDataFeed::from_reader(table(rows).as_bytes(), b';', None)
    }

    #[test]
    fn test_parses_levels_and_drops_empty_ones() {
        let feed = feed(&["0;0;KELP;99;5;98;0;;;101;10;102;5;;;100.0;0.0"]).unwrap();
        let row = &feed.rows_at(Tick::new(0, 0))[0];
        assert_eq!(row.bids, vec![(99.0, 5)]);
        assert_eq!(row.asks, vec![(101.0, 10), (102.0, 5)]);
        assert_eq!(row.mid_price, 100.0);

        let book = row.snapshot();
        assert_eq!(book.signed_asks(), vec![(101.0, -10), (102.0, -5)]);
    }

    #[test]
    fn test_missing_mid_price_is_fatal() {
        let err = feed(&["0;0;KELP;99;5;;;;;101;10;;;;;;0.0"]).unwrap_err();
        assert!(matches!(
            err,
            DataError::MissingField {
                row: 2,
                field: "mid_price"
            }
        ));
    }

    #[test]
    fn test_volume_without_price_is_malformed() {
        let err = feed(&["0;0;KELP;;5;;;;;101;10;;;;;100;0.0"]).unwrap_err();
        assert!(matches!(err, DataError::MalformedRow { row: 2, .. }));
    }

    #[test]
    fn test_unparseable_field_reports_row() {
        let err = feed(&[
            "0;0;KELP;99;5;;;;;101;10;;;;;100;0.0",
            "0;100;KELP;abc;5;;;;;101;10;;;;;100;0.0",
        ])
        .unwrap_err();
        assert!(matches!(err, DataError::Csv { row: 3, .. }));
    }

    #[test]
    fn test_duplicate_snapshot_rejected() {
        let err = feed(&[
            "0;0;KELP;99;5;;;;;101;10;;;;;100;0.0",
            "0;0;KELP;99;5;;;;;101;10;;;;;100;0.0",
        ])
        .unwrap_err();
        assert!(matches!(err, DataError::DuplicateSnapshot { .. }));
    }

    #[test]
    fn test_empty_table_rejected() {
        assert!(matches!(feed(&[]).unwrap_err(), DataError::Empty));
    }

    #[test]
    fn test_stride_inferred_and_gaps_filled() {
        let feed = feed(&[
            "0;0;KELP;99;5;;;;;101;10;;;;;100;0.0",
            "0;300;KELP;99;5;;;;;101;10;;;;;100;0.0",
            "0;400;RESIN;9;5;;;;;11;10;;;;;10;0.0",
        ])
        .unwrap();
        assert_eq!(feed.stride(), 100);
        assert_eq!(feed.timeline().len(), 5);
        assert_eq!(feed.symbols().len(), 2);
        assert!(feed.rows_at(Tick::new(0, 200)).is_empty());
    }

    #[test]
    fn test_days_are_sequenced_on_one_clock() {
        let feed = feed(&[
            "-1;0;KELP;99;5;;;;;101;10;;;;;100;0.0",
            "-1;100;KELP;99;5;;;;;101;10;;;;;100;0.0",
            "0;0;KELP;99;5;;;;;101;10;;;;;100;0.0",
        ])
        .unwrap();
        assert_eq!(
            feed.timeline(),
            &[Tick::new(-1, 0), Tick::new(-1, 100), Tick::new(0, 0)]
        );
    }

    #[test]
    fn test_explicit_stride_drops_off_grid_rows() {
        let feed = MarketDataFeed::from_reader(
            table(&[
                "0;0;KELP;99;5;;;;;101;10;;;;;100;0.0",
                "0;50;KELP;99;5;;;;;101;10;;;;;100;0.0",
                "0;100;KELP;99;5;;;;;101;10;;;;;100;0.0",
            ])
            .as_bytes(),
            b';',
            Some(100),
        )
        .unwrap();
        assert_eq!(feed.timeline().len(), 2);
        assert_eq!(feed.row_count(), 2);

        let err = MarketDataFeed::from_reader(table(&[]).as_bytes(), b';', Some(0));
        assert!(err.is_err());
    }

    #[test]
    fn test_reference_price_carried_forward() {
        let feed = feed(&[
            "0;0;KELP;99;5;;;;;101;10;;;;;105;0.0",
            "0;0;RESIN;9;5;;;;;11;10;;;;;10;0.0",
            "0;100;RESIN;9;5;;;;;11;10;;;;;10;0.0",
        ])
        .unwrap();
        let kelp = Symbol::new("KELP");
        let mut cursor = feed.replay();

        let first = cursor.next().unwrap();
        assert!(first.snapshots.contains_key(&kelp));

        let second = cursor.next().unwrap();
        assert!(!second.snapshots.contains_key(&kelp));
        assert!(!second.observed_prices.contains_key(&kelp));
        assert_eq!(cursor.reference_price(&kelp), Some(105.0));
        assert!(cursor.next().is_none());
    }

    #[test]
    fn test_log_sections() {
        let log = format!(
            "Sandbox logs:\n{{}}\n\n\n\nActivities log:\n{}\n\n\n\n\nTrade History:\n[\n  {{\"timestamp\": 0, \"buyer\": \"SUBMISSION\", \"seller\": \"\", \"symbol\": \"KELP\", \"currency\": \"SEASHELLS\", \"price\": 101, \"quantity\": 2}}\n]\ntrailing",
            table(&["0;0;KELP;99;5;;;;;101;10;;;;;100;0.0"])
        );
        let feed = MarketDataFeed::from_log_str(&log, b';', None).unwrap();
        assert_eq!(feed.row_count(), 1);
        assert_eq!(feed.trade_history().len(), 1);
        assert_eq!(feed.trade_history()[0].buyer, "SUBMISSION");
    }

    #[test]
    fn test_log_without_activities_is_fatal() {
        let err = MarketDataFeed::from_log_str("Trade History:\n[]", b';', None).unwrap_err();
        assert!(matches!(err, DataError::MissingSection(_)));
    }

    #[test]
    fn test_non_ascii_delimiter_rejected() {
        assert!(delimiter_byte('§').is_err());
        assert_eq!(delimiter_byte(';').unwrap(), b';');
    }
}
