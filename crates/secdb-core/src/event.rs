//! Event model: order-book snapshots, trades, and candle aggregates.
//!
//! All prices are scaled integers: a file-level `scale` (default 100) maps
//! a float price onto `round(price * scale)`. Working in ticks keeps the
//! delta codec exact and sidesteps float comparison; the `*_f64` helpers
//! convert back at the edges.

use serde::{Deserialize, Serialize};

/// One price level of an order-book side. Missing levels are `(0, 0)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    /// Scaled integer price.
    pub price: i64,
    /// Quantity at this price.
    pub size: u64,
}

impl Level {
    pub fn new(price: i64, size: u64) -> Self {
        Self { price, size }
    }

    /// Price as a float under the given scale.
    pub fn price_f64(&self, scale: u32) -> f64 {
        self.price as f64 / scale as f64
    }

    pub fn is_empty(&self) -> bool {
        self.price == 0 && self.size == 0
    }
}

/// Full order-book state at one instant: `depth` bid and `depth` ask
/// levels, best first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MdSnapshot {
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Bid levels, best (highest) first.
    pub bid: Vec<Level>,
    /// Ask levels, best (lowest) first.
    pub ask: Vec<Level>,
}

impl MdSnapshot {
    pub fn new(timestamp: u64, bid: Vec<Level>, ask: Vec<Level>) -> Self {
        Self { timestamp, bid, ask }
    }

    /// Midpoint of the best bid and best ask, in ticks.
    pub fn mid_price(&self) -> i64 {
        let bid = self.bid.first().map(|level| level.price).unwrap_or(0);
        let ask = self.ask.first().map(|level| level.price).unwrap_or(0);
        (bid + ask) / 2
    }
}

/// An executed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub trade_id: u64,
    /// Scaled integer price.
    pub price: i64,
    pub volume: u64,
}

impl Trade {
    /// Price as a float under the given scale.
    pub fn price_f64(&self, scale: u32) -> f64 {
        self.price as f64 / scale as f64
    }
}

/// OHLC + volume aggregate over one time bucket.
///
/// Candles are produced by the candle filter; they are never stored on
/// disk and the record codec has no tag for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    /// Start of the bucket, milliseconds since the Unix epoch.
    pub time: u64,
    pub open: i64,
    pub high: i64,
    pub low: i64,
    pub close: i64,
    /// Sum of trade volumes in the bucket.
    pub volume: u64,
}

impl Candle {
    /// The four prices as floats under the given scale.
    pub fn ohlc_f64(&self, scale: u32) -> (f64, f64, f64, f64) {
        let scale = scale as f64;
        (
            self.open as f64 / scale,
            self.high as f64 / scale,
            self.low as f64 / scale,
            self.close as f64 / scale,
        )
    }
}

/// A single entry of an event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    Md(MdSnapshot),
    Trade(Trade),
    Candle(Candle),
}

impl Event {
    /// Timestamp of the event (bucket start for candles).
    pub fn timestamp(&self) -> u64 {
        match self {
            Event::Md(md) => md.timestamp,
            Event::Trade(trade) => trade.timestamp,
            Event::Candle(candle) => candle.time,
        }
    }

    pub fn is_md(&self) -> bool {
        matches!(self, Event::Md(_))
    }

    pub fn is_trade(&self) -> bool {
        matches!(self, Event::Trade(_))
    }
}
