//! OHLC aggregation.

use secdb_core::event::{Candle, Event};

use crate::error::Result;
use crate::filter::{Filter, Step};

/// Running aggregate of one bucket.
#[derive(Debug, Clone, Default)]
struct Bucket {
    start: u64,
    first_mid: Option<i64>,
    last_mid: i64,
    mid_high: i64,
    mid_low: i64,
    first_trade: Option<i64>,
    last_trade: i64,
    trade_high: i64,
    trade_low: i64,
    volume: u64,
}

impl Bucket {
    fn new(start: u64) -> Self {
        Self {
            start,
            ..Default::default()
        }
    }

    fn on_mid(&mut self, mid: i64) {
        if self.first_mid.is_none() {
            self.first_mid = Some(mid);
            self.mid_high = mid;
            self.mid_low = mid;
        } else {
            self.mid_high = self.mid_high.max(mid);
            self.mid_low = self.mid_low.min(mid);
        }
        self.last_mid = mid;
    }

    fn on_trade(&mut self, price: i64, volume: u64) {
        if self.first_trade.is_none() {
            self.first_trade = Some(price);
            self.trade_high = price;
            self.trade_low = price;
        } else {
            self.trade_high = self.trade_high.max(price);
            self.trade_low = self.trade_low.min(price);
        }
        self.last_trade = price;
        self.volume += volume;
    }

    fn close_out(self) -> Candle {
        // open and close track the same source: the bucket's snapshots
        // when it has any, its trades otherwise
        let (open, close) = match (self.first_mid, self.first_trade) {
            (Some(mid), _) => (mid, self.last_mid),
            (None, Some(price)) => (price, self.last_trade),
            (None, None) => (0, 0),
        };
        // high/low prefer traded prices over quoted midpoints
        let (high, low) = if self.first_trade.is_some() {
            (self.trade_high, self.trade_low)
        } else {
            (self.mid_high, self.mid_low)
        };
        Candle {
            time: self.start,
            open,
            high,
            low,
            close,
            volume: self.volume,
        }
    }
}

/// Aggregates snapshots and trades into OHLC+volume candles, one per
/// `period` milliseconds; `period = None` folds the whole stream into a
/// single candle stamped with its first event's timestamp.
///
/// Per candle: `open` is the mid-price of the bucket's first snapshot, or
/// the first trade price when the bucket holds no snapshot; `close` is
/// the last observation of the same source; `high`/`low` run over trade
/// prices, falling back to mid-prices in trade-less buckets; `volume`
/// sums trade volumes; `time` is the bucket's start. A candle is emitted
/// when its bucket boundary is crossed, and the trailing bucket flushes
/// at end of stream.
#[derive(Debug, Clone)]
pub struct CandleFilter {
    period: Option<u64>,
    current: Option<Bucket>,
}

impl CandleFilter {
    pub fn new(period: Option<u64>) -> Self {
        Self {
            period,
            current: None,
        }
    }

    fn bucket_start(&self, timestamp: u64) -> u64 {
        match self.period {
            Some(period) => timestamp / period * period,
            None => timestamp,
        }
    }
}

impl Filter for CandleFilter {
    fn step(&mut self, event: Event) -> Result<Step> {
        let timestamp = event.timestamp();

        let mut events = Vec::new();
        let crossed = match (&self.current, self.period) {
            (Some(bucket), Some(period)) => timestamp >= bucket.start + period,
            _ => false,
        };
        if crossed {
            if let Some(bucket) = self.current.take() {
                events.push(Event::Candle(bucket.close_out()));
            }
        }

        let bucket_start = self.bucket_start(timestamp);
        let bucket = self
            .current
            .get_or_insert_with(|| Bucket::new(bucket_start));
        match event {
            Event::Md(md) => bucket.on_mid(md.mid_price()),
            Event::Trade(trade) => bucket.on_trade(trade.price, trade.volume),
            // an upstream aggregate folds in as its closing trade
            Event::Candle(candle) => bucket.on_trade(candle.close, candle.volume),
        }

        Ok(Step {
            events,
            done: false,
        })
    }

    fn finish(&mut self) -> Result<Vec<Event>> {
        Ok(self
            .current
            .take()
            .map(|bucket| Event::Candle(bucket.close_out()))
            .into_iter()
            .collect())
    }
}
