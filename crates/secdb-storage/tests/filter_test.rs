//! Filter pipeline behavior over real files: range clipping, candle
//! aggregation, stacking, and user-supplied stages.

use std::path::PathBuf;

use chrono::NaiveDate;
use tempfile::TempDir;

use secdb_core::format::DbOptions;
use secdb_core::{Candle, Event, Level, MdSnapshot, Trade};
use secdb_storage::filter::{Filter, Step};
use secdb_storage::{Appender, CandleFilter, RangeFilter, ReaderState, TimeBound};

fn md(timestamp: u64, bid: i64, ask: i64) -> Event {
    Event::Md(MdSnapshot::new(
        timestamp,
        vec![Level::new(bid, 10)],
        vec![Level::new(ask, 10)],
    ))
}

fn trade(timestamp: u64, price: i64, volume: u64) -> Event {
    Event::Trade(Trade {
        timestamp,
        trade_id: timestamp,
        price,
        volume,
    })
}

/// Write `events` into a fresh epoch-day file and return its path.
fn write_file(dir: &TempDir, events: &[Event]) -> PathBuf {
    let path = dir.path().join("X-1970-01-01.secdb");
    let date = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
    let options = DbOptions {
        depth: 1,
        scale: 100,
        chunk_size: 60_000,
    };
    let mut appender = Appender::open(&path, "X", date, options).unwrap();
    for event in events {
        appender.append(event).unwrap();
    }
    appender.close().unwrap();
    path
}

fn collect(path: &PathBuf, filters: Vec<Box<dyn Filter>>) -> Vec<Event> {
    ReaderState::open(path)
        .unwrap()
        .events(filters)
        .unwrap()
        .collect_all()
        .unwrap()
}

// ---------------------------------------------------------------
// Candles over one hour of trades
// ---------------------------------------------------------------

#[test]
fn hourly_candles() {
    let dir = TempDir::new().unwrap();
    let path = write_file(
        &dir,
        &[trade(1, 10, 5), trade(1000, 12, 3), trade(3_600_001, 9, 1)],
    );

    let events = collect(&path, vec![Box::new(CandleFilter::new(Some(3_600_000)))]);
    assert_eq!(
        events,
        vec![
            Event::Candle(Candle {
                time: 0,
                open: 10,
                high: 12,
                low: 10,
                close: 12,
                volume: 8
            }),
            Event::Candle(Candle {
                time: 3_600_000,
                open: 9,
                high: 9,
                low: 9,
                close: 9,
                volume: 1
            }),
        ]
    );
}

// ---------------------------------------------------------------
// Range clipping, absolute and time-of-day
// ---------------------------------------------------------------

#[test]
fn range_clips_absolute_bounds() {
    let dir = TempDir::new().unwrap();
    let all: Vec<Event> = (0..10).map(|i| trade(i * 100, 100 + i as i64, 1)).collect();
    let path = write_file(&dir, &all);

    let events = collect(&path, vec![Box::new(RangeFilter::between(200, 600))]);
    let timestamps: Vec<u64> = events.iter().map(Event::timestamp).collect();
    assert_eq!(timestamps, vec![200, 300, 400, 500, 600]);
}

#[test]
fn range_resolves_time_of_day_against_file_date() {
    let dir = TempDir::new().unwrap();
    // 10:00:00 on the epoch day = 36_000_000 ms
    let path = write_file(
        &dir,
        &[
            trade(35_999_999, 1, 1),
            trade(36_000_000, 2, 1),
            trade(36_000_500, 3, 1),
            trade(36_001_000, 4, 1),
        ],
    );

    let filter = RangeFilter::new(
        Some(TimeBound::TimeOfDay {
            hour: 10,
            minute: 0,
            second: 0,
        }),
        Some(TimeBound::Millis(36_000_500)),
    );
    let events = collect(&path, vec![Box::new(filter)]);
    let timestamps: Vec<u64> = events.iter().map(Event::timestamp).collect();
    assert_eq!(timestamps, vec![36_000_000, 36_000_500]);
}

#[test]
fn open_ended_range_passes_everything() {
    let dir = TempDir::new().unwrap();
    let all: Vec<Event> = (0..5).map(|i| trade(i, 1, 1)).collect();
    let path = write_file(&dir, &all);

    let events = collect(&path, vec![Box::new(RangeFilter::new(None, None))]);
    assert_eq!(events.len(), 5);
}

// ---------------------------------------------------------------
// Composition: range as the seeking first stage behaves like range
// applied to an already-produced event list
// ---------------------------------------------------------------

#[test]
fn range_seek_equals_range_clip() {
    let dir = TempDir::new().unwrap();
    let mut all = Vec::new();
    for i in 0u64..300 {
        all.push(md(i * 1_000, 100 + (i % 7) as i64, 110 + (i % 5) as i64));
        if i % 3 == 0 {
            all.push(trade(i * 1_000, 105, 2));
        }
    }
    let path = write_file(&dir, &all);

    // pipeline: seeking range in front of a candle stage
    let piped = collect(
        &path,
        vec![
            Box::new(RangeFilter::between(50_000, 250_000)),
            Box::new(CandleFilter::new(Some(30_000))),
        ],
    );

    // reference: clip the full decoded list by hand, then run the same
    // candle stage over it
    let mut candle = CandleFilter::new(Some(30_000));
    let mut reference = Vec::new();
    for event in collect(&path, Vec::new()) {
        let ts = event.timestamp();
        if !(50_000..=250_000).contains(&ts) {
            continue;
        }
        reference.extend(candle.step(event).unwrap().events);
    }
    reference.extend(candle.finish().unwrap());

    assert_eq!(piped, reference);
}

// ---------------------------------------------------------------
// End propagation: an early-ending range still flushes the candle
// stage below it
// ---------------------------------------------------------------

#[test]
fn early_end_flushes_downstream_candle() {
    let dir = TempDir::new().unwrap();
    let path = write_file(
        &dir,
        &[
            trade(0, 10, 1),
            trade(1_000, 20, 1),
            trade(200_000, 30, 1), // past the range end
        ],
    );

    let events = collect(
        &path,
        vec![
            Box::new(RangeFilter::between(0, 5_000)),
            Box::new(CandleFilter::new(Some(3_600_000))),
        ],
    );

    assert_eq!(events.len(), 1);
    match &events[0] {
        Event::Candle(candle) => {
            assert_eq!(candle.open, 10);
            assert_eq!(candle.close, 20);
            assert_eq!(candle.volume, 2);
        }
        other => panic!("expected the trailing candle, got {other:?}"),
    }
}

// ---------------------------------------------------------------
// User-supplied stages stack with the built-ins
// ---------------------------------------------------------------

/// Keeps trades, drops everything else.
struct TradesOnly;

impl Filter for TradesOnly {
    fn step(&mut self, event: Event) -> secdb_storage::Result<Step> {
        if event.is_trade() {
            Ok(Step::emit(event))
        } else {
            Ok(Step::skip())
        }
    }
}

#[test]
fn user_filter_stacks_with_builtins() {
    let dir = TempDir::new().unwrap();
    let path = write_file(
        &dir,
        &[
            md(0, 100, 102),
            trade(5, 101, 1),
            md(10, 100, 102),
            trade(150, 99, 2),
            trade(400, 98, 3),
        ],
    );

    let events = collect(
        &path,
        vec![
            Box::new(RangeFilter::between(0, 200)),
            Box::new(TradesOnly),
        ],
    );
    let timestamps: Vec<u64> = events.iter().map(Event::timestamp).collect();
    assert_eq!(timestamps, vec![5, 150]);
}

/// Fails on the first event it sees.
struct Exploding;

impl Filter for Exploding {
    fn step(&mut self, _event: Event) -> secdb_storage::Result<Step> {
        Err(secdb_storage::Error::Filter("boom".to_string()))
    }
}

#[test]
fn failing_filter_aborts_iteration() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, &[trade(0, 1, 1)]);

    let result = ReaderState::open(&path)
        .unwrap()
        .events(vec![Box::new(Exploding)])
        .unwrap()
        .collect_all();
    assert!(matches!(result, Err(secdb_storage::Error::Filter(_))));
}
