//! Time-range clipping.

use secdb_core::event::Event;
use secdb_core::format::Header;

use crate::error::Result;
use crate::filter::{Filter, Step};

/// One end of a time range: an absolute millisecond timestamp, or a time
/// of day resolved against the file's date when the filter is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeBound {
    Millis(u64),
    TimeOfDay { hour: u32, minute: u32, second: u32 },
}

impl TimeBound {
    fn resolve(self, day_start: u64) -> u64 {
        match self {
            TimeBound::Millis(ms) => ms,
            TimeBound::TimeOfDay {
                hour,
                minute,
                second,
            } => {
                day_start
                    + u64::from(hour) * 3_600_000
                    + u64::from(minute) * 60_000
                    + u64::from(second) * 1_000
            }
        }
    }
}

/// Clips the stream to `[start, end]`; `None` bounds are open.
///
/// Events before `start` are dropped; the first event past `end` ends the
/// stream. As the first stage of a pipeline the filter also drives a
/// reader seek to `start`, so the skipped prefix is never decoded.
/// Cascaded deeper in a stack it only clips; time-of-day bounds still
/// resolve, since every pipeline is attached to its file's header.
#[derive(Debug, Clone)]
pub struct RangeFilter {
    start: Option<TimeBound>,
    end: Option<TimeBound>,
    start_ms: Option<u64>,
    end_ms: Option<u64>,
}

impl RangeFilter {
    pub fn new(start: Option<TimeBound>, end: Option<TimeBound>) -> Self {
        // absolute bounds work even if the filter is never attached
        let fixed = |bound: Option<TimeBound>| match bound {
            Some(TimeBound::Millis(ms)) => Some(ms),
            _ => None,
        };
        Self {
            start_ms: fixed(start),
            end_ms: fixed(end),
            start,
            end,
        }
    }

    /// Range between two absolute millisecond timestamps.
    pub fn between(start: u64, end: u64) -> Self {
        Self::new(Some(TimeBound::Millis(start)), Some(TimeBound::Millis(end)))
    }
}

impl Filter for RangeFilter {
    fn attach(&mut self, header: &Header) -> Result<()> {
        let day_start = header.day_start_ms();
        self.start_ms = self.start.map(|bound| bound.resolve(day_start));
        self.end_ms = self.end.map(|bound| bound.resolve(day_start));
        Ok(())
    }

    fn seek_to(&self) -> Option<u64> {
        self.start_ms
    }

    fn step(&mut self, event: Event) -> Result<Step> {
        let timestamp = event.timestamp();
        if let Some(start) = self.start_ms {
            if timestamp < start {
                return Ok(Step::skip());
            }
        }
        if let Some(end) = self.end_ms {
            if timestamp > end {
                return Ok(Step::end());
            }
        }
        Ok(Step::emit(event))
    }
}
