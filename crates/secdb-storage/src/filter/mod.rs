//! Stackable event filters.
//!
//! A filter is a stateful transformer sitting between the raw reader and
//! the consumer. Stages stack: the output of stage *k* feeds stage *k+1*,
//! and end-of-stream propagates through each stage in order so buffered
//! output (a trailing candle, say) still reaches the consumer.
//!
//! A stage can also end the stream early by setting [`Step::done`]; the
//! range filter does this the moment an event passes its upper bound,
//! which stops the reader from decoding the rest of the file.
//!
//! Built-ins: [`RangeFilter`] (time clipping, with a reader seek when it
//! is the first stage) and [`CandleFilter`] (OHLC aggregation). User
//! filters implement the same trait; a failing step surfaces as
//! [`crate::Error::Filter`] and aborts iteration.

mod candle;
mod range;

pub use candle::CandleFilter;
pub use range::{RangeFilter, TimeBound};

use secdb_core::event::Event;
use secdb_core::format::Header;

use crate::error::Result;

/// Output of one filter step.
#[derive(Debug, Default)]
pub struct Step {
    /// Events handed to the next stage.
    pub events: Vec<Event>,
    /// True to end the stream after this step.
    pub done: bool,
}

impl Step {
    /// Pass one event through.
    pub fn emit(event: Event) -> Self {
        Self {
            events: vec![event],
            done: false,
        }
    }

    /// Swallow the input.
    pub fn skip() -> Self {
        Self::default()
    }

    /// End the stream, emitting nothing.
    pub fn end() -> Self {
        Self {
            events: Vec::new(),
            done: true,
        }
    }
}

/// A stateful event transformer in a pipeline.
pub trait Filter {
    /// Bind file metadata before iteration starts. Filters that interpret
    /// times of day resolve them against the file's date here.
    fn attach(&mut self, _header: &Header) -> Result<()> {
        Ok(())
    }

    /// Seek target for the backing reader; honored only on the first
    /// stage, where the raw stream is still addressable by timestamp.
    fn seek_to(&self) -> Option<u64> {
        None
    }

    /// Transform one input event.
    fn step(&mut self, event: Event) -> Result<Step>;

    /// Flush buffered output at end of stream.
    fn finish(&mut self) -> Result<Vec<Event>> {
        Ok(Vec::new())
    }
}
