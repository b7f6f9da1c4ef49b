//! secdb storage engine: append-mode writer, read-mode scanner, the
//! filter pipeline, and file discovery.
//!
//! One `.secdb` file holds one (symbol, trading day) partition. A file
//! handle is strictly one of [`Appender`] or [`ReaderState`]; switching
//! modes means close and reopen.
//!
//! ```text
//! append path:  caller ──► Appender ──► codec ──► file
//! read path:    file ──► header + chunkmap ──► Scanner ──► filters ──► caller
//! ```
//!
//! ## Writing
//!
//! ```ignore
//! let mut appender = secdb_storage::open_append("AAPL", "2012-01-15", DbOptions::default())?;
//! appender.append(&Event::Md(snapshot))?;
//! appender.append(&Event::Trade(trade))?;
//! appender.close()?;
//! ```
//!
//! ## Reading
//!
//! ```ignore
//! let events = secdb_storage::events(
//!     "AAPL",
//!     "2012-01-15",
//!     vec![
//!         Box::new(RangeFilter::new(
//!             Some(TimeBound::TimeOfDay { hour: 10, minute: 0, second: 0 }),
//!             None,
//!         )),
//!         Box::new(CandleFilter::new(Some(60_000))),
//!     ],
//! )?;
//! ```
//!
//! The free functions resolve (symbol, date) under the process-wide root
//! (`SECDB_ROOT`, default `db`); use a [`Catalog`] directly to point
//! elsewhere.

pub mod appender;
pub mod catalog;
pub mod error;
pub mod filter;
pub mod info;
pub mod reader;

pub use appender::Appender;
pub use catalog::Catalog;
pub use error::{Error, Result};
pub use filter::{CandleFilter, Filter, RangeFilter, Step, TimeBound};
pub use info::{info, FileInfo};
pub use reader::{EventIter, ReaderState, Scanner};

use chrono::NaiveDate;
use secdb_core::event::Event;
use secdb_core::format::DbOptions;

/// Open (symbol, date) for appending under the process-wide root.
pub fn open_append(symbol: &str, date: &str, options: DbOptions) -> Result<Appender> {
    Catalog::shared().open_append(symbol, date, options)
}

/// Open (symbol, date) for reading under the process-wide root.
pub fn open_read(symbol: &str, date: &str) -> Result<ReaderState> {
    Catalog::shared().open_read(symbol, date)
}

/// All events of (symbol, date) under the process-wide root, run through
/// `filters`.
pub fn events(symbol: &str, date: &str, filters: Vec<Box<dyn Filter>>) -> Result<Vec<Event>> {
    Catalog::shared().events(symbol, date, filters)
}

/// Distinct symbols under the process-wide root, sorted.
pub fn symbols() -> Result<Vec<String>> {
    Catalog::shared().symbols()
}

/// Sorted dates stored for `symbol` under the process-wide root.
pub fn dates(symbol: &str) -> Result<Vec<NaiveDate>> {
    Catalog::shared().dates(symbol)
}

/// Sorted dates stored for every symbol in `symbols` under the
/// process-wide root.
pub fn common_dates(symbols: &[&str]) -> Result<Vec<NaiveDate>> {
    Catalog::shared().common_dates(symbols)
}
