//! Storage error types.
//!
//! Policy (mirrored in the engine):
//!
//! - Readers tolerate exactly one kind of damage: a record torn at the end
//!   of the file, which silently ends the stream. Everything else is
//!   surfaced, never papered over.
//! - Appenders fail fast. A rejected append leaves the file readable up to
//!   the last complete record.
//! - Filters are pure transforms; a failing user filter aborts iteration
//!   with [`Error::Filter`].

use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database file not found: {0}")]
    NotFound(PathBuf),

    #[error("incompatible header: {field} is {stored} on disk, {given} requested")]
    IncompatibleHeader {
        field: &'static str,
        stored: String,
        given: String,
    },

    #[error("out-of-order append: timestamp {timestamp} after {last}")]
    OutOfOrder { timestamp: u64, last: u64 },

    #[error("timestamp {timestamp} outside trading day {date}")]
    OutOfRange { timestamp: u64, date: NaiveDate },

    #[error("event stream exceeds the 4 GiB chunkmap offset range")]
    FileTooLarge,

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("filter error: {0}")]
    Filter(String),

    #[error(transparent)]
    Format(#[from] secdb_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
