//! Error types for the secdb wire format.
//!
//! Everything in this crate returns [`Result<T>`], aliased to
//! `Result<T, Error>`, so decode paths compose with `?`.
//!
//! Two variants deserve a note:
//!
//! - [`Error::Truncated`] means a record ran past the end of the input. At
//!   the tail of a file this is the torn-record signal readers tolerate;
//!   anywhere else callers surface it as corruption.
//! - [`Error::CorruptStream`] is unrecoverable: an unknown tag byte, a
//!   delta record with no snapshot to apply it to, bitmask bits beyond the
//!   book depth, an over-long varint, or a delta that overflows a
//!   reconstructed timestamp, price, or size.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("record truncated at end of input")]
    Truncated,

    #[error("corrupt event stream: {0}")]
    CorruptStream(String),

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("invalid options: {0}")]
    InvalidOptions(String),
}

pub type Result<T> = std::result::Result<T, Error>;
