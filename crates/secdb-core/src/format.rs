//! File header, chunkmap, and offset arithmetic.
//!
//! Layout of a `.secdb` file, in write order:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ Header                                                      │
//! │ - ASCII key=value lines, one per option, '\n' terminated    │
//! │ - block ends with an empty line                             │
//! │ - required keys: version symbol date depth scale chunk_size │
//! │ - unknown keys are ignored on read                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Chunkmap                                                    │
//! │ - N big-endian u32 entries, N = ceil(86_400_000/chunk_size) │
//! │ - entry b = file offset of the first full MD whose          │
//! │   timestamp falls in bucket b, or 0 = absent                │
//! │ - written zeroed at creation, entries overwritten in place  │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Event stream                                                │
//! │ - concatenated records (see codec)                          │
//! │ - the first MD of each bucket is a full snapshot            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The chunkmap starts at `len(header_bytes)` and the event stream at
//! `chunkmap_offset + 4 * N`; both sides derive these offsets from the
//! parsed header rather than storing them.
//!
//! The chunkmap is the sole random-access index: seeking to a timestamp
//! means a floor lookup here, then a forward scan. Because every anchor is
//! a full snapshot, delta state always rebuilds after a landing.

use bytes::{Buf, BufMut};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Current file format version.
pub const FORMAT_VERSION: u32 = 2;

/// Milliseconds in one UTC trading day.
pub const DAY_MS: u64 = 86_400_000;

/// Deepest book a file may store, per side.
pub const MAX_DEPTH: u32 = 32;

/// Canonical file extension.
pub const FILE_EXTENSION: &str = "secdb";

/// Creation-time options of a file. Immutable once the file exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbOptions {
    /// Book depth stored per side (1..=32).
    pub depth: u32,
    /// Price scale: stored price = round(price * scale).
    pub scale: u32,
    /// Chunk width in milliseconds.
    pub chunk_size: u64,
}

impl Default for DbOptions {
    fn default() -> Self {
        Self {
            depth: 1,
            scale: 100,
            chunk_size: 300_000, // 5 minutes
        }
    }
}

impl DbOptions {
    pub fn validate(&self) -> Result<()> {
        if self.depth == 0 || self.depth > MAX_DEPTH {
            return Err(Error::InvalidOptions(format!(
                "depth {} outside 1..={MAX_DEPTH}",
                self.depth
            )));
        }
        if self.scale == 0 {
            return Err(Error::InvalidOptions("scale must be positive".to_string()));
        }
        if self.chunk_size == 0 || self.chunk_size > DAY_MS {
            return Err(Error::InvalidOptions(format!(
                "chunk_size {} outside 1..={DAY_MS}",
                self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Number of chunkmap entries a file with this chunk width carries.
pub fn chunk_count(chunk_size: u64) -> usize {
    ((DAY_MS + chunk_size - 1) / chunk_size) as usize
}

/// Parse a trading date; accepts `YYYY-MM-DD`, `YYYY/MM/DD`, `YYYY.MM.DD`.
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    for pattern in ["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(value, pattern) {
            return Ok(date);
        }
    }
    Err(Error::InvalidOptions(format!("unparseable date {value:?}")))
}

/// Parsed file header. Immutable for the life of the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub version: u32,
    pub symbol: String,
    pub date: NaiveDate,
    pub depth: u32,
    pub scale: u32,
    pub chunk_size: u64,
}

impl Header {
    pub fn new(symbol: &str, date: NaiveDate, options: DbOptions) -> Result<Self> {
        options.validate()?;
        if symbol.is_empty() {
            return Err(Error::InvalidOptions("symbol must be non-empty".to_string()));
        }
        if date < NaiveDate::default() {
            return Err(Error::InvalidOptions(format!(
                "date {date} precedes the Unix epoch"
            )));
        }
        Ok(Self {
            version: FORMAT_VERSION,
            symbol: symbol.to_string(),
            date,
            depth: options.depth,
            scale: options.scale,
            chunk_size: options.chunk_size,
        })
    }

    /// The creation-time options carried by this header.
    pub fn options(&self) -> DbOptions {
        DbOptions {
            depth: self.depth,
            scale: self.scale,
            chunk_size: self.chunk_size,
        }
    }

    /// Number of chunkmap entries for this file.
    pub fn chunk_count(&self) -> usize {
        chunk_count(self.chunk_size)
    }

    /// Millisecond timestamp of this file's UTC midnight.
    pub fn day_start_ms(&self) -> u64 {
        NaiveDateTime::new(self.date, NaiveTime::MIN)
            .and_utc()
            .timestamp_millis() as u64
    }

    /// Chunk bucket of an absolute millisecond timestamp, clamped to the
    /// file's day.
    pub fn bucket_of(&self, timestamp: u64) -> usize {
        let ms_of_day = timestamp.saturating_sub(self.day_start_ms()).min(DAY_MS - 1);
        (ms_of_day / self.chunk_size) as usize
    }

    /// Serialize as the on-disk options block.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = String::new();
        out.push_str(&format!("version={}\n", self.version));
        out.push_str(&format!("symbol={}\n", self.symbol));
        out.push_str(&format!(
            "date={:04}-{:02}-{:02}\n",
            self.date.year(),
            self.date.month(),
            self.date.day()
        ));
        out.push_str(&format!("depth={}\n", self.depth));
        out.push_str(&format!("scale={}\n", self.scale));
        out.push_str(&format!("chunk_size={}\n", self.chunk_size));
        out.push('\n');
        out.into_bytes()
    }

    /// Parse the options block from the start of a file.
    ///
    /// Returns the header and the byte length of the block, which is also
    /// the chunkmap offset.
    pub fn parse(data: &[u8]) -> Result<(Self, usize)> {
        let mut pos = 0usize;
        let mut version = None;
        let mut symbol = None;
        let mut date = None;
        let mut depth = None;
        let mut scale = None;
        let mut chunk_size = None;

        loop {
            let rest = &data[pos..];
            let newline = rest
                .iter()
                .position(|&b| b == b'\n')
                .ok_or_else(|| Error::InvalidHeader("unterminated options block".to_string()))?;
            let line = &rest[..newline];
            pos += newline + 1;

            if line.is_empty() {
                break;
            }
            let line = std::str::from_utf8(line)
                .map_err(|_| Error::InvalidHeader("options line is not UTF-8".to_string()))?;
            let (key, value) = line.split_once('=').ok_or_else(|| {
                Error::InvalidHeader(format!("malformed options line {line:?}"))
            })?;
            match key {
                "version" => version = Some(parse_value(key, value)?),
                "symbol" => symbol = Some(value.to_string()),
                "date" => date = Some(parse_date(value)?),
                "depth" => depth = Some(parse_value(key, value)?),
                "scale" => scale = Some(parse_value(key, value)?),
                "chunk_size" => chunk_size = Some(parse_value(key, value)?),
                // unknown keys: forward compatibility
                _ => {}
            }
        }

        let header = Self {
            version: version.ok_or_else(|| missing("version"))?,
            symbol: symbol.ok_or_else(|| missing("symbol"))?,
            date: date.ok_or_else(|| missing("date"))?,
            depth: depth.ok_or_else(|| missing("depth"))?,
            scale: scale.ok_or_else(|| missing("scale"))?,
            chunk_size: chunk_size.ok_or_else(|| missing("chunk_size"))?,
        };
        if header.version != FORMAT_VERSION {
            return Err(Error::InvalidHeader(format!(
                "unsupported version {}",
                header.version
            )));
        }
        header.options().validate()?;
        Ok((header, pos))
    }
}

fn missing(key: &str) -> Error {
    Error::InvalidHeader(format!("missing required key {key:?}"))
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::InvalidHeader(format!("bad value {value:?} for key {key:?}")))
}

/// The per-bucket offset index: one big-endian u32 file offset per chunk
/// of the day, zero meaning "no market data in this bucket".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunkmap {
    entries: Vec<u32>,
}

impl Chunkmap {
    /// A zeroed chunkmap, as written at file creation.
    pub fn new(chunk_count: usize) -> Self {
        Self {
            entries: vec![0; chunk_count],
        }
    }

    /// Parse `chunk_count` entries from the start of `data`.
    pub fn parse(data: &[u8], chunk_count: usize) -> Result<Self> {
        if data.len() < chunk_count * 4 {
            return Err(Error::Truncated);
        }
        let mut cursor = data;
        let entries = (0..chunk_count).map(|_| cursor.get_u32()).collect();
        Ok(Self { entries })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.byte_len());
        for &entry in &self.entries {
            out.put_u32(entry);
        }
        out
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn byte_len(&self) -> usize {
        self.entries.len() * 4
    }

    /// Offset of the bucket's anchor, if one was recorded.
    pub fn get(&self, bucket: usize) -> Option<u32> {
        match self.entries.get(bucket) {
            Some(&offset) if offset != 0 => Some(offset),
            _ => None,
        }
    }

    pub fn set(&mut self, bucket: usize, offset: u32) {
        self.entries[bucket] = offset;
    }

    /// The latest bucket at or before `bucket` that has an anchor.
    pub fn floor(&self, bucket: usize) -> Option<(usize, u32)> {
        let top = bucket.min(self.entries.len().saturating_sub(1));
        (0..=top)
            .rev()
            .find_map(|b| self.get(b).map(|offset| (b, offset)))
    }

    /// The last recorded anchor in the file.
    pub fn last_anchor(&self) -> Option<(usize, u32)> {
        if self.entries.is_empty() {
            return None;
        }
        self.floor(self.entries.len() - 1)
    }

    /// Indices of buckets that contain market data.
    pub fn present(&self) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|&(_, &entry)| entry != 0)
            .map(|(bucket, _)| bucket)
            .collect()
    }

    /// Zero every anchor at or past `offset`, returning the buckets that
    /// were cleared. Used when a torn tail is cut off.
    pub fn clear_from(&mut self, offset: u32) -> Vec<usize> {
        let mut cleared = Vec::new();
        for (bucket, entry) in self.entries.iter_mut().enumerate() {
            if *entry != 0 && *entry >= offset {
                *entry = 0;
                cleared.push(bucket);
            }
        }
        cleared
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> Header {
        Header::new(
            "AAPL",
            NaiveDate::from_ymd_opt(2012, 1, 15).unwrap(),
            DbOptions {
                depth: 2,
                scale: 100,
                chunk_size: 300_000,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_header_roundtrip() {
        let header = sample_header();
        let bytes = header.encode();
        let (parsed, consumed) = Header::parse(&bytes).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn test_header_text_shape() {
        let text = String::from_utf8(sample_header().encode()).unwrap();
        assert!(text.starts_with("version=2\n"));
        assert!(text.contains("symbol=AAPL\n"));
        assert!(text.contains("date=2012-01-15\n"));
        assert!(text.ends_with("\n\n"));
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let mut bytes = sample_header().encode();
        let end = bytes.len() - 1;
        bytes.splice(end..end, b"flavor=vanilla\n".iter().copied());
        let (parsed, consumed) = Header::parse(&bytes).unwrap();
        assert_eq!(parsed.symbol, "AAPL");
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn test_missing_key_rejected() {
        let bytes = b"version=2\nsymbol=X\ndate=2012-01-15\n\n";
        let result = Header::parse(bytes);
        assert!(matches!(result, Err(Error::InvalidHeader(_))));
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let mut header = sample_header();
        header.version = 3;
        let result = Header::parse(&header.encode());
        assert!(matches!(result, Err(Error::InvalidHeader(_))));
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2012, 1, 15).unwrap();
        for form in ["2012-01-15", "2012/01/15", "2012.01.15"] {
            assert_eq!(parse_date(form).unwrap(), expected);
        }
        assert!(parse_date("15 Jan 2012").is_err());
    }

    #[test]
    fn test_chunk_count() {
        assert_eq!(chunk_count(300_000), 288);
        assert_eq!(chunk_count(60_000), 1440);
        assert_eq!(chunk_count(DAY_MS), 1);
        // a width that does not divide the day rounds up
        assert_eq!(chunk_count(7_000_000), 13);
    }

    #[test]
    fn test_bucket_of() {
        let header = sample_header();
        let day_start = header.day_start_ms();
        assert_eq!(header.bucket_of(day_start), 0);
        assert_eq!(header.bucket_of(day_start + 299_999), 0);
        assert_eq!(header.bucket_of(day_start + 300_000), 1);
        // clamped at both ends
        assert_eq!(header.bucket_of(0), 0);
        assert_eq!(header.bucket_of(day_start + DAY_MS + 5), 287);
    }

    #[test]
    fn test_options_validation() {
        assert!(DbOptions::default().validate().is_ok());
        assert!(DbOptions { depth: 0, ..Default::default() }.validate().is_err());
        assert!(DbOptions { depth: 33, ..Default::default() }.validate().is_err());
        assert!(DbOptions { scale: 0, ..Default::default() }.validate().is_err());
        assert!(DbOptions { chunk_size: 0, ..Default::default() }.validate().is_err());
        assert!(DbOptions { chunk_size: DAY_MS + 1, ..Default::default() }
            .validate()
            .is_err());
    }

    #[test]
    fn test_chunkmap_roundtrip() {
        let mut map = Chunkmap::new(288);
        map.set(0, 1000);
        map.set(17, 2000);
        let bytes = map.encode();
        assert_eq!(bytes.len(), 288 * 4);
        let parsed = Chunkmap::parse(&bytes, 288).unwrap();
        assert_eq!(parsed, map);
    }

    #[test]
    fn test_chunkmap_floor() {
        let mut map = Chunkmap::new(10);
        map.set(2, 100);
        map.set(5, 200);
        assert_eq!(map.floor(0), None);
        assert_eq!(map.floor(2), Some((2, 100)));
        assert_eq!(map.floor(4), Some((2, 100)));
        assert_eq!(map.floor(5), Some((5, 200)));
        assert_eq!(map.floor(99), Some((5, 200)));
        assert_eq!(map.last_anchor(), Some((5, 200)));
    }

    #[test]
    fn test_chunkmap_present_and_clear() {
        let mut map = Chunkmap::new(10);
        map.set(1, 100);
        map.set(3, 200);
        map.set(7, 300);
        assert_eq!(map.present(), vec![1, 3, 7]);

        let cleared = map.clear_from(200);
        assert_eq!(cleared, vec![3, 7]);
        assert_eq!(map.present(), vec![1]);
    }

    #[test]
    fn test_chunkmap_truncated_rejected() {
        let result = Chunkmap::parse(&[0u8; 10], 3);
        assert!(matches!(result, Err(Error::Truncated)));
    }
}
