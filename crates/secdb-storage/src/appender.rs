//! Append-mode file handle.
//!
//! An [`Appender`] is one of the two handle kinds a database file admits
//! (the other is the reader); switching between them means close and
//! reopen. It owns the descriptor until closed and is not safe to share.
//!
//! ## State machine
//!
//! The appender keeps three pieces of state between appends:
//!
//! - `last_md`: the latest snapshot, fully reconstructed. The next MD in
//!   the same chunk is delta-encoded against it.
//! - `last_timestamp`: of any event; appends must never go backwards.
//! - `current_chunk`: the bucket of the last *MD* written. Trades do not
//!   roll the chunk: a trade opening a fresh bucket must not stop the
//!   first MD that later lands there from being written full, because the
//!   chunkmap records full-MD anchors only.
//!
//! An MD landing in a new bucket (or arriving with no snapshot state)
//! claims `chunkmap[bucket]` if the slot is still zero, then goes out as a
//! full snapshot; within a bucket, MDs go out as deltas. Trades are
//! encoded standalone and leave all snapshot state untouched.
//!
//! ## Durability
//!
//! Writes are buffered; `close` flushes and fsyncs. An interrupted append
//! loses at most the record in flight: on the next open the torn tail is
//! cut off (and any chunkmap entry pointing into it zeroed), so the
//! invariants hold again before a single new byte is written.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::Buf;
use chrono::NaiveDate;
use tracing::{debug, info, warn};

use secdb_core::codec;
use secdb_core::event::{Event, Level, MdSnapshot};
use secdb_core::format::{Chunkmap, DbOptions, Header, DAY_MS};

use crate::error::{Error, Result};

/// Append-mode handle on one (symbol, date) database file.
pub struct Appender {
    file: BufWriter<File>,
    path: PathBuf,
    header: Header,
    chunkmap: Chunkmap,
    chunkmap_offset: u64,
    /// Absolute offset the next record lands at.
    write_offset: u64,
    day_start: u64,
    last_md: Option<MdSnapshot>,
    last_timestamp: Option<u64>,
    /// Bucket of the last MD written; trades never advance this.
    current_chunk: Option<usize>,
}

impl Appender {
    /// Open `path` for appending, creating it (and parent directories)
    /// with the given options if absent. For an existing file the supplied
    /// identity and options must match the stored header exactly.
    pub fn open(
        path: impl AsRef<Path>,
        symbol: &str,
        date: NaiveDate,
        options: DbOptions,
    ) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::open_existing(path, symbol, date, options)
        } else {
            Self::create(path, symbol, date, options)
        }
    }

    fn create(path: &Path, symbol: &str, date: NaiveDate, options: DbOptions) -> Result<Self> {
        let header = Header::new(symbol, date, options)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let header_bytes = header.encode();
        let chunkmap = Chunkmap::new(header.chunk_count());
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        let mut file = BufWriter::new(file);
        file.write_all(&header_bytes)?;
        file.write_all(&chunkmap.encode())?;

        let chunkmap_offset = header_bytes.len() as u64;
        let write_offset = chunkmap_offset + chunkmap.byte_len() as u64;
        info!(
            target: "secdb::appender",
            path = %path.display(),
            symbol,
            %date,
            "created database file"
        );

        Ok(Self {
            file,
            path: path.to_path_buf(),
            day_start: header.day_start_ms(),
            header,
            chunkmap,
            chunkmap_offset,
            write_offset,
            last_md: None,
            last_timestamp: None,
            current_chunk: None,
        })
    }

    fn open_existing(
        path: &Path,
        symbol: &str,
        date: NaiveDate,
        options: DbOptions,
    ) -> Result<Self> {
        let data = fs::read(path)?;
        let (header, header_len) = Header::parse(&data)?;

        check_field("symbol", header.symbol.as_str(), symbol)?;
        check_field("date", &header.date, &date)?;
        check_field("depth", &header.depth, &options.depth)?;
        check_field("scale", &header.scale, &options.scale)?;
        check_field("chunk_size", &header.chunk_size, &options.chunk_size)?;

        let chunk_count = header.chunk_count();
        let chunkmap_offset = header_len as u64;
        let stream_offset = chunkmap_offset + (chunk_count * 4) as u64;
        if (data.len() as u64) < stream_offset {
            return Err(secdb_core::Error::Truncated.into());
        }
        let mut chunkmap = Chunkmap::parse(&data[header_len..], chunk_count)?;

        // Recover snapshot state by scanning from the last anchor; the
        // anchor record is a full MD, so decoding needs no prior state.
        let scan_from = match chunkmap.last_anchor() {
            Some((_, offset)) => {
                let offset = offset as u64;
                if offset < stream_offset || offset > data.len() as u64 {
                    return Err(secdb_core::Error::CorruptStream(format!(
                        "chunkmap offset {offset} outside the event stream"
                    ))
                    .into());
                }
                offset
            }
            None => stream_offset,
        };

        let mut pos = scan_from as usize;
        let mut last_md: Option<MdSnapshot> = None;
        let mut last_timestamp = None;
        let mut current_chunk = None;
        let mut valid_end = pos;
        while pos < data.len() {
            let mut cursor = &data[pos..];
            let before = cursor.remaining();
            match codec::decode_record(&mut cursor, header.depth as usize, last_md.as_ref()) {
                Ok(event) => {
                    last_timestamp = Some(event.timestamp());
                    if let Event::Md(md) = event {
                        current_chunk = Some(header.bucket_of(md.timestamp));
                        last_md = Some(md);
                    }
                    pos += before - cursor.remaining();
                    valid_end = pos;
                }
                Err(secdb_core::Error::Truncated) => break,
                Err(err) => return Err(err.into()),
            }
        }

        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        if valid_end < data.len() {
            warn!(
                target: "secdb::appender",
                path = %path.display(),
                torn_bytes = data.len() - valid_end,
                "cutting torn trailing record"
            );
            file.set_len(valid_end as u64)?;
            for bucket in chunkmap.clear_from(valid_end as u32) {
                file.seek(SeekFrom::Start(chunkmap_offset + (bucket * 4) as u64))?;
                file.write_all(&0u32.to_be_bytes())?;
            }
        }
        file.seek(SeekFrom::Start(valid_end as u64))?;

        info!(
            target: "secdb::appender",
            path = %path.display(),
            offset = valid_end,
            "opened database file for append"
        );

        Ok(Self {
            file: BufWriter::new(file),
            path: path.to_path_buf(),
            day_start: header.day_start_ms(),
            header,
            chunkmap,
            chunkmap_offset,
            write_offset: valid_end as u64,
            last_md,
            last_timestamp,
            current_chunk,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event. Events must arrive in timestamp order and fall
    /// inside the file's UTC day.
    pub fn append(&mut self, event: &Event) -> Result<()> {
        let timestamp = event.timestamp();
        if timestamp < self.day_start || timestamp >= self.day_start + DAY_MS {
            return Err(Error::OutOfRange {
                timestamp,
                date: self.header.date,
            });
        }
        if let Some(last) = self.last_timestamp {
            if timestamp < last {
                return Err(Error::OutOfOrder { timestamp, last });
            }
        }

        let mut record = Vec::with_capacity(64);
        match event {
            Event::Md(md) => {
                let md = self.normalize(md)?;
                let bucket = self.header.bucket_of(timestamp);
                let same_chunk = self.current_chunk == Some(bucket);
                match &self.last_md {
                    Some(prev) if same_chunk => {
                        codec::encode_delta_md(&mut record, &md, prev);
                    }
                    _ => {
                        if self.chunkmap.get(bucket).is_none() {
                            self.record_anchor(bucket)?;
                        }
                        codec::encode_full_md(&mut record, &md);
                    }
                }
                self.write_record(&record)?;
                self.current_chunk = Some(bucket);
                self.last_md = Some(md);
            }
            Event::Trade(trade) => {
                codec::encode_trade(&mut record, trade);
                self.write_record(&record)?;
            }
            Event::Candle(_) => {
                return Err(Error::Unsupported(
                    "candles are aggregates and cannot be appended".to_string(),
                ));
            }
        }

        self.last_timestamp = Some(timestamp);
        Ok(())
    }

    /// Flush buffered records and fsync the file.
    pub fn close(mut self) -> Result<()> {
        self.file.flush()?;
        self.file.get_ref().sync_all()?;
        info!(
            target: "secdb::appender",
            path = %self.path.display(),
            bytes = self.write_offset,
            "closed database file"
        );
        Ok(())
    }

    /// Point `chunkmap[bucket]` at the current write position, in memory
    /// and in place on disk.
    fn record_anchor(&mut self, bucket: usize) -> Result<()> {
        let offset = u32::try_from(self.write_offset).map_err(|_| Error::FileTooLarge)?;
        self.chunkmap.set(bucket, offset);
        self.file
            .seek(SeekFrom::Start(self.chunkmap_offset + (bucket * 4) as u64))?;
        self.file.write_all(&offset.to_be_bytes())?;
        self.file.seek(SeekFrom::Start(self.write_offset))?;
        debug!(target: "secdb::appender", bucket, offset, "recorded chunk anchor");
        Ok(())
    }

    fn write_record(&mut self, record: &[u8]) -> Result<()> {
        if self.write_offset + record.len() as u64 > u64::from(u32::MAX) {
            return Err(Error::FileTooLarge);
        }
        self.file.write_all(record)?;
        self.write_offset += record.len() as u64;
        Ok(())
    }

    /// Pad a snapshot to the file's depth with empty levels. More levels
    /// than the file stores is an error, not a silent truncation.
    fn normalize(&self, md: &MdSnapshot) -> Result<MdSnapshot> {
        let depth = self.header.depth as usize;
        if md.bid.len() > depth || md.ask.len() > depth {
            return Err(Error::Unsupported(format!(
                "snapshot has {}x{} levels but the file stores depth {depth}",
                md.bid.len(),
                md.ask.len(),
            )));
        }
        let mut md = md.clone();
        md.bid.resize(depth, Level::default());
        md.ask.resize(depth, Level::default());
        Ok(md)
    }
}

impl Drop for Appender {
    fn drop(&mut self) {
        let _ = self.file.flush();
    }
}

fn check_field<T: PartialEq + std::fmt::Display + ?Sized>(
    field: &'static str,
    stored: &T,
    given: &T,
) -> Result<()> {
    if stored != given {
        return Err(Error::IncompatibleHeader {
            field,
            stored: stored.to_string(),
            given: given.to_string(),
        });
    }
    Ok(())
}
