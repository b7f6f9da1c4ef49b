//! Read-mode scanner and event iterator.
//!
//! Opening a file for reading produces a [`ReaderState`]: the parsed
//! header, the chunkmap, and the entire event region materialized into
//! [`Bytes`]. The descriptor is released immediately, so the state stays
//! valid if the file is renamed or deleted, clones share one buffer, and
//! the state can be shipped wherever the events are wanted.
//!
//! Two layers sit on top:
//!
//! - [`Scanner`]: the raw decoding cursor. It reconstructs full snapshots
//!   from deltas as it walks the stream and supports timestamp seeks
//!   through the chunkmap. Every chunkmap anchor is a full snapshot, so a
//!   seek landing there needs no prior state.
//! - [`EventIter`]: the scanner feeding a stack of [`Filter`]s. Lazy,
//!   finite, non-restartable; one event out per [`EventIter::read_one`],
//!   buffering internally when a filter emits several at once.
//!
//! A record torn at the end of the file silently ends the stream (the tail
//! an interrupted appender may leave); corruption anywhere else surfaces
//! as an error.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use bytes::{Buf, Bytes};
use tracing::debug;

use secdb_core::codec;
use secdb_core::event::{Event, MdSnapshot};
use secdb_core::format::{Chunkmap, Header};

use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::info::FileInfo;

/// Self-sufficient read-only state of one database file.
#[derive(Debug, Clone)]
pub struct ReaderState {
    path: PathBuf,
    header: Header,
    chunkmap: Chunkmap,
    /// File offset where the event region starts; chunkmap entries are
    /// absolute, positions inside `events` are relative to this.
    stream_offset: u64,
    events: Bytes,
}

impl ReaderState {
    /// Open a database file for reading.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(path.to_path_buf()));
            }
            Err(err) => return Err(err.into()),
        };

        let (header, header_len) = Header::parse(&data)?;
        let chunk_count = header.chunk_count();
        let stream_offset = header_len + chunk_count * 4;
        if data.len() < stream_offset {
            return Err(secdb_core::Error::Truncated.into());
        }
        let chunkmap = Chunkmap::parse(&data[header_len..], chunk_count)?;
        let events = Bytes::from(data).slice(stream_offset..);

        debug!(
            target: "secdb::reader",
            path = %path.display(),
            bytes = events.len(),
            "loaded event region"
        );

        Ok(Self {
            path: path.to_path_buf(),
            header,
            chunkmap,
            stream_offset: stream_offset as u64,
            events,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Metadata and chunk presence of this file.
    pub fn file_info(&self) -> FileInfo {
        FileInfo::from_parts(&self.path, &self.header, &self.chunkmap)
    }

    /// Raw decoding cursor over the event stream.
    pub fn scan(&self) -> Scanner {
        Scanner {
            state: self.clone(),
            pos: 0,
            last_md: None,
        }
    }

    /// Iterate the file through a filter pipeline.
    pub fn events(self, filters: Vec<Box<dyn Filter>>) -> Result<EventIter> {
        EventIter::new(self, filters)
    }
}

/// Pull-based cursor decoding one record at a time, reconstructing full
/// snapshots from deltas as it goes.
#[derive(Debug, Clone)]
pub struct Scanner {
    state: ReaderState,
    pos: usize,
    last_md: Option<MdSnapshot>,
}

impl Scanner {
    /// Decode the next event, or `None` at end of stream. A record torn at
    /// the end of the file also ends the stream.
    pub fn next_event(&mut self) -> Result<Option<Event>> {
        if self.pos >= self.state.events.len() {
            return Ok(None);
        }
        let mut cursor = &self.state.events[self.pos..];
        let before = cursor.remaining();
        match codec::decode_record(
            &mut cursor,
            self.state.header.depth as usize,
            self.last_md.as_ref(),
        ) {
            Ok(event) => {
                self.pos += before - cursor.remaining();
                if let Event::Md(md) = &event {
                    self.last_md = Some(md.clone());
                }
                Ok(Some(event))
            }
            Err(secdb_core::Error::Truncated) => {
                debug!(
                    target: "secdb::reader",
                    at = self.pos,
                    "torn trailing record, ending stream"
                );
                self.pos = self.state.events.len();
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Position the cursor immediately before the first event with
    /// `timestamp >= target`.
    ///
    /// Lands on the nearest preceding chunk anchor (always a full
    /// snapshot) and decodes forward from there so delta state rebuilds.
    pub fn seek(&mut self, target: u64) -> Result<()> {
        let bucket = self.state.header.bucket_of(target);
        self.pos = match self.state.chunkmap.floor(bucket) {
            Some((_, offset)) => {
                let relative = (offset as u64)
                    .checked_sub(self.state.stream_offset)
                    .ok_or_else(|| {
                        secdb_core::Error::CorruptStream(format!(
                            "chunkmap offset {offset} before the event stream"
                        ))
                    })? as usize;
                if relative > self.state.events.len() {
                    return Err(secdb_core::Error::CorruptStream(format!(
                        "chunkmap offset {offset} beyond end of file"
                    ))
                    .into());
                }
                relative
            }
            None => 0,
        };
        self.last_md = None;

        loop {
            let checkpoint = (self.pos, self.last_md.clone());
            match self.next_event()? {
                Some(event) if event.timestamp() < target => continue,
                Some(_) => {
                    // leave the qualifying event for the next read
                    self.pos = checkpoint.0;
                    self.last_md = checkpoint.1;
                    break;
                }
                None => break,
            }
        }
        Ok(())
    }

    /// Decode the remaining stream into a vector.
    pub fn collect_all(mut self) -> Result<Vec<Event>> {
        let mut out = Vec::new();
        while let Some(event) = self.next_event()? {
            out.push(event);
        }
        Ok(out)
    }
}

/// Lazy, finite, non-restartable event sequence: a [`Scanner`] feeding a
/// stack of filters.
pub struct EventIter {
    scanner: Scanner,
    filters: Vec<Box<dyn Filter>>,
    /// Stages that have declared the stream over; they accept no more
    /// input.
    ended: Vec<bool>,
    queue: VecDeque<Event>,
    exhausted: bool,
}

impl EventIter {
    pub(crate) fn new(state: ReaderState, mut filters: Vec<Box<dyn Filter>>) -> Result<Self> {
        for filter in &mut filters {
            filter.attach(state.header())?;
        }
        let mut scanner = state.scan();
        if let Some(target) = filters.first().and_then(|filter| filter.seek_to()) {
            scanner.seek(target)?;
        }
        let ended = vec![false; filters.len()];
        Ok(Self {
            scanner,
            filters,
            ended,
            queue: VecDeque::new(),
            exhausted: false,
        })
    }

    /// Next event, or `None` once the stream and every filter's buffered
    /// output are drained.
    pub fn read_one(&mut self) -> Result<Option<Event>> {
        loop {
            if let Some(event) = self.queue.pop_front() {
                return Ok(Some(event));
            }
            if self.exhausted {
                return Ok(None);
            }
            match self.scanner.next_event()? {
                Some(event) => {
                    if let Some(stage) = self.run(vec![event], 0)? {
                        self.drain(stage)?;
                    }
                }
                None => self.drain(0)?,
            }
        }
    }

    /// Drain the remaining stream into a vector.
    pub fn collect_all(mut self) -> Result<Vec<Event>> {
        let mut out = Vec::new();
        while let Some(event) = self.read_one()? {
            out.push(event);
        }
        Ok(out)
    }

    /// Push a batch through stages `from..`, queueing whatever falls out
    /// the bottom. Returns the first stage that ended the stream, if any.
    fn run(&mut self, mut batch: Vec<Event>, from: usize) -> Result<Option<usize>> {
        let mut first_ended = None;
        for index in from..self.filters.len() {
            if self.ended[index] {
                // an ended stage swallows everything aimed at it
                batch.clear();
                break;
            }
            let mut next = Vec::new();
            let mut events = batch.into_iter();
            for event in events.by_ref() {
                let step = self.filters[index].step(event)?;
                next.extend(step.events);
                if step.done {
                    self.ended[index] = true;
                    first_ended.get_or_insert(index);
                    break;
                }
            }
            batch = next;
        }
        self.queue.extend(batch);
        Ok(first_ended)
    }

    /// Propagate end-of-stream from stage `from` downward: each stage
    /// flushes its buffered output through the stages below it, in order.
    fn drain(&mut self, from: usize) -> Result<()> {
        self.exhausted = true;
        for index in from..self.filters.len() {
            let flushed = self.filters[index].finish()?;
            self.run(flushed, index + 1)?;
        }
        Ok(())
    }
}

impl Iterator for EventIter {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_one().transpose()
    }
}
