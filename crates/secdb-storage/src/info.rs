//! File metadata reporting.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Serialize;

use secdb_core::format::{Chunkmap, Header};

use crate::error::Result;
use crate::reader::ReaderState;

/// Metadata of one database file, including which chunks hold market
/// data.
#[derive(Debug, Clone, Serialize)]
pub struct FileInfo {
    pub path: PathBuf,
    pub symbol: String,
    pub date: NaiveDate,
    pub version: u32,
    pub scale: u32,
    pub depth: u32,
    /// Chunk width in milliseconds.
    pub interval: u64,
    pub chunk_count: usize,
    /// Indices of chunks that contain market data.
    pub present_chunks: Vec<usize>,
}

impl FileInfo {
    pub(crate) fn from_parts(path: &Path, header: &Header, chunkmap: &Chunkmap) -> Self {
        Self {
            path: path.to_path_buf(),
            symbol: header.symbol.clone(),
            date: header.date,
            version: header.version,
            scale: header.scale,
            depth: header.depth,
            interval: header.chunk_size,
            chunk_count: header.chunk_count(),
            present_chunks: chunkmap.present(),
        }
    }
}

/// Read a file's metadata without iterating its events.
pub fn info(path: impl AsRef<Path>) -> Result<FileInfo> {
    Ok(ReaderState::open(path)?.file_info())
}
