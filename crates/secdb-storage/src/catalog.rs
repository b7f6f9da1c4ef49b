//! File discovery under a database root.
//!
//! One file per (symbol, trading day), laid out as
//!
//! ```text
//! <root>/stock/<YYYY>/<MM>/<SYMBOL>-<YYYY-MM-DD>.secdb
//! ```
//!
//! The process-wide root comes from `SECDB_ROOT` (default `db`), read
//! once at first use. Everything is also available on an explicit
//! [`Catalog`] so tests and tools can point at their own directories.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate};

use secdb_core::event::Event;
use secdb_core::format::{self, DbOptions};

use crate::appender::Appender;
use crate::error::Result;
use crate::filter::Filter;
use crate::reader::ReaderState;

/// Directory under the root that holds equity files.
const ASSET_DIR: &str = "stock";

/// Maps (symbol, date) pairs to paths under a root directory and lists
/// what is stored there.
#[derive(Debug, Clone)]
pub struct Catalog {
    root: PathBuf,
}

impl Catalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The process-wide catalog: `SECDB_ROOT` or `db`, read once.
    pub fn shared() -> &'static Catalog {
        static SHARED: OnceLock<Catalog> = OnceLock::new();
        SHARED.get_or_init(|| {
            Catalog::new(std::env::var("SECDB_ROOT").unwrap_or_else(|_| "db".to_string()))
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file holding one (symbol, date) partition.
    pub fn path(&self, symbol: &str, date: NaiveDate) -> PathBuf {
        self.root
            .join(ASSET_DIR)
            .join(format!("{:04}", date.year()))
            .join(format!("{:02}", date.month()))
            .join(format!(
                "{}-{:04}-{:02}-{:02}.{}",
                symbol,
                date.year(),
                date.month(),
                date.day(),
                format::FILE_EXTENSION
            ))
    }

    /// Open (symbol, date) for appending, creating the file if absent.
    pub fn open_append(&self, symbol: &str, date: &str, options: DbOptions) -> Result<Appender> {
        let date = format::parse_date(date)?;
        Appender::open(self.path(symbol, date), symbol, date, options)
    }

    /// Open (symbol, date) for reading.
    pub fn open_read(&self, symbol: &str, date: &str) -> Result<ReaderState> {
        let date = format::parse_date(date)?;
        ReaderState::open(self.path(symbol, date))
    }

    /// All events of (symbol, date), run through `filters`.
    pub fn events(
        &self,
        symbol: &str,
        date: &str,
        filters: Vec<Box<dyn Filter>>,
    ) -> Result<Vec<Event>> {
        self.open_read(symbol, date)?.events(filters)?.collect_all()
    }

    /// Distinct symbols stored under the root, sorted.
    pub fn symbols(&self) -> Result<Vec<String>> {
        let mut out = BTreeSet::new();
        for (symbol, _) in self.walk()? {
            out.insert(symbol);
        }
        Ok(out.into_iter().collect())
    }

    /// Sorted trading dates stored for one symbol.
    pub fn dates(&self, symbol: &str) -> Result<Vec<NaiveDate>> {
        let mut out = BTreeSet::new();
        for (stored, date) in self.walk()? {
            if stored == symbol {
                out.insert(date);
            }
        }
        Ok(out.into_iter().collect())
    }

    /// Sorted dates present for every one of `symbols`.
    pub fn common_dates(&self, symbols: &[&str]) -> Result<Vec<NaiveDate>> {
        let mut common: Option<BTreeSet<NaiveDate>> = None;
        for symbol in symbols {
            let dates: BTreeSet<NaiveDate> = self.dates(symbol)?.into_iter().collect();
            common = Some(match common {
                Some(held) => held.intersection(&dates).copied().collect(),
                None => dates,
            });
        }
        Ok(common.unwrap_or_default().into_iter().collect())
    }

    /// Every (symbol, date) pair stored under the root.
    fn walk(&self) -> Result<Vec<(String, NaiveDate)>> {
        let mut out = Vec::new();
        let base = self.root.join(ASSET_DIR);
        if !base.is_dir() {
            return Ok(out);
        }
        for year in read_dir_paths(&base)? {
            if !year.is_dir() {
                continue;
            }
            for month in read_dir_paths(&year)? {
                if !month.is_dir() {
                    continue;
                }
                for file in read_dir_paths(&month)? {
                    if let Some(parsed) = parse_file_name(&file) {
                        out.push(parsed);
                    }
                }
            }
        }
        Ok(out)
    }
}

fn read_dir_paths(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect();
    paths.sort();
    Ok(paths)
}

/// Parse `<symbol>-<YYYY-MM-DD>.secdb`. Symbols may themselves contain
/// dashes, so the date is taken from the fixed-width tail.
fn parse_file_name(path: &Path) -> Option<(String, NaiveDate)> {
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_suffix(".secdb")?;
    if stem.len() <= 11 {
        return None;
    }
    let (head, date) = stem.split_at(stem.len() - 10);
    let symbol = head.strip_suffix('-')?;
    if symbol.is_empty() {
        return None;
    }
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    Some((symbol.to_string(), date))
}
