//! secdb: inspect and dump `.secdb` market-data files.
//!
//! ```text
//! secdb dump db/stock/2012/01/AAPL-2012-01-15.secdb
//! secdb dump AAPL --date 2012-01-15 --from 10:00:00 --to 10:05:00
//! secdb dump AAPL --date 2012-01-15 --candle 60000
//! secdb dump AAPL --date 2012-01-15 -d 1 --unique-price --no-symbol
//! secdb info AAPL --date 2012-01-15 --json
//! secdb ls
//! secdb ls AAPL
//! ```
//!
//! Symbols resolve against `--root` (or `SECDB_ROOT`, default `db`);
//! `dump` and `info` also accept a direct file path. Logging goes to
//! stderr, controlled by `RUST_LOG`.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use secdb_core::format::parse_date;
use secdb_core::{Event, Header, Level, MdSnapshot};
use secdb_storage::{Catalog, CandleFilter, Filter, RangeFilter, ReaderState, TimeBound};

#[derive(Parser)]
#[command(name = "secdb")]
#[command(about = "Inspect secdb market-data files", long_about = None)]
struct Cli {
    /// Database root directory
    #[arg(long, env = "SECDB_ROOT", default_value = "db")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the events of one file
    Dump(DumpArgs),
    /// Print file metadata and chunk presence
    Info {
        /// A .secdb file path, or a symbol resolved with --date
        target: String,
        /// Trading date, when `target` is a symbol
        #[arg(long)]
        date: Option<String>,
        /// Emit JSON
        #[arg(long)]
        json: bool,
    },
    /// List symbols under the root, or the dates of one symbol
    Ls {
        symbol: Option<String>,
    },
}

#[derive(Args)]
struct DumpArgs {
    /// A .secdb file path, or a symbol resolved with --date
    target: String,
    /// Trading date, when `target` is a symbol
    #[arg(long)]
    date: Option<String>,
    /// Drop events before this time of day (HH:MM:SS)
    #[arg(long)]
    from: Option<String>,
    /// Drop events after this time of day (HH:MM:SS)
    #[arg(long)]
    to: Option<String>,
    /// Aggregate into OHLC candles of this many milliseconds
    #[arg(short, long)]
    candle: Option<u64>,
    /// Limit the printed book depth, independent of the stored depth
    #[arg(short, long)]
    depth: Option<usize>,
    /// Omit the leading symbol column
    #[arg(long)]
    no_symbol: bool,
    /// Only print snapshots whose visible prices or sizes changed
    #[arg(long, conflicts_with = "unique_price")]
    unique: bool,
    /// Only print snapshots whose visible prices changed (suppresses
    /// quantity-only updates)
    #[arg(long)]
    unique_price: bool,
    /// Print raw epoch milliseconds instead of wall-clock times
    #[arg(long)]
    epoch_time: bool,
    /// Stop after this many rows
    #[arg(short, long)]
    limit: Option<usize>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let catalog = Catalog::new(&cli.root);

    match cli.command {
        Commands::Dump(args) => dump(&catalog, args),
        Commands::Info { target, date, json } => print_info(&catalog, &target, date.as_deref(), json),
        Commands::Ls { symbol } => ls(&catalog, symbol.as_deref()),
    }
}

/// Open `target` as a symbol under the catalog when a date is given,
/// otherwise as a plain file path.
fn open(catalog: &Catalog, target: &str, date: Option<&str>) -> Result<ReaderState> {
    match date {
        Some(date) => {
            let date = parse_date(date).context("parsing --date")?;
            let path = catalog.path(target, date);
            ReaderState::open(&path)
                .with_context(|| format!("opening {}", path.display()))
        }
        None => ReaderState::open(Path::new(target))
            .with_context(|| format!("opening {target} (pass --date to resolve a symbol)")),
    }
}

fn dump(catalog: &Catalog, args: DumpArgs) -> Result<()> {
    let state = open(catalog, &args.target, args.date.as_deref())?;
    let header = state.header().clone();

    let mut filters: Vec<Box<dyn Filter>> = Vec::new();
    if args.from.is_some() || args.to.is_some() {
        let start = args.from.as_deref().map(parse_time_of_day).transpose()?;
        let end = args.to.as_deref().map(parse_time_of_day).transpose()?;
        filters.push(Box::new(RangeFilter::new(start, end)));
    }
    if let Some(period) = args.candle {
        filters.push(Box::new(CandleFilter::new(Some(period))));
    }

    let mut rows = 0usize;
    let mut last_printed: Option<MdSnapshot> = None;
    let mut iter = state.events(filters)?;
    while let Some(event) = iter.read_one()? {
        if args.limit.is_some_and(|limit| rows >= limit) {
            break;
        }
        let event = match event {
            Event::Md(md) => {
                let visible = clip_depth(&md, args.depth);
                let suppress = match &last_printed {
                    Some(prev) if args.unique => visible.bid == prev.bid && visible.ask == prev.ask,
                    Some(prev) if args.unique_price => prices_equal(&visible, prev),
                    _ => false,
                };
                if suppress {
                    continue;
                }
                last_printed = Some(visible.clone());
                Event::Md(visible)
            }
            other => other,
        };
        println!("{}", render_event(&header, &event, &args));
        rows += 1;
    }
    Ok(())
}

fn print_info(catalog: &Catalog, target: &str, date: Option<&str>, json: bool) -> Result<()> {
    let file_info = open(catalog, target, date)?.file_info();
    if json {
        println!("{}", serde_json::to_string_pretty(&file_info)?);
        return Ok(());
    }
    println!("path:        {}", file_info.path.display());
    println!("symbol:      {}", file_info.symbol);
    println!("date:        {}", file_info.date);
    println!("version:     {}", file_info.version);
    println!("scale:       {}", file_info.scale);
    println!("depth:       {}", file_info.depth);
    println!("interval:    {} ms", file_info.interval);
    println!(
        "presence:    {}/{} chunks",
        file_info.present_chunks.len(),
        file_info.chunk_count
    );
    Ok(())
}

fn ls(catalog: &Catalog, symbol: Option<&str>) -> Result<()> {
    match symbol {
        Some(symbol) => {
            for date in catalog.dates(symbol)? {
                println!("{date}");
            }
        }
        None => {
            for symbol in catalog.symbols()? {
                println!("{symbol}");
            }
        }
    }
    Ok(())
}

/// Cap a snapshot at the requested print depth.
fn clip_depth(md: &MdSnapshot, depth: Option<usize>) -> MdSnapshot {
    let Some(depth) = depth else {
        return md.clone();
    };
    MdSnapshot::new(
        md.timestamp,
        md.bid.iter().copied().take(depth).collect(),
        md.ask.iter().copied().take(depth).collect(),
    )
}

fn prices_equal(a: &MdSnapshot, b: &MdSnapshot) -> bool {
    let prices = |levels: &[Level]| levels.iter().map(|level| level.price).collect::<Vec<_>>();
    prices(&a.bid) == prices(&b.bid) && prices(&a.ask) == prices(&b.ask)
}

/// Parse `HH:MM` or `HH:MM:SS` into a time-of-day bound.
fn parse_time_of_day(value: &str) -> Result<TimeBound> {
    let mut parts = value.split(':');
    let hour: u32 = parts
        .next()
        .unwrap_or_default()
        .parse()
        .with_context(|| format!("bad time of day {value:?}"))?;
    let minute: u32 = parts
        .next()
        .unwrap_or("0")
        .parse()
        .with_context(|| format!("bad time of day {value:?}"))?;
    let second: u32 = parts
        .next()
        .unwrap_or("0")
        .parse()
        .with_context(|| format!("bad time of day {value:?}"))?;
    if parts.next().is_some() || hour > 23 || minute > 59 || second > 59 {
        bail!("bad time of day {value:?}");
    }
    Ok(TimeBound::TimeOfDay {
        hour,
        minute,
        second,
    })
}

fn render_time(header: &Header, timestamp: u64, epoch_time: bool) -> String {
    if epoch_time {
        return timestamp.to_string();
    }
    let ms_of_day = timestamp.saturating_sub(header.day_start_ms());
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        ms_of_day / 3_600_000,
        ms_of_day / 60_000 % 60,
        ms_of_day / 1_000 % 60,
        ms_of_day % 1_000
    )
}

fn render_event(header: &Header, event: &Event, args: &DumpArgs) -> String {
    let mut line = String::new();
    if !args.no_symbol {
        line.push_str(&header.symbol);
        line.push_str("  ");
    }
    line.push_str(&render_time(header, event.timestamp(), args.epoch_time));

    let scale = header.scale;
    match event {
        Event::Md(md) => {
            let side = |levels: &[Level]| {
                levels
                    .iter()
                    .map(|level| format!("{}x{}", level.price_f64(scale), level.size))
                    .collect::<Vec<_>>()
                    .join(" ")
            };
            line.push_str(&format!(
                "  md     bid [{}]  ask [{}]",
                side(&md.bid),
                side(&md.ask)
            ));
        }
        Event::Trade(trade) => {
            line.push_str(&format!(
                "  trade  id {}  price {}  volume {}",
                trade.trade_id,
                trade.price_f64(scale),
                trade.volume
            ));
        }
        Event::Candle(candle) => {
            let (open, high, low, close) = candle.ohlc_f64(scale);
            line.push_str(&format!(
                "  candle open {open}  high {high}  low {low}  close {close}  volume {}",
                candle.volume
            ));
        }
    }
    line
}
