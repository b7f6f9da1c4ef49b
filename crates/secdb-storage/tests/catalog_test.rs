//! Discovery and metadata over a populated root directory.

use chrono::NaiveDate;
use tempfile::TempDir;

use secdb_core::format::DbOptions;
use secdb_core::{Event, Level, MdSnapshot};
use secdb_storage::{info, Catalog, Error};

fn populate(catalog: &Catalog, symbol: &str, date: &str) {
    let mut appender = catalog
        .open_append(symbol, date, DbOptions::default())
        .unwrap();
    let day_start = appender.header().day_start_ms();
    appender
        .append(&Event::Md(MdSnapshot::new(
            day_start + 1_000,
            vec![Level::new(45010, 100)],
            vec![Level::new(45243, 20)],
        )))
        .unwrap();
    appender.close().unwrap();
}

fn date(value: &str) -> NaiveDate {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").unwrap()
}

// ---------------------------------------------------------------
// Path mapping and date forms
// ---------------------------------------------------------------

#[test]
fn files_land_in_the_year_month_layout() {
    let dir = TempDir::new().unwrap();
    let catalog = Catalog::new(dir.path());
    populate(&catalog, "AAPL", "2012-01-15");

    let expected = dir
        .path()
        .join("stock")
        .join("2012")
        .join("01")
        .join("AAPL-2012-01-15.secdb");
    assert!(expected.is_file());
}

#[test]
fn alternate_date_separators_resolve_to_one_file() {
    let dir = TempDir::new().unwrap();
    let catalog = Catalog::new(dir.path());
    populate(&catalog, "AAPL", "2012-01-15");

    for form in ["2012-01-15", "2012/01/15", "2012.01.15"] {
        let events = catalog.events("AAPL", form, Vec::new()).unwrap();
        assert_eq!(events.len(), 1, "date form {form}");
    }
}

#[test]
fn missing_file_is_not_found() {
    let dir = TempDir::new().unwrap();
    let catalog = Catalog::new(dir.path());
    let result = catalog.open_read("AAPL", "2012-01-15");
    assert!(matches!(result, Err(Error::NotFound(_))));
}

// ---------------------------------------------------------------
// Listing operations
// ---------------------------------------------------------------

#[test]
fn symbols_are_distinct_and_sorted() {
    let dir = TempDir::new().unwrap();
    let catalog = Catalog::new(dir.path());
    populate(&catalog, "MSFT", "2012-01-15");
    populate(&catalog, "AAPL", "2012-01-15");
    populate(&catalog, "AAPL", "2012-02-01");
    populate(&catalog, "GOOG", "2011-12-30");

    assert_eq!(catalog.symbols().unwrap(), vec!["AAPL", "GOOG", "MSFT"]);
}

#[test]
fn dates_are_sorted_per_symbol() {
    let dir = TempDir::new().unwrap();
    let catalog = Catalog::new(dir.path());
    populate(&catalog, "AAPL", "2012-02-01");
    populate(&catalog, "AAPL", "2011-12-30");
    populate(&catalog, "AAPL", "2012-01-15");
    populate(&catalog, "MSFT", "2012-03-03");

    assert_eq!(
        catalog.dates("AAPL").unwrap(),
        vec![date("2011-12-30"), date("2012-01-15"), date("2012-02-01")]
    );
    assert!(catalog.dates("GOOG").unwrap().is_empty());
}

#[test]
fn common_dates_intersect() {
    let dir = TempDir::new().unwrap();
    let catalog = Catalog::new(dir.path());
    for d in ["2012-01-01", "2012-01-02", "2012-01-03"] {
        populate(&catalog, "A", d);
    }
    for d in ["2012-01-02", "2012-01-03", "2012-01-04"] {
        populate(&catalog, "B", d);
    }

    assert_eq!(
        catalog.common_dates(&["A", "B"]).unwrap(),
        vec![date("2012-01-02"), date("2012-01-03")]
    );
    assert_eq!(
        catalog.common_dates(&["A"]).unwrap(),
        catalog.dates("A").unwrap()
    );
    assert!(catalog.common_dates(&["A", "B", "C"]).unwrap().is_empty());
}

// ---------------------------------------------------------------
// File metadata
// ---------------------------------------------------------------

#[test]
fn info_reports_options_and_presence() {
    let dir = TempDir::new().unwrap();
    let catalog = Catalog::new(dir.path());

    let options = DbOptions {
        depth: 2,
        scale: 1000,
        chunk_size: 60_000,
    };
    let mut appender = catalog.open_append("AAPL", "2012-01-15", options).unwrap();
    let day_start = appender.header().day_start_ms();
    for minute in [3u64, 3, 10] {
        appender
            .append(&Event::Md(MdSnapshot::new(
                day_start + minute * 60_000 + 1,
                vec![Level::new(45010, 1)],
                vec![Level::new(45243, 1)],
            )))
            .unwrap();
    }
    appender.close().unwrap();

    let path = catalog.path("AAPL", date("2012-01-15"));
    let file_info = info(&path).unwrap();
    assert_eq!(file_info.symbol, "AAPL");
    assert_eq!(file_info.date, date("2012-01-15"));
    assert_eq!(file_info.version, 2);
    assert_eq!(file_info.scale, 1000);
    assert_eq!(file_info.depth, 2);
    assert_eq!(file_info.interval, 60_000);
    assert_eq!(file_info.chunk_count, 1440);
    assert_eq!(file_info.present_chunks, vec![3, 10]);

    // the record serializes for tooling
    let json = serde_json::to_value(&file_info).unwrap();
    assert_eq!(json["symbol"], "AAPL");
    assert_eq!(json["present_chunks"], serde_json::json!([3, 10]));
}
