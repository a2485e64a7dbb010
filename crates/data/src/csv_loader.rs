use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use quotedb_core::{Bar, SeriesTable, StoreError, REFERENCE_COLUMN};
use rust_decimal::Decimal;
use std::io::{Read, Write};
use std::path::Path;
use std::str::FromStr;

/// Load daily bars from a CSV file.
///
/// Expected columns (case-insensitive, any order):
/// `date` (or `timestamp`, `datetime`), `open`, `high`, `low`, `close`,
/// optionally `adj_close` (or `adj close`, `adjusted_close`) and `volume`.
/// A missing adjusted close falls back to `close`.
pub fn load_bars_from_csv(path: &Path) -> Result<Vec<Bar>, StoreError> {
    let file = std::fs::File::open(path)
        .map_err(|e| StoreError::ParseError(format!("Failed to open {}: {}", path.display(), e)))?;
    read_bars(file)
}

/// Parse bars from any CSV source. Output is sorted by timestamp.
pub fn read_bars<R: Read>(source: R) -> Result<Vec<Bar>, StoreError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(source);

    let headers = reader
        .headers()
        .map_err(|e| StoreError::ParseError(format!("Failed to read headers: {}", e)))?
        .clone();
    let cols = resolve_bar_columns(&headers)?;

    let mut bars = Vec::new();
    for result in reader.records() {
        let record =
            result.map_err(|e| StoreError::ParseError(format!("CSV record error: {}", e)))?;
        let field = |idx: usize| record.get(idx).unwrap_or("");

        let timestamp = parse_timestamp(field(cols.timestamp))?;
        let close = parse_decimal(field(cols.close), "close")?;
        let adj_close = match cols.adj_close {
            Some(idx) if !field(idx).is_empty() => parse_decimal(field(idx), "adj_close")?,
            _ => close,
        };
        let volume = match cols.volume {
            Some(idx) if !field(idx).is_empty() => parse_decimal(field(idx), "volume")?,
            _ => Decimal::ZERO,
        };

        bars.push(Bar {
            timestamp,
            open: parse_decimal(field(cols.open), "open")?,
            high: parse_decimal(field(cols.high), "high")?,
            low: parse_decimal(field(cols.low), "low")?,
            close,
            adj_close,
            volume,
        });
    }

    bars.sort_by_key(|b| b.timestamp);
    if let Some(pair) = bars.windows(2).find(|p| p[0].timestamp == p[1].timestamp) {
        return Err(StoreError::ParseError(format!(
            "Duplicate timestamp {}",
            pair[0].timestamp
        )));
    }
    Ok(bars)
}

/// Write a series as CSV: `date`, the reference price, then one column per
/// indicator. Absent cells are left empty.
pub fn write_series_csv<W: Write>(
    sink: W,
    table: &SeriesTable,
    columns: &[&str],
) -> Result<(), StoreError> {
    let mut writer = csv::Writer::from_writer(sink);
    let write_err = |e: csv::Error| StoreError::ParseError(format!("CSV write error: {}", e));

    let mut header = vec!["date", REFERENCE_COLUMN];
    header.extend_from_slice(columns);
    writer.write_record(&header).map_err(write_err)?;

    for (obs, row) in table.observations().iter().zip(table.rows()) {
        let mut record = vec![
            obs.timestamp().format("%Y-%m-%d").to_string(),
            obs.reference().to_string(),
        ];
        record.extend(
            columns
                .iter()
                .map(|c| row.get(c).map(|v| v.to_string()).unwrap_or_default()),
        );
        writer.write_record(&record).map_err(write_err)?;
    }
    writer
        .flush()
        .map_err(|e| StoreError::ParseError(format!("CSV write error: {}", e)))
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

struct BarColumnMap {
    timestamp: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    adj_close: Option<usize>,
    volume: Option<usize>,
}

fn resolve_bar_columns(headers: &csv::StringRecord) -> Result<BarColumnMap, StoreError> {
    let required = |names: &[&str], label: &str| {
        find_column(headers, names)
            .ok_or_else(|| StoreError::ParseError(format!("No {} column found", label)))
    };
    Ok(BarColumnMap {
        timestamp: required(&["date", "timestamp", "datetime"], "date")?,
        open: required(&["open"], "open")?,
        high: required(&["high"], "high")?,
        low: required(&["low"], "low")?,
        close: required(&["close"], "close")?,
        adj_close: find_column(headers, &["adj_close", "adj close", "adjusted_close", "adjclose"]),
        volume: find_column(headers, &["volume", "vol"]),
    })
}

fn find_column(headers: &csv::StringRecord, names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| names.contains(&h.trim().to_lowercase().as_str()))
}

fn parse_decimal(s: &str, field: &str) -> Result<Decimal, StoreError> {
    Decimal::from_str(s.trim())
        .or_else(|_| Decimal::from_scientific(s.trim()))
        .map_err(|e| StoreError::ParseError(format!("Failed to parse {} '{}': {}", field, s, e)))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StoreError> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(naive.and_utc());
        }
    }

    // Daily bars are usually date-only; pin them to midnight UTC.
    for fmt in ["%Y-%m-%d", "%m/%d/%Y", "%Y%m%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            if let Some(naive) = date.and_hms_opt(0, 0, 0) {
                return Ok(naive.and_utc());
            }
        }
    }

    Err(StoreError::ParseError(format!(
        "Unable to parse timestamp: '{}'",
        s
    )))
}
