use crate::domain::series::Observation;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

#[derive(Debug, Deserialize)]
struct HistoryRecord {
    date: String,
    close: f64,
}

/// RFC 3339 timestamp or a bare `YYYY-MM-DD` date (midnight UTC)
pub fn parse_date(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("Unrecognised date '{}'", raw))?;
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .with_context(|| format!("Invalid date '{}'", raw))
}

/// Read `date,close` rows, sorted ascending by timestamp
pub fn load_history<R: Read>(reader: R) -> Result<Vec<Observation>> {
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let mut series = Vec::new();
    for (line, result) in csv_reader.deserialize().enumerate() {
        let record: HistoryRecord =
            result.with_context(|| format!("Malformed history row {}", line + 2))?;
        series.push(Observation::new(parse_date(&record.date)?, record.close));
    }

    series.sort_by_key(|o| o.timestamp);
    Ok(series)
}

pub fn load_history_file(path: &Path) -> Result<Vec<Observation>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open history file: {}", path.display()))?;
    load_history(BufReader::new(file))
}
