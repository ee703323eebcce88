//! Batch readers - JSON and CSV input into `RawRecord` values
//!
//! The JSON form is an array of records in the crate's own shape. The CSV
//! form mirrors the extractor's flat column layout (one column per service
//! grid cell) and is folded back into service groups here.

use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Utc};
use csv::{ReaderBuilder, StringRecord};
use tracing::info;

use crate::error::{EngineError, Result};
use crate::record::{RawRecord, RawServiceEntry, RawServiceGroup};

/// The service grid columns, grouped: service type column, then its
/// (date, quantity, hours) line columns.
const SERVICE_COLUMNS: [(&str, [[&str; 3]; 2]); 4] = [
    ("service1", [["d1", "q1", "h1"], ["d2", "q2", "h2"]]),
    ("service2", [["d3", "q3", "h3"], ["d4", "q4", "h4"]]),
    ("service3", [["d5", "q5", "h5"], ["d6", "q6", "h6"]]),
    ("service4", [["d7", "q7", "h7"], ["d8", "q8", "h8"]]),
];

pub fn read_batch_json_path(path: impl AsRef<Path>) -> Result<Vec<RawRecord>> {
    let file = std::fs::File::open(path.as_ref())?;
    let batch: Vec<RawRecord> = serde_json::from_reader(file)?;
    info!(records = batch.len(), path = %path.as_ref().display(), "Loaded JSON batch");
    Ok(batch)
}

pub fn read_batch_csv_path(path: impl AsRef<Path>) -> Result<Vec<RawRecord>> {
    let file = std::fs::File::open(path.as_ref())?;
    let batch = read_batch_csv(file)?;
    info!(records = batch.len(), path = %path.as_ref().display(), "Loaded CSV batch");
    Ok(batch)
}

pub fn read_batch_csv(reader: impl Read) -> Result<Vec<RawRecord>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = rdr
        .headers()?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();

    let mut batch = Vec::new();
    for result in rdr.records() {
        let record = result?;
        batch.push(parse_row(&headers, &record)?);
    }
    Ok(batch)
}

fn parse_row(headers: &[String], record: &StringRecord) -> Result<RawRecord> {
    let cell = |name: &str| -> Option<String> {
        headers
            .iter()
            .position(|h| h == name)
            .and_then(|idx| record.get(idx))
            .map(str::trim)
            .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("N/A"))
            .map(str::to_string)
    };

    let work_order_id = cell("work_order_id").unwrap_or_default();

    let extracted_at = match cell("extracted_at") {
        Some(text) => DateTime::parse_from_rfc3339(&text)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                EngineError::MalformedRecord(format!(
                    "Bad extracted_at for {}: {}",
                    work_order_id, e
                ))
            })?,
        None => {
            return Err(EngineError::MalformedRecord(format!(
                "Missing extracted_at for {}",
                work_order_id
            )))
        }
    };

    let year_raw = cell("year").and_then(|y| y.parse::<i32>().ok());

    let mut services = Vec::new();
    for (service_col, line_cols) in SERVICE_COLUMNS {
        let Some(service_type) = cell(service_col) else {
            continue;
        };
        let entries: Vec<RawServiceEntry> = line_cols
            .iter()
            .map(|&[d, q, h]| RawServiceEntry {
                date: cell(d),
                quantity: cell(q),
                hours: cell(h),
            })
            .filter(|e| e.date.is_some() || e.quantity.is_some() || e.hours.is_some())
            .collect();
        services.push(RawServiceGroup {
            service_type: Some(service_type),
            entries,
        });
    }

    Ok(RawRecord {
        work_order_id,
        work_order_number: cell("work_order_number"),
        builder_name_raw: cell("builder_name"),
        project_name_raw: cell("project_name"),
        company_name_raw: cell("company_name"),
        month_raw: cell("month"),
        year_raw,
        description: cell("description"),
        file_url: cell("file_url"),
        extracted_at,
        services,
    })
}
