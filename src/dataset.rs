//! Dataset I/O: the Skolverket merit export in, the enriched table out.
//!
//! The export is semicolon-separated with a fixed preamble before the
//! header row, and writes merit values with a decimal comma. Rows without
//! a unit code or a parsable merit value never reach the pipeline.

use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

const COL_ID: &str = "Skol-enhetskod";
const COL_NAME: &str = "Skola";
const COL_MUNICIPALITY: &str = "Skolkommun";
const COL_MERIT: &str = "Genomsnittligt meritvärde (17 ämnen)";

/// Preamble lines before the header row in the export.
pub const DEFAULT_SKIP_ROWS: usize = 5;

/// One input row, immutable once read.
#[derive(Debug, Clone, PartialEq)]
pub struct SchoolRecord {
    pub id: String,
    pub name: String,
    pub municipality: String,
    pub merit: f64,
}

/// One output row: the input plus everything the pipeline resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedRecord {
    #[serde(rename = "school_id")]
    pub id: String,
    #[serde(rename = "school_name")]
    pub name: String,
    pub municipality: String,
    pub address: String,
    #[serde(rename = "merit_value")]
    pub merit: f64,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug)]
pub enum DatasetError {
    Io(io::Error),
    Csv(csv::Error),
    MissingColumn(String),
}

impl fmt::Display for DatasetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::Csv(e) => write!(f, "CSV error: {}", e),
            Self::MissingColumn(name) => write!(f, "Required column '{}' not found", name),
        }
    }
}

impl std::error::Error for DatasetError {}

impl From<io::Error> for DatasetError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<csv::Error> for DatasetError {
    fn from(e: csv::Error) -> Self {
        Self::Csv(e)
    }
}

/// Read the merit export: skip the preamble, pick the required columns by
/// header name, drop rows without a unit code or merit value, sort by
/// merit descending, optionally keep only the top `top`.
pub fn read_dataset(
    path: &Path,
    skip_rows: usize,
    top: Option<usize>,
) -> Result<Vec<SchoolRecord>, DatasetError> {
    let raw = fs::read_to_string(path)?;
    let data: String = raw
        .lines()
        .skip(skip_rows)
        .collect::<Vec<_>>()
        .join("\n");

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .from_reader(data.as_bytes());

    let headers = reader.headers()?.clone();
    let id_col = column(&headers, COL_ID)?;
    let name_col = column(&headers, COL_NAME)?;
    let municipality_col = column(&headers, COL_MUNICIPALITY)?;
    let merit_col = column(&headers, COL_MERIT)?;

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let id = row.get(id_col).unwrap_or("").trim();
        if id.is_empty() {
            continue;
        }
        let Some(merit) = parse_merit(row.get(merit_col).unwrap_or("")) else {
            continue;
        };
        records.push(SchoolRecord {
            id: id.to_string(),
            name: row.get(name_col).unwrap_or("").trim().to_string(),
            municipality: row.get(municipality_col).unwrap_or("").trim().to_string(),
            merit,
        });
    }

    records.sort_by(|a, b| b.merit.partial_cmp(&a.merit).unwrap_or(Ordering::Equal));
    if let Some(n) = top {
        records.truncate(n);
    }
    Ok(records)
}

fn column(headers: &csv::StringRecord, name: &str) -> Result<usize, DatasetError> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| DatasetError::MissingColumn(name.to_string()))
}

/// The export writes decimal commas ("280,5").
fn parse_merit(field: &str) -> Option<f64> {
    let normalized = field.trim().replace(',', ".");
    if normalized.is_empty() {
        return None;
    }
    normalized.parse().ok()
}

/// Write the enriched table the downstream map renderer consumes.
pub fn write_enriched(path: &Path, records: &[EnrichedRecord]) -> Result<(), DatasetError> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}
