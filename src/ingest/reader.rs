use crate::error::{AppError, Result};
use crate::models::RawRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info};

/// Layout of a log export file
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum InputFormat {
    /// Detect from the first non-whitespace character
    #[default]
    Auto,
    /// A single JSON array of objects
    JsonArray,
    /// One JSON object per line (`journalctl -o json`)
    JsonLines,
}

impl InputFormat {
    fn resolve(self, input: &str) -> InputFormat {
        match self {
            InputFormat::Auto => {
                if input.trim_start().starts_with('[') {
                    InputFormat::JsonArray
                } else {
                    InputFormat::JsonLines
                }
            }
            other => other,
        }
    }
}

/// Parse raw records from an in-memory export
pub fn parse_records(input: &str, format: InputFormat) -> Result<Vec<RawRecord>> {
    match format.resolve(input) {
        InputFormat::JsonArray => {
            let records: Vec<RawRecord> = serde_json::from_str(input)
                .map_err(|e| AppError::Serialization(format!("invalid JSON array: {}", e)))?;
            Ok(records)
        }
        _ => {
            let mut records = Vec::new();
            for (line_no, line) in input.lines().enumerate() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let record: RawRecord = serde_json::from_str(line).map_err(|e| {
                    AppError::Serialization(format!("line {}: {}", line_no + 1, e))
                })?;
                records.push(record);
            }
            Ok(records)
        }
    }
}

/// Read raw records from a file
pub async fn read_records(path: impl AsRef<Path>, format: InputFormat) -> Result<Vec<RawRecord>> {
    let path = path.as_ref();
    debug!(path = %path.display(), ?format, "Reading log export");

    let input = tokio::fs::read_to_string(path).await.map_err(|e| {
        AppError::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    })?;
    let records = parse_records(&input, format)?;

    info!(path = %path.display(), records = records.len(), "Loaded log records");
    Ok(records)
}

/// Keys present in every record, sorted
pub fn common_keys(records: &[RawRecord]) -> Vec<String> {
    let mut iter = records.iter();
    let first = match iter.next() {
        Some(first) => first,
        None => return Vec::new(),
    };

    let mut common: BTreeSet<String> = first.keys().cloned().collect();
    for record in iter {
        common.retain(|key| record.contains_key(key));
        if common.is_empty() {
            break;
        }
    }
    common.into_iter().collect()
}
