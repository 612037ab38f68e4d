//! CSV ingestion used by the command line front end.
//!
//! Uploading and parsing files is outside the job service; this reader exists so
//! the CLI can turn a local file into a [`Dataset`] before handing it over.

use super::Dataset;
use crate::error::{CleanserError, Result, ResultExt as _};
use std::io::Read;
use std::path::Path;

/// Read a headed CSV file and infer column types from the first `sample_size` rows.
pub fn read_csv(path: impl AsRef<Path>, sample_size: usize) -> Result<Dataset> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    read_csv_from(file, b',', sample_size)
        .with_context(|| format!("Failed to read {}", path.display()))
}

/// Read headed CSV from any reader using the given delimiter.
pub fn read_csv_from<R: Read>(reader: R, delimiter: u8, sample_size: usize) -> Result<Dataset> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .flexible(false)
        .from_reader(reader);

    let names: Vec<String> = csv_reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_owned())
        .collect();
    if names.is_empty() {
        return Err(CleanserError::Data("CSV input has no header row".to_owned()));
    }

    let mut rows = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        rows.push(
            record
                .iter()
                .map(|cell| (!cell.is_empty()).then(|| cell.to_owned()))
                .collect(),
        );
    }

    tracing::debug!(columns = names.len(), rows = rows.len(), "Parsed CSV input");
    Dataset::from_raw(names, rows, sample_size)
}
