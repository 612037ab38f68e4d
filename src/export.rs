//! Serialization of cleaned tables into export artifacts.
//!
//! Each output format is a [`TableWriter`]. CSV, JSON lines and Parquet writers
//! are built in; other formats (such as xlsx) are plugged in through
//! [`CodecRegistry::register`]. Writers only produce bytes. Persisting them is
//! the job of an [`ArtifactStore`](crate::jobs::ArtifactStore).

pub mod csv;
pub mod json;
pub mod options;
pub mod parquet;

pub use options::{ExportFormat, ExportOptions, NumberFormat, QuoteStyle, TextEncoding};

use crate::dataset::Dataset;
use crate::error::{CleanserError, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Serializes a table in one output format.
pub trait TableWriter: Send + Sync {
    fn format(&self) -> ExportFormat;

    /// Produce the complete artifact bytes. Must be deterministic for a given
    /// table and options.
    fn write(&self, table: &Dataset, options: &ExportOptions) -> Result<Vec<u8>>;
}

/// Writers keyed by the format they produce.
#[derive(Clone, Default)]
pub struct CodecRegistry {
    writers: HashMap<ExportFormat, Arc<dyn TableWriter>>,
}

impl CodecRegistry {
    /// Registry with no writers at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the CSV, JSON and Parquet writers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(csv::CsvWriter));
        registry.register(Arc::new(json::JsonLinesWriter));
        registry.register(Arc::new(parquet::ParquetTableWriter));
        registry
    }

    /// Add or replace the writer for its format.
    pub fn register(&mut self, writer: Arc<dyn TableWriter>) {
        self.writers.insert(writer.format(), writer);
    }

    pub fn get(&self, format: ExportFormat) -> Result<Arc<dyn TableWriter>> {
        self.writers
            .get(&format)
            .cloned()
            .ok_or_else(|| CleanserError::Resource(format!("no writer registered for {format}")))
    }

    pub fn supports(&self, format: ExportFormat) -> bool {
        self.writers.contains_key(&format)
    }
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut formats: Vec<_> = self.writers.keys().map(|k| k.extension()).collect();
        formats.sort_unstable();
        f.debug_struct("CodecRegistry").field("formats", &formats).finish()
    }
}

/// Serialized output ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Applies column selection and dispatches to the registered writer.
#[derive(Debug, Clone)]
pub struct ExportAdapter {
    registry: CodecRegistry,
}

impl ExportAdapter {
    pub fn new(registry: CodecRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &CodecRegistry {
        &self.registry
    }

    pub fn export(&self, dataset: &Dataset, options: &ExportOptions) -> Result<Artifact> {
        let writer = self.registry.get(options.format)?;
        let table = select_columns(dataset, options.selected_columns.as_deref());
        let bytes = writer.write(&table, options).map_err(CleanserError::into_resource)?;
        tracing::debug!(
            format = %options.format,
            rows = table.len(),
            columns = table.width(),
            bytes = bytes.len(),
            "Serialized export"
        );
        Ok(Artifact {
            file_name: options.format.file_name(),
            bytes,
        })
    }
}

impl Default for ExportAdapter {
    fn default() -> Self {
        Self::new(CodecRegistry::with_defaults())
    }
}

/// Restrict to the selected columns that exist, in selection order.
///
/// With no selection, or when none of the names exist, every column is kept.
pub fn select_columns(dataset: &Dataset, selected: Option<&[String]>) -> Dataset {
    let indices: Vec<usize> = selected
        .unwrap_or_default()
        .iter()
        .filter_map(|name| dataset.column_index(name))
        .collect();
    if indices.is_empty() {
        dataset.clone()
    } else {
        dataset.select(&indices)
    }
}
