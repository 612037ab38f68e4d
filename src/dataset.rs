//! In-memory tabular data: ordered named columns with a dtype and rows of [`Value`]s.
//!
//! A [`Dataset`] handed to the job service is treated as a read-only snapshot.
//! Each job clones it into a working copy that only that job mutates.

pub mod inference;
pub mod io;
pub mod parse;
pub mod value;

pub use inference::{ColumnInference, infer_column, infer_dtype};
pub use value::{DType, Value, ValueKey};

use crate::error::{CleanserError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A row of cells, positionally aligned with [`Dataset::columns`].
pub type Row = Vec<Value>;

/// Name and type of a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub dtype: DType,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, dtype: DType) -> Self {
        Self {
            name: name.into(),
            dtype,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    columns: Vec<ColumnInfo>,
    rows: Vec<Row>,
}

impl Dataset {
    /// Build a dataset from typed rows.
    ///
    /// Column names must be unique and every row must have one cell per column.
    pub fn new(columns: Vec<ColumnInfo>, rows: Vec<Row>) -> Result<Self> {
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(CleanserError::Data(format!(
                    "duplicate column name '{}'",
                    column.name
                )));
            }
        }

        if let Some((idx, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != columns.len())
        {
            return Err(CleanserError::Data(format!(
                "row {idx} has {} cells, expected {}",
                row.len(),
                columns.len()
            )));
        }

        Ok(Self { columns, rows })
    }

    /// Build a dataset from raw text cells, inferring each column's dtype from
    /// the first `sample_size` values. Empty cells become null.
    ///
    /// Date columns are parsed with the single layout inferred for the column,
    /// so `01/05/2024` reads the same way as its unambiguous neighbours.
    pub fn from_raw(names: Vec<String>, raw_rows: Vec<Vec<Option<String>>>, sample_size: usize) -> Result<Self> {
        let inferred: Vec<ColumnInference> = (0..names.len())
            .map(|col| {
                infer_column(
                    raw_rows
                        .iter()
                        .map(|row| row.get(col).and_then(|cell| cell.as_deref())),
                    sample_size,
                )
            })
            .collect();

        let columns: Vec<ColumnInfo> = names
            .into_iter()
            .zip(&inferred)
            .map(|(name, column)| ColumnInfo::new(name, column.dtype))
            .collect();

        let rows = raw_rows
            .into_iter()
            .map(|raw| {
                raw.into_iter()
                    .zip(&inferred)
                    .map(|(cell, column)| match cell {
                        Some(text) if !text.trim().is_empty() => read_cell(text, column),
                        _ => Value::Null,
                    })
                    .collect()
            })
            .collect();

        Self::new(columns, rows)
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn dtype(&self, name: &str) -> Option<DType> {
        self.columns.iter().find(|c| c.name == name).map(|c| c.dtype)
    }

    pub fn set_dtype(&mut self, index: usize, dtype: DType) {
        if let Some(column) = self.columns.get_mut(index) {
            column.dtype = dtype;
        }
    }

    /// Turn an integer column into a float column, converting its cells.
    /// Other columns are left alone.
    pub fn widen_to_float(&mut self, index: usize) {
        if self.columns.get(index).is_none_or(|c| c.dtype != DType::Integer) {
            return;
        }
        for cell in self.rows.iter_mut().filter_map(|row| row.get_mut(index)) {
            if let Value::Int(n) = *cell {
                *cell = Value::Float(n as f64);
            }
        }
        self.set_dtype(index, DType::Float);
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [Row] {
        &mut self.rows
    }

    /// Keep only the rows for which `keep` returns true, preserving order.
    pub fn retain_rows(&mut self, keep: impl FnMut(&Row) -> bool) {
        self.rows.retain(keep);
    }

    /// All values of one column, top to bottom.
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &Value> {
        self.rows.iter().filter_map(move |row| row.get(index))
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index)
    }

    /// First `n` rows with the same columns.
    pub fn head(&self, n: usize) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    /// A dataset restricted to the given column positions, in that order.
    pub fn select(&self, indices: &[usize]) -> Self {
        let columns = indices
            .iter()
            .filter_map(|&i| self.columns.get(i).cloned())
            .collect();
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().filter_map(|&i| row.get(i).cloned()).collect())
            .collect();
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn into_parts(self) -> (Vec<ColumnInfo>, Vec<Row>) {
        (self.columns, self.rows)
    }
}

/// Coerce one raw cell to its inferred dtype, keeping the text when it does not fit.
fn read_cell(text: String, column: &ColumnInference) -> Value {
    let parsed = match (column.dtype, column.date_format) {
        (DType::Date, Some(layout)) => parse::parse_date_with(&text, layout).map(Value::Date),
        (dtype, _) => parse::coerce(Value::Text(text.clone()), dtype),
    };
    parsed.unwrap_or(Value::Text(text))
}
