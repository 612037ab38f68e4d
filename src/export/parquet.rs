//! Parquet output through polars.
//!
//! Each column gets the narrowest polars type that holds all of its non-null
//! values; mixed or textual columns are written as strings.

use super::options::{ExportFormat, ExportOptions};
use super::TableWriter;
use crate::dataset::{Dataset, Value};
use crate::error::Result;
use polars::prelude::*;

/// Day number of 1970-01-01 counted from 0001-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

pub struct ParquetTableWriter;

impl TableWriter for ParquetTableWriter {
    fn format(&self) -> ExportFormat {
        ExportFormat::Parquet
    }

    fn write(&self, table: &Dataset, _options: &ExportOptions) -> Result<Vec<u8>> {
        let mut df = to_data_frame(table)?;
        let mut buf = Vec::new();
        ParquetWriter::new(&mut buf).finish(&mut df)?;
        Ok(buf)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Storage {
    Boolean,
    Int,
    Float,
    Date,
    Datetime,
    Text,
}

fn storage_for<'a>(values: impl Iterator<Item = &'a Value>) -> Storage {
    let mut storage: Option<Storage> = None;
    for value in values {
        let kind = match value {
            Value::Null => continue,
            Value::Bool(_) => Storage::Boolean,
            Value::Int(_) => Storage::Int,
            Value::Float(_) => Storage::Float,
            Value::Date(_) => Storage::Date,
            Value::DateTime(_) => Storage::Datetime,
            Value::Text(_) | Value::List(_) => return Storage::Text,
        };
        storage = Some(match (storage, kind) {
            (None, k) => k,
            (Some(a), b) if a == b => a,
            (Some(Storage::Int | Storage::Float), Storage::Int | Storage::Float) => Storage::Float,
            (Some(Storage::Date | Storage::Datetime), Storage::Date | Storage::Datetime) => {
                Storage::Datetime
            }
            _ => return Storage::Text,
        });
    }
    storage.unwrap_or(Storage::Text)
}

fn to_column(name: &str, table: &Dataset, index: usize) -> Result<Column> {
    let values = || table.column_values(index);
    let series = match storage_for(values()) {
        Storage::Boolean => Series::new(
            name.into(),
            values()
                .map(|v| match v {
                    Value::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        ),
        Storage::Int => Series::new(
            name.into(),
            values()
                .map(|v| match v {
                    Value::Int(i) => Some(*i),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        ),
        Storage::Float => Series::new(
            name.into(),
            values().map(Value::as_f64).collect::<Vec<_>>(),
        ),
        Storage::Date => Series::new(
            name.into(),
            values()
                .map(|v| match v {
                    Value::Date(d) => Some(chrono::Datelike::num_days_from_ce(d) - UNIX_EPOCH_DAYS_FROM_CE),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )
        .cast(&DataType::Date)?,
        Storage::Datetime => Series::new(
            name.into(),
            values()
                .map(|v| v.as_datetime().map(|dt| dt.and_utc().timestamp_millis()))
                .collect::<Vec<_>>(),
        )
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?,
        Storage::Text => Series::new(
            name.into(),
            values()
                .map(|v| (!v.is_null()).then(|| v.to_string()))
                .collect::<Vec<_>>(),
        ),
    };
    Ok(Column::from(series))
}

/// Convert a dataset into a polars frame with one typed column per dataset column.
pub fn to_data_frame(table: &Dataset) -> Result<DataFrame> {
    let columns = table
        .columns()
        .iter()
        .enumerate()
        .map(|(index, info)| to_column(&info.name, table, index))
        .collect::<Result<Vec<_>>>()?;
    Ok(DataFrame::new(columns)?)
}
