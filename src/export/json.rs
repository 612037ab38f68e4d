//! Newline-delimited JSON records, one object per row with keys in column order.

use super::options::{ExportFormat, ExportOptions};
use super::TableWriter;
use crate::dataset::{Dataset, Value};
use crate::error::Result;

pub struct JsonLinesWriter;

impl TableWriter for JsonLinesWriter {
    fn format(&self) -> ExportFormat {
        ExportFormat::Json
    }

    fn write(&self, table: &Dataset, options: &ExportOptions) -> Result<Vec<u8>> {
        let encoding = options.text_encoding()?;
        let keys = table
            .column_names()
            .map(serde_json::to_string)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut out = String::new();
        for row in table.rows() {
            out.push('{');
            for (i, (key, value)) in keys.iter().zip(row).enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(key);
                out.push(':');
                out.push_str(&render_value(value, options)?);
            }
            out.push('}');
            out.push('\n');
        }
        encoding.encode(&out)
    }
}

/// Typed JSON, with temporal values following `date_format` when set.
fn render_value(value: &Value, options: &ExportOptions) -> Result<String> {
    let rendered = match (value, &options.date_format) {
        (Value::Date(_) | Value::DateTime(_), Some(_)) => {
            serde_json::to_string(&options.format_cell(value)?)?
        }
        _ => serde_json::to_string(value)?,
    };
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{ColumnInfo, DType};

    #[test]
    fn test_records_keep_column_order() {
        let ds = Dataset::new(
            vec![
                ColumnInfo::new("z", DType::Integer),
                ColumnInfo::new("a", DType::String),
            ],
            vec![
                vec![Value::Int(1), Value::text("x\"y")],
                vec![Value::Null, Value::List(vec!["p".to_owned(), "q".to_owned()])],
            ],
        )
        .expect("valid dataset");

        let bytes = JsonLinesWriter
            .write(&ds, &ExportOptions::with_format(ExportFormat::Json))
            .expect("write");
        let text = String::from_utf8(bytes).expect("utf-8");
        assert_eq!(
            text,
            "{\"z\":1,\"a\":\"x\\\"y\"}\n{\"z\":null,\"a\":[\"p\",\"q\"]}\n"
        );
    }

    #[test]
    fn test_date_format_applies_to_dates() {
        let date = chrono::NaiveDate::from_ymd_opt(2024, 5, 6).expect("valid date");
        let ds = Dataset::new(
            vec![ColumnInfo::new("d", DType::Date)],
            vec![vec![Value::Date(date)]],
        )
        .expect("valid dataset");
        let options = ExportOptions {
            format: ExportFormat::Json,
            date_format: Some("%d.%m.%Y".to_owned()),
            ..ExportOptions::default()
        };
        let bytes = JsonLinesWriter.write(&ds, &options).expect("write");
        assert_eq!(bytes, b"{\"d\":\"06.05.2024\"}\n".to_vec());
    }
}
