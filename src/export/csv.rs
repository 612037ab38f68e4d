//! Delimited text output.

use super::options::{ExportFormat, ExportOptions, QuoteStyle};
use super::TableWriter;
use crate::dataset::Dataset;
use crate::error::{CleanserError, Result};

pub struct CsvWriter;

impl TableWriter for CsvWriter {
    fn format(&self) -> ExportFormat {
        ExportFormat::Csv
    }

    fn write(&self, table: &Dataset, options: &ExportOptions) -> Result<Vec<u8>> {
        let encoding = options.text_encoding()?;
        let text = render(table, options)?;
        encoding.encode(&text)
    }
}

fn quote_style(style: QuoteStyle) -> csv::QuoteStyle {
    match style {
        QuoteStyle::Minimal => csv::QuoteStyle::Necessary,
        QuoteStyle::All => csv::QuoteStyle::Always,
        QuoteStyle::NonNumeric => csv::QuoteStyle::NonNumeric,
        QuoteStyle::None => csv::QuoteStyle::Never,
    }
}

fn terminator(line_ending: &str) -> csv::Terminator {
    match line_ending {
        "\r\n" => csv::Terminator::CRLF,
        "\r" => csv::Terminator::Any(b'\r'),
        _ => csv::Terminator::Any(b'\n'),
    }
}

/// Header plus one record per row, as UTF-8 text.
pub fn render(table: &Dataset, options: &ExportOptions) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(options.delimiter_byte()?)
        .quote_style(quote_style(options.quote_style))
        .terminator(terminator(&options.line_ending))
        .from_writer(Vec::new());

    writer.write_record(table.column_names())?;
    for row in table.rows() {
        let record = row
            .iter()
            .map(|value| options.format_cell(value))
            .collect::<Result<Vec<_>>>()?;
        writer.write_record(&record)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| CleanserError::Resource(format!("CSV flush failed: {}", e.error())))?;
    String::from_utf8(bytes)
        .map_err(|e| CleanserError::Resource(format!("CSV output is not UTF-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{ColumnInfo, DType, Value};

    fn table() -> Dataset {
        Dataset::new(
            vec![
                ColumnInfo::new("name", DType::String),
                ColumnInfo::new("score", DType::Float),
            ],
            vec![
                vec![Value::text("Smith, J"), Value::Float(1.5)],
                vec![Value::text("Lee"), Value::Null],
            ],
        )
        .expect("valid dataset")
    }

    #[test]
    fn test_minimal_quoting() {
        let text = render(&table(), &ExportOptions::default()).expect("render");
        assert_eq!(text, "name,score\n\"Smith, J\",1.5\nLee,\n");
    }

    #[test]
    fn test_semicolon_crlf_and_na_rep() {
        let options = ExportOptions {
            delimiter: ";".to_owned(),
            line_ending: "\r\n".to_owned(),
            na_rep: "NULL".to_owned(),
            ..ExportOptions::default()
        };
        let text = render(&table(), &options).expect("render");
        assert_eq!(text, "name;score\r\nSmith, J;1.5\r\nLee;NULL\r\n");
    }

    #[test]
    fn test_quote_all() {
        let options = ExportOptions {
            quote_style: QuoteStyle::All,
            ..ExportOptions::default()
        };
        let text = render(&table(), &options).expect("render");
        assert!(text.starts_with("\"name\",\"score\"\n"));
    }

    #[test]
    fn test_latin1_bytes() {
        let ds = Dataset::new(
            vec![ColumnInfo::new("city", DType::String)],
            vec![vec![Value::text("Zürich")]],
        )
        .expect("valid dataset");
        let options = ExportOptions {
            encoding: "latin-1".to_owned(),
            ..ExportOptions::default()
        };
        let bytes = CsvWriter.write(&ds, &options).expect("write");
        assert_eq!(bytes, b"city\nZ\xfcrich\n".to_vec());
    }
}
