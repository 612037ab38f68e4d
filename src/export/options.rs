//! Export configuration attached to each job.

use crate::dataset::Value;
use crate::error::{CleanserError, Result};
use chrono::format::{Item, StrftimeItems};
use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    /// Newline-delimited JSON records
    Json,
    Xlsx,
    Parquet,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Xlsx => "xlsx",
            Self::Parquet => "parquet",
        }
    }

    /// Name of the artifact file produced for this format.
    pub fn file_name(self) -> String {
        format!("cleaned_data.{}", self.extension())
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteStyle {
    /// Quote only fields that need it
    #[default]
    Minimal,
    All,
    NonNumeric,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumberFormat {
    /// Thousands separators: `1,234.5`
    Comma,
    /// Scaled by 100 with two decimals: `12.50%`
    Percent,
}

/// Byte encodings supported for text outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    /// UTF-8 with a byte order mark
    Utf8Bom,
    Latin1,
}

impl TextEncoding {
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" => Ok(Self::Utf8),
            "utf-8-sig" | "utf8-sig" => Ok(Self::Utf8Bom),
            "latin-1" | "latin1" | "iso-8859-1" => Ok(Self::Latin1),
            other => Err(CleanserError::Resource(format!("unsupported encoding '{other}'"))),
        }
    }

    pub fn encode(self, text: &str) -> Result<Vec<u8>> {
        match self {
            Self::Utf8 => Ok(text.as_bytes().to_vec()),
            Self::Utf8Bom => {
                let mut bytes = Vec::with_capacity(text.len() + 3);
                bytes.extend_from_slice(&[0xEF, 0xBB, 0xBF]);
                bytes.extend_from_slice(text.as_bytes());
                Ok(bytes)
            }
            Self::Latin1 => text
                .chars()
                .map(|c| {
                    u8::try_from(u32::from(c)).map_err(|_overflow| {
                        CleanserError::Resource(format!(
                            "character '{c}' cannot be encoded as latin-1"
                        ))
                    })
                })
                .collect(),
        }
    }
}

/// How the cleaned table is serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    pub format: ExportFormat,
    pub delimiter: String,
    pub encoding: String,
    pub quote_style: QuoteStyle,
    pub line_ending: String,
    pub sheet_name: String,
    /// strftime layout for date and datetime cells
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number_format: Option<NumberFormat>,
    /// Text written for null cells
    pub na_rep: String,
    /// Columns to export, in this order. Unknown names are ignored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_columns: Option<Vec<String>>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            format: ExportFormat::Csv,
            delimiter: ",".to_owned(),
            encoding: "utf-8".to_owned(),
            quote_style: QuoteStyle::Minimal,
            line_ending: "\n".to_owned(),
            sheet_name: "Sheet1".to_owned(),
            date_format: None,
            number_format: None,
            na_rep: String::new(),
            selected_columns: None,
        }
    }
}

impl ExportOptions {
    pub fn with_format(format: ExportFormat) -> Self {
        Self {
            format,
            ..Self::default()
        }
    }

    /// Structural checks done at submission time.
    pub fn validate(&self) -> Result<()> {
        self.delimiter_byte()?;
        if !matches!(self.line_ending.as_str(), "\n" | "\r\n" | "\r") {
            return Err(CleanserError::Config(format!(
                "line ending must be \\n, \\r\\n or \\r, got {:?}",
                self.line_ending
            )));
        }
        if let Some(date_format) = &self.date_format {
            if StrftimeItems::new(date_format).any(|item| matches!(item, Item::Error)) {
                return Err(CleanserError::Config(format!(
                    "invalid date format '{date_format}'"
                )));
            }
            render_temporal(&NaiveDateTime::default(), date_format)?;
        }
        if self.sheet_name.trim().is_empty() {
            return Err(CleanserError::Config("sheet name must not be empty".to_owned()));
        }
        Ok(())
    }

    pub fn delimiter_byte(&self) -> Result<u8> {
        match self.delimiter.as_bytes() {
            [b] if b.is_ascii() => Ok(*b),
            _ => Err(CleanserError::Config(format!(
                "delimiter must be a single ASCII character, got {:?}",
                self.delimiter
            ))),
        }
    }

    pub fn text_encoding(&self) -> Result<TextEncoding> {
        TextEncoding::parse(&self.encoding)
    }

    /// Render a cell for text outputs honoring `na_rep`, `date_format` and
    /// `number_format`.
    ///
    /// Dates are rendered at midnight so layouts with time fields still apply.
    pub fn format_cell(&self, value: &Value) -> Result<String> {
        let rendered = match value {
            Value::Null => self.na_rep.clone(),
            Value::Date(d) => match &self.date_format {
                Some(fmt) => render_temporal(&d.and_time(NaiveTime::MIN), fmt)?,
                None => value.to_string(),
            },
            Value::DateTime(dt) => match &self.date_format {
                Some(fmt) => render_temporal(dt, fmt)?,
                None => value.to_string(),
            },
            Value::Int(_) | Value::Float(_) => match (self.number_format, value.as_f64()) {
                (Some(NumberFormat::Percent), Some(x)) => format!("{:.2}%", x * 100.0),
                (Some(NumberFormat::Comma), _) => group_thousands(&value.to_string()),
                _ => value.to_string(),
            },
            _ => value.to_string(),
        };
        Ok(rendered)
    }
}

/// chrono reports layouts it cannot fill (time zone fields on a naive value)
/// as a `fmt::Error`.
fn render_temporal(value: &NaiveDateTime, layout: &str) -> Result<String> {
    let mut out = String::new();
    write!(out, "{}", value.format(layout)).map_err(|_unrenderable| {
        CleanserError::Config(format!(
            "date format '{layout}' cannot be applied to naive dates"
        ))
    })?;
    Ok(out)
}

/// Insert `,` between groups of three digits in the integer part.
fn group_thousands(number: &str) -> String {
    let (sign, unsigned) = match number.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", number),
    };
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (unsigned, None),
    };

    let digits: Vec<char> = int_part.chars().collect();
    let mut grouped = String::with_capacity(number.len() + digits.len() / 3);
    grouped.push_str(sign);
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(*c);
    }
    if let Some(frac) = frac_part {
        grouped.push('.');
        grouped.push_str(frac);
    }
    grouped
}
