//! Column type inference over a bounded sample.
//!
//! Candidates are tried from most to least specific: Boolean, Integer, Float,
//! Date, Datetime, JSON, then String. A candidate wins only when every non-null
//! sampled value parses as that type. `Category` is never inferred, only declared.

use super::parse::{self, DATE_FORMATS};
use super::value::DType;
use chrono::NaiveDate;

/// Outcome of inferring one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnInference {
    pub dtype: DType,
    /// The layout every sampled date matched. Set only for [`DType::Date`].
    pub date_format: Option<&'static str>,
}

/// Infer a column type from raw text cells.
///
/// Only the first `sample_size` non-empty values are inspected. An all-empty
/// sample yields [`DType::String`].
pub fn infer_dtype<'a, I>(values: I, sample_size: usize) -> DType
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    infer_column(values, sample_size).dtype
}

/// Like [`infer_dtype`], also reporting the date layout so cells can be parsed
/// with it instead of the first layout that happens to fit.
pub fn infer_column<'a, I>(values: I, sample_size: usize) -> ColumnInference
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let sample: Vec<&str> = values
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .take(sample_size.max(1))
        .collect();

    let plain = |dtype| ColumnInference {
        dtype,
        date_format: None,
    };
    if sample.is_empty() {
        return plain(DType::String);
    }

    if sample.iter().all(|s| parse::parse_bool(s).is_some()) {
        plain(DType::Boolean)
    } else if sample.iter().all(|s| parse::parse_int(s).is_some()) {
        plain(DType::Integer)
    } else if sample.iter().all(|s| parse::parse_float(s).is_some()) {
        plain(DType::Float)
    } else if let Some(layout) = shared_date_format(&sample) {
        ColumnInference {
            dtype: DType::Date,
            date_format: Some(layout),
        }
    } else if sample.iter().all(|s| parse::parse_datetime(s).is_some()) {
        plain(DType::Datetime)
    } else if sample.iter().all(|s| looks_like_json(s)) {
        plain(DType::Json)
    } else {
        plain(DType::String)
    }
}

/// The first date layout that parses every sampled value.
pub fn shared_date_format(sample: &[&str]) -> Option<&'static str> {
    DATE_FORMATS
        .iter()
        .find(|fmt| {
            sample
                .iter()
                .all(|s| NaiveDate::parse_from_str(s, fmt).is_ok())
        })
        .copied()
}

fn looks_like_json(s: &str) -> bool {
    let starts_structured = s.starts_with('{') || s.starts_with('[');
    starts_structured && serde_json::from_str::<serde_json::Value>(s).is_ok()
}
