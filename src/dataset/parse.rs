//! Text parsing helpers shared by type inference, transforms and dtype coercion.

use super::value::{DType, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Date layouts recognised during inference and coercion, most specific first.
pub const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%m/%d/%Y", "%d.%m.%Y"];

/// Datetime layouts recognised during inference and coercion. RFC 3339 is tried separately.
pub const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

/// Strict boolean literals used by inference.
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "yes" => Some(true),
        "false" | "no" => Some(false),
        _ => None,
    }
}

/// Boolean literals accepted when coercing into a declared `Boolean` column.
pub fn parse_bool_loose(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "yes" | "y" | "t" | "1" => Some(true),
        "false" | "no" | "n" | "f" | "0" => Some(false),
        _ => None,
    }
}

pub fn parse_int(s: &str) -> Option<i64> {
    s.trim().parse::<i64>().ok()
}

/// Finite floats only; `NaN` and `inf` are not numbers for cleaning purposes.
pub fn parse_float(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|x| x.is_finite())
}

/// Which character separates the fractional part of a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecimalMark {
    /// `1,234.5`
    #[default]
    Point,
    /// `1.234,5`
    Comma,
}

impl DecimalMark {
    fn separators(self) -> (char, char) {
        match self {
            Self::Point => ('.', ','),
            Self::Comma => (',', '.'),
        }
    }
}

/// Integer first, then float, with `.` as the decimal mark.
pub fn parse_number(s: &str) -> Option<Value> {
    parse_number_with(s, DecimalMark::Point)
}

/// Parse a number written with the given decimal mark. Thousands separators
/// (the other mark, `_` or a space) are accepted only between groups of three
/// digits, so `1,5` is not read as fifteen.
pub fn parse_number_with(s: &str, mark: DecimalMark) -> Option<Value> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    if mark == DecimalMark::Point
        && let Some(number) = plain_number(trimmed)
    {
        return Some(number);
    }

    let (decimal, group) = mark.separators();
    let (int_part, frac_part) = match trimmed.rsplit_once(decimal) {
        Some((int_part, frac)) => (int_part, Some(frac)),
        None => (trimmed, None),
    };
    let digits = strip_grouping(int_part, group)?;
    match frac_part {
        Some(frac) => plain_number(&format!("{digits}.{frac}")),
        None => plain_number(&digits),
    }
}

fn plain_number(s: &str) -> Option<Value> {
    parse_int(s)
        .map(Value::Int)
        .or_else(|| parse_float(s).map(Value::Float))
}

fn strip_grouping(int_part: &str, group: char) -> Option<String> {
    let (sign, unsigned) = match int_part.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", int_part),
    };
    let groups: Vec<&str> = unsigned
        .split(|c: char| c == group || c == '_' || c == ' ')
        .collect();
    if let [first, rest @ ..] = groups.as_slice()
        && !rest.is_empty()
        && (first.is_empty() || first.len() > 3 || rest.iter().any(|g| g.len() != 3))
    {
        return None;
    }
    Some(format!("{sign}{}", groups.concat()))
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let trimmed = s.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

/// Parse with one known layout only.
pub fn parse_date_with(s: &str, layout: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), layout).ok()
}

/// Known datetime layouts, RFC 3339 (converted to UTC), then a bare date at midnight.
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let trimmed = s.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(trimmed)
                .ok()
                .map(|dt| dt.naive_utc())
        })
        .or_else(|| parse_date(trimmed).and_then(|d| d.and_hms_opt(0, 0, 0)))
}

/// Convert a value into the representation required by `dtype`.
///
/// Returns `None` when the value cannot be represented; nulls always pass.
pub fn coerce(value: Value, dtype: DType) -> Option<Value> {
    if value.is_null() {
        return Some(Value::Null);
    }
    match dtype {
        DType::String | DType::Category => Some(match value {
            Value::Text(_) | Value::List(_) => value,
            other => Value::Text(other.to_string()),
        }),
        DType::Json => Some(value),
        DType::Boolean => match value {
            Value::Bool(_) => Some(value),
            Value::Int(0) => Some(Value::Bool(false)),
            Value::Int(1) => Some(Value::Bool(true)),
            Value::Text(s) => parse_bool_loose(&s).map(Value::Bool),
            _ => None,
        },
        DType::Integer => match value {
            Value::Int(_) => Some(value),
            Value::Float(x) => float_to_int(x).map(Value::Int),
            Value::Bool(b) => Some(Value::Int(i64::from(b))),
            Value::Text(s) => match parse_number(&s)? {
                Value::Float(x) => float_to_int(x).map(Value::Int),
                other => Some(other),
            },
            _ => None,
        },
        DType::Float => match value {
            Value::Float(_) => Some(value),
            Value::Int(_) => value.as_f64().map(Value::Float),
            Value::Bool(b) => Some(Value::Float(if b { 1.0 } else { 0.0 })),
            Value::Text(s) => parse_number(&s)?.as_f64().map(Value::Float),
            _ => None,
        },
        DType::Date => match value {
            Value::Date(_) => Some(value),
            Value::DateTime(dt) => Some(Value::Date(dt.date())),
            Value::Text(s) => parse_date(&s)
                .or_else(|| parse_datetime(&s).map(|dt| dt.date()))
                .map(Value::Date),
            _ => None,
        },
        DType::Datetime => match value {
            Value::DateTime(_) => Some(value),
            Value::Date(d) => d.and_hms_opt(0, 0, 0).map(Value::DateTime),
            Value::Text(s) => parse_datetime(&s).map(Value::DateTime),
            _ => None,
        },
    }
}

fn float_to_int(x: f64) -> Option<i64> {
    let in_range = x >= -9_223_372_036_854_775_808.0 && x < 9_223_372_036_854_775_808.0;
    (x.fract() == 0.0 && in_range).then_some(x as i64)
}
