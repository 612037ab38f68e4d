//! Per-column value transforms followed by coercion to the declared type.
//!
//! String transforms only touch text cells; anything else passes through
//! unchanged. Parse failures null the cell and leave a warning behind.

use super::plan::{ColumnPlan, CompiledTransform};
use super::validation::{ValidationWarning, WarningKind};
use crate::dataset::{DType, Dataset, Value, parse};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone as _};
use chrono_tz::Tz;

/// Apply every column's transform chain, then coerce the column to its
/// declared type. Returns the warnings raised along the way.
pub fn apply_transforms(dataset: &mut Dataset, columns: &[ColumnPlan]) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    for plan in columns {
        for (row_idx, row) in dataset.rows_mut().iter_mut().enumerate() {
            let Some(cell) = row.get_mut(plan.index) else {
                continue;
            };
            let mut value = std::mem::take(cell);

            for transform in &plan.transforms {
                value = match apply_transform(value, transform) {
                    Ok(v) => v,
                    Err(observed) => {
                        warnings.push(ValidationWarning::new(
                            row_idx,
                            &plan.name,
                            failure_kind(transform),
                            &observed,
                        ));
                        Value::Null
                    }
                };
            }

            *cell = match coerce_or_observed(value, plan.dtype) {
                Ok(v) => v,
                Err(observed) => {
                    warnings.push(ValidationWarning::new(
                        row_idx,
                        &plan.name,
                        WarningKind::TypeCoercion,
                        &observed,
                    ));
                    Value::Null
                }
            };
        }
        dataset.set_dtype(plan.index, plan.dtype);
    }

    if !warnings.is_empty() {
        tracing::debug!(count = warnings.len(), "Transforms produced warnings");
    }
    warnings
}

fn coerce_or_observed(value: Value, dtype: DType) -> Result<Value, Value> {
    let observed = value.clone();
    parse::coerce(value, dtype).ok_or(observed)
}

fn failure_kind(transform: &CompiledTransform) -> WarningKind {
    match transform {
        CompiledTransform::ParseDate { .. } => WarningKind::ParseDate,
        _ => WarningKind::ParseNumber,
    }
}

/// Apply one transform. `Err` hands back the value that could not be parsed.
pub fn apply_transform(value: Value, transform: &CompiledTransform) -> Result<Value, Value> {
    if value.is_null() {
        return Ok(value);
    }

    match transform {
        CompiledTransform::Trim => Ok(map_text(value, |s| s.trim().to_owned())),
        CompiledTransform::Lower => Ok(map_text(value, |s| s.to_lowercase())),
        CompiledTransform::Upper => Ok(map_text(value, |s| s.to_uppercase())),
        CompiledTransform::Title => Ok(map_text(value, title_case)),
        CompiledTransform::Replace { regex, replacement } => Ok(map_text(value, |s| {
            regex.replace_all(s, replacement.as_str()).into_owned()
        })),
        CompiledTransform::Extract { regex } => Ok(match value {
            Value::Text(s) => regex
                .captures(&s)
                .and_then(|caps| caps.get(1).or_else(|| caps.get(0)))
                .map_or(Value::Null, |m| Value::text(m.as_str())),
            other => other,
        }),
        CompiledTransform::ParseDate {
            format,
            date_only,
            timezone,
        } => parse_date(value, format, *date_only, timezone.as_ref()),
        CompiledTransform::ParseNumber { decimal } => match value {
            Value::Int(_) | Value::Float(_) => Ok(value),
            Value::Bool(b) => Ok(Value::Int(i64::from(b))),
            Value::Text(s) => parse::parse_number_with(&s, *decimal).ok_or(Value::Text(s)),
            other => Err(other),
        },
        CompiledTransform::MapValues { mapping } => {
            Ok(mapping.get(&value.to_string()).cloned().unwrap_or(value))
        }
        CompiledTransform::Split { delimiter } => Ok(match value {
            Value::Text(s) => Value::List(s.split(delimiter.as_str()).map(str::to_owned).collect()),
            other => other,
        }),
        CompiledTransform::Join { delimiter } => Ok(match value {
            Value::List(items) => Value::Text(items.join(delimiter)),
            other => other,
        }),
    }
}

fn map_text(value: Value, f: impl FnOnce(&str) -> String) -> Value {
    match value {
        Value::Text(s) => Value::Text(f(&s)),
        other => other,
    }
}

/// Upper-case the first letter of each alphabetic run, lower-case the rest.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}

fn parse_date(
    value: Value,
    format: &str,
    date_only: bool,
    timezone: Option<&Tz>,
) -> Result<Value, Value> {
    if matches!(value, Value::Date(_) | Value::DateTime(_)) {
        return Ok(value);
    }
    let text = value.to_string();
    let text = text.trim();

    if date_only {
        return NaiveDate::parse_from_str(text, format)
            .map(Value::Date)
            .or(Err(value));
    }

    let parsed = if format.contains("%z") || format.contains("%:z") {
        DateTime::parse_from_str(text, format).map(|dt| dt.naive_utc())
    } else {
        NaiveDateTime::parse_from_str(text, format)
    };
    let Ok(naive) = parsed else {
        return Err(value);
    };

    Ok(Value::DateTime(match timezone {
        Some(tz) => tz.from_utc_datetime(&naive).naive_local(),
        None => naive,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::ColumnInfo;
    use crate::pipeline::normalize::prepare;
    use crate::pipeline::spec::{ColumnRule, RuleSet, Transform};
    use std::collections::BTreeMap;

    fn run(dtype: DType, transforms: Vec<Transform>, values: Vec<Value>) -> (Vec<Value>, Vec<ValidationWarning>) {
        let mut ds = Dataset::new(
            vec![ColumnInfo::new("c", DType::String)],
            values.into_iter().map(|v| vec![v]).collect(),
        )
        .expect("valid dataset");
        let mut rule = ColumnRule::new("c", dtype);
        rule.transforms = transforms;
        let rules = RuleSet {
            columns: vec![rule],
            ..RuleSet::default()
        };
        let plan = prepare(&rules, &ds).expect("valid rules");
        let warnings = apply_transforms(&mut ds, &plan.columns);
        assert_eq!(ds.dtype("c"), Some(dtype));
        (ds.column_values(0).cloned().collect(), warnings)
    }

    #[test]
    fn test_string_chain() {
        let (values, warnings) = run(
            DType::String,
            vec![Transform::Trim, Transform::Title],
            vec![Value::text("  hello wORLD "), Value::Null],
        );
        assert_eq!(values, vec![Value::text("Hello World"), Value::Null]);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_string_transforms_skip_non_text() {
        let transform = CompiledTransform::Upper;
        assert_eq!(apply_transform(Value::Int(4), &transform), Ok(Value::Int(4)));
    }

    #[test]
    fn test_replace_and_extract() {
        let (values, _) = run(
            DType::String,
            vec![Transform::Replace {
                pattern: r"\s+".to_owned(),
                replacement: "_".to_owned(),
            }],
            vec![Value::text("a  b c")],
        );
        assert_eq!(values, vec![Value::text("a_b_c")]);

        let (values, warnings) = run(
            DType::String,
            vec![Transform::Extract {
                pattern: r"id-(\d+)".to_owned(),
            }],
            vec![Value::text("user id-42"), Value::text("nothing")],
        );
        assert_eq!(values, vec![Value::text("42"), Value::Null]);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_parse_number_failure_nulls_and_warns() {
        let (values, warnings) = run(
            DType::Float,
            vec![Transform::ParseNumber { locale: None }],
            vec![Value::text("1,500"), Value::text("n/a"), Value::text("2.5")],
        );
        assert_eq!(
            values,
            vec![Value::Float(1500.0), Value::Null, Value::Float(2.5)]
        );
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].row, 1);
        assert_eq!(warnings[0].kind, WarningKind::ParseNumber);
        assert_eq!(warnings[0].value.as_deref(), Some("n/a"));
    }

    #[test]
    fn test_parse_number_decimal_marks() {
        let (values, warnings) = run(
            DType::Float,
            vec![Transform::ParseNumber { locale: None }],
            vec![Value::text("1,234"), Value::text("1,5")],
        );
        assert_eq!(values, vec![Value::Float(1234.0), Value::Null]);
        assert_eq!(warnings.len(), 1, "a lone comma is not a thousands separator");

        let (values, warnings) = run(
            DType::Float,
            vec![Transform::ParseNumber {
                locale: Some("de-DE".to_owned()),
            }],
            vec![Value::text("1,5"), Value::text("1.234,75"), Value::text("12")],
        );
        assert_eq!(
            values,
            vec![Value::Float(1.5), Value::Float(1234.75), Value::Float(12.0)]
        );
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_parse_date_with_format() {
        let (values, warnings) = run(
            DType::Date,
            vec![Transform::ParseDate {
                format: "%d/%m/%Y".to_owned(),
                timezone: None,
            }],
            vec![Value::text("15/01/2024"), Value::text("2024-01-15")],
        );
        let expected = NaiveDate::from_ymd_opt(2024, 1, 15).expect("valid date");
        assert_eq!(values, vec![Value::Date(expected), Value::Null]);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::ParseDate);
    }

    #[test]
    fn test_parse_datetime_converts_timezone() {
        let (values, _) = run(
            DType::Datetime,
            vec![Transform::ParseDate {
                format: "%Y-%m-%d %H:%M".to_owned(),
                timezone: Some("Asia/Tokyo".to_owned()),
            }],
            vec![Value::text("2024-01-15 10:00")],
        );
        let expected = NaiveDate::from_ymd_opt(2024, 1, 15)
            .and_then(|d| d.and_hms_opt(19, 0, 0))
            .expect("valid datetime");
        assert_eq!(values, vec![Value::DateTime(expected)]);
    }

    #[test]
    fn test_map_split_join() {
        let mut mapping = BTreeMap::new();
        mapping.insert("M".to_owned(), Value::text("male"));
        mapping.insert("1".to_owned(), Value::Bool(true));
        let transform = CompiledTransform::MapValues {
            mapping: mapping.into_iter().collect(),
        };
        assert_eq!(apply_transform(Value::text("M"), &transform), Ok(Value::text("male")));
        assert_eq!(apply_transform(Value::Int(1), &transform), Ok(Value::Bool(true)));
        assert_eq!(apply_transform(Value::text("X"), &transform), Ok(Value::text("X")));

        let (values, _) = run(
            DType::String,
            vec![
                Transform::Split {
                    delimiter: ";".to_owned(),
                },
                Transform::Join {
                    delimiter: "|".to_owned(),
                },
            ],
            vec![Value::text("a;b;c")],
        );
        assert_eq!(values, vec![Value::text("a|b|c")]);
    }

    #[test]
    fn test_declared_type_coercion_warns() {
        let (values, warnings) = run(
            DType::Integer,
            Vec::new(),
            vec![Value::text("12"), Value::text("twelve")],
        );
        assert_eq!(values, vec![Value::Int(12), Value::Null]);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::TypeCoercion);
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("o'neil mcDONALD"), "O'Neil Mcdonald");
        assert_eq!(title_case(""), "");
    }
}
