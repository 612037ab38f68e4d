//! Rule set normalization and compilation.
//!
//! Two passes, both run before any data is touched:
//!
//! 1. [`normalize`] is structural. It rejects rules that reference unknown
//!    columns or name a column twice, and fills in a default rule for every
//!    column without one. Its output lists columns in dataset order, which
//!    makes it idempotent.
//! 2. [`compile`] is semantic. It compiles regexes, checks date formats and
//!    timezones, parses bounds and fill values, and refuses statistics on
//!    columns whose declared type is not numeric. Its output is an
//!    [`ExecutionPlan`].
//!
//! Errors carry the column and rule position so a client can point at the
//! offending entry.

use super::plan::{
    Bound, ColumnPlan, CompiledTransform, CompiledValidation, ExecutionPlan, OutlierPlan,
};
use super::spec::{ColumnRule, Impute, RuleSet, Transform, Validation};
use crate::dataset::parse::DecimalMark;
use crate::dataset::{Dataset, Value, parse};
use crate::error::{RuleError, RuleLocation};
use chrono::NaiveDateTime;
use chrono::format::{Item, StrftimeItems};
use chrono_tz::Tz;
use regex::Regex;
use std::collections::{HashMap, HashSet};

/// Time-of-day specifiers; a format with none of these parses to a plain date.
const TIME_SPECIFIERS: &[&str] = &[
    "%H", "%I", "%k", "%l", "%M", "%S", "%T", "%R", "%X", "%r", "%c", "%s", "%+", "%p", "%P",
];

/// Structural pass: resolve the rule set against the dataset's columns.
pub fn normalize(rules: &RuleSet, dataset: &Dataset) -> Result<RuleSet, RuleError> {
    let mut declared: HashMap<&str, &ColumnRule> = HashMap::new();
    for rule in &rules.columns {
        if dataset.column_index(&rule.name).is_none() {
            return Err(RuleError::at(
                &rule.name,
                RuleLocation::Column,
                "column not found in dataset",
            ));
        }
        if declared.insert(rule.name.as_str(), rule).is_some() {
            return Err(RuleError::at(
                &rule.name,
                RuleLocation::Column,
                "column has more than one rule",
            ));
        }
    }

    let columns = dataset
        .columns()
        .iter()
        .map(|info| match declared.get(info.name.as_str()) {
            Some(rule) => ColumnRule {
                dtype: Some(rule.dtype.unwrap_or(info.dtype)),
                ..(*rule).clone()
            },
            None => ColumnRule::new(info.name.clone(), info.dtype),
        })
        .collect();

    if let Some(outliers) = &rules.outliers {
        if outliers.columns.is_empty() {
            return Err(RuleError::dataset(
                RuleLocation::Outliers,
                "at least one column is required",
            ));
        }
        check_known_columns(&outliers.columns, dataset, RuleLocation::Outliers)?;
    }
    if let Some(dedup) = &rules.deduplicate {
        check_known_columns(&dedup.subset, dataset, RuleLocation::Deduplicate)?;
    }

    Ok(RuleSet {
        columns,
        deduplicate: rules.deduplicate.clone(),
        outliers: rules.outliers.clone(),
    })
}

fn check_known_columns(
    names: &[String],
    dataset: &Dataset,
    location: RuleLocation,
) -> Result<(), RuleError> {
    let mut seen = HashSet::new();
    for name in names {
        if dataset.column_index(name).is_none() {
            return Err(RuleError::dataset(
                location,
                format!("unknown column '{name}'"),
            ));
        }
        if !seen.insert(name.as_str()) {
            return Err(RuleError::dataset(
                location,
                format!("column '{name}' listed twice"),
            ));
        }
    }
    Ok(())
}

/// Semantic pass: compile a normalized rule set into an execution plan.
pub fn compile(rules: &RuleSet, dataset: &Dataset) -> Result<ExecutionPlan, RuleError> {
    let columns = rules
        .columns
        .iter()
        .map(|rule| compile_column(rule, dataset))
        .collect::<Result<Vec<_>, _>>()?;

    let outliers = match &rules.outliers {
        Some(outliers) => {
            let mut targets = Vec::with_capacity(outliers.columns.len());
            for name in &outliers.columns {
                let index = resolve(dataset, name, RuleLocation::Outliers)?;
                let dtype = columns
                    .iter()
                    .find(|c| c.index == index)
                    .map_or_else(|| dataset.dtype(name).unwrap_or_default(), |c| c.dtype);
                if !dtype.is_numeric() {
                    return Err(RuleError::dataset(
                        RuleLocation::Outliers,
                        format!("column '{name}' is declared {dtype}, outliers need a numeric column"),
                    ));
                }
                targets.push((index, name.clone()));
            }
            Some(OutlierPlan {
                method: outliers.method,
                action: outliers.action,
                columns: targets,
            })
        }
        None => None,
    };

    let deduplicate = match &rules.deduplicate {
        Some(dedup) if !dedup.subset.is_empty() => Some(
            dedup
                .subset
                .iter()
                .map(|name| resolve(dataset, name, RuleLocation::Deduplicate))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        _ => None,
    };

    Ok(ExecutionPlan {
        columns,
        outliers,
        deduplicate,
    })
}

/// Both passes in sequence.
pub fn prepare(rules: &RuleSet, dataset: &Dataset) -> Result<ExecutionPlan, RuleError> {
    compile(&normalize(rules, dataset)?, dataset)
}

fn resolve(dataset: &Dataset, name: &str, location: RuleLocation) -> Result<usize, RuleError> {
    dataset
        .column_index(name)
        .ok_or_else(|| RuleError::dataset(location, format!("unknown column '{name}'")))
}

fn compile_column(rule: &ColumnRule, dataset: &Dataset) -> Result<ColumnPlan, RuleError> {
    let index = dataset.column_index(&rule.name).ok_or_else(|| {
        RuleError::at(&rule.name, RuleLocation::Column, "column not found in dataset")
    })?;
    let dtype = rule
        .dtype
        .or_else(|| dataset.dtype(&rule.name))
        .unwrap_or_default();

    let transforms = rule
        .transforms
        .iter()
        .enumerate()
        .map(|(i, t)| {
            compile_transform(t).map_err(|message| {
                RuleError::at(&rule.name, RuleLocation::transform(i, t.kind()), message)
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let validations = rule
        .validations
        .iter()
        .enumerate()
        .map(|(i, v)| {
            compile_validation(v).map_err(|message| {
                RuleError::at(&rule.name, RuleLocation::validation(i, v.kind()), message)
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let impute_location = RuleLocation::Impute {
        kind: rule.impute.kind(),
    };
    let impute = match &rule.impute {
        Impute::Mean | Impute::Median if !dtype.is_numeric() => {
            return Err(RuleError::at(
                &rule.name,
                impute_location,
                format!("column is declared {dtype}, {} needs a numeric column", rule.impute.kind()),
            ));
        }
        Impute::Value { value } => {
            let fill = parse::coerce(value.clone(), dtype).ok_or_else(|| {
                RuleError::at(
                    &rule.name,
                    impute_location,
                    format!("fill value '{value}' is not a valid {dtype}"),
                )
            })?;
            Impute::Value { value: fill }
        }
        other => other.clone(),
    };

    Ok(ColumnPlan {
        name: rule.name.clone(),
        index,
        dtype,
        transforms,
        validations,
        impute,
    })
}

fn compile_regex(pattern: &str) -> Result<Regex, String> {
    Regex::new(pattern).map_err(|e| format!("invalid pattern '{pattern}': {e}"))
}

/// Languages that write `1.234,5`.
const COMMA_DECIMAL_LANGUAGES: &[&str] = &[
    "de", "fr", "es", "it", "pt", "nl", "ru", "pl", "cs", "sk", "sv", "da", "nb", "nn", "no",
    "fi", "tr", "el", "hu", "ro", "uk", "id", "vi",
];

/// Decimal mark from a BCP 47 style tag; only the language subtag matters.
fn decimal_mark(locale: &str) -> Result<DecimalMark, String> {
    let language = locale
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    if !(2..=3).contains(&language.len()) || !language.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(format!("unknown locale '{locale}'"));
    }
    Ok(if COMMA_DECIMAL_LANGUAGES.contains(&language.as_str()) {
        DecimalMark::Comma
    } else {
        DecimalMark::Point
    })
}

fn compile_transform(transform: &Transform) -> Result<CompiledTransform, String> {
    Ok(match transform {
        Transform::Trim => CompiledTransform::Trim,
        Transform::Lower => CompiledTransform::Lower,
        Transform::Upper => CompiledTransform::Upper,
        Transform::Title => CompiledTransform::Title,
        Transform::Replace {
            pattern,
            replacement,
        } => CompiledTransform::Replace {
            regex: compile_regex(pattern)?,
            replacement: replacement.clone(),
        },
        Transform::Extract { pattern } => CompiledTransform::Extract {
            regex: compile_regex(pattern)?,
        },
        Transform::ParseDate { format, timezone } => {
            if format.is_empty() || StrftimeItems::new(format).any(|item| matches!(item, Item::Error))
            {
                return Err(format!("invalid date format '{format}'"));
            }
            let timezone = timezone
                .as_deref()
                .map(|name| {
                    name.parse::<Tz>()
                        .map_err(|e| format!("unknown timezone '{name}': {e}"))
                })
                .transpose()?;
            CompiledTransform::ParseDate {
                format: format.clone(),
                date_only: !TIME_SPECIFIERS.iter().any(|spec| format.contains(spec)),
                timezone,
            }
        }
        Transform::ParseNumber { locale } => CompiledTransform::ParseNumber {
            decimal: match locale {
                Some(name) => decimal_mark(name)?,
                None => DecimalMark::Point,
            },
        },
        Transform::MapValues { mapping } => CompiledTransform::MapValues {
            mapping: mapping
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        },
        Transform::Split { delimiter } | Transform::Join { delimiter } if delimiter.is_empty() => {
            return Err("delimiter must not be empty".to_owned());
        }
        Transform::Split { delimiter } => CompiledTransform::Split {
            delimiter: delimiter.clone(),
        },
        Transform::Join { delimiter } => CompiledTransform::Join {
            delimiter: delimiter.clone(),
        },
    })
}

fn compile_bound(value: &Value) -> Result<Bound, String> {
    if let Some(x) = value.as_f64() {
        return Ok(Bound::Number(x));
    }
    if let Some(instant) = value.as_datetime() {
        return Ok(Bound::Instant(instant));
    }
    value
        .as_str()
        .and_then(parse::parse_datetime)
        .map(Bound::Instant)
        .ok_or_else(|| format!("bound '{value}' is neither a number nor a date"))
}

fn compile_instant(raw: Option<&str>) -> Result<Option<NaiveDateTime>, String> {
    raw.map(|s| parse::parse_datetime(s).ok_or_else(|| format!("'{s}' is not a date")))
        .transpose()
}

fn compile_validation(validation: &Validation) -> Result<CompiledValidation, String> {
    Ok(match validation {
        Validation::Required => CompiledValidation::Required,
        Validation::Unique => CompiledValidation::Unique,
        Validation::Min { value } => CompiledValidation::Min(compile_bound(value)?),
        Validation::Max { value } => CompiledValidation::Max(compile_bound(value)?),
        Validation::Regex { pattern } => {
            compile_regex(pattern)?;
            CompiledValidation::Regex(compile_regex(&format!("^(?:{pattern})$"))?)
        }
        Validation::AllowedSet { allowed } => {
            CompiledValidation::AllowedSet(allowed.iter().map(Value::key).collect())
        }
        Validation::DateRange { min, max } => {
            let min = compile_instant(min.as_deref())?;
            let max = compile_instant(max.as_deref())?;
            if let (Some(lo), Some(hi)) = (min, max)
                && lo > hi
            {
                return Err(format!("min {lo} is after max {hi}"));
            }
            CompiledValidation::DateRange { min, max }
        }
    })
}
