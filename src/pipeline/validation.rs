//! Row-level validation.
//!
//! Validations never modify data and never fail a job. Each failing cell
//! produces a [`ValidationWarning`] naming the row, column and check.

use super::plan::{Bound, ColumnPlan, CompiledValidation};
use crate::dataset::{Dataset, Row, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

/// What produced a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    Required,
    Unique,
    Min,
    Max,
    Regex,
    AllowedSet,
    DateRange,
    /// `parseDate` transform could not parse the value
    ParseDate,
    /// `parseNumber` transform could not parse the value
    ParseNumber,
    /// Value could not be represented in the column's declared type
    TypeCoercion,
}

impl WarningKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::Unique => "unique",
            Self::Min => "min",
            Self::Max => "max",
            Self::Regex => "regex",
            Self::AllowedSet => "allowed_set",
            Self::DateRange => "date_range",
            Self::ParseDate => "parse_date",
            Self::ParseNumber => "parse_number",
            Self::TypeCoercion => "type_coercion",
        }
    }
}

/// A non-fatal, row-level finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationWarning {
    /// Zero-based row position in the source dataset
    pub row: usize,
    pub column: String,
    pub kind: WarningKind,
    /// Observed value, absent when the cell was null
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl ValidationWarning {
    pub fn new(row: usize, column: impl Into<String>, kind: WarningKind, observed: &Value) -> Self {
        Self {
            row,
            column: column.into(),
            kind,
            value: (!observed.is_null()).then(|| observed.to_string()),
        }
    }
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}, column '{}': {}", self.row, self.column, self.kind.as_str())?;
        if let Some(value) = &self.value {
            write!(f, " (observed '{value}')")?;
        }
        Ok(())
    }
}

/// Run every column's validations over the dataset.
///
/// Warnings are ordered by column, then by validation, then by row.
pub fn run_validations(dataset: &Dataset, columns: &[ColumnPlan]) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    for plan in columns {
        for validation in &plan.validations {
            check_column(dataset.rows(), plan, validation, &mut warnings);
        }
    }
    warnings
}

fn check_column(
    rows: &[Row],
    plan: &ColumnPlan,
    validation: &CompiledValidation,
    warnings: &mut Vec<ValidationWarning>,
) {
    let kind = warning_kind(validation);
    let mut seen = HashSet::new();

    for (row_idx, row) in rows.iter().enumerate() {
        let Some(value) = row.get(plan.index) else {
            continue;
        };
        let failed = match validation {
            CompiledValidation::Required => value.is_blank(),
            // Nulls are the concern of `required`
            _ if value.is_null() => false,
            CompiledValidation::Unique => !seen.insert(value.key()),
            CompiledValidation::Min(bound) => violates(value, bound, Ordering::Less),
            CompiledValidation::Max(bound) => violates(value, bound, Ordering::Greater),
            CompiledValidation::Regex(regex) => match value {
                Value::Text(s) => !regex.is_match(s),
                _ => false,
            },
            CompiledValidation::AllowedSet(allowed) => !allowed.contains(&value.key()),
            CompiledValidation::DateRange { min, max } => match value.as_datetime() {
                Some(instant) => {
                    min.is_some_and(|lo| instant < lo) || max.is_some_and(|hi| instant > hi)
                }
                None => true,
            },
        };

        if failed {
            warnings.push(ValidationWarning::new(row_idx, &plan.name, kind, value));
        }
    }
}

/// True when `value` lies strictly on the `outside` side of `bound`.
///
/// Values that cannot be compared with the bound (text against a number) are
/// reported as violations.
fn violates(value: &Value, bound: &Bound, outside: Ordering) -> bool {
    let ordering = match bound {
        Bound::Number(limit) => value.as_f64().and_then(|x| x.partial_cmp(limit)),
        Bound::Instant(limit) => value.as_datetime().map(|t| t.cmp(limit)),
    };
    ordering.is_none_or(|o| o == outside)
}

fn warning_kind(validation: &CompiledValidation) -> WarningKind {
    match validation {
        CompiledValidation::Required => WarningKind::Required,
        CompiledValidation::Unique => WarningKind::Unique,
        CompiledValidation::Min(_) => WarningKind::Min,
        CompiledValidation::Max(_) => WarningKind::Max,
        CompiledValidation::Regex(_) => WarningKind::Regex,
        CompiledValidation::AllowedSet(_) => WarningKind::AllowedSet,
        CompiledValidation::DateRange { .. } => WarningKind::DateRange,
    }
}
