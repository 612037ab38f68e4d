//! Compiled execution plan.
//!
//! A plan is a normalized [`RuleSet`](super::spec::RuleSet) with every
//! semantic check already done: column names resolved to positions, regexes
//! compiled, bounds parsed and timezones looked up. Stages only consume plans,
//! so they never see a rule that could still fail to compile.

use super::spec::{Impute, OutlierAction, OutlierMethod};
use crate::dataset::parse::DecimalMark;
use crate::dataset::{DType, Value, ValueKey};
use chrono::NaiveDateTime;
use chrono_tz::Tz;
use regex::Regex;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub columns: Vec<ColumnPlan>,
    pub outliers: Option<OutlierPlan>,
    /// Column positions forming the duplicate key; `None` disables deduplication
    pub deduplicate: Option<Vec<usize>>,
}

#[derive(Debug, Clone)]
pub struct ColumnPlan {
    pub name: String,
    pub index: usize,
    pub dtype: DType,
    pub transforms: Vec<CompiledTransform>,
    pub validations: Vec<CompiledValidation>,
    pub impute: Impute,
}

#[derive(Debug, Clone)]
pub enum CompiledTransform {
    Trim,
    Lower,
    Upper,
    Title,
    Replace { regex: Regex, replacement: String },
    Extract { regex: Regex },
    ParseDate {
        format: String,
        /// Format carries no time fields, values become plain dates
        date_only: bool,
        timezone: Option<Tz>,
    },
    ParseNumber { decimal: DecimalMark },
    MapValues { mapping: HashMap<String, Value> },
    Split { delimiter: String },
    Join { delimiter: String },
}

/// A comparable bound for `min`/`max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bound {
    Number(f64),
    Instant(NaiveDateTime),
}

#[derive(Debug, Clone)]
pub enum CompiledValidation {
    Required,
    Unique,
    Min(Bound),
    Max(Bound),
    /// Anchored so the whole value must match
    Regex(Regex),
    AllowedSet(HashSet<ValueKey>),
    DateRange {
        min: Option<NaiveDateTime>,
        max: Option<NaiveDateTime>,
    },
}

#[derive(Debug, Clone)]
pub struct OutlierPlan {
    pub method: OutlierMethod,
    pub action: OutlierAction,
    /// `(position, name)` of each target column
    pub columns: Vec<(usize, String)>,
}
