//! Rule set data structures.
//!
//! Defines the JSON schema for cleaning rules: per-column transforms,
//! validations and imputation, plus dataset-level outlier handling and
//! deduplication. Tagged enums keep the wire format close to what a client
//! would type by hand:
//!
//! ```json
//! {
//!   "columns": [
//!     {
//!       "name": "email",
//!       "dtype": "String",
//!       "transforms": [{ "type": "trim" }, { "type": "lower" }],
//!       "validations": [{ "type": "regex", "pattern": "[^@]+@[^@]+" }],
//!       "impute": { "strategy": "none" }
//!     }
//!   ],
//!   "deduplicate": { "subset": ["email"] }
//! }
//! ```

use crate::dataset::{DType, Value};
use crate::error::{Result, ResultExt as _};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Root rule set structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    /// Per-column rules, in the order they were declared
    #[serde(default)]
    pub columns: Vec<ColumnRule>,

    /// Dataset-level duplicate removal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deduplicate: Option<Deduplicate>,

    /// Dataset-level outlier handling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outliers: Option<Outliers>,
}

impl RuleSet {
    /// Load a rule set from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).context("Failed to read rule set file")?;
        Self::from_json(&content)
    }

    /// Parse a rule set from JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse rule set JSON")
    }

    /// Serialize rule set to JSON string
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize rule set")
    }

    pub fn column(&self, name: &str) -> Option<&ColumnRule> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Rules for a single column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnRule {
    pub name: String,

    /// Declared type; filled from inference when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dtype: Option<DType>,

    #[serde(default)]
    pub transforms: Vec<Transform>,

    #[serde(default)]
    pub validations: Vec<Validation>,

    #[serde(default)]
    pub impute: Impute,
}

impl ColumnRule {
    /// A rule with no transforms, no validations and no imputation.
    pub fn new(name: impl Into<String>, dtype: DType) -> Self {
        Self {
            name: name.into(),
            dtype: Some(dtype),
            transforms: Vec::new(),
            validations: Vec::new(),
            impute: Impute::None,
        }
    }

    #[must_use]
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transforms.push(transform);
        self
    }

    #[must_use]
    pub fn with_validation(mut self, validation: Validation) -> Self {
        self.validations.push(validation);
        self
    }

    #[must_use]
    pub fn with_impute(mut self, impute: Impute) -> Self {
        self.impute = impute;
        self
    }
}

/// Value transformation (tagged enum), applied in declaration order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Transform {
    /// Strip leading/trailing whitespace
    Trim,
    Lower,
    Upper,
    /// Capitalize the first letter of each word
    Title,

    /// Regex replacement of every match
    Replace {
        pattern: String,
        #[serde(default)]
        replacement: String,
    },

    /// Keep the first capture group (or whole match) of a regex
    Extract { pattern: String },

    /// Parse text into a date or datetime
    ParseDate {
        #[serde(default = "default_date_format")]
        format: String,
        /// IANA zone the parsed values are converted into
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timezone: Option<String>,
    },

    /// Parse text into an integer or float
    ParseNumber {
        /// Locale whose decimal mark applies, e.g. `de-DE` reads `1.234,5`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        locale: Option<String>,
    },

    /// Exact-match lookup; unmatched values pass through
    MapValues { mapping: BTreeMap<String, Value> },

    /// Split text into a list
    Split {
        #[serde(default = "default_split_delimiter")]
        delimiter: String,
    },

    /// Join a list back into text
    Join {
        #[serde(default = "default_join_delimiter")]
        delimiter: String,
    },
}

impl Transform {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Trim => "trim",
            Self::Lower => "lower",
            Self::Upper => "upper",
            Self::Title => "title",
            Self::Replace { .. } => "replace",
            Self::Extract { .. } => "extract",
            Self::ParseDate { .. } => "parseDate",
            Self::ParseNumber { .. } => "parseNumber",
            Self::MapValues { .. } => "mapValues",
            Self::Split { .. } => "split",
            Self::Join { .. } => "join",
        }
    }
}

/// Row-level check (tagged enum); failures become warnings, never errors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Validation {
    Required,
    Unique,
    Min { value: Value },
    Max { value: Value },
    Regex { pattern: String },
    AllowedSet { allowed: Vec<Value> },
    DateRange {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<String>,
    },
}

impl Validation {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::Unique => "unique",
            Self::Min { .. } => "min",
            Self::Max { .. } => "max",
            Self::Regex { .. } => "regex",
            Self::AllowedSet { .. } => "allowedSet",
            Self::DateRange { .. } => "dateRange",
        }
    }
}

/// Missing-value strategy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum Impute {
    #[default]
    None,
    /// Fill with a constant
    Value { value: Value },
    Mean,
    Median,
    /// Most frequent value, first seen wins ties
    Mode,
    #[serde(rename = "ffill", alias = "forwardfill")]
    ForwardFill,
    #[serde(rename = "bfill", alias = "backwardfill")]
    BackwardFill,
}

impl Impute {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Value { .. } => "value",
            Self::Mean => "mean",
            Self::Median => "median",
            Self::Mode => "mode",
            Self::ForwardFill => "ffill",
            Self::BackwardFill => "bfill",
        }
    }
}

/// Dataset-level outlier handling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outliers {
    pub method: OutlierMethod,
    pub columns: Vec<String>,
    pub action: OutlierAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutlierMethod {
    /// Outside `[Q1 - 1.5*IQR, Q3 + 1.5*IQR]`
    #[serde(rename = "IQR", alias = "iqr")]
    Iqr,
    /// More than three population standard deviations from the mean
    #[serde(rename = "ZSCORE", alias = "zscore")]
    ZScore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutlierAction {
    /// Clamp to the nearest bound
    Cap,
    /// Drop the whole row
    Remove,
}

/// Dataset-level duplicate removal, keeping the first occurrence
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deduplicate {
    #[serde(default)]
    pub subset: Vec<String>,
}

// Default value functions
fn default_date_format() -> String {
    "%Y-%m-%d".to_owned()
}

fn default_split_delimiter() -> String {
    ",".to_owned()
}

fn default_join_delimiter() -> String {
    ",".to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_set_from_json() {
        let json = r#"{
            "columns": [
                {
                    "name": "signup",
                    "dtype": "Date",
                    "transforms": [
                        {"type": "trim"},
                        {"type": "parseDate", "format": "%d/%m/%Y", "timezone": "Europe/Paris"}
                    ],
                    "validations": [{"type": "dateRange", "min": "2020-01-01"}],
                    "impute": {"strategy": "ffill"}
                }
            ],
            "outliers": {"method": "IQR", "columns": ["age"], "action": "cap"},
            "deduplicate": {"subset": ["signup"]}
        }"#;

        let rules = RuleSet::from_json(json).expect("Failed to parse");
        let column = rules.column("signup").expect("column rule");
        assert_eq!(column.dtype, Some(DType::Date));
        assert_eq!(column.transforms.len(), 2);
        assert_eq!(column.impute, Impute::ForwardFill);
        assert_eq!(
            rules.outliers.as_ref().map(|o| o.method),
            Some(OutlierMethod::Iqr)
        );
        assert_eq!(
            rules.deduplicate,
            Some(Deduplicate {
                subset: vec!["signup".to_owned()]
            })
        );
    }

    #[test]
    fn test_defaults_fill_optional_fields() {
        let json = r#"{"columns": [{"name": "a", "transforms": [{"type": "split"}]}]}"#;
        let rules = RuleSet::from_json(json).expect("Failed to parse");
        let column = rules.column("a").expect("column rule");

        assert_eq!(column.dtype, None);
        assert_eq!(column.impute, Impute::None);
        assert_eq!(
            column.transforms,
            vec![Transform::Split {
                delimiter: ",".to_owned()
            }]
        );
    }

    #[test]
    fn test_serialization_uses_tags() {
        let rules = RuleSet {
            columns: vec![
                ColumnRule::new("price", DType::Float)
                    .with_transform(Transform::ParseNumber { locale: None })
                    .with_validation(Validation::Min {
                        value: Value::Int(0),
                    })
                    .with_impute(Impute::Median),
            ],
            ..RuleSet::default()
        };

        let json = rules.to_json().expect("Failed to serialize");
        assert!(json.contains("\"type\": \"parseNumber\""));
        assert!(json.contains("\"strategy\": \"median\""));
        assert!(!json.contains("outliers"));

        let parsed = RuleSet::from_json(&json).expect("Failed to parse");
        assert_eq!(parsed, rules);
    }

    #[test]
    fn test_unknown_transform_is_rejected() {
        let json = r#"{"columns": [{"name": "a", "transforms": [{"type": "explode"}]}]}"#;
        assert!(RuleSet::from_json(json).is_err(), "unknown transform tag must fail");
    }
}
