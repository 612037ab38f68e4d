//! Pipeline execution engine.
//!
//! Runs a compiled [`ExecutionPlan`] over an owned working copy of a dataset:
//! transforms, validations, imputation, outlier handling and deduplication,
//! in that order. Each finished stage is reported to a [`StageObserver`],
//! which may stop the run by returning an error.

use super::dedup::deduplicate;
use super::impute::apply_imputation;
use super::normalize::prepare;
use super::outliers::apply_outliers;
use super::plan::ExecutionPlan;
use super::spec::RuleSet;
use super::transform::apply_transforms;
use super::validation::{ValidationWarning, run_validations};
use crate::dataset::{ColumnInfo, Dataset, Row};
use crate::error::Result;
use serde::Serialize;

/// Named points of a job's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Read,
    Transform,
    Validate,
    Impute,
    /// Outlier handling and deduplication
    Reshape,
    Export,
    Completed,
}

impl Stage {
    /// Progress fraction reached once this stage has finished.
    pub fn checkpoint(self) -> f64 {
        match self {
            Self::Read => 0.1,
            Self::Transform => 0.3,
            Self::Validate => 0.5,
            Self::Impute => 0.7,
            Self::Reshape => 0.85,
            Self::Export => 0.95,
            Self::Completed => 1.0,
        }
    }
}

/// Receives stage completions; an `Err` aborts the run.
pub trait StageObserver {
    fn stage_completed(&self, stage: Stage) -> Result<()>;
}

impl<F> StageObserver for F
where
    F: Fn(Stage) -> Result<()>,
{
    fn stage_completed(&self, stage: Stage) -> Result<()> {
        self(stage)
    }
}

/// Observer that ignores every stage.
pub struct NoopObserver;

impl StageObserver for NoopObserver {
    fn stage_completed(&self, _stage: Stage) -> Result<()> {
        Ok(())
    }
}

/// Report generated after pipeline execution
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    /// Number of rows before processing
    pub rows_before: usize,

    /// Number of rows after processing
    pub rows_after: usize,

    /// Null cells filled by imputation
    pub values_imputed: usize,

    /// Cells clamped to an outlier bound
    pub values_capped: usize,

    /// Rows dropped as outliers
    pub outlier_rows_removed: usize,

    /// Rows dropped as duplicates
    pub duplicates_removed: usize,

    /// Row-level findings from transforms and validations
    pub warnings: Vec<ValidationWarning>,

    /// Time taken for execution
    #[serde(skip)]
    pub duration: std::time::Duration,
}

impl RunReport {
    /// Create a summary message
    pub fn summary(&self) -> String {
        format!(
            "Pipeline completed: {} → {} rows, {} imputed, {} capped, {} outlier rows and {} duplicates removed, {} warnings, {:.2}s",
            self.rows_before,
            self.rows_after,
            self.values_imputed,
            self.values_capped,
            self.outlier_rows_removed,
            self.duplicates_removed,
            self.warnings.len(),
            self.duration.as_secs_f64()
        )
    }
}

/// Cleaned table plus the report describing how it was produced.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub dataset: Dataset,
    pub report: RunReport,
}

/// Execute a compiled plan on a working copy of the data.
pub fn run_pipeline(
    mut dataset: Dataset,
    plan: &ExecutionPlan,
    observer: &dyn StageObserver,
) -> Result<PipelineOutput> {
    let start = std::time::Instant::now();
    let rows_before = dataset.len();

    let mut warnings = apply_transforms(&mut dataset, &plan.columns);
    observer.stage_completed(Stage::Transform)?;

    warnings.extend(run_validations(&dataset, &plan.columns));
    observer.stage_completed(Stage::Validate)?;

    let values_imputed = apply_imputation(&mut dataset, &plan.columns)?;
    observer.stage_completed(Stage::Impute)?;

    let outliers = plan
        .outliers
        .as_ref()
        .map(|outlier_plan| apply_outliers(&mut dataset, outlier_plan))
        .unwrap_or_default();
    let duplicates_removed = plan
        .deduplicate
        .as_deref()
        .map_or(0, |subset| deduplicate(&mut dataset, subset));
    observer.stage_completed(Stage::Reshape)?;

    let report = RunReport {
        rows_before,
        rows_after: dataset.len(),
        values_imputed,
        values_capped: outliers.capped,
        outlier_rows_removed: outliers.removed,
        duplicates_removed,
        warnings,
        duration: start.elapsed(),
    };
    tracing::debug!("{}", report.summary());

    Ok(PipelineOutput { dataset, report })
}

/// First rows of a dataset after running the rules over them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Preview {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Row>,
    pub warnings: Vec<ValidationWarning>,
}

impl Preview {
    /// Rows as JSON objects keyed by column name.
    pub fn records(&self) -> Vec<serde_json::Value> {
        self.rows
            .iter()
            .map(|row| {
                let record: serde_json::Map<String, serde_json::Value> = self
                    .columns
                    .iter()
                    .zip(row)
                    .map(|(column, value)| {
                        (
                            column.name.clone(),
                            serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
                        )
                    })
                    .collect();
                serde_json::Value::Object(record)
            })
            .collect()
    }
}

/// Run `rules` (or defaults) over the first `row_limit` rows without producing
/// an artifact. Rule errors surface exactly as they would for a job.
pub fn preview_dataset(dataset: &Dataset, rules: Option<&RuleSet>, row_limit: usize) -> Result<Preview> {
    let sample = dataset.head(row_limit);
    let default_rules = RuleSet::default();
    let rules = rules.unwrap_or(&default_rules);

    let plan = prepare(rules, &sample)?;
    let output = run_pipeline(sample, &plan, &NoopObserver)?;

    let (columns, rows) = output.dataset.into_parts();
    Ok(Preview {
        columns,
        rows,
        warnings: output.report.warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{DType, Value};
    use crate::error::CleanserError;
    use crate::pipeline::spec::{ColumnRule, Deduplicate, Impute, Transform, Validation};
    use std::cell::RefCell;

    fn customers() -> Dataset {
        Dataset::new(
            vec![
                ColumnInfo::new("email", DType::String),
                ColumnInfo::new("age", DType::Integer),
            ],
            vec![
                vec![Value::text(" A@X.IO "), Value::Int(30)],
                vec![Value::text("b@x.io"), Value::Null],
                vec![Value::text("a@x.io"), Value::Int(-4)],
            ],
        )
        .expect("valid dataset")
    }

    fn rules() -> RuleSet {
        RuleSet {
            columns: vec![
                ColumnRule::new("email", DType::String)
                    .with_transform(Transform::Trim)
                    .with_transform(Transform::Lower),
                ColumnRule::new("age", DType::Integer)
                    .with_validation(Validation::Min {
                        value: Value::Int(0),
                    })
                    .with_impute(Impute::Median),
            ],
            deduplicate: Some(Deduplicate {
                subset: vec!["email".to_owned()],
            }),
            outliers: None,
        }
    }

    #[test]
    fn test_run_pipeline_end_to_end() {
        let ds = customers();
        let plan = prepare(&rules(), &ds).expect("valid rules");
        let output = run_pipeline(ds, &plan, &NoopObserver).expect("pipeline runs");

        assert_eq!(output.report.rows_before, 3);
        assert_eq!(output.report.rows_after, 2);
        assert_eq!(output.report.duplicates_removed, 1);
        assert_eq!(output.report.values_imputed, 1);
        assert_eq!(output.report.warnings.len(), 1);
        assert_eq!(output.dataset.cell(0, "email"), Some(&Value::text("a@x.io")));
        // Median of 30 and -4, computed before the duplicate row was dropped.
        assert_eq!(output.dataset.cell(1, "age"), Some(&Value::Int(13)));
    }

    #[test]
    fn test_observer_sees_stages_in_order() {
        let ds = customers();
        let plan = prepare(&rules(), &ds).expect("valid rules");
        let seen = RefCell::new(Vec::new());
        let observer = |stage: Stage| -> Result<()> {
            seen.borrow_mut().push(stage);
            Ok(())
        };
        run_pipeline(ds, &plan, &observer).expect("pipeline runs");
        assert_eq!(
            seen.into_inner(),
            vec![Stage::Transform, Stage::Validate, Stage::Impute, Stage::Reshape]
        );
    }

    #[test]
    fn test_observer_error_aborts() {
        let ds = customers();
        let plan = prepare(&rules(), &ds).expect("valid rules");
        let observer = |stage: Stage| -> Result<()> {
            if stage == Stage::Validate {
                Err(CleanserError::Timeout(std::time::Duration::from_secs(1)))
            } else {
                Ok(())
            }
        };
        let err = run_pipeline(ds, &plan, &observer).expect_err("aborted");
        assert!(matches!(err, CleanserError::Timeout(_)));
    }

    #[test]
    fn test_checkpoints_increase() {
        let stages = [
            Stage::Read,
            Stage::Transform,
            Stage::Validate,
            Stage::Impute,
            Stage::Reshape,
            Stage::Export,
            Stage::Completed,
        ];
        assert!(stages.windows(2).all(|w| w[0].checkpoint() < w[1].checkpoint()));
    }

    #[test]
    fn test_preview_limits_rows_and_keeps_source() {
        let ds = customers();
        let before = ds.clone();
        let preview = preview_dataset(&ds, Some(&rules()), 2).expect("preview runs");

        assert_eq!(preview.rows.len(), 2);
        assert_eq!(ds, before);
        let records = preview.records();
        assert_eq!(records[0]["email"], serde_json::json!("a@x.io"));
    }

    #[test]
    fn test_preview_without_rules_uses_defaults() {
        let ds = customers();
        let preview = preview_dataset(&ds, None, 200).expect("preview runs");
        assert_eq!(preview.rows.len(), 3);
        assert!(preview.warnings.is_empty());
    }

    #[test]
    fn test_preview_surfaces_rule_errors() {
        let mut bad = rules();
        bad.columns[0].validations.push(Validation::Regex {
            pattern: "(".to_owned(),
        });
        let err = preview_dataset(&customers(), Some(&bad), 10).expect_err("bad regex");
        assert!(matches!(err, CleanserError::Rule(_)));
    }
}
