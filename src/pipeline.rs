//! Rule-driven cleaning pipeline.
//!
//! Clients describe the cleaning they want as a JSON [`RuleSet`]. Before any
//! data is touched the rule set is normalized against the dataset's columns and
//! compiled into an [`ExecutionPlan`]; every rule problem is reported at that
//! point as a [`RuleError`](crate::error::RuleError).
//!
//! # Stages
//!
//! A plan runs over an owned working copy in a fixed order:
//! 1. **Transform**: per-column `trim`, `lower`, `upper`, `title`, `replace`,
//!    `extract`, `parseDate`, `parseNumber`, `mapValues`, `split`, `join`,
//!    then coercion to the declared dtype
//! 2. **Validate**: `required`, `unique`, `min`, `max`, `regex`, `allowedSet`,
//!    `dateRange`, producing [`ValidationWarning`]s only
//! 3. **Impute**: `value`, `mean`, `median`, `mode`, `ffill`, `bfill`
//! 4. **Reshape**: IQR or z-score outlier capping/removal, then deduplication
//!
//! # Example
//!
//! ```
//! use cleanser::dataset::{ColumnInfo, DType, Dataset, Value};
//! use cleanser::pipeline::{ColumnRule, NoopObserver, RuleSet, Transform, prepare, run_pipeline};
//!
//! let dataset = Dataset::new(
//!     vec![ColumnInfo::new("city", DType::String)],
//!     vec![vec![Value::text("  paris ")]],
//! )?;
//! let rules = RuleSet {
//!     columns: vec![ColumnRule::new("city", DType::String)
//!         .with_transform(Transform::Trim)
//!         .with_transform(Transform::Title)],
//!     ..RuleSet::default()
//! };
//!
//! let plan = prepare(&rules, &dataset)?;
//! let output = run_pipeline(dataset, &plan, &NoopObserver)?;
//! assert_eq!(output.dataset.cell(0, "city"), Some(&Value::text("Paris")));
//! # Ok::<(), cleanser::error::CleanserError>(())
//! ```

pub mod dedup;
pub mod executor;
pub mod impute;
pub mod normalize;
pub mod outliers;
pub mod plan;
pub mod spec;
pub mod stats;
pub mod transform;
pub mod validation;

pub use executor::{
    NoopObserver, PipelineOutput, Preview, RunReport, Stage, StageObserver, preview_dataset,
    run_pipeline,
};
pub use normalize::{compile, normalize, prepare};
pub use plan::ExecutionPlan;
pub use spec::{
    ColumnRule, Deduplicate, Impute, OutlierAction, OutlierMethod, Outliers, RuleSet, Transform,
    Validation,
};
pub use validation::{ValidationWarning, WarningKind};
