//! Outlier detection and handling over numeric columns.
//!
//! Bounds are computed from the non-null numeric values of each target
//! column before any row is touched. A column with fewer than two numeric
//! values, or zero spread under z-score, has no outliers.

use super::plan::OutlierPlan;
use super::spec::{OutlierAction, OutlierMethod};
use super::stats;
use crate::dataset::{Dataset, Value};
use std::collections::HashSet;

const IQR_FENCE: f64 = 1.5;
const Z_LIMIT: f64 = 3.0;

/// Closed interval of acceptable values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub lower: f64,
    pub upper: f64,
}

impl Bounds {
    pub fn contains(&self, x: f64) -> bool {
        x >= self.lower && x <= self.upper
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutlierSummary {
    pub capped: usize,
    pub removed: usize,
}

pub fn compute_bounds(values: &[f64], method: OutlierMethod) -> Option<Bounds> {
    if values.len() < 2 {
        return None;
    }
    match method {
        OutlierMethod::Iqr => {
            let mut sorted = values.to_vec();
            sorted.sort_by(f64::total_cmp);
            let q1 = stats::quantile(&sorted, 0.25)?;
            let q3 = stats::quantile(&sorted, 0.75)?;
            let iqr = q3 - q1;
            Some(Bounds {
                lower: q1 - IQR_FENCE * iqr,
                upper: q3 + IQR_FENCE * iqr,
            })
        }
        OutlierMethod::ZScore => {
            let mean = stats::mean(values)?;
            let std = stats::population_std(values, mean)?;
            (std > 0.0).then(|| Bounds {
                lower: mean - Z_LIMIT * std,
                upper: mean + Z_LIMIT * std,
            })
        }
    }
}

/// Cap or remove outliers in place.
pub fn apply_outliers(dataset: &mut Dataset, plan: &OutlierPlan) -> OutlierSummary {
    let bounds: Vec<(usize, Bounds)> = plan
        .columns
        .iter()
        .filter_map(|(index, name)| {
            let values: Vec<f64> = dataset
                .column_values(*index)
                .filter_map(Value::as_f64)
                .collect();
            let bounds = compute_bounds(&values, plan.method);
            tracing::debug!(column = %name, ?bounds, "Computed outlier bounds");
            bounds.map(|b| (*index, b))
        })
        .collect();

    let mut summary = OutlierSummary::default();
    match plan.action {
        OutlierAction::Cap => {
            let mut fractional = HashSet::new();
            for row in dataset.rows_mut() {
                for (index, b) in &bounds {
                    if let Some(cell) = row.get_mut(*index)
                        && let Some(x) = cell.as_f64()
                        && !b.contains(x)
                    {
                        *cell = capped_value(cell, x.clamp(b.lower, b.upper));
                        if matches!(cell, Value::Float(_)) {
                            fractional.insert(*index);
                        }
                        summary.capped += 1;
                    }
                }
            }
            // A fractional bound in an integer column makes it a float column
            for (index, _) in &bounds {
                if fractional.contains(index) {
                    dataset.widen_to_float(*index);
                }
            }
        }
        OutlierAction::Remove => {
            let before = dataset.len();
            dataset.retain_rows(|row| {
                bounds.iter().all(|(index, b)| {
                    row.get(*index)
                        .and_then(Value::as_f64)
                        .is_none_or(|x| b.contains(x))
                })
            });
            summary.removed = before - dataset.len();
        }
    }
    summary
}

/// Keep integer cells integral when the bound allows it.
fn capped_value(original: &Value, bound: f64) -> Value {
    match original {
        Value::Int(_) if bound.fract() == 0.0 => Value::Int(bound as i64),
        _ => Value::Float(bound),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{ColumnInfo, DType};

    fn dataset(values: &[i64]) -> Dataset {
        Dataset::new(
            vec![
                ColumnInfo::new("id", DType::Integer),
                ColumnInfo::new("x", DType::Integer),
            ],
            values
                .iter()
                .enumerate()
                .map(|(i, v)| vec![Value::Int(i as i64), Value::Int(*v)])
                .collect(),
        )
        .expect("valid dataset")
    }

    fn plan(method: OutlierMethod, action: OutlierAction) -> OutlierPlan {
        OutlierPlan {
            method,
            action,
            columns: vec![(1, "x".to_owned())],
        }
    }

    #[test]
    fn test_iqr_bounds() {
        let bounds = compute_bounds(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 100.0], OutlierMethod::Iqr)
            .expect("enough values");
        // q1 = 2.75, q3 = 6.25, iqr = 3.5
        assert!((bounds.lower - (-2.5)).abs() < 1e-12, "lower was {}", bounds.lower);
        assert!((bounds.upper - 11.5).abs() < 1e-12, "upper was {}", bounds.upper);
    }

    #[test]
    fn test_iqr_cap() {
        let mut ds = dataset(&[1, 2, 3, 4, 5, 6, 7, 100]);
        let summary = apply_outliers(&mut ds, &plan(OutlierMethod::Iqr, OutlierAction::Cap));
        assert_eq!(summary.capped, 1);
        assert_eq!(ds.len(), 8);
        assert_eq!(ds.cell(7, "x"), Some(&Value::Float(11.5)));
        assert_eq!(ds.dtype("x"), Some(DType::Float), "fractional cap widens");
        assert_eq!(ds.cell(0, "x"), Some(&Value::Float(1.0)));
        assert_eq!(ds.dtype("id"), Some(DType::Integer));
    }

    #[test]
    fn test_iqr_remove_drops_whole_row() {
        let mut ds = dataset(&[1, 2, 3, 4, 5, 6, 7, 100]);
        let summary = apply_outliers(&mut ds, &plan(OutlierMethod::Iqr, OutlierAction::Remove));
        assert_eq!(summary.removed, 1);
        assert_eq!(ds.len(), 7);
        assert!(ds.column_values(1).all(|v| v.as_f64().is_some_and(|x| x <= 7.0)));
    }

    #[test]
    fn test_zscore_cap_clamps_to_three_sigma() {
        let mut values = vec![10; 20];
        values.push(1000);
        let mut ds = dataset(&values);
        let xs: Vec<f64> = values.iter().map(|v| *v as f64).collect();
        let bounds = compute_bounds(&xs, OutlierMethod::ZScore).expect("spread");

        let summary = apply_outliers(&mut ds, &plan(OutlierMethod::ZScore, OutlierAction::Cap));
        assert_eq!(summary.capped, 1);
        let capped = ds.cell(20, "x").and_then(Value::as_f64).expect("numeric");
        assert!((capped - bounds.upper).abs() < 1e-9, "capped to {capped}");
    }

    #[test]
    fn test_constant_column_has_no_zscore_outliers() {
        assert_eq!(compute_bounds(&[5.0, 5.0, 5.0], OutlierMethod::ZScore), None);
        assert_eq!(compute_bounds(&[5.0], OutlierMethod::Iqr), None);
    }

    #[test]
    fn test_nulls_are_kept_on_remove() {
        let mut ds = Dataset::new(
            vec![ColumnInfo::new("x", DType::Float)],
            vec![
                vec![Value::Float(1.0)],
                vec![Value::Null],
                vec![Value::Float(2.0)],
                vec![Value::Float(3.0)],
            ],
        )
        .expect("valid dataset");
        let plan = OutlierPlan {
            method: OutlierMethod::Iqr,
            action: OutlierAction::Remove,
            columns: vec![(0, "x".to_owned())],
        };
        let summary = apply_outliers(&mut ds, &plan);
        assert_eq!(summary.removed, 0);
        assert_eq!(ds.len(), 4);
    }
}
