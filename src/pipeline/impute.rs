//! Missing-value imputation.

use super::plan::ColumnPlan;
use super::spec::Impute;
use super::stats;
use crate::dataset::{DType, Dataset, Row, Value, parse};
use crate::error::{RuleError, RuleLocation};

/// Fill nulls column by column. Returns the number of cells filled.
///
/// Mean and median fail with a [`RuleError`] if a non-null value in the
/// column is not numeric at this point. An integer column that receives a
/// fractional statistic becomes a float column.
pub fn apply_imputation(dataset: &mut Dataset, columns: &[ColumnPlan]) -> Result<usize, RuleError> {
    let mut filled = 0;
    for plan in columns {
        filled += impute_column(dataset, plan)?;
    }
    Ok(filled)
}

fn impute_column(dataset: &mut Dataset, plan: &ColumnPlan) -> Result<usize, RuleError> {
    let fill = match &plan.impute {
        Impute::None => return Ok(0),
        Impute::ForwardFill => return Ok(forward_fill(dataset.rows_mut().iter_mut(), plan.index)),
        Impute::BackwardFill => {
            return Ok(forward_fill(dataset.rows_mut().iter_mut().rev(), plan.index));
        }
        Impute::Value { value } => value.clone(),
        Impute::Mode => match stats::mode(dataset.column_values(plan.index)) {
            Some(v) => v,
            None => return Ok(0),
        },
        strategy @ (Impute::Mean | Impute::Median) => {
            let numbers = numeric_values(dataset.rows(), plan, strategy.kind())?;
            let statistic = if matches!(strategy, Impute::Mean) {
                stats::mean(&numbers)
            } else {
                stats::median(&numbers)
            };
            match statistic {
                Some(x) => numeric_fill(dataset, plan, x),
                None => {
                    tracing::debug!(column = %plan.name, "No numeric values to impute from");
                    return Ok(0);
                }
            }
        }
    };

    let mut filled = 0;
    for cell in dataset
        .rows_mut()
        .iter_mut()
        .filter_map(|r| r.get_mut(plan.index))
    {
        if cell.is_null() {
            *cell = fill.clone();
            filled += 1;
        }
    }
    Ok(filled)
}

/// The statistic in the column's representation, widening integers when it
/// has a fractional part.
fn numeric_fill(dataset: &mut Dataset, plan: &ColumnPlan, statistic: f64) -> Value {
    let is_integer = dataset
        .columns()
        .get(plan.index)
        .is_some_and(|c| c.dtype == DType::Integer);
    if !is_integer {
        return Value::Float(statistic);
    }
    if let Some(whole) = parse::coerce(Value::Float(statistic), DType::Integer) {
        return whole;
    }

    dataset.widen_to_float(plan.index);
    tracing::debug!(column = %plan.name, "Widened integer column to float for imputation");
    Value::Float(statistic)
}

fn numeric_values(rows: &[Row], plan: &ColumnPlan, kind: &'static str) -> Result<Vec<f64>, RuleError> {
    let mut numbers = Vec::new();
    for (row_idx, value) in rows.iter().filter_map(|r| r.get(plan.index)).enumerate() {
        if value.is_null() {
            continue;
        }
        let x = value.as_f64().ok_or_else(|| {
            RuleError::at(
                &plan.name,
                RuleLocation::Impute { kind },
                format!(
                    "{kind} needs numeric values, found {} '{value}' at row {row_idx}",
                    value.kind_name()
                ),
            )
        })?;
        numbers.push(x);
    }
    Ok(numbers)
}

/// Carry the last seen value forward over nulls. Leading nulls stay null.
fn forward_fill<'a>(rows: impl Iterator<Item = &'a mut Row>, index: usize) -> usize {
    let mut last: Option<Value> = None;
    let mut filled = 0;
    for cell in rows.filter_map(|r| r.get_mut(index)) {
        if cell.is_null() {
            if let Some(v) = &last {
                *cell = v.clone();
                filled += 1;
            }
        } else {
            last = Some(cell.clone());
        }
    }
    filled
}
