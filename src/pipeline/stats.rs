//! Small numeric helpers used by imputation and outlier detection.

use crate::dataset::{Value, ValueKey};
use std::collections::HashMap;

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation around a precomputed mean.
pub fn population_std(values: &[f64], mean: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

/// Quantile of an ascending slice with linear interpolation between ranks.
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let pos = last as f64 * q.clamp(0.0, 1.0);
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let lo = *sorted.get(lower)?;
    let hi = *sorted.get(upper)?;
    Some(lo + (hi - lo) * (pos - lower as f64))
}

pub fn median(values: &[f64]) -> Option<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    quantile(&sorted, 0.5)
}

/// Most frequent non-null value. Ties go to the value seen first.
pub fn mode<'a>(values: impl IntoIterator<Item = &'a Value>) -> Option<Value> {
    let mut counts: HashMap<ValueKey, (usize, usize)> = HashMap::new();
    let mut firsts: Vec<&'a Value> = Vec::new();

    for value in values.into_iter().filter(|v| !v.is_null()) {
        let next_slot = firsts.len();
        let entry = counts.entry(value.key()).or_insert((0, next_slot));
        if entry.1 == next_slot && entry.0 == 0 {
            firsts.push(value);
        }
        entry.0 += 1;
    }

    let mut best: Option<(usize, usize)> = None;
    #[expect(clippy::iter_over_hash_type)]
    for (count, slot) in counts.into_values() {
        let better = match best {
            None => true,
            Some((best_count, best_slot)) => {
                count > best_count || (count == best_count && slot < best_slot)
            }
        };
        if better {
            best = Some((count, slot));
        }
    }

    best.and_then(|(_, slot)| firsts.get(slot).map(|v| (*v).clone()))
}
