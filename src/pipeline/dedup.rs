//! Duplicate row removal over a column subset.

use crate::dataset::{Dataset, ValueKey};
use std::collections::HashSet;

/// Drop rows whose values on `subset` repeat an earlier row. The first
/// occurrence is kept and relative order is preserved. Returns the number of
/// rows removed.
pub fn deduplicate(dataset: &mut Dataset, subset: &[usize]) -> usize {
    if subset.is_empty() {
        return 0;
    }
    let before = dataset.len();
    let mut seen: HashSet<Vec<ValueKey>> = HashSet::with_capacity(before);
    dataset.retain_rows(|row| {
        let key = subset
            .iter()
            .map(|&i| row.get(i).map_or(ValueKey::Null, |v| v.key()))
            .collect();
        seen.insert(key)
    });
    before - dataset.len()
}
