use std::collections::HashSet;

use crate::error::{Result, VerifyError};

/// Intersect per-experiment key sets into the common-observation population.
///
/// Associative and order-independent; with a single experiment the result is
/// that experiment's own key set.
pub fn intersect_key_sets(mut sets: Vec<HashSet<u128>>) -> Result<HashSet<u128>> {
    // Start from the smallest set so retain walks the fewest keys.
    sets.sort_by_key(HashSet::len);
    let mut iter = sets.into_iter();
    let Some(mut common) = iter.next() else {
        return Err(VerifyError::Config(
            "at least one experiment key set is required".to_string(),
        ));
    };
    for set in iter {
        common.retain(|key| set.contains(key));
    }
    Ok(common)
}
