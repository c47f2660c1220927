use crate::models::MetricsRow;

/// Concatenates per-shard partial tables into the final metrics table.
///
/// Partials are concatenated, not re-aggregated: the same group may appear
/// once per contributing shard, and any cross-shard combination (such as an
/// n-weighted campaign mean) is left entirely to downstream consumers.
pub struct MetricsMerger;

impl MetricsMerger {
    pub fn merge(partials: Vec<Vec<MetricsRow>>) -> Vec<MetricsRow> {
        partials
            .into_iter()
            .filter(|partial| !partial.is_empty())
            .flatten()
            .collect()
    }
}
