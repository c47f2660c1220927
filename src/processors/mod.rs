pub mod aggregation_spec;
pub mod metrics_merger;
pub mod parallel_aggregator;

pub use aggregation_spec::{AggregationSpec, AggregationSpecBuilder, ParamKind};
pub use metrics_merger::MetricsMerger;
pub use parallel_aggregator::ParallelAggregator;
