pub mod metrics;
pub mod observation;

pub use metrics::{AggregationGroup, ErrorAccumulator, LevelBucket, MetricsRow};
pub use observation::{ObsIdentity, ObservationRecord};
