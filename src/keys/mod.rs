pub mod builder;
pub mod collector;
pub mod intersect;

pub use builder::KeyBuilder;
pub use collector::{CollectionSummary, DateFilter, KeyCollector};
pub use intersect::intersect_key_sets;
