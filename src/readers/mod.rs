pub mod shard_discovery;
pub mod shard_reader;

pub use shard_discovery::{find_shard_files, partition_by_table};
pub use shard_reader::{IdentityRows, ObservationRows, ShardInfo, ShardReader};
