/// Shard file naming convention: OFCTABLE_{obstypevar}_*.sqlite
pub const SHARD_PREFIX: &str = "OFCTABLE_";
pub const SHARD_SUFFIX: &str = ".sqlite";

/// Columns every shard table must expose for key building
pub const IDENTITY_COLUMNS: [&str; 7] = [
    "fcst_dttm",
    "valid_dttm",
    "SID",
    "parameter",
    "level",
    "lon",
    "lat",
];

/// Additional columns required for verification
pub const FORECAST_COLUMN: &str = "fcst";
pub const OBSERVED_COLUMN: &str = "obs";

/// Optional grouping columns
pub const LEAD_TIME_COLUMN: &str = "lead_time";
pub const MODEL_COLUMN: &str = "fcst_model";

/// Coordinate rounding decimals; must match between the key-building run
/// and any later run that filters by that key artifact
pub const DEFAULT_ROUND_DECIMALS: u32 = 2;

/// Key artifact column name
pub const KEY_COLUMN: &str = "obs_key";

/// Relational mirror sink file name, written next to the primary artifact
pub const MIRROR_DB_FILE: &str = "metrics.sqlite";

/// Processing defaults
pub const DEFAULT_ROW_GROUP_SIZE: usize = 10000;

/// Parquet compression options
pub const COMPRESSION_SNAPPY: &str = "snappy";
pub const COMPRESSION_GZIP: &str = "gzip";
pub const COMPRESSION_LZ4: &str = "lz4";
pub const COMPRESSION_ZSTD: &str = "zstd";
pub const COMPRESSION_NONE: &str = "none";
