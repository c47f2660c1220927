use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, VerifyError>;

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Shard {shard} has no table matching '{requested}'")]
    MissingTable { shard: PathBuf, requested: String },

    #[error("Shard {shard} table '{table}' is missing columns: {columns:?}")]
    MissingColumns {
        shard: PathBuf,
        table: String,
        columns: Vec<String>,
    },

    #[error("Strict mode abort: {0}")]
    StrictMissing(String),

    #[error("Shard query failed for {shard}: {message}")]
    ShardQuery { shard: PathBuf, message: String },

    #[error("Invalid key artifact: {0}")]
    KeyArtifact(String),
}
