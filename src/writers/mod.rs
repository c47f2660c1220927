pub mod parquet_writer;
pub mod sqlite_mirror;

pub use parquet_writer::{ParquetFileInfo, ParquetWriter};
pub use sqlite_mirror::SqliteMirror;
