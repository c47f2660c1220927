use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::readers::shard_reader::ShardReader;
use crate::utils::constants::{SHARD_PREFIX, SHARD_SUFFIX};

/// Recursively find shard files for one observation-type-variable under an
/// experiment's data root. Matches `OFCTABLE_{obstypevar}_*.sqlite` at any
/// depth; results are sorted for reproducible scan order.
pub fn find_shard_files(root: &Path, obstypevar: &str) -> Result<Vec<PathBuf>> {
    let prefix = format!("{}{}_", SHARD_PREFIX, obstypevar);
    let mut matches = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if let Some(name) = path.file_name().and_then(|f| f.to_str()) {
                if name.starts_with(&prefix) && name.ends_with(SHARD_SUFFIX) {
                    matches.push(path);
                }
            }
        }
    }

    matches.sort();
    Ok(matches)
}

/// Split discovered shard files into those exposing the requested table and
/// those missing it. Files that cannot be opened count as missing.
pub fn partition_by_table(files: &[PathBuf], table: &str) -> (Vec<PathBuf>, Vec<PathBuf>) {
    let reader = ShardReader::new();
    let mut present = Vec::new();
    let mut missing = Vec::new();
    for file in files {
        if reader.has_table(file, table) {
            present.push(file.clone());
        } else {
            missing.push(file.clone());
        }
    }
    (present, missing)
}
