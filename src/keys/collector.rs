use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{Result, VerifyError};
use crate::keys::builder::KeyBuilder;
use crate::readers::shard_discovery::find_shard_files;
use crate::readers::shard_reader::ShardReader;
use crate::utils::constants::IDENTITY_COLUMNS;

/// Inclusive bounds on the valid timestamp, in the shard's native
/// `YYYYMMDDHH` integer encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateFilter {
    start: Option<i64>,
    end: Option<i64>,
}

impl DateFilter {
    pub fn new(start: Option<i64>, end: Option<i64>) -> Self {
        Self { start, end }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn contains(&self, valid_dttm: i64) -> bool {
        if let Some(start) = self.start {
            if valid_dttm < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if valid_dttm > end {
                return false;
            }
        }
        true
    }
}

/// Shard counts accumulated while collecting one experiment's keys.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CollectionSummary {
    pub files_seen: usize,
    pub files_used: usize,
    pub skipped_no_table: usize,
    pub skipped_bad_columns: usize,
    pub rows_skipped: usize,
}

impl CollectionSummary {
    pub fn skipped(&self) -> usize {
        self.skipped_no_table + self.skipped_bad_columns
    }
}

/// Builds one experiment's deduplicated key set by scanning its shard tree
/// sequentially, one short-lived connection per file.
#[derive(Debug, Clone)]
pub struct KeyCollector {
    builder: KeyBuilder,
    date_filter: DateFilter,
    strict: bool,
}

impl KeyCollector {
    pub fn new(round_decimals: u32) -> Self {
        Self {
            builder: KeyBuilder::new(round_decimals),
            date_filter: DateFilter::unbounded(),
            strict: false,
        }
    }

    pub fn with_date_filter(mut self, filter: DateFilter) -> Self {
        self.date_filter = filter;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Scan all shards for `obstypevar` under `root` and union their keys.
    ///
    /// In lenient mode shards missing the table or required columns are
    /// counted and skipped; in strict mode any skip aborts the collection.
    pub fn collect(
        &self,
        experiment: &str,
        root: &Path,
        obstypevar: &str,
    ) -> Result<(HashSet<u128>, CollectionSummary)> {
        let reader = ShardReader::new();
        let files = find_shard_files(root, obstypevar)?;
        if files.is_empty() {
            warn!(
                experiment,
                obstypevar,
                root = %root.display(),
                "no shard files found"
            );
        }

        let mut keys: HashSet<u128> = HashSet::new();
        let mut summary = CollectionSummary {
            files_seen: files.len(),
            ..Default::default()
        };

        for file in &files {
            let info = match reader.inspect(file) {
                Ok(info) => info,
                Err(e) => {
                    summary.skipped_no_table += 1;
                    self.handle_skip(VerifyError::ShardQuery {
                        shard: file.clone(),
                        message: e.to_string(),
                    })?;
                    continue;
                }
            };

            let Some(table) = ShardReader::pick_table(&info.tables, obstypevar) else {
                summary.skipped_no_table += 1;
                self.handle_skip(VerifyError::MissingTable {
                    shard: file.clone(),
                    requested: obstypevar.to_string(),
                })?;
                continue;
            };
            let table = table.to_string();

            let missing = info.missing_columns(&table, &IDENTITY_COLUMNS);
            if !missing.is_empty() {
                summary.skipped_bad_columns += 1;
                self.handle_skip(VerifyError::MissingColumns {
                    shard: file.clone(),
                    table,
                    columns: missing,
                })?;
                continue;
            }

            match reader.read_identity_rows(file, &table, &self.date_filter) {
                Ok(rows) => {
                    summary.files_used += 1;
                    summary.rows_skipped += rows.rows_skipped;
                    for identity in &rows.identities {
                        keys.insert(self.builder.observation_key(identity));
                    }
                    debug!(
                        shard = %file.display(),
                        rows = rows.identities.len(),
                        skipped = rows.rows_skipped,
                        "collected keys"
                    );
                }
                Err(e) => {
                    summary.skipped_bad_columns += 1;
                    self.handle_skip(VerifyError::ShardQuery {
                        shard: file.clone(),
                        message: e.to_string(),
                    })?;
                }
            }
        }

        Ok((keys, summary))
    }

    fn handle_skip(&self, error: VerifyError) -> Result<()> {
        if self.strict {
            return Err(VerifyError::StrictMissing(error.to_string()));
        }
        warn!("skipping shard: {}", error);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_filter_inclusive_bounds() {
        let filter = DateFilter::new(Some(2023071500), Some(2023071600));
        assert!(filter.contains(2023071500));
        assert!(filter.contains(2023071512));
        assert!(filter.contains(2023071600));
        assert!(!filter.contains(2023071423));
        assert!(!filter.contains(2023071601));
    }

    #[test]
    fn test_unbounded_filter_accepts_everything() {
        let filter = DateFilter::unbounded();
        assert!(filter.contains(0));
        assert!(filter.contains(2023071512));
    }

    #[test]
    fn test_summary_skip_total() {
        let summary = CollectionSummary {
            files_seen: 5,
            files_used: 2,
            skipped_no_table: 2,
            skipped_bad_columns: 1,
            rows_skipped: 0,
        };
        assert_eq!(summary.skipped(), 3);
    }
}
