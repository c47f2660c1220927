use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::warn;

use crate::error::Result;
use crate::keys::KeyBuilder;
use crate::models::{AggregationGroup, ErrorAccumulator, MetricsRow};
use crate::processors::aggregation_spec::AggregationSpec;
use crate::readers::shard_reader::ShardReader;
use crate::utils::progress::ProgressReporter;

/// Executes the aggregation plan against each shard file concurrently.
///
/// Each work unit owns its own SQLite connection for the duration of its
/// shard; no mutable state is shared across tasks. A shard whose query fails
/// contributes zero rows and the run continues.
pub struct ParallelAggregator {
    workers: usize,
}

impl ParallelAggregator {
    pub fn new(workers: usize) -> Self {
        Self { workers }
    }

    /// Aggregate every shard and return the per-shard partial tables,
    /// unordered. Partials are not combined here; see
    /// [`MetricsMerger`](crate::processors::MetricsMerger).
    pub fn aggregate(
        &self,
        shards: &[std::path::PathBuf],
        table: &str,
        spec: &AggregationSpec,
        experiment: &str,
        obstypevar: &str,
        progress: Option<&ProgressReporter>,
    ) -> Result<Vec<Vec<MetricsRow>>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| crate::error::VerifyError::Config(e.to_string()))?;

        let processed = Arc::new(AtomicUsize::new(0));

        let partials: Vec<Vec<MetricsRow>> = pool.install(|| {
            shards
                .par_iter()
                .map(|shard| {
                    let rows =
                        match aggregate_shard(shard, table, spec, experiment, obstypevar) {
                            Ok(rows) => rows,
                            Err(e) => {
                                warn!(
                                    shard = %shard.display(),
                                    error = %e,
                                    "shard query failed, contributing zero rows"
                                );
                                Vec::new()
                            }
                        };

                    let count = processed.fetch_add(1, Ordering::Relaxed) + 1;
                    if let Some(p) = progress {
                        p.update(count as u64);
                    }
                    rows
                })
                .collect()
        });

        Ok(partials)
    }
}

impl Default for ParallelAggregator {
    fn default() -> Self {
        Self::new(num_cpus::get())
    }
}

/// Run the plan against a single shard: read rows, apply the typed
/// predicates, bucket, accumulate and finalize per-group statistics.
pub fn aggregate_shard(
    shard: &Path,
    table: &str,
    spec: &AggregationSpec,
    experiment: &str,
    obstypevar: &str,
) -> Result<Vec<MetricsRow>> {
    let reader = ShardReader::new();
    let rows = reader.read_observations(shard, table, spec.by_lead_time, spec.by_model)?;

    let key_builder = KeyBuilder::new(spec.round_decimals);
    let mut groups: HashMap<AggregationGroup, ErrorAccumulator> = HashMap::new();

    for record in &rows.records {
        let cycle_hour = record.cycle_hour();
        if !spec.cycle_hour_allowed(cycle_hour) {
            continue;
        }
        if let Some(filter) = &spec.key_filter {
            // The key is derived inline with the same formula the collector
            // used, so membership matches exactly.
            if !filter.contains(&key_builder.observation_key(&record.identity())) {
                continue;
            }
        }
        let Some(vt_hour) = record.valid_time() else {
            continue;
        };

        let group = AggregationGroup {
            vt_hour,
            cycle_hour,
            level: spec.bucket(record.level),
            lead_time: if spec.by_lead_time {
                record.lead_time
            } else {
                None
            },
            fcst_model: if spec.by_model {
                record.fcst_model.clone()
            } else {
                None
            },
        };
        groups.entry(group).or_default().push(record.error());
    }

    let source = shard
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| shard.display().to_string());

    let mut metrics: Vec<MetricsRow> = groups
        .into_iter()
        .map(|(group, acc)| {
            MetricsRow::from_accumulator(group, &acc, experiment, obstypevar, &source)
        })
        .collect();

    // HashMap iteration order is arbitrary; sort so a shard's partial table
    // is reproducible.
    metrics.sort_by(|a, b| {
        (
            a.group.vt_hour,
            a.group.cycle_hour,
            a.group.level.label(),
            a.group.lead_time,
            a.group.fcst_model.clone(),
        )
            .cmp(&(
                b.group.vt_hour,
                b.group.cycle_hour,
                b.group.level.label(),
                b.group.lead_time,
                b.group.fcst_model.clone(),
            ))
    });

    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::aggregation_spec::{AggregationSpecBuilder, ParamKind};
    use rusqlite::Connection;
    use tempfile::TempDir;

    fn create_shard(dir: &Path, name: &str, rows: &[(i64, i64, i64, &str, i64, f64, f64, f64, f64)]) -> std::path::PathBuf {
        let path = dir.join(name);
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE synop (
                fcst_dttm INTEGER, valid_dttm INTEGER, SID INTEGER,
                parameter TEXT, level INTEGER, lon REAL, lat REAL,
                fcst REAL, obs REAL
            );",
        )
        .unwrap();
        for row in rows {
            conn.execute(
                "INSERT INTO synop VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    row.0, row.1, row.2, row.3, row.4, row.5, row.6, row.7, row.8
                ],
            )
            .unwrap();
        }
        path
    }

    #[test]
    fn test_aggregate_shard_groups_and_statistics() {
        let dir = TempDir::new().unwrap();
        // Two observations in the 950-850 bracket, one in 1050-950.
        let shard = create_shard(
            dir.path(),
            "OFCTABLE_synop_1.sqlite",
            &[
                (2023071500, 2023071512, 1, "t", 90000, 10.0, 60.0, 2.0, 1.0),
                (2023071500, 2023071512, 2, "t", 90000, 11.0, 61.0, 1.0, 2.0),
                (2023071500, 2023071512, 3, "t", 96000, 12.0, 62.0, 5.0, 2.0),
            ],
        );

        let spec = AggregationSpecBuilder::new(ParamKind::Pressure)
            .build()
            .unwrap();
        let rows = aggregate_shard(&shard, "synop", &spec, "EXP1", "synop").unwrap();

        assert_eq!(rows.len(), 2);
        let mid = rows
            .iter()
            .find(|r| r.group.level.label() == "950-850")
            .unwrap();
        assert_eq!(mid.n, 2);
        assert!((mid.bias - 0.0).abs() < 1e-12);
        assert!((mid.mae - 1.0).abs() < 1e-12);
        assert!((mid.rmse - 1.0).abs() < 1e-12);

        let low = rows
            .iter()
            .find(|r| r.group.level.label() == "1050-950")
            .unwrap();
        assert_eq!(low.n, 1);
        assert!((low.bias - 3.0).abs() < 1e-12);
        assert_eq!(low.experiment, "EXP1");
        assert_eq!(low.source, "OFCTABLE_synop_1.sqlite");
    }

    #[test]
    fn test_cycle_hour_filter_excludes_off_cycle_records() {
        let dir = TempDir::new().unwrap();
        let shard = create_shard(
            dir.path(),
            "OFCTABLE_synop_1.sqlite",
            &[
                (2023071500, 2023071512, 1, "t", 90000, 10.0, 60.0, 2.0, 1.0),
                (2023071503, 2023071512, 2, "t", 90000, 11.0, 61.0, 9.0, 1.0),
            ],
        );

        let spec = AggregationSpecBuilder::new(ParamKind::Pressure)
            .cycle_interval(Some(6))
            .build()
            .unwrap();
        let rows = aggregate_shard(&shard, "synop", &spec, "EXP1", "synop").unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].n, 1);
        assert_eq!(rows[0].group.cycle_hour, 0);
    }

    #[test]
    fn test_channel_mode_groups_by_raw_level() {
        let dir = TempDir::new().unwrap();
        let shard = create_shard(
            dir.path(),
            "OFCTABLE_amsua_1.sqlite",
            &[
                (2023071500, 2023071512, 1, "tb", 5, 10.0, 60.0, 240.0, 239.0),
                (2023071500, 2023071512, 2, "tb", 7, 11.0, 61.0, 242.0, 241.0),
            ],
        );
        // reuse fixture table name
        let conn = Connection::open(&shard).unwrap();
        conn.execute_batch("ALTER TABLE synop RENAME TO amsua;").unwrap();
        drop(conn);

        let spec = AggregationSpecBuilder::new(ParamKind::BrightnessTemperature)
            .build()
            .unwrap();
        let rows = aggregate_shard(&shard, "amsua", &spec, "EXP1", "amsua").unwrap();

        assert_eq!(rows.len(), 2);
        let labels: Vec<String> = rows.iter().map(|r| r.group.level.label()).collect();
        assert_eq!(labels, vec!["5".to_string(), "7".to_string()]);
    }

    #[test]
    fn test_failing_shard_degrades_to_zero_rows() {
        let dir = TempDir::new().unwrap();
        let bogus = dir.path().join("OFCTABLE_synop_bad.sqlite");
        std::fs::write(&bogus, b"not a database").unwrap();

        let spec = AggregationSpecBuilder::new(ParamKind::Pressure)
            .build()
            .unwrap();
        let aggregator = ParallelAggregator::new(2);
        let partials = aggregator
            .aggregate(&[bogus], "synop", &spec, "EXP1", "synop", None)
            .unwrap();
        assert_eq!(partials.len(), 1);
        assert!(partials[0].is_empty());
    }

    #[test]
    fn test_parallel_aggregate_covers_all_shards() {
        let dir = TempDir::new().unwrap();
        let mut shards = Vec::new();
        for i in 0..4 {
            shards.push(create_shard(
                dir.path(),
                &format!("OFCTABLE_synop_{i}.sqlite"),
                &[(
                    2023071500,
                    2023071512,
                    i as i64,
                    "t",
                    90000,
                    10.0,
                    60.0,
                    2.0,
                    1.0,
                )],
            ));
        }

        let spec = AggregationSpecBuilder::new(ParamKind::Pressure)
            .build()
            .unwrap();
        let aggregator = ParallelAggregator::new(2);
        let partials = aggregator
            .aggregate(&shards, "synop", &spec, "EXP1", "synop", None)
            .unwrap();

        assert_eq!(partials.len(), 4);
        assert!(partials.iter().all(|p| p.len() == 1));
        // provenance keeps each shard distinguishable after merging
        let sources: std::collections::HashSet<String> = partials
            .iter()
            .map(|p| p[0].source.clone())
            .collect();
        assert_eq!(sources.len(), 4);
    }
}
