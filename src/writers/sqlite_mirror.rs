use std::path::Path;

use rusqlite::{params, Connection};

use crate::error::{Result, VerifyError};
use crate::models::{LevelBucket, MetricsRow};
use crate::processors::aggregation_spec::ParamKind;
use crate::readers::shard_reader::quote_ident;

/// Best-effort relational mirror of the metrics table.
///
/// The mirror uses replace semantics: the target table is dropped and
/// recreated on every write, and is never appended to concurrently. A mirror
/// failure is reported to the caller, who logs it; it must never affect the
/// primary artifact.
pub struct SqliteMirror;

impl SqliteMirror {
    /// Write `rows` into `table` inside the database at `db_path`.
    pub fn write(
        rows: &[MetricsRow],
        kind: ParamKind,
        db_path: &Path,
        table: &str,
    ) -> Result<()> {
        validate_table_name(table)?;

        let level_column = match kind {
            ParamKind::Pressure => "pressure_bracket TEXT",
            ParamKind::BrightnessTemperature => "channel INTEGER",
        };

        let quoted = quote_ident(table);
        let mut conn = Connection::open(db_path)?;
        conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS {quoted};
             CREATE TABLE {quoted} (
                vt_hour TEXT NOT NULL,
                cycle_hour INTEGER NOT NULL,
                {level_column},
                lead_time INTEGER,
                fcst_model TEXT,
                n INTEGER NOT NULL,
                bias REAL NOT NULL,
                mae REAL NOT NULL,
                rmse REAL NOT NULL,
                experiment TEXT NOT NULL,
                obstypevar TEXT NOT NULL,
                source TEXT NOT NULL
             );"
        ))?;

        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {quoted} VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
            ))?;
            for row in rows {
                let level_value: rusqlite::types::Value = match (&row.group.level, kind) {
                    (LevelBucket::Channel(channel), ParamKind::BrightnessTemperature) => {
                        (*channel).into()
                    }
                    (level, _) => level.label().into(),
                };
                stmt.execute(params![
                    row.group.vt_hour.format("%Y-%m-%d %H:%M:%S").to_string(),
                    row.group.cycle_hour,
                    level_value,
                    row.group.lead_time,
                    row.group.fcst_model,
                    row.n as i64,
                    row.bias,
                    row.mae,
                    row.rmse,
                    row.experiment,
                    row.obstypevar,
                    row.source,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

/// The mirror table name is composed from experiment and obstypevar; restrict
/// it to identifier characters so it can never smuggle SQL.
fn validate_table_name(table: &str) -> Result<()> {
    let mut chars = table.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    if valid_start && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Ok(());
    }
    Err(VerifyError::Config(format!(
        "invalid mirror table name '{}'",
        table
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AggregationGroup;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn sample_rows() -> Vec<MetricsRow> {
        vec![MetricsRow {
            group: AggregationGroup {
                vt_hour: NaiveDate::from_ymd_opt(2023, 7, 15)
                    .unwrap()
                    .and_hms_opt(12, 0, 0)
                    .unwrap(),
                cycle_hour: 12,
                level: LevelBucket::Pressure("950-850"),
                lead_time: None,
                fcst_model: None,
            },
            n: 10,
            bias: 0.25,
            mae: 0.5,
            rmse: 0.75,
            experiment: "EXP1".to_string(),
            obstypevar: "synop".to_string(),
            source: "OFCTABLE_synop_1.sqlite".to_string(),
        }]
    }

    #[test]
    fn test_mirror_write_and_replace_semantics() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("metrics.sqlite");

        SqliteMirror::write(&sample_rows(), ParamKind::Pressure, &db, "EXP1_synop").unwrap();
        // A second write replaces rather than appends.
        SqliteMirror::write(&sample_rows(), ParamKind::Pressure, &db, "EXP1_synop").unwrap();

        let conn = Connection::open(&db).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM EXP1_synop", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);

        let (bracket, bias): (String, f64) = conn
            .query_row(
                "SELECT pressure_bracket, bias FROM EXP1_synop",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(bracket, "950-850");
        assert!((bias - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_table_name_rejected() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("metrics.sqlite");
        let result = SqliteMirror::write(
            &sample_rows(),
            ParamKind::Pressure,
            &db,
            "bad name; DROP TABLE x",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_rows_create_empty_table() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("metrics.sqlite");

        SqliteMirror::write(&[], ParamKind::BrightnessTemperature, &db, "EXP1_amsua").unwrap();
        let conn = Connection::open(&db).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM EXP1_amsua", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
