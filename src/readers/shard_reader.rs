use std::collections::HashMap;
use std::path::Path;

use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags};

use crate::error::Result;
use crate::keys::collector::DateFilter;
use crate::models::{ObsIdentity, ObservationRecord};
use crate::utils::constants::{
    FORECAST_COLUMN, IDENTITY_COLUMNS, LEAD_TIME_COLUMN, MODEL_COLUMN, OBSERVED_COLUMN,
};
use validator::Validate;

/// Tables and per-table column names discovered in one shard file.
#[derive(Debug, Clone)]
pub struct ShardInfo {
    pub tables: Vec<String>,
    pub columns: HashMap<String, Vec<String>>,
}

impl ShardInfo {
    /// Columns of `table` that are absent from the shard, in the order given.
    pub fn missing_columns(&self, table: &str, required: &[&str]) -> Vec<String> {
        let present = self.columns.get(table);
        required
            .iter()
            .filter(|col| {
                present.map_or(true, |cols| !cols.iter().any(|c| c == *col))
            })
            .map(|col| (*col).to_string())
            .collect()
    }
}

/// Identity tuples extracted from one shard, with the count of rows dropped
/// for malformed fields.
#[derive(Debug)]
pub struct IdentityRows {
    pub identities: Vec<ObsIdentity>,
    pub rows_skipped: usize,
}

/// Full observation rows extracted from one shard.
#[derive(Debug)]
pub struct ObservationRows {
    pub records: Vec<ObservationRecord>,
    pub rows_skipped: usize,
}

/// Reads shard SQLite files through short-lived, read-only connections.
/// Every method opens its own connection and closes it on return; nothing is
/// held open across files.
#[derive(Debug, Default)]
pub struct ShardReader;

impl ShardReader {
    pub fn new() -> Self {
        Self
    }

    fn open(path: &Path) -> Result<Connection> {
        Ok(Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?)
    }

    /// List tables and their columns.
    pub fn inspect(&self, path: &Path) -> Result<ShardInfo> {
        let conn = Self::open(path)?;
        let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type='table'")?;
        let tables: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;

        let mut columns = HashMap::new();
        for table in &tables {
            let mut col_stmt =
                conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
            let cols: Vec<String> = col_stmt
                .query_map([], |row| row.get(1))?
                .collect::<rusqlite::Result<_>>()?;
            columns.insert(table.clone(), cols);
        }

        Ok(ShardInfo { tables, columns })
    }

    /// True if the shard file opens and contains `table`.
    pub fn has_table(&self, path: &Path, table: &str) -> bool {
        let Ok(conn) = Self::open(path) else {
            return false;
        };
        let Ok(mut stmt) =
            conn.prepare("SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1 LIMIT 1")
        else {
            return false;
        };
        stmt.exists([table]).unwrap_or(false)
    }

    /// Decide which table to read for the requested observation-type-variable.
    /// Accepts an exact match, then a case-insensitive match; anything else is
    /// `None` — an unrelated table is never substituted.
    pub fn pick_table<'a>(tables: &'a [String], requested: &str) -> Option<&'a str> {
        if let Some(table) = tables.iter().find(|t| *t == requested) {
            return Some(table);
        }
        let lowered = requested.to_lowercase();
        tables
            .iter()
            .find(|t| t.to_lowercase() == lowered)
            .map(|t| t.as_str())
    }

    /// Extract identity tuples for key building, applying the inclusive valid
    /// time filter. Rows with malformed identity fields are dropped and
    /// counted.
    pub fn read_identity_rows(
        &self,
        path: &Path,
        table: &str,
        filter: &DateFilter,
    ) -> Result<IdentityRows> {
        let conn = Self::open(path)?;
        let select = format!(
            "SELECT {} FROM {}",
            IDENTITY_COLUMNS
                .iter()
                .map(|c| quote_ident(c))
                .collect::<Vec<_>>()
                .join(", "),
            quote_ident(table)
        );

        let mut stmt = conn.prepare(&select)?;
        let raw_rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, Value>(0)?,
                row.get::<_, Value>(1)?,
                row.get::<_, Value>(2)?,
                row.get::<_, Value>(3)?,
                row.get::<_, Value>(4)?,
                row.get::<_, Value>(5)?,
                row.get::<_, Value>(6)?,
            ))
        })?;

        let mut identities = Vec::new();
        let mut rows_skipped = 0;
        for raw in raw_rows {
            let (fcst, valid, sid, param, level, lon, lat) = raw?;
            let identity = match (
                value_to_i64(&fcst),
                value_to_i64(&valid),
                value_to_i64(&sid),
                value_to_string(&param),
                value_to_i64(&level),
                value_to_f64(&lon),
                value_to_f64(&lat),
            ) {
                (
                    Some(fcst_dttm),
                    Some(valid_dttm),
                    Some(station_id),
                    Some(parameter),
                    Some(level),
                    Some(lon),
                    Some(lat),
                ) => ObsIdentity {
                    fcst_dttm,
                    valid_dttm,
                    station_id,
                    parameter,
                    level,
                    lon,
                    lat,
                },
                _ => {
                    rows_skipped += 1;
                    continue;
                }
            };
            if filter.contains(identity.valid_dttm) {
                identities.push(identity);
            }
        }

        Ok(IdentityRows {
            identities,
            rows_skipped,
        })
    }

    /// Extract full observation rows for aggregation. The lead-time and model
    /// columns are selected only when requested; a missing requested column
    /// fails the whole shard (degraded to zero rows by the caller).
    pub fn read_observations(
        &self,
        path: &Path,
        table: &str,
        with_lead_time: bool,
        with_model: bool,
    ) -> Result<ObservationRows> {
        let mut columns: Vec<&str> = IDENTITY_COLUMNS.to_vec();
        columns.push(FORECAST_COLUMN);
        columns.push(OBSERVED_COLUMN);
        if with_lead_time {
            columns.push(LEAD_TIME_COLUMN);
        }
        if with_model {
            columns.push(MODEL_COLUMN);
        }

        let conn = Self::open(path)?;
        let select = format!(
            "SELECT {} FROM {}",
            columns
                .iter()
                .map(|c| quote_ident(c))
                .collect::<Vec<_>>()
                .join(", "),
            quote_ident(table)
        );

        let mut stmt = conn.prepare(&select)?;
        let column_count = columns.len();
        let raw_rows = stmt.query_map([], move |row| {
            let mut values = Vec::with_capacity(column_count);
            for index in 0..column_count {
                values.push(row.get::<_, Value>(index)?);
            }
            Ok(values)
        })?;

        let mut records = Vec::new();
        let mut rows_skipped = 0;
        for raw in raw_rows {
            let values = raw?;
            let Some(record) = row_to_record(&values, with_lead_time, with_model) else {
                rows_skipped += 1;
                continue;
            };
            if record.validate().is_err() {
                rows_skipped += 1;
                continue;
            }
            records.push(record);
        }

        Ok(ObservationRows {
            records,
            rows_skipped,
        })
    }
}

fn row_to_record(
    values: &[Value],
    with_lead_time: bool,
    with_model: bool,
) -> Option<ObservationRecord> {
    let mut record = ObservationRecord {
        fcst_dttm: value_to_i64(&values[0])?,
        valid_dttm: value_to_i64(&values[1])?,
        station_id: value_to_i64(&values[2])?,
        parameter: value_to_string(&values[3])?,
        level: value_to_i64(&values[4])?,
        lon: value_to_f64(&values[5])?,
        lat: value_to_f64(&values[6])?,
        fcst: value_to_f64(&values[7])?,
        obs: value_to_f64(&values[8])?,
        lead_time: None,
        fcst_model: None,
    };

    let mut index = 9;
    if with_lead_time {
        record.lead_time = value_to_i64(&values[index]);
        index += 1;
    }
    if with_model {
        record.fcst_model = value_to_string(&values[index]);
    }
    Some(record)
}

/// Double-quote an SQL identifier, escaping embedded quotes. Table names come
/// from `sqlite_master`, never from raw user input, but they are still quoted
/// rather than interpolated.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn value_to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(i) => Some(*i),
        Value::Real(f) if f.is_finite() => Some(f.round() as i64),
        Value::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Real(f) => Some(*f),
        Value::Integer(i) => Some(*i as f64),
        Value::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Text(s) => Some(s.clone()),
        Value::Integer(i) => Some(i.to_string()),
        _ => None,
    }
}
