use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// One matched forecast/observation pair read from a shard table.
///
/// Timestamps use the shard's native `YYYYMMDDHH` integer encoding, e.g.
/// `2023071512` for 2023-07-15 12Z.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ObservationRecord {
    pub fcst_dttm: i64,
    pub valid_dttm: i64,
    pub station_id: i64,
    pub parameter: String,
    pub level: i64,

    #[validate(range(min = -180.0, max = 360.0))]
    pub lon: f64,

    #[validate(range(min = -90.0, max = 90.0))]
    pub lat: f64,

    pub fcst: f64,
    pub obs: f64,

    pub lead_time: Option<i64>,
    pub fcst_model: Option<String>,
}

impl ObservationRecord {
    /// Forecast error (forecast minus observed).
    pub fn error(&self) -> f64 {
        self.fcst - self.obs
    }

    /// Hour-of-day at which the forecast was issued.
    pub fn cycle_hour(&self) -> u32 {
        (self.fcst_dttm.rem_euclid(100)) as u32
    }

    /// Valid time parsed from the `YYYYMMDDHH` encoding, `None` if the
    /// encoded date does not exist.
    pub fn valid_time(&self) -> Option<NaiveDateTime> {
        parse_valid_hour(self.valid_dttm)
    }

    /// The seven fields that identify this observation across experiments.
    pub fn identity(&self) -> ObsIdentity {
        ObsIdentity {
            fcst_dttm: self.fcst_dttm,
            valid_dttm: self.valid_dttm,
            station_id: self.station_id,
            parameter: self.parameter.clone(),
            level: self.level,
            lon: self.lon,
            lat: self.lat,
        }
    }
}

/// The identity fields from which an observation key is derived.
///
/// Two records from different experiments with equal identity fields (after
/// coordinate rounding) must produce the same key; no other fields
/// participate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObsIdentity {
    pub fcst_dttm: i64,
    pub valid_dttm: i64,
    pub station_id: i64,
    pub parameter: String,
    pub level: i64,
    pub lon: f64,
    pub lat: f64,
}

/// Parse a `YYYYMMDDHH` integer into a naive datetime.
pub fn parse_valid_hour(dttm: i64) -> Option<NaiveDateTime> {
    if dttm < 0 {
        return None;
    }
    let hour = (dttm % 100) as u32;
    let day = ((dttm / 100) % 100) as u32;
    let month = ((dttm / 10_000) % 100) as u32;
    let year = (dttm / 1_000_000) as i32;
    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, 0, 0)
}
