use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{Result, VerifyError};
use crate::models::LevelBucket;

/// Which kind of parameter is being verified; decides the level-bucketing
/// mode. Brightness temperature uses the level as a discrete channel id,
/// everything else discretizes into pressure brackets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Pressure,
    BrightnessTemperature,
}

impl ParamKind {
    pub fn from_parameter(parameter: Option<&str>) -> Self {
        match parameter {
            Some("tb") => ParamKind::BrightnessTemperature,
            _ => ParamKind::Pressure,
        }
    }
}

/// The validated query plan for one aggregation run. Built once, before any
/// shard I/O, and shared read-only by every worker.
#[derive(Debug, Clone)]
pub struct AggregationSpec {
    pub param_kind: ParamKind,
    pub by_lead_time: bool,
    pub by_model: bool,
    pub allowed_cycle_hours: Option<Vec<u32>>,
    pub key_filter: Option<Arc<HashSet<u128>>>,
    pub round_decimals: u32,
}

impl AggregationSpec {
    pub fn cycle_hour_allowed(&self, hour: u32) -> bool {
        self.allowed_cycle_hours
            .as_ref()
            .map_or(true, |hours| hours.contains(&hour))
    }

    pub fn bucket(&self, level: i64) -> LevelBucket {
        match self.param_kind {
            ParamKind::Pressure => LevelBucket::Pressure(LevelBucket::pressure_bracket(level)),
            ParamKind::BrightnessTemperature => LevelBucket::Channel(level),
        }
    }
}

/// Translates verification options into an [`AggregationSpec`].
/// Configuration errors (a cycle interval that does not divide 24) are
/// rejected here, before any query execution.
#[derive(Debug, Default)]
pub struct AggregationSpecBuilder {
    param_kind: Option<ParamKind>,
    by_lead_time: bool,
    by_model: bool,
    cycle_interval: Option<u32>,
    key_filter: Option<HashSet<u128>>,
    round_decimals: u32,
}

impl AggregationSpecBuilder {
    pub fn new(param_kind: ParamKind) -> Self {
        Self {
            param_kind: Some(param_kind),
            round_decimals: crate::utils::constants::DEFAULT_ROUND_DECIMALS,
            ..Default::default()
        }
    }

    pub fn by_lead_time(mut self, enabled: bool) -> Self {
        self.by_lead_time = enabled;
        self
    }

    pub fn by_model(mut self, enabled: bool) -> Self {
        self.by_model = enabled;
        self
    }

    pub fn cycle_interval(mut self, fcint: Option<u32>) -> Self {
        self.cycle_interval = fcint;
        self
    }

    pub fn key_filter(mut self, keys: Option<HashSet<u128>>) -> Self {
        self.key_filter = keys;
        self
    }

    pub fn round_decimals(mut self, decimals: u32) -> Self {
        self.round_decimals = decimals;
        self
    }

    pub fn build(self) -> Result<AggregationSpec> {
        let allowed_cycle_hours = match self.cycle_interval {
            None => None,
            Some(fcint) => Some(allowed_cycle_hours(fcint)?),
        };

        Ok(AggregationSpec {
            param_kind: self.param_kind.unwrap_or(ParamKind::Pressure),
            by_lead_time: self.by_lead_time,
            by_model: self.by_model,
            allowed_cycle_hours,
            key_filter: self.key_filter.map(Arc::new),
            round_decimals: self.round_decimals,
        })
    }
}

/// The cycle hours admitted by a forecast cycle interval: {0, fcint, 2·fcint,
/// …} below 24. The interval must divide 24 evenly.
pub fn allowed_cycle_hours(fcint: u32) -> Result<Vec<u32>> {
    if fcint == 0 || 24 % fcint != 0 {
        return Err(VerifyError::Config(format!(
            "forecast cycle interval {} must divide 24 evenly",
            fcint
        )));
    }
    Ok((0..24).step_by(fcint as usize).collect())
}
