use chrono::NaiveDateTime;
use serde::Serialize;

/// Vertical-level grouping dimension: a fixed pressure band for profile
/// parameters, or the raw channel identifier for brightness temperature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum LevelBucket {
    Pressure(&'static str),
    Channel(i64),
}

impl LevelBucket {
    /// Discretize a pressure-like level (Pa) into its band label.
    /// Bands use inclusive lower thresholds, descending.
    pub fn pressure_bracket(level: i64) -> &'static str {
        match level {
            l if l >= 95000 => "1050-950",
            l if l >= 85000 => "950-850",
            l if l >= 75000 => "850-750",
            l if l >= 65000 => "750-650",
            l if l >= 55000 => "650-550",
            l if l >= 45000 => "550-450",
            l if l >= 35000 => "450-350",
            l if l >= 25000 => "350-250",
            l if l >= 15000 => "250-150",
            _ => "150-0",
        }
    }

    pub fn label(&self) -> String {
        match self {
            LevelBucket::Pressure(bracket) => (*bracket).to_string(),
            LevelBucket::Channel(channel) => channel.to_string(),
        }
    }
}

/// One bucketed grouping of observations within a single shard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct AggregationGroup {
    pub vt_hour: NaiveDateTime,
    pub cycle_hour: u32,
    pub level: LevelBucket,
    pub lead_time: Option<i64>,
    pub fcst_model: Option<String>,
}

/// Running error sums for one aggregation group.
#[derive(Debug, Default, Clone, Copy)]
pub struct ErrorAccumulator {
    n: u64,
    sum: f64,
    sum_abs: f64,
    sum_sq: f64,
}

impl ErrorAccumulator {
    pub fn push(&mut self, error: f64) {
        self.n += 1;
        self.sum += error;
        self.sum_abs += error.abs();
        self.sum_sq += error * error;
    }

    pub fn n(&self) -> u64 {
        self.n
    }

    pub fn bias(&self) -> f64 {
        if self.n == 0 {
            return 0.0;
        }
        self.sum / self.n as f64
    }

    pub fn mae(&self) -> f64 {
        if self.n == 0 {
            return 0.0;
        }
        self.sum_abs / self.n as f64
    }

    pub fn rmse(&self) -> f64 {
        if self.n == 0 {
            return 0.0;
        }
        (self.sum_sq / self.n as f64).sqrt()
    }
}

/// One row of the output metrics table: a group, its statistics, and the
/// provenance tags.
///
/// Rows are produced per shard and never combined across shards, so the same
/// group may appear once per contributing shard in the final table.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsRow {
    pub group: AggregationGroup,
    pub n: u64,
    pub bias: f64,
    pub mae: f64,
    pub rmse: f64,
    pub experiment: String,
    pub obstypevar: String,
    pub source: String,
}

impl MetricsRow {
    pub fn from_accumulator(
        group: AggregationGroup,
        acc: &ErrorAccumulator,
        experiment: &str,
        obstypevar: &str,
        source: &str,
    ) -> Self {
        Self {
            group,
            n: acc.n(),
            bias: acc.bias(),
            mae: acc.mae(),
            rmse: acc.rmse(),
            experiment: experiment.to_string(),
            obstypevar: obstypevar.to_string(),
            source: source.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pressure_bracket_thresholds() {
        assert_eq!(LevelBucket::pressure_bracket(96000), "1050-950");
        assert_eq!(LevelBucket::pressure_bracket(95000), "1050-950");
        assert_eq!(LevelBucket::pressure_bracket(90000), "950-850");
        assert_eq!(LevelBucket::pressure_bracket(85000), "950-850");
        assert_eq!(LevelBucket::pressure_bracket(84999), "850-750");
        assert_eq!(LevelBucket::pressure_bracket(50000), "650-550");
        assert_eq!(LevelBucket::pressure_bracket(15000), "250-150");
        assert_eq!(LevelBucket::pressure_bracket(10000), "150-0");
        assert_eq!(LevelBucket::pressure_bracket(0), "150-0");
    }

    #[test]
    fn test_channel_bucket_keeps_raw_level() {
        let bucket = LevelBucket::Channel(7);
        assert_eq!(bucket.label(), "7");
    }

    #[test]
    fn test_accumulator_statistics() {
        let mut acc = ErrorAccumulator::default();
        acc.push(1.0);
        acc.push(-1.0);
        acc.push(2.0);
        assert_eq!(acc.n(), 3);
        assert!((acc.bias() - 2.0 / 3.0).abs() < 1e-12);
        assert!((acc.mae() - 4.0 / 3.0).abs() < 1e-12);
        assert!((acc.rmse() - (6.0f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_empty_accumulator_yields_zeros() {
        let acc = ErrorAccumulator::default();
        assert_eq!(acc.n(), 0);
        assert_eq!(acc.bias(), 0.0);
        assert_eq!(acc.mae(), 0.0);
        assert_eq!(acc.rmse(), 0.0);
    }
}
