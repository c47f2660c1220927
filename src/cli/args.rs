use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

use crate::utils::constants::DEFAULT_ROUND_DECIMALS;

#[derive(Parser)]
#[command(name = "nwp-verifier")]
#[command(about = "Parallel forecast-verification metrics engine for sharded observation archives")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the common observation-key artifact across experiments
    BuildKeys {
        #[arg(long, help = "Observation type variable (shard table name)")]
        obstypevar: String,

        #[arg(
            long,
            num_args = 2,
            value_names = ["NAME", "DATA_ROOT"],
            action = ArgAction::Append,
            help = "Experiment name and data root; repeat for each experiment"
        )]
        exp: Vec<String>,

        #[arg(
            long,
            default_value_t = DEFAULT_ROUND_DECIMALS,
            help = "Coordinate rounding decimals (must match later filtered runs)"
        )]
        round_dec: u32,

        #[arg(long, help = "Inclusive start bound on valid time (YYYYMMDDHH)")]
        start: Option<i64>,

        #[arg(long, help = "Inclusive end bound on valid time (YYYYMMDDHH)")]
        end: Option<i64>,

        #[arg(short, long, help = "Output Parquet key artifact")]
        out: PathBuf,

        #[arg(
            long,
            default_value = "false",
            help = "Abort if any shard lacks the requested table or required columns"
        )]
        strict_missing: bool,
    },

    /// Compute grouped verification metrics for one experiment
    Verify {
        #[arg(long, help = "Experiment name")]
        exp_name: String,

        #[arg(long, help = "Root directory of the experiment's shards")]
        data_root: PathBuf,

        #[arg(long, help = "Observation type variable (shard table name)")]
        obstypevar: String,

        #[arg(
            long,
            help = "Parameter kind ('tb' groups by channel instead of pressure bracket)"
        )]
        parameter: Option<String>,

        #[arg(short, long, help = "Output Parquet metrics file")]
        out: PathBuf,

        #[arg(long, default_value_t = num_cpus::get(), help = "Worker pool size")]
        jobs: usize,

        #[arg(long, default_value = "false", help = "Group by lead time")]
        by_lead: bool,

        #[arg(long, default_value = "false", help = "Group by forecast model")]
        by_model: bool,

        #[arg(
            long,
            help = "Forecast cycle interval in hours (e.g. 12 for 00Z/12Z); must divide 24"
        )]
        fcint: Option<u32>,

        #[arg(
            long,
            help = "Parquet artifact of common observation keys to restrict against"
        )]
        key_filter: Option<PathBuf>,

        #[arg(
            long,
            default_value_t = DEFAULT_ROUND_DECIMALS,
            help = "Coordinate rounding decimals (must match the key artifact)"
        )]
        round_dec: u32,

        #[arg(
            long,
            default_value = "false",
            help = "Abort if any shard lacks the requested table"
        )]
        strict_missing: bool,

        #[arg(short, long, default_value = "snappy")]
        compression: String,
    },
}
