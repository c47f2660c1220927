use std::path::PathBuf;

use tracing::warn;

use crate::cli::args::{Cli, Commands};
use crate::error::{Result, VerifyError};
use crate::keys::{intersect_key_sets, DateFilter, KeyCollector};
use crate::processors::aggregation_spec::allowed_cycle_hours;
use crate::processors::{AggregationSpecBuilder, MetricsMerger, ParallelAggregator, ParamKind};
use crate::readers::{find_shard_files, partition_by_table};
use crate::utils::constants::MIRROR_DB_FILE;
use crate::utils::progress::ProgressReporter;
use crate::writers::{ParquetWriter, SqliteMirror};

pub async fn run(cli: Cli) -> Result<()> {
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    match cli.command {
        Commands::BuildKeys {
            obstypevar,
            exp,
            round_dec,
            start,
            end,
            out,
            strict_missing,
        } => build_keys(obstypevar, exp, round_dec, start, end, out, strict_missing),

        Commands::Verify {
            exp_name,
            data_root,
            obstypevar,
            parameter,
            out,
            jobs,
            by_lead,
            by_model,
            fcint,
            key_filter,
            round_dec,
            strict_missing,
            compression,
        } => verify(VerifyRun {
            exp_name,
            data_root,
            obstypevar,
            parameter,
            out,
            jobs,
            by_lead,
            by_model,
            fcint,
            key_filter,
            round_dec,
            strict_missing,
            compression,
        }),
    }
}

fn build_keys(
    obstypevar: String,
    exp: Vec<String>,
    round_dec: u32,
    start: Option<i64>,
    end: Option<i64>,
    out: PathBuf,
    strict_missing: bool,
) -> Result<()> {
    if exp.is_empty() {
        return Err(VerifyError::Config(
            "provide at least one --exp NAME DATA_ROOT pair".to_string(),
        ));
    }
    // clap delivers --exp NAME ROOT occurrences as a flat list
    let experiments: Vec<(&str, PathBuf)> = exp
        .chunks_exact(2)
        .map(|pair| (pair[0].as_str(), PathBuf::from(&pair[1])))
        .collect();

    let collector = KeyCollector::new(round_dec)
        .with_date_filter(DateFilter::new(start, end))
        .with_strict(strict_missing);

    let mut key_sets = Vec::with_capacity(experiments.len());
    for (name, root) in &experiments {
        let progress =
            ProgressReporter::new_spinner(&format!("Collecting keys for {}...", name), false);
        let (keys, summary) = collector.collect(name, root, &obstypevar)?;
        progress.finish_with_message(&format!("{}: {} keys", name, keys.len()));
        println!(
            "{}: files used={}, skipped_no_table={}, skipped_bad_columns={}",
            name, summary.files_used, summary.skipped_no_table, summary.skipped_bad_columns
        );
        if summary.files_seen == 0 {
            println!(
                "Warning: no shard files for {} under {}",
                obstypevar,
                root.display()
            );
        }
        key_sets.push(keys);
    }

    let common = intersect_key_sets(key_sets)?;

    if let Some(parent) = out.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let writer = ParquetWriter::new();
    writer.write_keys(&common, &out)?;
    println!("Wrote {} common keys to {}", common.len(), out.display());

    Ok(())
}

struct VerifyRun {
    exp_name: String,
    data_root: PathBuf,
    obstypevar: String,
    parameter: Option<String>,
    out: PathBuf,
    jobs: usize,
    by_lead: bool,
    by_model: bool,
    fcint: Option<u32>,
    key_filter: Option<PathBuf>,
    round_dec: u32,
    strict_missing: bool,
    compression: String,
}

fn verify(run: VerifyRun) -> Result<()> {
    let writer = ParquetWriter::new().with_compression(&run.compression)?;
    let param_kind = ParamKind::from_parameter(run.parameter.as_deref());

    // Reject configuration errors before touching any shard.
    if let Some(fcint) = run.fcint {
        allowed_cycle_hours(fcint)?;
    }

    let mut spec_builder = AggregationSpecBuilder::new(param_kind)
        .by_lead_time(run.by_lead)
        .by_model(run.by_model)
        .cycle_interval(run.fcint)
        .round_decimals(run.round_dec);

    let files = find_shard_files(&run.data_root, &run.obstypevar)?;
    if files.is_empty() {
        println!("No matching shard files found.");
        write_output(&writer, &[], param_kind, &run)?;
        return Ok(());
    }

    let (present, missing) = partition_by_table(&files, &run.obstypevar);
    if !missing.is_empty() {
        println!(
            "{} of {} files missing table '{}':",
            missing.len(),
            files.len(),
            run.obstypevar
        );
        for path in missing.iter().take(8) {
            println!("  MISSING: {}", path.display());
        }
        if missing.len() > 8 {
            println!("  ... ({} more)", missing.len() - 8);
        }
        if run.strict_missing {
            return Err(VerifyError::StrictMissing(format!(
                "{} shard files are missing table '{}'",
                missing.len(),
                run.obstypevar
            )));
        }
    }

    if present.is_empty() {
        println!("All files missing required table; nothing to process.");
        write_output(&writer, &[], param_kind, &run)?;
        return Ok(());
    }

    if let Some(artifact) = &run.key_filter {
        let keys = writer.read_keys(artifact)?;
        println!(
            "Restricting to {} common observations from {}",
            keys.len(),
            artifact.display()
        );
        spec_builder = spec_builder.key_filter(Some(keys));
    }
    let spec = spec_builder.build()?;

    println!(
        "Using {} files with table '{}' (skipped {}).",
        present.len(),
        run.obstypevar,
        missing.len()
    );

    let progress = ProgressReporter::new(present.len() as u64, "Aggregating shards...", false);
    let aggregator = ParallelAggregator::new(run.jobs);
    let partials = aggregator.aggregate(
        &present,
        &run.obstypevar,
        &spec,
        &run.exp_name,
        &run.obstypevar,
        Some(&progress),
    )?;
    progress.finish_with_message("Aggregation complete");

    let rows = MetricsMerger::merge(partials);
    if rows.is_empty() {
        println!("All queries returned empty; writing empty metrics file.");
    }
    write_output(&writer, &rows, param_kind, &run)?;

    Ok(())
}

fn write_output(
    writer: &ParquetWriter,
    rows: &[crate::models::MetricsRow],
    param_kind: ParamKind,
    run: &VerifyRun,
) -> Result<()> {
    if let Some(parent) = run.out.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    writer.write_metrics(rows, param_kind, &run.out)?;
    println!(
        "Verification metrics saved to {} (rows={})",
        run.out.display(),
        rows.len()
    );
    if let Ok(info) = writer.get_file_info(&run.out) {
        println!("\n{}", info.summary());
    }

    if rows.is_empty() {
        return Ok(());
    }

    // Best-effort relational mirror; never fails the run.
    let mirror_path = run
        .out
        .parent()
        .map(|p| p.join(MIRROR_DB_FILE))
        .unwrap_or_else(|| PathBuf::from(MIRROR_DB_FILE));
    let table = format!("{}_{}", run.exp_name, run.obstypevar);
    match SqliteMirror::write(rows, param_kind, &mirror_path, &table) {
        Ok(()) => println!(
            "Metrics also saved to SQLite table '{}' in {}",
            table,
            mirror_path.display()
        ),
        Err(e) => warn!(
            mirror = %mirror_path.display(),
            error = %e,
            "mirror write failed; primary artifact is unaffected"
        ),
    }

    Ok(())
}
