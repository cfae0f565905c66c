//! Fetch subcommand - retrieve and post-process high-rate files

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::Cell;
use highrate_cddis::RunSummary;
use highrate_core::SharedProgress;

use super::{RequestArgs, print_summary, table};

#[derive(Args, Debug)]
pub struct FetchArgs {
    #[command(flatten)]
    pub request: RequestArgs,

    /// Remove .crx.gz and .crx once a later stage exists
    #[arg(long)]
    pub cleanup: bool,

    /// CRX2RNX program name or path
    #[arg(long)]
    pub converter: Option<PathBuf>,

    /// Write the run summary as JSON
    #[arg(long)]
    pub report: Option<PathBuf>,
}

pub fn run(args: FetchArgs, mut engine: highrate_cddis::Config, progress: &SharedProgress) -> Result<()> {
    let request = args.request.request()?;

    if let Some(output) = args.request.output {
        engine.output_dir = output;
    }
    if let Some(program) = args.converter {
        engine.converter.program = program;
    }
    if args.cleanup {
        engine.keep_intermediates = false;
    }

    highrate_core::install_signal_handlers().context("Failed to install signal handlers")?;

    log::info!("Fetching high-rate data from {}", engine.archive.host);
    log::info!("  Output: {}", engine.output_dir.display());

    let summary = highrate_cddis::run(&request, &engine, progress)?;

    print_summary(
        "Retrieval",
        &[
            ("Request", summary.request.clone()),
            (
                "Items",
                format!(
                    "{} succeeded, {} skipped, {} failed",
                    summary.counts.succeeded, summary.counts.skipped, summary.counts.failed
                ),
            ),
            ("Retrievals", format!("{} ({} retries)", summary.retrievals, summary.retries)),
            ("Downloaded", format!("{:.1} MB", summary.bytes as f64 / 1_000_000.0)),
            ("Time", format!("{:.1}s", summary.elapsed.as_secs_f64())),
        ],
    );
    print_failures(&summary);

    if let Some(path) = &args.report {
        write_report(&summary, path)?;
        log::info!("Report written to {}", path.display());
    }

    if summary.interrupted {
        anyhow::bail!("Interrupted; re-run the same command to resume");
    }
    if summary.has_failures() {
        anyhow::bail!("{} item(s) failed", summary.counts.failed);
    }
    Ok(())
}

fn print_failures(summary: &RunSummary) {
    if !summary.has_failures() {
        return;
    }
    let mut table = table(&["Station", "DOY", "Hour", "Kind", "Reason"]);
    for outcome in summary.failures() {
        let (kind, message) = outcome
            .error
            .as_ref()
            .map_or(("", ""), |e| (e.kind, e.message.as_str()));
        table.add_row(vec![
            Cell::new(&outcome.station),
            Cell::new(&outcome.day),
            Cell::new(&outcome.hour),
            Cell::new(kind),
            Cell::new(message),
        ]);
    }
    eprintln!("\n{table}");
}

fn write_report(summary: &RunSummary, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create report: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, summary)
        .with_context(|| format!("Failed to write report: {}", path.display()))?;
    writer.flush()?;
    Ok(())
}
