//! highrate - Batch retrieval of high-rate GNSS observation files
//!
//! Downloads `.crx.gz` files from the CDDIS archive for a station, year,
//! day-of-year and hour range, and optionally turns them into `.crx` and
//! `.rnx` files.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use comfy_table::Cell;

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "highrate")]
#[command(about = "Batch retrieval of high-rate GNSS observation files")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file path (default: ./highrate.toml or ~/.config/highrate/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Network timeout in seconds for every FTP operation
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Maximum retry attempts for transient failures
    #[arg(long, global = true)]
    max_retries: Option<u32>,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch files and post-process them
    Fetch(cmd::fetch::FetchArgs),
    /// Show what is already on disk for a request (offline)
    Status(cmd::status::StatusArgs),
    /// Show current configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(highrate_core::ProgressContext::new());

    // Logging:
    //   TTY:     quiet (warn) unless --debug, progress bars show activity
    //   non-TTY: info unless --debug/--quiet, logs are the only progress indicator
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = cli.quiet || (is_tty && !cli.debug);
    highrate_core::init_logging(quiet, cli.debug, multi);

    let config = if let Some(path) = &cli.config {
        Config::from_file(path)?
    } else {
        Config::load()?
    };

    // Config file values, CLI overrides
    let mut engine = config.engine();
    if let Some(secs) = cli.timeout {
        engine.archive.timeout = Duration::from_secs(secs);
    }
    if let Some(max_retries) = cli.max_retries {
        engine.retry.max_retries = max_retries;
    }

    match cli.command {
        Command::Fetch(args) => cmd::fetch::run(args, engine, &progress),
        Command::Status(args) => cmd::status::run(args, &engine),
        Command::Config => {
            let mut table = cmd::table(&["Setting", "Value"]);
            let scheme = if engine.archive.tls { "ftps" } else { "ftp" };
            let rows = [
                ("Output directory", engine.output_dir.display().to_string()),
                ("Keep intermediates", engine.keep_intermediates.to_string()),
                (
                    "Archive",
                    format!("{scheme}://{}:{}", engine.archive.host, engine.archive.port),
                ),
                ("Remote root", engine.archive.remote_root.clone()),
                ("User", engine.archive.user.clone()),
                ("Timeout", format!("{}s", engine.archive.timeout.as_secs())),
                ("Max retries", engine.retry.max_retries.to_string()),
                (
                    "Backoff",
                    format!(
                        "{}s doubling, max {}s",
                        engine.retry.base_delay.as_secs(),
                        engine.retry.max_delay.as_secs()
                    ),
                ),
                ("Converter", engine.converter.program.display().to_string()),
                (
                    "Converter timeout",
                    format!("{}s", engine.converter.timeout.as_secs()),
                ),
            ];
            for (label, value) in rows {
                table.add_row(vec![Cell::new(label), Cell::new(value)]);
            }

            eprintln!("\n{table}");
            Ok(())
        }
    }
}
