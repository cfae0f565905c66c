//! Batch orchestrator
//!
//! Walks every (station, day, hour) item of a request in order: consult
//! the local state, fetch what is missing, post-process up to the requested
//! stage, record an outcome. Per-item failures never stop the batch; only
//! validation, converter discovery and the first connection are fatal.

use std::collections::BTreeSet;
use std::fs;
use std::time::Instant;

use highrate_core::{ProgressContext, cleanup_part_files, is_shutdown_requested};

use crate::config::Config;
use crate::convert::{Converter, Crx2Rnx};
use crate::error::{ItemError, RunError, TransferError};
use crate::ftp::FtpConnector;
use crate::layout::{COMPRESSED_SUFFIX, LocalLayout, RemoteFileRef, RemoteLayout, basename, group_by_station};
use crate::pipeline::Pipeline;
use crate::request::{RetrievalRequest, Station};
use crate::session::Connector;
use crate::state::{Stage, resolve_existing_stage, satisfies};
use crate::summary::{OutcomeStatus, RunSummary, TransferOutcome};
use crate::transfer::TransferClient;

/// Run a request against the configured archive.
///
/// Locates the converter first when the request asks for conversion.
pub fn run(
    request: &RetrievalRequest,
    config: &Config,
    progress: &ProgressContext,
) -> Result<RunSummary, RunError> {
    let located = if request.convert() {
        Some(Crx2Rnx::locate(&config.converter)?)
    } else {
        None
    };
    let converter = located.as_ref().map(|c| c as &dyn Converter);
    run_with(request, config, FtpConnector::new(&config.archive), converter, progress)
}

/// Run a request over any connector and converter.
pub fn run_with<C: Connector>(
    request: &RetrievalRequest,
    config: &Config,
    connector: C,
    converter: Option<&dyn Converter>,
    progress: &ProgressContext,
) -> Result<RunSummary, RunError> {
    let start = Instant::now();
    if request.convert() && converter.is_none() {
        return Err(RunError::ConverterUnavailable {
            program: config.converter.program.clone(),
            reason: "no converter available".to_string(),
        });
    }

    fs::create_dir_all(&config.output_dir)?;
    match cleanup_part_files(&config.output_dir) {
        Ok(0) => {}
        Ok(n) => log::info!("Removed {n} stale partial files"),
        Err(e) => log::warn!("Stale partial cleanup failed: {e}"),
    }

    log::info!("Request: {request}");
    let mut client = TransferClient::new(connector, config.retry);
    client.connect().map_err(RunError::Connection)?;
    log::info!("Connected to {}", client.connector().endpoint());

    let mut batch = Batch {
        request,
        client,
        remote: RemoteLayout::new(config.archive.remote_root.as_str()),
        local: LocalLayout::new(config.output_dir.as_path()),
        pipeline: Pipeline::new(converter, config.keep_intermediates),
        progress,
        summary: RunSummary::new(request.to_string()),
    };
    batch.run_all();

    let Batch {
        mut client,
        mut summary,
        ..
    } = batch;
    client.close();
    let stats = client.stats();
    summary.bytes = stats.bytes;
    summary.retrievals = stats.retrievals;
    summary.retries = stats.retries;
    summary.elapsed = start.elapsed();
    summary.log();
    Ok(summary)
}

/// Mutable state of one batch
struct Batch<'a, C: Connector> {
    request: &'a RetrievalRequest,
    client: TransferClient<C>,
    remote: RemoteLayout,
    local: LocalLayout,
    pipeline: Pipeline<'a>,
    progress: &'a ProgressContext,
    summary: RunSummary,
}

/// Outcome of one file within an item
struct FileResult {
    /// Stage on disk after processing (`None` if nothing usable)
    stage: Option<Stage>,
    /// Nothing had to be done
    skipped: bool,
    error: Option<ItemError>,
}

impl<C: Connector> Batch<'_, C> {
    fn run_all(&mut self) {
        let request = self.request;
        let slots = self.progress.batch_bar(request.slot_count() as u64);

        'days: for day in request.days() {
            if self.interrupted() {
                break;
            }
            if let Some(date) = request.date_of(&day) {
                slots.set_message(format!("{} (doy {day})", date.format("%Y-%m-%d")));
            }

            let day_dir = self.remote.day_dir(request.year(), &day, request.subfolder());
            let available = self.available_hours(&day_dir);

            for hour in request.hours() {
                if self.interrupted() {
                    break 'days;
                }
                match &available {
                    Ok(hours) if hours.contains(&hour) => self.run_slot(&day, &hour),
                    Ok(_) => {
                        let missing = ItemError::RemoteNotFound(format!("{day_dir}/{hour}"));
                        self.record_failure(&request.station().to_string(), &day, &hour, &missing);
                    }
                    Err(e) => {
                        let error = ItemError::Connection(e.clone());
                        self.record_failure(&request.station().to_string(), &day, &hour, &error);
                    }
                }
                slots.inc(1);
            }
        }
        slots.finish_and_clear();
    }

    /// Hour subfolders present in a remote day directory.
    ///
    /// A missing day directory means no hours; other failures are
    /// reported on every hour of that day.
    fn available_hours(&mut self, day_dir: &str) -> Result<BTreeSet<String>, TransferError> {
        match self.client.list(day_dir) {
            Ok(names) => Ok(names
                .into_iter()
                .filter(|n| n.len() == 2 && n.bytes().all(|b| b.is_ascii_digit()))
                .collect()),
            Err(e) if e.is_not_found() => {
                log::debug!("{day_dir}: no such day directory");
                Ok(BTreeSet::new())
            }
            Err(e) => {
                log::warn!("{day_dir}: listing failed: {e}");
                Err(e)
            }
        }
    }

    /// One remote hour directory: resolve stations and process each.
    fn run_slot(&mut self, day: &str, hour: &str) {
        let request = self.request;
        let hour_dir = self
            .remote
            .hour_dir(request.year(), day, request.subfolder(), hour);
        let station_label = request.station().to_string();

        let names = match self.client.list(&hour_dir) {
            Ok(names) => names,
            Err(e) => {
                self.record_failure(&station_label, day, hour, &ItemError::from(e));
                return;
            }
        };

        let groups = group_by_station(names.iter().map(String::as_str));
        let items: Vec<(String, Vec<String>)> = match request.station() {
            Station::Code(code) => {
                let files: Vec<String> = groups
                    .into_values()
                    .flatten()
                    .filter(|name| request.station().matches_file(name))
                    .collect();
                if files.is_empty() {
                    Vec::new()
                } else {
                    vec![(code.clone(), files)]
                }
            }
            Station::All => groups.into_iter().collect(),
        };

        if items.is_empty() {
            let pattern = format!("{hour_dir}/{}*{COMPRESSED_SUFFIX}", request.station());
            self.record_failure(&station_label, day, hour, &ItemError::RemoteNotFound(pattern));
            return;
        }

        for (station, files) in items {
            if self.interrupted() {
                break;
            }
            let outcome = self.run_item(&station, day, hour, &hour_dir, &files);
            self.record(outcome);
        }
    }

    /// One item: every file of one station in one hour directory.
    fn run_item(
        &mut self,
        station: &str,
        day: &str,
        hour: &str,
        hour_dir: &str,
        files: &[String],
    ) -> TransferOutcome {
        let mut results = Vec::with_capacity(files.len());
        for name in files {
            if self.interrupted() {
                results.push(FileResult {
                    stage: None,
                    skipped: false,
                    error: Some(ItemError::Cancelled),
                });
                break;
            }
            results.push(self.run_file(station, day, hour, &RemoteFileRef::new(hour_dir, name)));
        }

        let stage = results.iter().map(|r| r.stage).min().flatten();
        let skipped = results.iter().all(|r| r.skipped);
        let error = results.into_iter().find_map(|r| r.error);
        if matches!(error, Some(ItemError::Cancelled)) {
            self.summary.interrupted = true;
        }
        let status = match (&error, skipped) {
            (Some(_), _) => OutcomeStatus::Failed,
            (None, true) => OutcomeStatus::Skipped,
            (None, false) => OutcomeStatus::Succeeded,
        };

        TransferOutcome {
            station: station.to_string(),
            day: day.to_string(),
            hour: hour.to_string(),
            files: files.len(),
            stage,
            status,
            error: error.as_ref().map(Into::into),
        }
    }

    /// Guard, fetch, post-process one remote file.
    fn run_file(&mut self, station: &str, day: &str, hour: &str, remote: &RemoteFileRef) -> FileResult {
        let request = self.request;
        let target = request.target_stage();
        let Some(base) = basename(&remote.name) else {
            return FileResult {
                stage: None,
                skipped: false,
                error: Some(ItemError::RemoteNotFound(remote.path())),
            };
        };
        let paths = self.local.paths(station, request.year(), day, hour, base);

        let existing = resolve_existing_stage(&paths);
        if satisfies(existing, target) {
            log::debug!("{}: already {}", remote.name, existing.unwrap_or(target));
            return FileResult {
                stage: existing,
                skipped: true,
                error: None,
            };
        }

        let from = match existing {
            Some(stage) => stage,
            None => {
                let pb = self.progress.transfer_bar(&remote.name);
                let fetched = self.client.fetch(remote, &paths.compressed, &pb);
                pb.finish_and_clear();
                match fetched {
                    Ok(report) => {
                        log::debug!(
                            "{}: {} bytes in {} attempt(s)",
                            remote.name,
                            report.bytes,
                            report.retry.attempts
                        );
                        Stage::Compressed
                    }
                    Err(e) => {
                        return FileResult {
                            stage: None,
                            skipped: false,
                            error: Some(e.into()),
                        };
                    }
                }
            }
        };

        match self.pipeline.advance(&paths, from, target) {
            Ok(stage) => FileResult {
                stage: Some(stage),
                skipped: false,
                error: None,
            },
            Err(e) => FileResult {
                stage: resolve_existing_stage(&paths),
                skipped: false,
                error: Some(e),
            },
        }
    }

    fn record(&mut self, outcome: TransferOutcome) {
        match (&outcome.status, &outcome.error) {
            (OutcomeStatus::Skipped, _) => {
                log::debug!("{}: skipped ({} files present)", outcome.label(), outcome.files);
            }
            (OutcomeStatus::Succeeded, _) => {
                log::info!("{}: {} file(s) ready", outcome.label(), outcome.files);
            }
            (OutcomeStatus::Failed, Some(detail)) => {
                log::warn!("{}: {}", outcome.label(), detail.message);
            }
            (OutcomeStatus::Failed, None) => log::warn!("{}: failed", outcome.label()),
        }
        self.summary.record(outcome);
    }

    fn record_failure(&mut self, station: &str, day: &str, hour: &str, error: &ItemError) {
        if matches!(error, ItemError::Cancelled) {
            self.summary.interrupted = true;
        }
        self.record(TransferOutcome::failed(station, day, hour, error));
    }

    fn interrupted(&mut self) -> bool {
        if is_shutdown_requested() {
            if !self.summary.interrupted {
                log::warn!("Shutdown requested, stopping after the current item");
            }
            self.summary.interrupted = true;
        }
        self.summary.interrupted
    }
}
