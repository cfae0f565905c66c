//! Per-item outcomes and the batch summary

use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::error::ItemError;
use crate::state::Stage;

/// What happened to one (station, day, hour) item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    /// Every file already satisfied the requested stage
    Skipped,
    Succeeded,
    Failed,
}

/// Why an item failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureDetail {
    /// Stable label, see [`ItemError::kind`]
    pub kind: &'static str,
    pub message: String,
}

impl From<&ItemError> for FailureDetail {
    fn from(e: &ItemError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferOutcome {
    pub station: String,
    pub day: String,
    pub hour: String,
    /// Remote files the item covered
    pub files: usize,
    /// Least-processed stage across the item's files, `None` if any file
    /// has no local artifact
    pub stage: Option<Stage>,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureDetail>,
}

impl TransferOutcome {
    pub fn failed(station: &str, day: &str, hour: &str, error: &ItemError) -> Self {
        Self {
            station: station.to_string(),
            day: day.to_string(),
            hour: hour.to_string(),
            files: 0,
            stage: None,
            status: OutcomeStatus::Failed,
            error: Some(error.into()),
        }
    }

    /// `station/day/hour` for log lines
    pub fn label(&self) -> String {
        format!("{}/{}/{}", self.station, self.day, self.hour)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub skipped: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl OutcomeCounts {
    pub fn total(&self) -> usize {
        self.skipped + self.succeeded + self.failed
    }
}

/// Aggregate result of one batch, returned to the front-end.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Normalized request, as displayed
    pub request: String,
    pub counts: OutcomeCounts,
    pub outcomes: Vec<TransferOutcome>,
    /// Bytes retrieved from the archive
    pub bytes: u64,
    /// Network retrieval attempts (zero on an idempotent re-run)
    pub retrievals: u32,
    /// Retries across connects, listings and retrievals
    pub retries: u32,
    #[serde(rename = "elapsed_secs", serialize_with = "as_secs")]
    pub elapsed: Duration,
    /// Stopped early by a shutdown request
    pub interrupted: bool,
}

impl RunSummary {
    pub fn new(request: String) -> Self {
        Self {
            request,
            counts: OutcomeCounts::default(),
            outcomes: Vec::new(),
            bytes: 0,
            retrievals: 0,
            retries: 0,
            elapsed: Duration::ZERO,
            interrupted: false,
        }
    }

    /// Append an outcome and update the counts.
    pub fn record(&mut self, outcome: TransferOutcome) {
        match outcome.status {
            OutcomeStatus::Skipped => self.counts.skipped += 1,
            OutcomeStatus::Succeeded => self.counts.succeeded += 1,
            OutcomeStatus::Failed => self.counts.failed += 1,
        }
        self.outcomes.push(outcome);
    }

    pub fn failures(&self) -> impl Iterator<Item = &TransferOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::Failed)
    }

    pub fn has_failures(&self) -> bool {
        self.counts.failed > 0
    }

    pub fn log(&self) {
        log::info!("=== Retrieval Summary ===");
        log::info!("Request: {}", self.request);
        log::info!(
            "Items: {} total, {} succeeded, {} skipped, {} failed",
            self.counts.total(),
            self.counts.succeeded,
            self.counts.skipped,
            self.counts.failed
        );
        log::info!(
            "Transfers: {} retrievals, {} retries, {:.1} MB",
            self.retrievals,
            self.retries,
            self.bytes as f64 / 1_000_000.0
        );
        log::info!("Time: {:.1}s", self.elapsed.as_secs_f64());
        for failure in self.failures() {
            if let Some(detail) = &failure.error {
                log::info!("  {} [{}] {}", failure.label(), detail.kind, detail.message);
            }
        }
        if self.interrupted {
            log::warn!("Run interrupted; re-run the same request to resume");
        }
    }
}

fn as_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}
