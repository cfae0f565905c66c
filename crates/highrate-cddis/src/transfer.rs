//! Resilient transfer client
//!
//! Owns the session lifecycle: opened lazily on first use, dropped and
//! reopened after connection-level failures, closed on shutdown. Every
//! operation goes through [`retry_with_backoff`]; "not found" replies are
//! never retried.
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Transferring
//!                      ^                         |
//!                      +---- recoverable --------+--> Connected (ok)
//!                                                +--> Failed (exhausted)
//! ```
//! `Failed` only ends the current item; the next operation reconnects.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use highrate_core::fsutil::remove_if_exists;
use highrate_core::progress::upgrade_to_bar;
use highrate_core::{RetryLog, RetryPolicy, part_path, retry_with_backoff};
use indicatif::ProgressBar;

use crate::error::TransferError;
use crate::layout::RemoteFileRef;
use crate::session::{Connector, Session};

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Transferring,
    Failed,
}

/// Result of a successful fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchReport {
    pub bytes: u64,
    pub retry: RetryLog,
}

/// Counters for the run summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    /// Sessions successfully opened
    pub connects: u32,
    /// Retrieval attempts (each one a network fetch)
    pub retrievals: u32,
    /// Retries across all operations
    pub retries: u32,
    pub bytes: u64,
}

/// Transfer client over any [`Connector`].
pub struct TransferClient<C: Connector> {
    connector: C,
    session: Option<C::Session>,
    state: SessionState,
    policy: RetryPolicy,
    stats: ClientStats,
}

impl<C: Connector> TransferClient<C> {
    pub fn new(connector: C, policy: RetryPolicy) -> Self {
        Self {
            connector,
            session: None,
            state: SessionState::Disconnected,
            policy,
            stats: ClientStats::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> ClientStats {
        self.stats
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Open a session now, retrying per policy.
    ///
    /// No-op if a session is already open.
    pub fn connect(&mut self) -> Result<(), TransferError> {
        if self.session.is_some() {
            return Ok(());
        }
        let policy = self.policy;
        let label = format!("connect {}", self.connector.endpoint());
        let mut retry_log = RetryLog::default();
        let result = retry_with_backoff(&label, &policy, &ProgressBar::hidden(), &mut retry_log, |_| {
            self.open_session()
        });
        self.stats.retries += retry_log.retries();
        if result.is_err() {
            self.state = SessionState::Failed;
        }
        result
    }

    /// Entry names of a remote directory.
    pub fn list(&mut self, dir: &str) -> Result<Vec<String>, TransferError> {
        let policy = self.policy;
        let mut retry_log = RetryLog::default();
        let result = retry_with_backoff(dir, &policy, &ProgressBar::hidden(), &mut retry_log, |_| {
            let outcome = self.session().and_then(|s| s.list(dir));
            self.settle(outcome)
        });
        self.stats.retries += retry_log.retries();
        result
    }

    /// Download `remote` to `dest` with retries.
    ///
    /// Bytes go to `<dest>.part` and are renamed into place only after a
    /// complete transfer, so `dest` is either absent, untouched or complete.
    pub fn fetch(
        &mut self,
        remote: &RemoteFileRef,
        dest: &Path,
        pb: &ProgressBar,
    ) -> Result<FetchReport, TransferError> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(TransferError::Local)?;
        }
        let tmp = part_path(dest);
        let policy = self.policy;
        let label = remote.name.clone();
        let mut retry_log = RetryLog::default();

        let result = retry_with_backoff(&label, &policy, pb, &mut retry_log, |_| {
            let outcome = self.fetch_once(remote, dest, &tmp, pb);
            if outcome.is_err() {
                if let Err(e) = remove_if_exists(&tmp) {
                    log::warn!("Failed to remove partial {}: {e}", tmp.display());
                }
            }
            self.settle(outcome)
        });
        self.stats.retries += retry_log.retries();

        match result {
            Ok(bytes) => {
                self.stats.bytes += bytes;
                Ok(FetchReport { bytes, retry: retry_log })
            }
            Err(e) => {
                if !e.is_not_found() {
                    self.state = SessionState::Failed;
                }
                Err(e)
            }
        }
    }

    /// Close the session, if any.
    pub fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
            log::debug!("Closed session to {}", self.connector.endpoint());
        }
        self.state = SessionState::Disconnected;
    }

    fn fetch_once(
        &mut self,
        remote: &RemoteFileRef,
        dest: &Path,
        tmp: &Path,
        pb: &ProgressBar,
    ) -> Result<u64, TransferError> {
        let session = self.session()?;
        let expected = session.size(remote)?;
        if let Some(total) = expected {
            upgrade_to_bar(pb, total);
        }
        pb.set_position(0);

        self.state = SessionState::Transferring;
        self.stats.retrievals += 1;
        let mut writer = BufWriter::new(File::create(tmp).map_err(TransferError::Local)?);
        let session = self.session()?;
        let received = session.retrieve(remote, &mut writer, pb)?;
        let file = writer
            .into_inner()
            .map_err(|e| TransferError::Local(e.into_error()))?;
        file.sync_all().map_err(TransferError::Local)?;
        drop(file);

        if let Some(expected) = expected {
            if expected != received {
                return Err(TransferError::Truncated { expected, received });
            }
        }
        fs::rename(tmp, dest).map_err(TransferError::Local)?;
        Ok(received)
    }

    /// Current session, opening one (single attempt) if needed.
    fn session(&mut self) -> Result<&mut C::Session, TransferError> {
        if self.session.is_none() {
            self.open_session()?;
        }
        self.session
            .as_mut()
            .ok_or_else(|| TransferError::Connect("session unavailable".to_string()))
    }

    fn open_session(&mut self) -> Result<(), TransferError> {
        self.state = SessionState::Connecting;
        log::debug!("Connecting to {}", self.connector.endpoint());
        match self.connector.connect() {
            Ok(session) => {
                self.session = Some(session);
                self.state = SessionState::Connected;
                self.stats.connects += 1;
                log::debug!("Connected to {}", self.connector.endpoint());
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Disconnected;
                Err(e)
            }
        }
    }

    /// Update lifecycle state after one attempt.
    fn settle<T>(&mut self, outcome: Result<T, TransferError>) -> Result<T, TransferError> {
        match &outcome {
            Ok(_) => self.state = SessionState::Connected,
            Err(e) if e.is_connection_level() => {
                log::debug!("Dropping session after: {e}");
                if let Some(mut session) = self.session.take() {
                    session.close();
                }
                self.state = SessionState::Connecting;
            }
            Err(_) => {
                if self.session.is_some() {
                    self.state = SessionState::Connected;
                }
            }
        }
        outcome
    }
}

impl<C: Connector> Drop for TransferClient<C> {
    fn drop(&mut self) {
        self.close();
    }
}
