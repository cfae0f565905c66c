//! Hatanaka converter capability
//!
//! The pipeline only sees [`Converter`]; [`Crx2Rnx`] runs the external
//! `CRX2RNX` program as a bounded subprocess on the shared runtime.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use highrate_core::SHARED_RUNTIME;
use tokio::process::Command;

use crate::config::ConverterConfig;
use crate::error::{ItemError, RunError};

/// Longest stderr excerpt carried into a conversion error
const STDERR_EXCERPT: usize = 512;

/// Turns one decompressed (`.crx`) file into one converted (`.rnx`) file.
pub trait Converter {
    /// Write the converted form of `input` to `output`.
    ///
    /// `output` is a temporary path; the caller renames it into place.
    fn convert(&self, input: &Path, output: &Path) -> Result<(), ItemError>;

    /// Short description for log lines
    fn describe(&self) -> String;
}

/// The external `CRX2RNX` executable.
#[derive(Debug, Clone)]
pub struct Crx2Rnx {
    program: PathBuf,
    timeout: Duration,
}

impl Crx2Rnx {
    /// Resolve the configured program (explicit path or `PATH` lookup).
    ///
    /// Called once before the batch touches the network.
    pub fn locate(config: &ConverterConfig) -> Result<Self, RunError> {
        let program = which::which(&config.program).map_err(|e| RunError::ConverterUnavailable {
            program: config.program.clone(),
            reason: e.to_string(),
        })?;
        log::debug!("Using converter {}", program.display());
        Ok(Self {
            program,
            timeout: config.timeout,
        })
    }
}

impl Converter for Crx2Rnx {
    fn convert(&self, input: &Path, output: &Path) -> Result<(), ItemError> {
        let stdout = File::create(output)?;
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        // `-` sends the result to stdout, which lands in `output`
        let mut cmd = Command::new(&self.program);
        cmd.arg(input)
            .arg("-")
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let timeout = self.timeout;
        let result = SHARED_RUNTIME.handle().block_on(async {
            let child = cmd.spawn()?;
            match tokio::time::timeout(timeout, child.wait_with_output()).await {
                Ok(output) => output.map(Some),
                // Dropping the future kills the child
                Err(_) => Ok(None),
            }
        });

        match result {
            Ok(Some(out)) if out.status.success() => Ok(()),
            Ok(Some(out)) => Err(ItemError::Conversion(format!(
                "{name}: {} exited with {}{}",
                self.program.display(),
                out.status,
                stderr_excerpt(&out.stderr)
            ))),
            Ok(None) => Err(ItemError::Conversion(format!(
                "{name}: timed out after {}s",
                timeout.as_secs_f64()
            ))),
            Err(e) => Err(ItemError::Conversion(format!(
                "{name}: cannot run {}: {e}",
                self.program.display()
            ))),
        }
    }

    fn describe(&self) -> String {
        self.program.display().to_string()
    }
}

fn stderr_excerpt(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.is_empty() {
        return String::new();
    }
    let cut = text
        .char_indices()
        .nth(STDERR_EXCERPT)
        .map_or(text.len(), |(i, _)| i);
    format!(": {}", &text[..cut])
}
