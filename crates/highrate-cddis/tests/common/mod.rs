//! In-memory archive, fake converter and fixtures shared by the
//! orchestrator tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use flate2::Compression;
use flate2::write::GzEncoder;
use highrate_cddis::{
    Config, Connector, Converter, ItemError, RemoteFileRef, RequestSpec, RetrievalRequest, Session,
    TransferError,
};
use highrate_core::RetryPolicy;
use indicatif::ProgressBar;
use tempfile::TempDir;

pub const ROOT: &str = "/gnss/data/highrate";

#[derive(Default)]
pub struct ArchiveState {
    pub files: BTreeMap<String, Vec<u8>>,
    /// Connection resets injected into the next retrievals
    pub resets: u32,
    pub refuse_connections: bool,
    pub retrievals: u32,
    /// Request a shutdown once this many retrievals have completed
    pub shutdown_after: Option<u32>,
}

/// Shared in-memory archive; clones see the same state
#[derive(Clone, Default)]
pub struct MemoryArchive(pub Rc<RefCell<ArchiveState>>);

impl MemoryArchive {
    pub fn put(&self, path: String, bytes: Vec<u8>) {
        self.0.borrow_mut().files.insert(path, bytes);
    }

    pub fn retrievals(&self) -> u32 {
        self.0.borrow().retrievals
    }
}

pub struct MemorySession(Rc<RefCell<ArchiveState>>);

impl Connector for MemoryArchive {
    type Session = MemorySession;

    fn connect(&self) -> Result<MemorySession, TransferError> {
        if self.0.borrow().refuse_connections {
            return Err(TransferError::Connect("connection refused".to_string()));
        }
        Ok(MemorySession(self.0.clone()))
    }

    fn endpoint(&self) -> String {
        "memory://archive".to_string()
    }
}

impl Session for MemorySession {
    fn list(&mut self, dir: &str) -> Result<Vec<String>, TransferError> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        let names: BTreeSet<String> = self
            .0
            .borrow()
            .files
            .keys()
            .filter_map(|p| p.strip_prefix(&prefix))
            .filter_map(|rest| rest.split('/').next())
            .map(str::to_string)
            .collect();
        if names.is_empty() {
            return Err(TransferError::NotFound(dir.to_string()));
        }
        Ok(names.into_iter().collect())
    }

    fn size(&mut self, remote: &RemoteFileRef) -> Result<Option<u64>, TransferError> {
        self.0
            .borrow()
            .files
            .get(&remote.path())
            .map(|b| Some(b.len() as u64))
            .ok_or_else(|| TransferError::NotFound(remote.path()))
    }

    fn retrieve(
        &mut self,
        remote: &RemoteFileRef,
        sink: &mut dyn Write,
        _pb: &ProgressBar,
    ) -> Result<u64, TransferError> {
        let mut state = self.0.borrow_mut();
        state.retrievals += 1;
        if state.resets > 0 {
            state.resets -= 1;
            return Err(TransferError::Io(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            )));
        }
        let data = state
            .files
            .get(&remote.path())
            .ok_or_else(|| TransferError::NotFound(remote.path()))?;
        sink.write_all(data)?;
        if state.shutdown_after == Some(state.retrievals) {
            highrate_core::request_shutdown();
        }
        Ok(data.len() as u64)
    }
}

/// Prefixes the input with a RINEX-like header line, or fails every call
#[derive(Default)]
pub struct FakeConverter {
    pub calls: RefCell<u32>,
    pub fail: bool,
}

impl FakeConverter {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }
}

impl Converter for FakeConverter {
    fn convert(&self, input: &Path, output: &Path) -> Result<(), ItemError> {
        *self.calls.borrow_mut() += 1;
        if self.fail {
            return Err(ItemError::Conversion("exit status 1".to_string()));
        }
        let mut data = b"RINEX 3.04\n".to_vec();
        data.extend(fs::read(input)?);
        fs::write(output, data)?;
        Ok(())
    }

    fn describe(&self) -> String {
        "fake".to_string()
    }
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

pub fn file_name(station: &str, day: &str, hour: &str) -> String {
    format!("{station}_R_2024{day}{hour}00_01H_01S_MO.crx.gz")
}

pub fn remote_path(station: &str, day: &str, hour: &str) -> String {
    format!("{ROOT}/2024/{day}/24d/{hour}/{}", file_name(station, day, hour))
}

/// Archive holding one file per station for each (day, hour)
pub fn archive(stations: &[&str], slots: &[(&str, &str)]) -> MemoryArchive {
    let archive = MemoryArchive::default();
    for station in stations {
        for (day, hour) in slots {
            let body = format!("{station} {day} {hour} observations\n");
            archive.put(remote_path(station, day, hour), gzip(body.as_bytes()));
        }
    }
    archive
}

pub const FOUR_SLOTS: [(&str, &str); 4] = [("300", "00"), ("300", "01"), ("301", "00"), ("301", "01")];

pub fn config(dir: &TempDir) -> Config {
    Config {
        output_dir: dir.path().join("downloads"),
        retry: RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        },
        ..Default::default()
    }
}

pub fn request(station: &str, extract: bool, convert: bool) -> RetrievalRequest {
    RetrievalRequest::try_from(RequestSpec {
        station: station.to_string(),
        year: 2024,
        days: "300-301".to_string(),
        subfolder: String::new(),
        hours: "00-01".to_string(),
        extract,
        convert,
    })
    .unwrap()
}

pub fn local(config: &Config, station: &str, day: &str, hour: &str, suffix: &str) -> PathBuf {
    let name = file_name(station, day, hour);
    let base = name.strip_suffix(".crx.gz").unwrap();
    config
        .output_dir
        .join(station)
        .join("2024")
        .join(day)
        .join(hour)
        .join(format!("{base}{suffix}"))
}
