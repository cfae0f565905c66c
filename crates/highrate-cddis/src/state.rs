//! Local state guard
//!
//! There is no manifest: a non-empty file at a stage path is the durable
//! record that the stage completed. Writers go through `.part` files, so a
//! file at a final path is never a partial write.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::Path;

use highrate_core::is_nonempty_file;
use serde::Serialize;

use crate::layout::{COMPRESSED_SUFFIX, CONVERTED_SUFFIX, DECOMPRESSED_SUFFIX, LocalLayout, LocalPaths};
use crate::request::{RetrievalRequest, Station};

/// Pipeline stage of a local artifact, ordered from least to most processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// `.crx.gz` as fetched
    Compressed,
    /// `.crx` after gunzip
    Decompressed,
    /// `.rnx` after conversion
    Converted,
}

impl Stage {
    /// Most processed first
    pub const DESCENDING: [Stage; 3] = [Self::Converted, Self::Decompressed, Self::Compressed];

    pub fn suffix(self) -> &'static str {
        match self {
            Self::Compressed => COMPRESSED_SUFFIX,
            Self::Decompressed => DECOMPRESSED_SUFFIX,
            Self::Converted => CONVERTED_SUFFIX,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Compressed => "compressed",
            Self::Decompressed => "decompressed",
            Self::Converted => "converted",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Furthest stage already present (non-empty) for one file.
///
/// Checks converted, then decompressed, then compressed.
pub fn resolve_existing_stage(paths: &LocalPaths) -> Option<Stage> {
    Stage::DESCENDING
        .into_iter()
        .find(|&stage| is_nonempty_file(paths.get(stage)))
}

/// True if nothing needs doing for a file to reach `target`.
pub fn satisfies(existing: Option<Stage>, target: Stage) -> bool {
    existing.is_some_and(|stage| stage >= target)
}

/// Furthest stage per basename in a local hour directory, filtered by a
/// name predicate. Reads only the local tree.
pub fn scan_hour_dir(dir: &Path, keep: impl Fn(&str) -> bool) -> io::Result<BTreeMap<String, Stage>> {
    let mut found: BTreeMap<String, Stage> = BTreeMap::new();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(found),
        Err(e) => return Err(e),
    };

    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !keep(&name) || !is_nonempty_file(&entry.path()) {
            continue;
        }
        // Longest suffix first: ".crx.gz" must not be read as ".gz" of ".crx"
        let Some((base, stage)) = [Stage::Compressed, Stage::Decompressed, Stage::Converted]
            .into_iter()
            .find_map(|stage| name.strip_suffix(stage.suffix()).map(|b| (b, stage)))
        else {
            continue;
        };
        if base.is_empty() {
            continue;
        }
        found
            .entry(base.to_string())
            .and_modify(|s| *s = (*s).max(stage))
            .or_insert(stage);
    }
    Ok(found)
}

/// Local progress of one (station, day, hour) directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HourStatus {
    pub station: String,
    pub day: String,
    pub hour: String,
    /// Furthest stage per file basename
    pub files: BTreeMap<String, Stage>,
}

impl HourStatus {
    /// Least-processed stage across files, `None` if the directory is empty
    pub fn stage(&self) -> Option<Stage> {
        self.files.values().copied().min()
    }
}

/// Offline view of what a request already has on disk.
///
/// A concrete station reports every (day, hour), empty ones included; the
/// wildcard reports only directories holding artifacts.
pub fn survey(request: &RetrievalRequest, layout: &LocalLayout) -> io::Result<Vec<HourStatus>> {
    let stations = match request.station() {
        Station::Code(code) => vec![code.clone()],
        Station::All => station_dirs(layout.root())?,
    };
    let keep_empty = matches!(request.station(), Station::Code(_));

    let mut report = Vec::new();
    for station in &stations {
        for day in request.days() {
            for hour in request.hours() {
                let dir = layout.hour_dir(station, request.year(), &day, &hour);
                let files = scan_hour_dir(&dir, |name| request.station().matches_file(name))?;
                if files.is_empty() && !keep_empty {
                    continue;
                }
                report.push(HourStatus {
                    station: station.clone(),
                    day: day.clone(),
                    hour: hour.clone(),
                    files,
                });
            }
        }
    }
    Ok(report)
}

/// Station directories directly under the output root, sorted
fn station_dirs(root: &Path) -> io::Result<Vec<String>> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut stations = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            stations.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    stations.sort();
    Ok(stations)
}
