//! Remote and local path construction
//!
//! Pure functions only: the state guard, the transfer client and the
//! pipeline all derive artifact locations from here, so identical inputs
//! must always produce identical paths.
//!
//! Remote: `<root>/<year>/<doy>/<subfolder>/<hour>/<name>.crx.gz`
//! Local:  `<root>/<station>/<year>/<doy>/<hour>/<name>.{crx.gz,crx,rnx}`

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::state::Stage;

/// Suffix of Hatanaka-compressed, gzipped observation files
pub const COMPRESSED_SUFFIX: &str = ".crx.gz";
/// Suffix after gunzip (still Hatanaka-compressed)
pub const DECOMPRESSED_SUFFIX: &str = ".crx";
/// Suffix after conversion to plain RINEX
pub const CONVERTED_SUFFIX: &str = ".rnx";

/// Length of a long station name: marker, monument, receiver, country
pub const STATION_ID_LEN: usize = 9;

/// One remote file: directory plus file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteFileRef {
    pub dir: String,
    pub name: String,
}

impl RemoteFileRef {
    pub fn new(dir: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            name: name.into(),
        }
    }

    /// Full remote path
    pub fn path(&self) -> String {
        format!("{}/{}", self.dir.trim_end_matches('/'), self.name)
    }
}

impl fmt::Display for RemoteFileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Remote archive directory convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLayout {
    root: String,
}

impl RemoteLayout {
    pub fn new(root: impl Into<String>) -> Self {
        let root = root.into();
        let trimmed = root.trim_end_matches('/');
        Self {
            root: if trimmed.is_empty() { "/".to_string() } else { trimmed.to_string() },
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Directory holding the hour subfolders of one day
    pub fn day_dir(&self, year: i32, day: &str, subfolder: &str) -> String {
        format!("{}/{year}/{day}/{subfolder}", self.root.trim_end_matches('/'))
    }

    /// Directory holding the files of one hour
    pub fn hour_dir(&self, year: i32, day: &str, subfolder: &str, hour: &str) -> String {
        format!("{}/{hour}", self.day_dir(year, day, subfolder))
    }
}

/// Local output paths of one file at every pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalPaths {
    pub compressed: PathBuf,
    pub decompressed: PathBuf,
    pub converted: PathBuf,
}

impl LocalPaths {
    pub fn get(&self, stage: Stage) -> &Path {
        match stage {
            Stage::Compressed => &self.compressed,
            Stage::Decompressed => &self.decompressed,
            Stage::Converted => &self.converted,
        }
    }

    /// Directory all stages share
    pub fn dir(&self) -> &Path {
        self.compressed.parent().unwrap_or(Path::new("."))
    }
}

/// Local output tree convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalLayout {
    root: PathBuf,
}

impl LocalLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<station>/<year>/<doy>/<hour>`
    pub fn hour_dir(&self, station: &str, year: i32, day: &str, hour: &str) -> PathBuf {
        self.root
            .join(station)
            .join(year.to_string())
            .join(day)
            .join(hour)
    }

    /// Stage paths for the file `<basename>.crx.gz`
    pub fn paths(&self, station: &str, year: i32, day: &str, hour: &str, basename: &str) -> LocalPaths {
        let dir = self.hour_dir(station, year, day, hour);
        LocalPaths {
            compressed: dir.join(format!("{basename}{COMPRESSED_SUFFIX}")),
            decompressed: dir.join(format!("{basename}{DECOMPRESSED_SUFFIX}")),
            converted: dir.join(format!("{basename}{CONVERTED_SUFFIX}")),
        }
    }
}

/// `BRST00FRA_R_..._MO.crx.gz` → `BRST00FRA_R_..._MO`
pub fn basename(file_name: &str) -> Option<&str> {
    file_name
        .strip_suffix(COMPRESSED_SUFFIX)
        .filter(|b| !b.is_empty())
}

/// True for a nine-character alphanumeric station name (`BRST00FRA`).
pub fn is_station_id(id: &str) -> bool {
    id.len() == STATION_ID_LEN && id.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Station identifier of a file: the name up to the first `_`, upper-cased.
///
/// `None` unless that prefix is a valid station name; it becomes a local
/// directory name.
pub fn station_of(file_name: &str) -> Option<String> {
    let stem = basename(file_name).unwrap_or(file_name);
    let id = stem.split('_').next().unwrap_or(stem);
    is_station_id(id).then(|| id.to_ascii_uppercase())
}

/// Group compressed observation files of a listing by station.
///
/// Names that are not `.crx.gz` files, or carry no valid station name, are
/// ignored; each group is sorted.
pub fn group_by_station<'a>(names: impl IntoIterator<Item = &'a str>) -> BTreeMap<String, Vec<String>> {
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for name in names {
        let name = name.rsplit('/').next().unwrap_or(name);
        if basename(name).is_none() {
            continue;
        }
        match station_of(name) {
            Some(station) => groups.entry(station).or_default().push(name.to_string()),
            None => log::debug!("Ignoring {name}: no station name"),
        }
    }
    for files in groups.values_mut() {
        files.sort();
        files.dedup();
    }
    groups
}
