//! Retrieval request: the engine's entry contract
//!
//! A front-end fills a [`RequestSpec`] with raw user input; converting it
//! into a [`RetrievalRequest`] validates every field before any network
//! work happens.

use std::fmt;

use chrono::{Datelike, NaiveDate};

use crate::error::ValidationError;
use crate::layout::{is_station_id, station_of};
use crate::range::{Field, ValueRange, is_all_keyword};
use crate::state::Stage;

/// Oldest year the high-rate archive can hold
const MIN_YEAR: i32 = 1980;
const MAX_YEAR: i32 = 2100;

/// Station selection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Station {
    /// One station, upper-case long name (e.g. `BRST00FRA`)
    Code(String),
    /// Every station present in each remote hour directory
    All,
}

impl Station {
    /// Parse a nine-character station name; empty, `*` or `all` select every
    /// station.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let input = input.trim();
        if input.is_empty() || input == "*" || input.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        if !is_station_id(input) {
            return Err(ValidationError::new(
                "station",
                input,
                "expected a 9-character station name (e.g. BRST00FRA)",
            ));
        }
        Ok(Self::Code(input.to_ascii_uppercase()))
    }

    /// True if a remote file name belongs to this selection.
    ///
    /// A concrete station matches the file's whole station name, the part
    /// before the first `_`.
    pub fn matches_file(&self, file_name: &str) -> bool {
        match self {
            Self::All => true,
            Self::Code(code) => station_of(file_name).as_deref() == Some(code.as_str()),
        }
    }
}

impl fmt::Display for Station {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => f.write_str(code),
            Self::All => f.write_str("*"),
        }
    }
}

/// Raw, unvalidated request fields as a front-end collects them.
#[derive(Debug, Clone, Default)]
pub struct RequestSpec {
    /// Station code; empty for all stations
    pub station: String,
    pub year: i32,
    /// Day-of-year spec: `300`, `300-305` or `all`
    pub days: String,
    /// Remote subfolder (e.g. `24d`); empty derives it from the year
    pub subfolder: String,
    /// Hour spec: `00`, `00-05`; empty for all hours
    pub hours: String,
    pub extract: bool,
    pub convert: bool,
}

/// Validated retrieval request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalRequest {
    station: Station,
    year: i32,
    days: ValueRange,
    subfolder: String,
    hours: ValueRange,
    extract: bool,
    convert: bool,
}

impl TryFrom<RequestSpec> for RetrievalRequest {
    type Error = ValidationError;

    fn try_from(spec: RequestSpec) -> Result<Self, ValidationError> {
        let station = Station::parse(&spec.station)?;
        let year = validate_year(spec.year)?;

        let days = ValueRange::parse(Field::Day, &spec.days)?;
        // "all" covers the days this year actually has
        let days = if is_all_keyword(&spec.days) {
            days.clamp_end(days_in_year(year)).unwrap_or(days)
        } else {
            days
        };

        let hours = ValueRange::parse(Field::Hour, &spec.hours)?;
        let subfolder = validate_subfolder(&spec.subfolder, year)?;

        Ok(Self {
            station,
            year,
            days,
            subfolder,
            hours,
            extract: spec.extract || spec.convert,
            convert: spec.convert,
        })
    }
}

impl RetrievalRequest {
    pub fn station(&self) -> &Station {
        &self.station
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn days(&self) -> &ValueRange {
        &self.days
    }

    pub fn subfolder(&self) -> &str {
        &self.subfolder
    }

    pub fn hours(&self) -> &ValueRange {
        &self.hours
    }

    /// Decompress fetched archives (always true when converting)
    pub fn extract(&self) -> bool {
        self.extract
    }

    pub fn convert(&self) -> bool {
        self.convert
    }

    /// Furthest pipeline stage this request asks for.
    pub fn target_stage(&self) -> Stage {
        if self.convert {
            Stage::Converted
        } else if self.extract {
            Stage::Decompressed
        } else {
            Stage::Compressed
        }
    }

    /// Number of (day, hour) pairs, before station resolution.
    pub fn slot_count(&self) -> usize {
        self.days.len() * self.hours.len()
    }

    /// Calendar date of a day-of-year, for log lines.
    pub fn date_of(&self, day: &str) -> Option<NaiveDate> {
        let doy: u32 = day.parse().ok()?;
        NaiveDate::from_yo_opt(self.year, doy)
    }
}

impl fmt::Display for RetrievalRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "station={} year={} doy={} subfolder={} hour={} target={}",
            self.station,
            self.year,
            self.days,
            self.subfolder,
            self.hours,
            self.target_stage()
        )
    }
}

fn validate_year(year: i32) -> Result<i32, ValidationError> {
    if (MIN_YEAR..=MAX_YEAR).contains(&year) {
        Ok(year)
    } else {
        Err(ValidationError::new(
            "year",
            year.to_string(),
            format!("must be between {MIN_YEAR} and {MAX_YEAR}"),
        ))
    }
}

fn days_in_year(year: i32) -> u16 {
    match NaiveDate::from_ymd_opt(year, 12, 31) {
        Some(last) => last.ordinal() as u16,
        None => 365,
    }
}

fn validate_subfolder(input: &str, year: i32) -> Result<String, ValidationError> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(format!("{:02}d", year.rem_euclid(100)));
    }
    if input.contains(['/', '\\']) || input.contains("..") {
        return Err(ValidationError::new(
            "subfolder",
            input,
            "must be a single directory name (e.g. 24d)",
        ));
    }
    Ok(input.to_string())
}
