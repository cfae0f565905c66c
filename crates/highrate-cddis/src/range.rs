//! Day-of-year and hour range expansion
//!
//! Accepts a single value (`"300"`), an inclusive range (`"300-305"`) or
//! `"all"` / `"*"`, and renders every value zero-padded regardless of how
//! it was typed (`"1"`, `"01"` and `"001"` are the same day).

use std::fmt;
use std::ops::RangeInclusive;

use crate::error::ValidationError;

/// Which calendar field a range applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// Day of year, 1–366, rendered with 3 digits
    Day,
    /// Hour of day, 0–23, rendered with 2 digits
    Hour,
}

impl Field {
    /// Inclusive bounds accepted for this field
    pub const fn bounds(self) -> (u16, u16) {
        match self {
            Self::Day => (1, 366),
            Self::Hour => (0, 23),
        }
    }

    /// Zero-padded width
    pub const fn width(self) -> usize {
        match self {
            Self::Day => 3,
            Self::Hour => 2,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Hour => "hour",
        }
    }

    /// Render a value with this field's padding
    pub fn render(self, value: u16) -> String {
        format!("{value:0width$}", width = self.width())
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Validated inclusive range of day or hour values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueRange {
    field: Field,
    start: u16,
    end: u16,
}

impl ValueRange {
    /// Parse a range spec.
    ///
    /// An empty spec means "all" for hours; days must be given.
    pub fn parse(field: Field, spec: &str) -> Result<Self, ValidationError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return match field {
                Field::Hour => Ok(Self::full(field)),
                Field::Day => Err(ValidationError::new(field.name(), spec, "a value is required")),
            };
        }
        if is_all_keyword(spec) {
            return Ok(Self::full(field));
        }

        let (start, end) = match spec.split_once('-') {
            Some((a, b)) => (parse_token(field, a, spec)?, parse_token(field, b, spec)?),
            None => {
                let v = parse_token(field, spec, spec)?;
                (v, v)
            }
        };
        Self::new(field, start, end)
    }

    /// Range from numeric bounds, validated.
    pub fn new(field: Field, start: u16, end: u16) -> Result<Self, ValidationError> {
        let (min, max) = field.bounds();
        for v in [start, end] {
            if !(min..=max).contains(&v) {
                return Err(ValidationError::new(
                    field.name(),
                    v.to_string(),
                    format!("must be between {} and {}", field.render(min), field.render(max)),
                ));
            }
        }
        if start > end {
            return Err(ValidationError::new(
                field.name(),
                format!("{}-{}", field.render(start), field.render(end)),
                "range start is greater than its end",
            ));
        }
        Ok(Self { field, start, end })
    }

    /// Every value the field allows
    pub fn full(field: Field) -> Self {
        let (start, end) = field.bounds();
        Self { field, start, end }
    }

    /// Same range with the upper end lowered to `max` (e.g. 365 for a
    /// non-leap year). Returns `None` if nothing remains.
    pub fn clamp_end(&self, max: u16) -> Option<Self> {
        let end = self.end.min(max);
        (self.start <= end).then(|| Self { end, ..self.clone() })
    }

    pub fn field(&self) -> Field {
        self.field
    }

    pub fn start(&self) -> u16 {
        self.start
    }

    pub fn end(&self) -> u16 {
        self.end
    }

    pub fn len(&self) -> usize {
        usize::from(self.end - self.start) + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, value: u16) -> bool {
        (self.start..=self.end).contains(&value)
    }

    /// Ascending, zero-padded values. Restartable: each call starts over.
    pub fn iter(&self) -> Values {
        Values {
            field: self.field,
            inner: self.start..=self.end,
        }
    }
}

impl fmt::Display for ValueRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            f.write_str(&self.field.render(self.start))
        } else {
            write!(f, "{}-{}", self.field.render(self.start), self.field.render(self.end))
        }
    }
}

impl<'a> IntoIterator for &'a ValueRange {
    type Item = String;
    type IntoIter = Values;

    fn into_iter(self) -> Values {
        self.iter()
    }
}

/// Lazy iterator over the rendered values of a [`ValueRange`]
#[derive(Debug, Clone)]
pub struct Values {
    field: Field,
    inner: RangeInclusive<u16>,
}

impl Iterator for Values {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.inner.next().map(|v| self.field.render(v))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Values {}

/// True for the `all` / `*` keyword.
pub fn is_all_keyword(spec: &str) -> bool {
    let spec = spec.trim();
    spec == "*" || spec.eq_ignore_ascii_case("all")
}

/// Expand a spec into its ordered, zero-padded values.
pub fn expand(field: Field, spec: &str) -> Result<Vec<String>, ValidationError> {
    Ok(ValueRange::parse(field, spec)?.iter().collect())
}

fn parse_token(field: Field, token: &str, spec: &str) -> Result<u16, ValidationError> {
    let token = token.trim();
    if token.is_empty() || token.len() > 5 || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ValidationError::new(
            field.name(),
            spec,
            "expected a number or a range like 1-5",
        ));
    }
    token
        .parse()
        .map_err(|_| ValidationError::new(field.name(), spec, "number out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_padding_normalized() {
        for spec in ["1", "01", "001"] {
            assert_eq!(expand(Field::Day, spec).unwrap(), vec!["001"]);
        }
    }

    #[test]
    fn hour_padding_normalized() {
        for spec in ["0", "00"] {
            assert_eq!(expand(Field::Hour, spec).unwrap(), vec!["00"]);
        }
    }

    #[test]
    fn day_range_ascending() {
        assert_eq!(
            expand(Field::Day, "001-003").unwrap(),
            vec!["001", "002", "003"]
        );
        assert_eq!(expand(Field::Day, "300-301").unwrap(), vec!["300", "301"]);
    }

    #[test]
    fn reversed_range_rejected() {
        let err = expand(Field::Day, "005-003").unwrap_err();
        assert_eq!(err.field, "day");
        assert!(err.reason.contains("greater"));
    }

    #[test]
    fn out_of_bounds_rejected() {
        assert!(expand(Field::Day, "0").is_err());
        assert!(expand(Field::Day, "367").is_err());
        assert!(expand(Field::Hour, "24").is_err());
        assert!(expand(Field::Hour, "20-24").is_err());
        assert!(expand(Field::Day, "999999").is_err());
    }

    #[test]
    fn non_numeric_rejected() {
        for spec in ["abc", "1-x", "-5", "3-", "1-2-3", "+1", "1.5"] {
            assert!(expand(Field::Day, spec).is_err(), "{spec} should fail");
        }
    }

    #[test]
    fn empty_hour_means_all_day() {
        let hours = expand(Field::Hour, "").unwrap();
        assert_eq!(hours.len(), 24);
        assert_eq!(hours.first().map(String::as_str), Some("00"));
        assert_eq!(hours.last().map(String::as_str), Some("23"));
    }

    #[test]
    fn empty_day_rejected() {
        assert!(expand(Field::Day, "  ").is_err());
    }

    #[test]
    fn all_keyword() {
        assert_eq!(expand(Field::Hour, "ALL").unwrap().len(), 24);
        assert_eq!(expand(Field::Day, "*").unwrap().len(), 366);
    }

    #[test]
    fn whitespace_tolerated() {
        assert_eq!(expand(Field::Hour, " 1 - 2 ").unwrap(), vec!["01", "02"]);
    }

    #[test]
    fn iteration_is_restartable() {
        let range = ValueRange::parse(Field::Hour, "22-23").unwrap();
        let first: Vec<_> = range.iter().collect();
        let second: Vec<_> = (&range).into_iter().collect();
        assert_eq!(first, second);
        assert_eq!(range.iter().len(), 2);
    }

    #[test]
    fn clamp_end_for_short_years() {
        let all = ValueRange::full(Field::Day);
        assert_eq!(all.clamp_end(365).unwrap().len(), 365);
        let tail = ValueRange::parse(Field::Day, "366").unwrap();
        assert!(tail.clamp_end(365).is_none());
    }

    #[test]
    fn display_round_trips_normalized() {
        assert_eq!(ValueRange::parse(Field::Day, "1-3").unwrap().to_string(), "001-003");
        assert_eq!(ValueRange::parse(Field::Hour, "7").unwrap().to_string(), "07");
    }
}
