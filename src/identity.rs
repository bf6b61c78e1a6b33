use std::sync::Arc;

use thiserror::Error;

use crate::shared::time::Timestamp;

/// Seconds of tolerated clock skew before a future trip origin is read as
/// a trip that started on the previous service day.
const DAY_ROLLOVER_SLACK: i64 = 3_600;

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("trip id {0:?} is missing its line field")]
    MissingLine(String),
    #[error("trip id {0:?} is missing its direction field")]
    MissingDirection(String),
    #[error("trip id {0:?} has a non-numeric origin offset")]
    BadOriginOffset(String),
}

/// A (line, direction) pair, the unit the system is filtered and
/// aggregated by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Service {
    pub line: char,
    pub direction: char,
}

impl Service {
    pub const fn new(line: char, direction: char) -> Self {
        Self { line, direction }
    }

    /// Pulls line and direction out of a raw trip id.
    ///
    /// The wire format is fixed: the line is the first character of the
    /// second `_`-separated field, the direction the first character of
    /// the last `.`-separated field.
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        let line = raw
            .split('_')
            .nth(1)
            .and_then(|field| field.chars().next())
            .ok_or_else(|| ParseError::MissingLine(raw.to_string()))?;
        let direction = raw
            .split('.')
            .next_back()
            .and_then(|field| field.chars().next())
            .ok_or_else(|| ParseError::MissingDirection(raw.to_string()))?;
        Ok(Self { line, direction })
    }
}

/// A fully parsed trip identifier.
///
/// The raw id stays around as the registry key; the structured fields are
/// extracted once here and never re-parsed downstream.
#[derive(Debug, Clone)]
pub struct TripId {
    raw: Arc<str>,
    pub service: Service,
    /// The leading numeric field: minutes since the service-day reference,
    /// scaled by 1/0.6.
    minutes: f64,
}

impl TripId {
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        let service = Service::parse(raw)?;
        let minutes = raw
            .split('_')
            .next()
            .unwrap_or_default()
            .parse::<f64>()
            .map_err(|_| ParseError::BadOriginOffset(raw.to_string()))?;
        Ok(Self {
            raw: raw.into(),
            service,
            minutes,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn raw_arc(&self) -> Arc<str> {
        self.raw.clone()
    }

    /// When this trip nominally left its origin terminal.
    ///
    /// The embedded offset counts from local midnight of the day the report
    /// was made. Trips published shortly before departure can appear to
    /// start in the future; anything more than [`DAY_ROLLOVER_SLACK`] ahead
    /// belongs to the previous service day instead.
    pub fn trip_origin(&self, reported_at: Timestamp) -> Timestamp {
        let reference = reported_at.start_of_day();
        let origin = reference + (0.6 * self.minutes).round() as i64;
        if reported_at.seconds_since(origin) < -DAY_ROLLOVER_SLACK {
            origin - SECONDS_PER_DAY
        } else {
            origin
        }
    }
}

#[test]
fn parse_example_id_test() {
    let trip = TripId::parse("0090_1.TRIP123.N").unwrap();
    assert_eq!(trip.service, Service::new('1', 'N'));
    assert_eq!(trip.raw(), "0090_1.TRIP123.N");
    assert_eq!(trip.minutes, 90.0);
}

#[test]
fn parse_keeps_whole_id_when_undotted_test() {
    // No `.` in the id: the whole string is the last field, so the
    // direction falls back to its first character.
    let service = Service::parse("0090_1N").unwrap();
    assert_eq!(service.direction, '0');
}

#[test]
fn parse_missing_line_test() {
    assert!(matches!(
        Service::parse("0090"),
        Err(ParseError::MissingLine(_))
    ));
}

#[test]
fn parse_bad_offset_test() {
    assert!(matches!(
        TripId::parse("abc_1.TRIP.N"),
        Err(ParseError::BadOriginOffset(_))
    ));
}
