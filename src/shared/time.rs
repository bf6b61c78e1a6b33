use std::ops::{Add, AddAssign, Sub, SubAssign};

use chrono::{Local, NaiveTime, TimeZone, Timelike, Utc};

/// A point in time as whole epoch seconds.
///
/// Reports arrive stamped in epoch seconds, so the core keeps that unit
/// everywhere and only goes through `chrono` for the local-time derived
/// values: the hour-of-day bucket used to key historical series and the
/// start of the local service day used as the trip-origin reference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(i64);

impl From<i64> for Timestamp {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp())
    }

    pub const fn from_epoch(secs: i64) -> Self {
        Self(secs)
    }

    pub const fn as_epoch(&self) -> i64 {
        self.0
    }

    /// Local hour of day, the bucket key for historical series.
    pub fn hour(&self) -> u32 {
        Local
            .timestamp_opt(self.0, 0)
            .single()
            .map(|local| local.hour())
            .unwrap_or(0)
    }

    /// Midnight of the local day this instant falls in.
    pub fn start_of_day(&self) -> Self {
        let Some(local) = Local.timestamp_opt(self.0, 0).single() else {
            return *self;
        };
        let midnight = local.date_naive().and_time(NaiveTime::MIN);
        match midnight.and_local_timezone(Local).earliest() {
            Some(start) => Self(start.timestamp()),
            None => *self,
        }
    }

    pub const fn seconds_since(&self, earlier: Self) -> i64 {
        self.0 - earlier.0
    }

    pub fn minutes_since(&self, earlier: Self) -> f64 {
        self.seconds_since(earlier) as f64 / 60.0
    }
}

impl Add<i64> for Timestamp {
    type Output = Self;

    fn add(self, rhs: i64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<i64> for Timestamp {
    fn add_assign(&mut self, rhs: i64) {
        self.0 += rhs
    }
}

impl Sub<i64> for Timestamp {
    type Output = Self;

    fn sub(self, rhs: i64) -> Self::Output {
        Self(self.0 - rhs)
    }
}

impl SubAssign<i64> for Timestamp {
    fn sub_assign(&mut self, rhs: i64) {
        self.0 -= rhs
    }
}

#[test]
fn seconds_since_test() {
    let a = Timestamp::from_epoch(1000);
    let b = Timestamp::from_epoch(1600);
    assert_eq!(b.seconds_since(a), 600);
    assert_eq!(a.seconds_since(b), -600);
}

#[test]
fn minutes_since_test() {
    let a = Timestamp::from_epoch(1000);
    let b = Timestamp::from_epoch(1090);
    assert_eq!(b.minutes_since(a), 1.5);
}

#[test]
fn add_sub_test() {
    let a = Timestamp::from_epoch(500);
    assert_eq!(a + 100, Timestamp::from_epoch(600));
    assert_eq!(a - 100, Timestamp::from_epoch(400));
}

#[test]
fn ordering_test() {
    assert!(Timestamp::from_epoch(10) < Timestamp::from_epoch(11));
}

#[test]
fn start_of_day_is_at_or_before_test() {
    let now = Timestamp::now();
    let start = now.start_of_day();
    assert!(start <= now);
    assert!(now.seconds_since(start) < 86_400 + 3_600);
}
