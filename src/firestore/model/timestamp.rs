use std::cmp::Ordering;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, FixedOffset, SecondsFormat, TimeZone, Utc};

use crate::firestore::error::{invalid_argument, FirestoreResult};

/// A point in time with nanosecond precision, stored as seconds and nanos since the epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanos: i32,
}

impl Timestamp {
    pub fn new(seconds: i64, nanos: i32) -> Self {
        let mut timestamp = Self { seconds, nanos };
        timestamp.normalize();
        timestamp
    }

    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    pub fn from_millis(millis: i64) -> Self {
        Self::new(
            millis.div_euclid(1_000),
            (millis.rem_euclid(1_000) * 1_000_000) as i32,
        )
    }

    pub fn from_system_time(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(duration) => Self {
                seconds: duration.as_secs() as i64,
                nanos: duration.subsec_nanos() as i32,
            },
            Err(err) => {
                let duration = err.duration();
                Self::new(
                    -(duration.as_secs() as i64),
                    -(duration.subsec_nanos() as i32),
                )
            }
        }
    }

    pub fn to_system_time(&self) -> SystemTime {
        if self.seconds >= 0 {
            UNIX_EPOCH
                + Duration::from_secs(self.seconds as u64)
                + Duration::from_nanos(self.nanos as u64)
        } else {
            UNIX_EPOCH - Duration::from_secs((-self.seconds) as u64)
                + Duration::from_nanos(self.nanos as u64)
        }
    }

    pub fn from_datetime(value: DateTime<Utc>) -> Self {
        Self::new(value.timestamp(), value.timestamp_subsec_nanos() as i32)
    }

    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.seconds, self.nanos as u32).single()
    }

    /// Renders the instant as RFC 3339 in UTC.
    ///
    /// Millisecond precision is used whenever it is lossless
    /// (`2020-01-01T00:00:00.000Z`), nanoseconds otherwise.
    pub fn to_iso_string(&self) -> String {
        let format = if self.nanos % 1_000_000 == 0 {
            SecondsFormat::Millis
        } else {
            SecondsFormat::Nanos
        };
        match self.to_datetime() {
            Some(datetime) => datetime.to_rfc3339_opts(format, true),
            None => format!("{}.{:09}", self.seconds, self.nanos),
        }
    }

    /// Parses an RFC 3339 instant. Years outside `0000..=9999` are accepted in
    /// the signed, expanded form `to_iso_string` writes (`+10000-…`, `-0001-…`).
    pub fn parse_iso(value: &str) -> FirestoreResult<Self> {
        let trimmed = value.trim();
        DateTime::parse_from_rfc3339(trimmed)
            .or_else(|err| parse_expanded_year(trimmed).ok_or(err))
            .map(|parsed| Self::from_datetime(parsed.with_timezone(&Utc)))
            .map_err(|err| invalid_argument(format!("Invalid timestamp `{value}`: {err}")))
    }

    fn normalize(&mut self) {
        let extra_seconds = self.nanos.div_euclid(1_000_000_000);
        self.seconds += extra_seconds as i64;
        self.nanos = self.nanos.rem_euclid(1_000_000_000);
    }
}

fn parse_expanded_year(value: &str) -> Option<DateTime<FixedOffset>> {
    if !value.starts_with(['+', '-']) {
        return None;
    }
    let offset_form = match value.strip_suffix(['Z', 'z']) {
        Some(rest) => format!("{rest}+00:00"),
        None => value.to_string(),
    };
    DateTime::parse_from_str(&offset_form, "%Y-%m-%dT%H:%M:%S%.f%:z").ok()
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.seconds.cmp(&other.seconds) {
            Ordering::Equal => self.nanos.cmp(&other.nanos),
            ordering => ordering,
        }
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self::from_datetime(value)
    }
}
