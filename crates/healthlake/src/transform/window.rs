//! Incremental window filtering and zone-aware date derivation
//!
//! All calendar dates in the pipeline are derived the same way: convert the
//! instant to the configured zone first, then truncate to a date.

use chrono::{DateTime, Days, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::debug;

use crate::error::{HealthlakeError, Result};

use super::report::QualityReport;

/// Resolve an IANA zone name, failing on anything unknown
pub fn resolve_zone(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| HealthlakeError::TimeZone(name.to_string()))
}

/// Calendar day of `instant` as observed in `zone`
pub fn local_date<Z: TimeZone>(instant: DateTime<Z>, zone: Tz) -> NaiveDate {
    instant.with_timezone(&zone).date_naive()
}

/// Parse an export timestamp into a calendar day in `zone`.
///
/// Accepts `2025-03-12 00:00:00 +1100`, RFC 3339, or a bare `YYYY-MM-DD`
/// (already a calendar day, taken as-is).
pub fn parse_local_date(s: &str, zone: Tz) -> Result<NaiveDate> {
    let s = s.trim();
    if let Ok(ts) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S %z") {
        return Ok(local_date(ts, zone));
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(local_date(ts, zone));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| HealthlakeError::InvalidDateFormat(s.to_string()))
}

/// Longest lookback accepted from configuration or the command line
pub const MAX_LOOKBACK_DAYS: u32 = 36_500;

/// Trailing lookback window anchored on "now" in a fixed zone.
///
/// The lower bound is inclusive: a record dated exactly at the cutoff is
/// kept, one day earlier is excluded. There is no upper bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncrementalWindow {
    lookback_days: u32,
    zone: Tz,
}

impl IncrementalWindow {
    /// Build a window for a named zone. An unknown zone is an error, so a
    /// batch can never be filtered against a guessed zone.
    pub fn new(lookback_days: u32, zone: &str) -> Result<Self> {
        Ok(Self::with_zone(lookback_days, resolve_zone(zone)?))
    }

    pub fn with_zone(lookback_days: u32, zone: Tz) -> Self {
        Self {
            lookback_days,
            zone,
        }
    }

    pub fn lookback_days(&self) -> u32 {
        self.lookback_days
    }

    pub fn zone(&self) -> Tz {
        self.zone
    }

    /// Today in the window's zone
    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        local_date(now, self.zone)
    }

    /// `today - lookback_days`, saturating at the earliest representable
    /// date so an oversized lookback keeps everything
    pub fn cutoff(&self, now: DateTime<Utc>) -> NaiveDate {
        self.today(now)
            .checked_sub_days(Days::new(u64::from(self.lookback_days)))
            .unwrap_or(NaiveDate::MIN)
    }

    pub fn contains(&self, now: DateTime<Utc>, date: NaiveDate) -> bool {
        date >= self.cutoff(now)
    }

    /// Keep the records dated on or after the cutoff; excluded records are
    /// counted as `outside_window`.
    pub fn filter<T, F>(
        &self,
        now: DateTime<Utc>,
        records: Vec<T>,
        date_of: F,
        report: &mut QualityReport,
    ) -> Vec<T>
    where
        F: Fn(&T) -> NaiveDate,
    {
        let cutoff = self.cutoff(now);
        let before = records.len();
        let kept: Vec<T> = records.into_iter().filter(|r| date_of(r) >= cutoff).collect();
        let excluded = before - kept.len();
        report.outside_window += excluded;
        debug!(%cutoff, kept = kept.len(), excluded, "Applied incremental window");
        kept
    }
}
