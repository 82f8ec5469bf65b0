//! Cardio activity payloads (Strava export)
//!
//! Field names follow the Strava activity API, so landed payloads
//! deserialize without renaming.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::transform::window::local_date;

use super::RawRecord;

/// Activity summary as landed from the athlete activities endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Unique activity identifier
    pub id: u64,

    /// Sport type (e.g., "Run", "Ride", "Walk")
    #[serde(default)]
    pub sport_type: Option<String>,

    /// Start instant in UTC
    pub start_date: DateTime<Utc>,

    /// Distance in meters
    #[serde(default)]
    pub distance: Option<f64>,

    /// Moving time in seconds
    #[serde(default)]
    pub moving_time: Option<f64>,

    /// Total elevation gain in meters
    #[serde(default)]
    pub total_elevation_gain: Option<f64>,

    /// Average heart rate in bpm
    #[serde(default)]
    pub average_heartrate: Option<f64>,
}

impl Activity {
    pub fn from_record(record: &RawRecord) -> Result<Self> {
        Ok(serde_json::from_value(record.payload.clone())?)
    }

    /// Calendar day of the activity start in the given zone
    pub fn local_date(&self, zone: Tz) -> NaiveDate {
        local_date(self.start_date, zone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NaturalKey;

    #[test]
    fn test_activity_from_record() {
        let payload = serde_json::json!({
            "id": 1234,
            "name": "Morning Run",
            "sport_type": "Run",
            "start_date": "2024-03-01T20:30:00Z",
            "distance": 5012.3,
            "moving_time": 1500
        });
        let record = RawRecord::new(NaturalKey::new(["1234"]), payload);
        let activity = Activity::from_record(&record).unwrap();

        assert_eq!(activity.id, 1234);
        assert_eq!(activity.distance, Some(5012.3));
        assert_eq!(activity.total_elevation_gain, None);

        // 20:30 UTC is already the next morning in Melbourne
        let melbourne: Tz = "Australia/Melbourne".parse().unwrap();
        assert_eq!(
            activity.local_date(melbourne),
            NaiveDate::from_ymd_opt(2024, 3, 2).unwrap()
        );
    }

    #[test]
    fn test_activity_missing_start_is_error() {
        let record = RawRecord::new(NaturalKey::new(["1"]), serde_json::json!({ "id": 1 }));
        assert!(Activity::from_record(&record).is_err());
    }
}
