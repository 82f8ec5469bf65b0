//! Strength training payloads (Hevy workouts, flattened to one row per set)

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::transform::window::local_date;

use super::RawRecord;

/// One performed set within a workout exercise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutSet {
    pub workout_id: String,

    #[serde(default)]
    pub workout_title: Option<String>,

    /// Workout start instant
    pub start_time: DateTime<Utc>,

    /// Exercise title, e.g. "Squat (Barbell)"
    pub exercise: String,

    /// Position of the exercise within the workout
    #[serde(default)]
    pub exercise_index: u32,

    /// Position of the set within the exercise
    #[serde(default)]
    pub set_index: u32,

    /// "normal", "warmup", "dropset" or "failure"
    #[serde(default)]
    pub set_type: Option<String>,

    #[serde(default)]
    pub weight_kg: Option<f64>,

    #[serde(default)]
    pub reps: Option<u32>,

    #[serde(default)]
    pub rpe: Option<f64>,
}

impl WorkoutSet {
    pub fn from_record(record: &RawRecord) -> Result<Self> {
        Ok(serde_json::from_value(record.payload.clone())?)
    }

    /// Calendar day of the workout start in the given zone
    pub fn local_date(&self, zone: Tz) -> NaiveDate {
        local_date(self.start_time, zone)
    }

    pub fn is_warmup(&self) -> bool {
        self.set_type.as_deref() == Some("warmup")
    }

    /// Weight moved across all reps, if both are known
    pub fn volume_kg(&self) -> Option<f64> {
        match (self.weight_kg, self.reps) {
            (Some(w), Some(r)) => Some(w * r as f64),
            _ => None,
        }
    }
}
