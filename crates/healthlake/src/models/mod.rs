//! Data models shared by staging, transformation and storage
//!
//! Source payloads (`HealthPoint`, `WorkoutSet`, `Activity`) are decoded
//! from the `payload` of a landed [`RawRecord`]; the transformation core
//! works on [`MetricSample`]s and the wide [`DailyTable`]/[`SummaryTable`].

mod activity;
mod health;
mod record;
mod table;
mod workout;

pub use activity::Activity;
pub use health::HealthPoint;
pub use record::{Freshness, MetricSample, MetricValue, NaturalKey, RawRecord};
pub use table::{Column, DailyRow, DailyTable, SummaryRow, SummaryTable, ValueKind};
pub use workout::WorkoutSet;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::HealthlakeError;

/// Source domains feeding the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    /// Daily vitals, sleep, nutrition and body measurements
    Health,
    /// Strength training sets
    Workouts,
    /// Cardio activities
    Activities,
}

impl Domain {
    pub const ALL: [Domain; 3] = [Domain::Health, Domain::Workouts, Domain::Activities];

    pub fn name(&self) -> &'static str {
        match self {
            Domain::Health => "health",
            Domain::Workouts => "workouts",
            Domain::Activities => "activities",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Domain {
    type Err = HealthlakeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "health" => Ok(Domain::Health),
            "workouts" | "hevy" => Ok(Domain::Workouts),
            "activities" | "strava" => Ok(Domain::Activities),
            other => Err(HealthlakeError::invalid_param(format!(
                "unknown domain '{}' (expected health, workouts or activities)",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_parse() {
        assert_eq!("health".parse::<Domain>().unwrap(), Domain::Health);
        assert_eq!("Hevy".parse::<Domain>().unwrap(), Domain::Workouts);
        assert_eq!("strava".parse::<Domain>().unwrap(), Domain::Activities);
        assert!("garmin".parse::<Domain>().is_err());
    }

    #[test]
    fn test_domain_display_round_trips() {
        for domain in Domain::ALL {
            assert_eq!(domain.to_string().parse::<Domain>().unwrap(), domain);
        }
    }
}
