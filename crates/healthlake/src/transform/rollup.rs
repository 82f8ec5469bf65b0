//! Daily rollups of set- and activity-level records into metric samples
//!
//! Rollups sum distinct records (different sets, different activities) that
//! fall on the same calendar day. Duplicate deliveries of one record are
//! removed by deduplication before they get here.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::models::{Activity, MetricSample, MetricValue, WorkoutSet};

use super::rolling::{RollingPoint, SeriesPoint};
use super::strength::estimate_one_rep_max;

/// Order key of a training session: day first, then start time, then id so
/// two sessions on the same day never compare equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionOrder {
    pub date: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub workout_id: String,
}

/// One row of personal-record progression for an exercise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseRecord {
    pub exercise: String,
    pub date: NaiveDate,
    pub workout_id: String,
    pub e1rm_kg: f64,
    pub running_max_kg: f64,
    pub previous_e1rm_kg: Option<f64>,
    pub delta_kg: Option<f64>,
    pub is_new_record: bool,
}

impl From<RollingPoint<SessionOrder>> for ExerciseRecord {
    fn from(point: RollingPoint<SessionOrder>) -> Self {
        let delta_kg = point.delta().map(|d| (d * 10.0).round() / 10.0);
        Self {
            exercise: point.partition,
            date: point.order.date,
            workout_id: point.order.workout_id,
            e1rm_kg: point.value,
            running_max_kg: point.running_max,
            previous_e1rm_kg: point.previous_value,
            delta_kg,
            is_new_record: point.is_new_record,
        }
    }
}

#[derive(Default)]
struct TrainingDay {
    workouts: BTreeSet<String>,
    sets: usize,
    volume_kg: f64,
}

/// Per-day training metrics: distinct workouts, working sets, volume in kg.
/// Warmup sets count toward neither sets nor volume.
pub fn workout_samples(entity: &str, sets: &[WorkoutSet], zone: Tz) -> Vec<MetricSample> {
    let mut days: BTreeMap<NaiveDate, TrainingDay> = BTreeMap::new();

    for set in sets {
        let day = days.entry(set.local_date(zone)).or_default();
        day.workouts.insert(set.workout_id.clone());
        if set.is_warmup() {
            continue;
        }
        day.sets += 1;
        day.volume_kg += set.volume_kg().unwrap_or(0.0);
    }

    let mut samples = Vec::with_capacity(days.len() * 3);
    for (date, day) in days {
        samples.push(number(entity, date, "workout_count", day.workouts.len() as f64, "count"));
        samples.push(number(entity, date, "set_count", day.sets as f64, "count"));
        samples.push(number(entity, date, "volume_kg", day.volume_kg, "kg"));
    }
    samples
}

#[derive(Default)]
struct ActivityDay {
    count: usize,
    distance_m: Option<f64>,
    moving_s: Option<f64>,
    elevation_m: Option<f64>,
    heart_rate: Vec<(f64, f64)>,
    sport_types: BTreeSet<String>,
}

impl ActivityDay {
    /// Mean of the activities' average heart rates weighted by moving
    /// time. Falls back to a plain mean when no activity has a moving time.
    fn average_heart_rate(&self) -> Option<f64> {
        if self.heart_rate.is_empty() {
            return None;
        }
        let weight: f64 = self.heart_rate.iter().map(|(_, w)| w).sum();
        if weight > 0.0 {
            Some(self.heart_rate.iter().map(|(hr, w)| hr * w).sum::<f64>() / weight)
        } else {
            Some(self.heart_rate.iter().map(|(hr, _)| hr).sum::<f64>() / self.heart_rate.len() as f64)
        }
    }
}

/// Per-day activity metrics in source units (meters, seconds); the registry
/// converts them to kilometers and minutes during the pivot.
pub fn activity_samples(entity: &str, activities: &[Activity], zone: Tz) -> Vec<MetricSample> {
    let mut days: BTreeMap<NaiveDate, ActivityDay> = BTreeMap::new();

    for activity in activities {
        let day = days.entry(activity.local_date(zone)).or_default();
        day.count += 1;
        if let Some(d) = activity.distance {
            *day.distance_m.get_or_insert(0.0) += d;
        }
        if let Some(t) = activity.moving_time {
            *day.moving_s.get_or_insert(0.0) += t;
        }
        if let Some(e) = activity.total_elevation_gain {
            *day.elevation_m.get_or_insert(0.0) += e;
        }
        if let Some(hr) = activity.average_heartrate.filter(|hr| hr.is_finite()) {
            day.heart_rate.push((hr, activity.moving_time.unwrap_or(0.0)));
        }
        if let Some(sport) = &activity.sport_type {
            day.sport_types.insert(sport.clone());
        }
    }

    let mut samples = Vec::with_capacity(days.len() * 6);
    for (date, day) in days {
        samples.push(number(entity, date, "activity_count", day.count as f64, "count"));
        samples.push(
            MetricSample::new(entity, date, "distance", day.distance_m.map(MetricValue::Number))
                .with_unit("m"),
        );
        samples.push(
            MetricSample::new(entity, date, "moving_time", day.moving_s.map(MetricValue::Number))
                .with_unit("s"),
        );
        samples.push(
            MetricSample::new(
                entity,
                date,
                "total_elevation_gain",
                day.elevation_m.map(MetricValue::Number),
            )
            .with_unit("m"),
        );
        samples.push(
            MetricSample::new(
                entity,
                date,
                "average_heartrate",
                day.average_heart_rate().map(MetricValue::Number),
            )
            .with_unit("bpm"),
        );
        let sports = (!day.sport_types.is_empty())
            .then(|| MetricValue::Text(day.sport_types.into_iter().collect::<Vec<_>>().join(", ")));
        samples.push(MetricSample::new(entity, date, "sport_types", sports));
    }
    samples
}

/// Best estimated 1RM per (exercise, workout), ready for the rolling
/// aggregator. Warmups and sets without a usable estimate are skipped.
pub fn exercise_sessions(sets: &[WorkoutSet], zone: Tz) -> Vec<SeriesPoint<SessionOrder>> {
    let mut best: HashMap<(String, SessionOrder), f64> = HashMap::new();

    for set in sets.iter().filter(|s| !s.is_warmup()) {
        let Some(e1rm) = set
            .weight_kg
            .zip(set.reps)
            .and_then(|(w, r)| estimate_one_rep_max(w, r))
        else {
            continue;
        };
        let order = SessionOrder {
            date: set.local_date(zone),
            started_at: set.start_time,
            workout_id: set.workout_id.clone(),
        };
        best.entry((set.exercise.clone(), order))
            .and_modify(|v| *v = v.max(e1rm))
            .or_insert(e1rm);
    }

    best.into_iter()
        .map(|((exercise, order), value)| SeriesPoint::new(exercise, order, value))
        .collect()
}

fn number(entity: &str, date: NaiveDate, metric: &str, value: f64, unit: &str) -> MetricSample {
    MetricSample::new(entity, date, metric, Some(MetricValue::Number(value))).with_unit(unit)
}
