//! Stage orchestration: landing → staged → marts
//!
//! `stage` derives each record's date in the configured zone, applies the
//! domain's lookback window and upserts into the staged partitions.
//! `transform` recomputes every mart from the staged data in dependency
//! order: dedupe, pivot, rolling series, spine join.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::{HealthlakeError, Result};
use crate::models::{
    Activity, DailyTable, Domain, HealthPoint, MetricSample, NaturalKey, RawRecord, SummaryTable,
    WorkoutSet,
};
use crate::storage::{Dataset, MartTable, Storage};
use crate::transform::rollup::{activity_samples, exercise_sessions, workout_samples};
use crate::transform::window::{local_date, parse_local_date, MAX_LOOKBACK_DAYS};
use crate::transform::{
    deduplicate, ExerciseRecord, IncrementalWindow, MetricPivot, MetricRegistry, QualityReport,
    RollingAggregator, SpineJoiner, SpineOrder,
};

/// Options for a staging run
#[derive(Debug, Clone, Copy)]
pub struct StageOptions {
    /// Reference instant for the lookback window
    pub now: DateTime<Utc>,
    /// Stage everything landed, ignoring the lookback window
    pub full: bool,
}

impl StageOptions {
    pub fn incremental(now: DateTime<Utc>) -> Self {
        Self { now, full: false }
    }

    pub fn full(now: DateTime<Utc>) -> Self {
        Self { now, full: true }
    }
}

/// Statistics from a staging run
#[derive(Debug, Clone, Serialize)]
pub struct StageStats {
    pub domain: Domain,
    /// Records read from the landing zone
    pub landed: usize,
    /// Records passed to the upsert after windowing
    pub candidates: usize,
    /// Rows in the rewritten staged partitions
    pub staged: usize,
    /// Window cutoff, absent for a full stage
    pub cutoff: Option<NaiveDate>,
    pub quality: QualityReport,
}

impl fmt::Display for StageStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: landed {}, staged {} of {} in window",
            self.domain, self.landed, self.staged, self.candidates
        )?;
        if let Some(cutoff) = self.cutoff {
            write!(f, " (since {})", cutoff)?;
        }
        Ok(())
    }
}

/// Statistics from a transform run
#[derive(Debug, Clone, Serialize)]
pub struct TransformStats {
    pub health_rows: usize,
    pub training_rows: usize,
    pub activity_rows: usize,
    pub summary_rows: usize,
    pub exercise_sessions: usize,
    pub new_records: usize,
    pub recent_summary_rows: usize,
    pub quality: QualityReport,
}

impl fmt::Display for TransformStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Summary: {} days ({} recent), Health: {}, Training: {}, Activity: {}, Sessions: {}, PRs: {}",
            self.summary_rows,
            self.recent_summary_rows,
            self.health_rows,
            self.training_rows,
            self.activity_rows,
            self.exercise_sessions,
            self.new_records
        )
    }
}

/// Everything `transform` computes, before it is written
#[derive(Debug, Clone)]
pub struct Marts {
    pub daily_health: DailyTable,
    pub daily_training: DailyTable,
    pub daily_activity: DailyTable,
    pub daily_summary: SummaryTable,
    pub exercise_records: Vec<ExerciseRecord>,
}

impl Marts {
    /// Restrict every table to rows on or after the window cutoff
    pub fn recent(&self, window: &IncrementalWindow, now: DateTime<Utc>) -> Marts {
        let cutoff = window.cutoff(now);
        let daily = |table: &DailyTable| {
            let mut recent = DailyTable::new(table.name.clone(), table.columns.clone());
            recent.rows = table.rows.iter().filter(|r| r.date >= cutoff).cloned().collect();
            recent
        };
        Marts {
            daily_health: daily(&self.daily_health),
            daily_training: daily(&self.daily_training),
            daily_activity: daily(&self.daily_activity),
            daily_summary: SummaryTable {
                columns: self.daily_summary.columns.clone(),
                rows: self
                    .daily_summary
                    .rows
                    .iter()
                    .filter(|r| r.date >= cutoff)
                    .cloned()
                    .collect(),
            },
            exercise_records: self
                .exercise_records
                .iter()
                .filter(|r| r.date >= cutoff)
                .cloned()
                .collect(),
        }
    }
}

pub struct Pipeline {
    storage: Storage,
    config: PipelineConfig,
    zone: Tz,
    registry: MetricRegistry,
}

impl Pipeline {
    /// Open the pipeline on the configured data directory
    pub fn open(config: PipelineConfig) -> Result<Self> {
        let storage = Storage::open(config.data_dir()?)?;
        Self::with_storage(storage, config)
    }

    /// Create a pipeline on existing storage. Fails if the configuration is
    /// invalid, in particular if the time zone does not resolve.
    pub fn with_storage(storage: Storage, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let zone = config.zone()?;
        Ok(Self {
            storage,
            config,
            zone,
            registry: MetricRegistry::standard()?,
        })
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Window cutoff for `days` back from `now` in the configured zone
    pub fn cutoff(&self, days: u32, now: DateTime<Utc>) -> Result<NaiveDate> {
        if days > MAX_LOOKBACK_DAYS {
            return Err(HealthlakeError::invalid_param(format!(
                "days must be at most {} (got {})",
                MAX_LOOKBACK_DAYS, days
            )));
        }
        Ok(IncrementalWindow::with_zone(days, self.zone).cutoff(now))
    }

    // =========================================================================
    // Staging
    // =========================================================================

    pub fn stage(&self, domain: Domain, opts: StageOptions) -> Result<StageStats> {
        let mut report = QualityReport::new();
        let landed = self.storage.landing.read(domain, &mut report)?;
        let landed_count = landed.len();

        let mut prepared = Vec::with_capacity(landed.len());
        for record in landed {
            match prepare_record(domain, record, self.zone) {
                Ok(record) => prepared.push(record),
                Err((key, e)) => {
                    report.malformed += 1;
                    warn!(%domain, %key, error = %e, "Skipping record with unreadable payload");
                }
            }
        }

        let (candidates, cutoff) = if opts.full {
            (prepared, None)
        } else {
            let window = self.config.staging_window(domain)?;
            let kept = window.filter(
                opts.now,
                prepared,
                |r: &RawRecord| r.date.unwrap_or(NaiveDate::MIN),
                &mut report,
            );
            (kept, Some(window.cutoff(opts.now)))
        };
        let candidate_count = candidates.len();

        let staged = self.storage.parquet.upsert_staged(domain, candidates, &mut report)?;
        if !report.is_clean() {
            warn!(%domain, warnings = report.warnings(), "Staging finished with data-quality warnings");
        }

        Ok(StageStats {
            domain,
            landed: landed_count,
            candidates: candidate_count,
            staged,
            cutoff,
            quality: report,
        })
    }

    // =========================================================================
    // Transform
    // =========================================================================

    /// Build every mart from the staged data without writing it
    pub fn build_marts(&self, report: &mut QualityReport) -> Result<Marts> {
        let entity = self.config.entity.as_str();

        let health = self.staged(Domain::Health, report)?;
        let mut samples: Vec<MetricSample> = Vec::with_capacity(health.len());
        for record in &health {
            match HealthPoint::from_record(record)
                .and_then(|p| p.into_sample(entity, self.zone, record))
            {
                Ok(sample) => samples.push(sample),
                Err(e) => {
                    report.malformed += 1;
                    warn!(key = %record.key, error = %e, "Skipping unreadable health record");
                }
            }
        }
        let samples = deduplicate(samples, report);
        let daily_health = MetricPivot::new(&self.registry, Domain::Health).pivot(
            MartTable::DailyHealth.name(),
            samples,
            report,
        );

        let sets: Vec<WorkoutSet> = self.decode(Domain::Workouts, WorkoutSet::from_record, report)?;
        let daily_training = MetricPivot::new(&self.registry, Domain::Workouts).pivot(
            MartTable::DailyTraining.name(),
            workout_samples(entity, &sets, self.zone),
            report,
        );
        let exercise_records: Vec<ExerciseRecord> = RollingAggregator::new()
            .compute(exercise_sessions(&sets, self.zone), report)
            .into_iter()
            .map(ExerciseRecord::from)
            .collect();

        let activities: Vec<Activity> = self.decode(Domain::Activities, Activity::from_record, report)?;
        let daily_activity = MetricPivot::new(&self.registry, Domain::Activities).pivot(
            MartTable::DailyActivity.name(),
            activity_samples(entity, &activities, self.zone),
            report,
        );

        let daily_summary = SpineJoiner::new(SpineOrder::Descending).join(
            entity,
            &[&daily_health, &daily_training, &daily_activity],
        )?;

        Ok(Marts {
            daily_health,
            daily_training,
            daily_activity,
            daily_summary,
            exercise_records,
        })
    }

    /// Recompute and write all marts, full history and recent window
    pub fn transform(&self, now: DateTime<Utc>) -> Result<TransformStats> {
        let mut report = QualityReport::new();
        let marts = self.build_marts(&mut report)?;
        let recent = marts.recent(&self.config.recent_window()?, now);

        self.write_marts(&marts, Dataset::Mart)?;
        self.write_marts(&recent, Dataset::RecentMart)?;

        let stats = TransformStats {
            health_rows: marts.daily_health.rows.len(),
            training_rows: marts.daily_training.rows.len(),
            activity_rows: marts.daily_activity.rows.len(),
            summary_rows: marts.daily_summary.rows.len(),
            exercise_sessions: marts.exercise_records.len(),
            new_records: marts.exercise_records.iter().filter(|r| r.is_new_record).count(),
            recent_summary_rows: recent.daily_summary.rows.len(),
            quality: report,
        };
        info!(%stats, "Transform complete");
        if !stats.quality.is_clean() {
            warn!(warnings = stats.quality.warnings(), "Transform finished with data-quality warnings");
        }
        Ok(stats)
    }

    fn write_marts(&self, marts: &Marts, dataset: fn(MartTable) -> Dataset) -> Result<()> {
        let parquet = &self.storage.parquet;
        parquet.write_daily_table(dataset(MartTable::DailyHealth), &marts.daily_health)?;
        parquet.write_daily_table(dataset(MartTable::DailyTraining), &marts.daily_training)?;
        parquet.write_daily_table(dataset(MartTable::DailyActivity), &marts.daily_activity)?;
        parquet.write_summary(
            dataset(MartTable::DailySummary),
            &self.config.entity,
            &marts.daily_summary,
        )?;
        parquet.write_exercise_records(dataset(MartTable::ExerciseRecords), &marts.exercise_records)
    }

    /// Staged records, deduplicated again across partitions in case a
    /// record's date moved between deliveries
    fn staged(&self, domain: Domain, report: &mut QualityReport) -> Result<Vec<RawRecord>> {
        let records = self.storage.parquet.read_staged(domain)?;
        Ok(deduplicate(records, report))
    }

    fn decode<T, F>(&self, domain: Domain, decode: F, report: &mut QualityReport) -> Result<Vec<T>>
    where
        F: Fn(&RawRecord) -> Result<T>,
    {
        let mut items = Vec::new();
        for record in self.staged(domain, report)? {
            match decode(&record) {
                Ok(item) => items.push(item),
                Err(e) => {
                    report.malformed += 1;
                    warn!(%domain, key = %record.key, error = %e, "Skipping unreadable staged record");
                }
            }
        }
        Ok(items)
    }

    // =========================================================================
    // Personal records
    // =========================================================================

    /// Personal-record progression, optionally for exercises whose name
    /// contains `exercise` (case-insensitive)
    pub fn personal_records(&self, exercise: Option<&str>) -> Result<Vec<ExerciseRecord>> {
        let records = self
            .storage
            .parquet
            .read_exercise_records(Dataset::Mart(MartTable::ExerciseRecords))?;
        Ok(match exercise {
            Some(filter) => {
                let filter = filter.to_lowercase();
                records
                    .into_iter()
                    .filter(|r| r.exercise.to_lowercase().contains(&filter))
                    .collect()
            }
            None => records,
        })
    }
}

/// Derive the date, primary value and (if missing) natural key of a landed
/// record from its payload
fn prepare_record(
    domain: Domain,
    mut record: RawRecord,
    zone: Tz,
) -> std::result::Result<RawRecord, (NaturalKey, HealthlakeError)> {
    let derived = match domain {
        Domain::Health => HealthPoint::from_record(&record).and_then(|p| {
            let date = parse_local_date(&p.date, zone)?;
            let value = p
                .qty
                .map(serde_json::Value::from)
                .or_else(|| p.value.clone().map(serde_json::Value::from));
            let source = p.source.clone().unwrap_or_else(|| "Unknown".to_string());
            let key = NaturalKey::new([date.to_string(), p.name.clone(), source]);
            Ok((date, value, key))
        }),
        Domain::Workouts => WorkoutSet::from_record(&record).map(|s| {
            let key = NaturalKey::new([
                s.workout_id.clone(),
                s.exercise_index.to_string(),
                s.set_index.to_string(),
            ]);
            (s.local_date(zone), s.weight_kg.map(serde_json::Value::from), key)
        }),
        Domain::Activities => Activity::from_record(&record).map(|a| {
            let key = NaturalKey::new([a.id.to_string()]);
            (
                local_date(a.start_date, zone),
                a.distance.map(serde_json::Value::from),
                key,
            )
        }),
    };

    match derived {
        Ok((date, value, key)) => {
            record.date = Some(date);
            if record.value.is_none() {
                record.value = value;
            }
            if record.key.parts().is_empty() {
                record.key = key;
            }
            Ok(record)
        }
        Err(e) => Err((record.key, e)),
    }
}
