//! Dataset layout and partition key calculation

use chrono::{Datelike, NaiveDate};

use crate::models::Domain;

/// Output tables of the transform stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MartTable {
    DailyHealth,
    DailyTraining,
    DailyActivity,
    /// Spine join of the three daily tables
    DailySummary,
    /// Per-exercise e1RM progression
    ExerciseRecords,
}

impl MartTable {
    pub const ALL: [MartTable; 5] = [
        MartTable::DailyHealth,
        MartTable::DailyTraining,
        MartTable::DailyActivity,
        MartTable::DailySummary,
        MartTable::ExerciseRecords,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MartTable::DailyHealth => "daily_health",
            MartTable::DailyTraining => "daily_training",
            MartTable::DailyActivity => "daily_activity",
            MartTable::DailySummary => "daily_summary",
            MartTable::ExerciseRecords => "exercise_records",
        }
    }

    /// Daily table built from a domain
    pub fn for_domain(domain: Domain) -> Self {
        match domain {
            Domain::Health => MartTable::DailyHealth,
            Domain::Workouts => MartTable::DailyTraining,
            Domain::Activities => MartTable::DailyActivity,
        }
    }
}

/// Datasets with their partition strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dataset {
    /// Newline-delimited JSON from extractors, one file per delivery
    Landing(Domain),
    /// Monthly partitions (YYYY-MM) of deduplicated raw records
    Staged(Domain),
    /// Single file per table, full history
    Mart(MartTable),
    /// Single file per table, trailing window only
    RecentMart(MartTable),
}

impl Dataset {
    /// Directory of this dataset relative to the storage root
    pub fn dir_name(&self) -> String {
        match self {
            Dataset::Landing(domain) => format!("landing/{}", domain),
            Dataset::Staged(domain) => format!("staged/{}", domain),
            Dataset::Mart(_) => "marts".to_string(),
            Dataset::RecentMart(_) => "marts/recent".to_string(),
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            Dataset::Landing(_) => "jsonl",
            _ => "parquet",
        }
    }

    /// Calculate partition key for a given date
    pub fn partition_key(&self, date: NaiveDate) -> String {
        match self {
            Dataset::Landing(_) => date.format("%Y-%m-%d").to_string(),
            Dataset::Staged(_) => date.format("%Y-%m").to_string(),
            Dataset::Mart(table) | Dataset::RecentMart(table) => table.name().to_string(),
        }
    }

    /// Path of one partition relative to the storage root
    pub fn relative_path(&self, partition_key: &str) -> String {
        format!("{}/{}.{}", self.dir_name(), partition_key, self.extension())
    }

    /// Get the glob pattern for querying all partitions
    pub fn glob_pattern(&self) -> String {
        match self {
            Dataset::Mart(table) | Dataset::RecentMart(table) => self.relative_path(table.name()),
            _ => format!("{}/*.{}", self.dir_name(), self.extension()),
        }
    }

    /// Partition files covering a date range, in date order
    pub fn date_range_pattern(&self, from: NaiveDate, to: NaiveDate) -> Vec<String> {
        let mut patterns = Vec::new();
        let mut current = from;

        while current <= to {
            let pattern = self.relative_path(&self.partition_key(current));
            if !patterns.contains(&pattern) {
                patterns.push(pattern);
            }

            current = match self {
                Dataset::Landing(_) => match current.succ_opt() {
                    Some(next) => next,
                    None => break,
                },
                Dataset::Staged(_) => match first_of_next_month(current) {
                    Some(next) => next,
                    None => break,
                },
                Dataset::Mart(_) | Dataset::RecentMart(_) => break,
            };
        }

        patterns
    }
}

fn first_of_next_month(date: NaiveDate) -> Option<NaiveDate> {
    if date.month() == 12 {
        NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1)
    }
}
