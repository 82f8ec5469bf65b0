//! Wide tables produced by the pivot and spine-join stages

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::MetricValue;

/// Storage type of a metric column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Number,
    Text,
}

/// A named metric column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub kind: ValueKind,
}

impl Column {
    pub fn number(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ValueKind::Number,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ValueKind::Text,
        }
    }
}

/// One row per (entity, date); `values` is aligned with the table's columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRow {
    pub entity: String,
    pub date: NaiveDate,
    pub values: Vec<Option<MetricValue>>,
}

/// Pivoted table for one domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyTable {
    pub name: String,
    pub columns: Vec<Column>,
    pub rows: Vec<DailyRow>,
}

impl DailyTable {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn row(&self, entity: &str, date: NaiveDate) -> Option<&DailyRow> {
        self.rows
            .iter()
            .find(|r| r.entity == entity && r.date == date)
    }

    /// Value of one cell; `None` both for a null cell and a missing row
    pub fn get(&self, entity: &str, date: NaiveDate, metric: &str) -> Option<&MetricValue> {
        let idx = self.column_index(metric)?;
        self.row(entity, date)?.values.get(idx)?.as_ref()
    }

    pub fn entities(&self) -> Vec<&str> {
        let mut entities: Vec<&str> = self.rows.iter().map(|r| r.entity.as_str()).collect();
        entities.sort_unstable();
        entities.dedup();
        entities
    }
}

/// One row per calendar day after the spine join
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub date: NaiveDate,
    pub values: Vec<Option<MetricValue>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryTable {
    pub columns: Vec<Column>,
    pub rows: Vec<SummaryRow>,
}

impl SummaryTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn row(&self, date: NaiveDate) -> Option<&SummaryRow> {
        self.rows.iter().find(|r| r.date == date)
    }

    pub fn get(&self, date: NaiveDate, metric: &str) -> Option<&MetricValue> {
        let idx = self.column_index(metric)?;
        self.row(date)?.values.get(idx)?.as_ref()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.rows.iter().map(|r| r.date).collect()
    }
}
