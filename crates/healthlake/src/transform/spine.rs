//! Date-spine join of per-domain daily tables
//!
//! The spine is the union of every date any source has a row for. Each
//! source's columns are left-joined onto it, so a day with data in only one
//! domain still gets a row with nulls for the others.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{HealthlakeError, Result};
use crate::models::{Column, DailyTable, MetricValue, SummaryRow, SummaryTable};

/// Row order of the joined table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpineOrder {
    /// Most recent day first
    #[default]
    Descending,
    Ascending,
}

/// Distinct dates with a row for `entity` in any of `sources`
pub fn date_spine(entity: &str, sources: &[&DailyTable]) -> BTreeSet<NaiveDate> {
    sources
        .iter()
        .flat_map(|t| t.rows.iter())
        .filter(|r| r.entity == entity)
        .map(|r| r.date)
        .collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SpineJoiner {
    order: SpineOrder,
}

impl SpineJoiner {
    pub fn new(order: SpineOrder) -> Self {
        Self { order }
    }

    /// Join `sources` for one entity onto their shared date spine.
    ///
    /// Column names must be unique across sources; a collision is an error
    /// rather than a silent overwrite.
    pub fn join(&self, entity: &str, sources: &[&DailyTable]) -> Result<SummaryTable> {
        let mut seen = HashSet::new();
        let mut columns: Vec<Column> = Vec::new();
        for table in sources {
            for column in &table.columns {
                if !seen.insert(column.name.as_str()) {
                    return Err(HealthlakeError::invalid_param(format!(
                        "column '{}' from '{}' is already provided by another source",
                        column.name, table.name
                    )));
                }
                columns.push(column.clone());
            }
        }

        let lookups: Vec<HashMap<NaiveDate, &[Option<MetricValue>]>> = sources
            .iter()
            .map(|t| {
                t.rows
                    .iter()
                    .filter(|r| r.entity == entity)
                    .map(|r| (r.date, r.values.as_slice()))
                    .collect()
            })
            .collect();

        let spine = date_spine(entity, sources);
        let dates: Vec<NaiveDate> = match self.order {
            SpineOrder::Ascending => spine.into_iter().collect(),
            SpineOrder::Descending => spine.into_iter().rev().collect(),
        };

        let rows: Vec<SummaryRow> = dates
            .into_iter()
            .map(|date| {
                let mut values = Vec::with_capacity(columns.len());
                for (table, lookup) in sources.iter().zip(&lookups) {
                    match lookup.get(&date) {
                        Some(cells) => values.extend(
                            (0..table.columns.len()).map(|i| cells.get(i).cloned().flatten()),
                        ),
                        None => values.extend(std::iter::repeat(None).take(table.columns.len())),
                    }
                }
                SummaryRow { date, values }
            })
            .collect();

        info!(entity, sources = sources.len(), rows = rows.len(), "Joined daily summary");
        Ok(SummaryTable { columns, rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DailyRow;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn table(name: &str, column: &str, days: &[u32]) -> DailyTable {
        let mut t = DailyTable::new(name, vec![Column::number(column)]);
        for d in days {
            t.rows.push(DailyRow {
                entity: "me".to_string(),
                date: date(*d),
                values: vec![Some(MetricValue::Number(f64::from(*d)))],
            });
        }
        t
    }

    #[test]
    fn test_spine_is_union_of_dates() {
        let a = table("a", "steps", &[1, 2, 3]);
        let b = table("b", "volume_kg", &[2, 4]);

        let joined = SpineJoiner::default().join("me", &[&a, &b]).unwrap();

        assert_eq!(joined.rows.len(), 4);
        assert_eq!(joined.dates(), vec![date(4), date(3), date(2), date(1)]);
        assert_eq!(joined.get(date(1), "steps"), Some(&MetricValue::Number(1.0)));
        assert_eq!(joined.get(date(1), "volume_kg"), None);
        assert_eq!(joined.get(date(4), "steps"), None);
        assert_eq!(joined.get(date(4), "volume_kg"), Some(&MetricValue::Number(4.0)));
        assert_eq!(joined.get(date(2), "volume_kg"), Some(&MetricValue::Number(2.0)));
        assert!(joined.rows.iter().all(|r| r.values.len() == 2));
    }

    #[test]
    fn test_ascending_order_override() {
        let a = table("a", "steps", &[3, 1]);
        let joined = SpineJoiner::new(SpineOrder::Ascending).join("me", &[&a]).unwrap();
        assert_eq!(joined.dates(), vec![date(1), date(3)]);
    }

    #[test]
    fn test_other_entities_not_joined() {
        let mut a = table("a", "steps", &[1]);
        a.rows.push(DailyRow {
            entity: "someone-else".to_string(),
            date: date(9),
            values: vec![Some(MetricValue::Number(1.0))],
        });

        let joined = SpineJoiner::default().join("me", &[&a]).unwrap();
        assert_eq!(joined.dates(), vec![date(1)]);
    }

    #[test]
    fn test_duplicate_columns_rejected() {
        let a = table("a", "steps", &[1]);
        let b = table("b", "steps", &[2]);
        assert!(matches!(
            SpineJoiner::default().join("me", &[&a, &b]),
            Err(HealthlakeError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_empty_sources_yield_empty_table() {
        let a = table("a", "steps", &[]);
        let joined = SpineJoiner::default().join("me", &[&a]).unwrap();
        assert!(joined.rows.is_empty());
        assert_eq!(joined.columns.len(), 1);
    }
}
