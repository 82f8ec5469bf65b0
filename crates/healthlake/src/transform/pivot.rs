//! Long-to-wide metric pivot
//!
//! One output row per distinct (entity, date) in the input, one column per
//! registered metric of the domain. Metrics with no sample for a row are
//! null; unregistered metric names never become columns.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::models::{DailyRow, DailyTable, Domain, MetricSample, MetricValue};

use super::registry::{Aggregation, MetricDef, MetricRegistry};
use super::report::QualityReport;

pub struct MetricPivot<'a> {
    registry: &'a MetricRegistry,
    domain: Domain,
}

impl<'a> MetricPivot<'a> {
    pub fn new(registry: &'a MetricRegistry, domain: Domain) -> Self {
        Self { registry, domain }
    }

    pub fn pivot(
        &self,
        table_name: &str,
        samples: Vec<MetricSample>,
        report: &mut QualityReport,
    ) -> DailyTable {
        let defs: Vec<&MetricDef> = self.registry.metrics(self.domain).collect();
        let mut table = DailyTable::new(table_name, defs.iter().map(|d| d.column()).collect());

        let unknown_before = report.unknown_metric_total();
        let mut cells: BTreeMap<(String, NaiveDate), HashMap<String, Vec<MetricSample>>> =
            BTreeMap::new();

        for sample in samples {
            let key = (sample.entity.clone(), sample.date);
            let cell = cells.entry(key).or_default();
            if let Some(sample) = self.registry.normalize(sample, self.domain, report) {
                cell.entry(sample.metric.clone()).or_default().push(sample);
            }
        }

        for ((entity, date), mut by_metric) in cells {
            let mut values: Vec<Option<MetricValue>> = Vec::with_capacity(defs.len());

            for def in &defs {
                if def.is_derived() {
                    values.push(None);
                    continue;
                }
                let samples = by_metric.remove(&def.name).unwrap_or_default();
                if samples.len() > 1 {
                    debug!(
                        metric = %def.name,
                        %entity,
                        %date,
                        count = samples.len(),
                        "Multiple samples for one cell; applying aggregation policy"
                    );
                }
                values.push(aggregate(def.aggregation, samples));
            }

            for (idx, def) in defs.iter().enumerate() {
                if def.is_derived() {
                    values[idx] = derive(def, &defs, &values);
                }
            }

            table.rows.push(DailyRow {
                entity,
                date,
                values,
            });
        }

        let unknown = report.unknown_metric_total() - unknown_before;
        if unknown > 0 {
            warn!(
                table = table_name,
                dropped = unknown,
                "Samples with unknown metric names excluded from pivot"
            );
        }
        info!(table = table_name, rows = table.rows.len(), "Pivoted daily table");

        table
    }
}

/// Sample order for first-non-null: most recently loaded first, then source
/// name, then value, so the choice does not depend on input order.
fn sample_order(a: &MetricSample, b: &MetricSample) -> Ordering {
    b.loaded_at
        .cmp(&a.loaded_at)
        .then_with(|| a.source.cmp(&b.source))
        .then_with(|| match (&a.value, &b.value) {
            (Some(x), Some(y)) => x.total_cmp(y),
            (x, y) => y.is_some().cmp(&x.is_some()),
        })
}

fn aggregate(policy: Aggregation, mut samples: Vec<MetricSample>) -> Option<MetricValue> {
    match policy {
        Aggregation::FirstNonNull => {
            samples.sort_by(sample_order);
            samples.into_iter().find_map(|s| s.value)
        }
        // Sum is never applied across duplicate samples of one metric;
        // duplicates of a summed metric collapse like Max.
        Aggregation::Max | Aggregation::Sum => samples
            .into_iter()
            .filter_map(|s| s.value)
            .max_by(|a, b| a.total_cmp(b)),
    }
}

/// Weighted sum of the row's component values; null only if every
/// component is null.
fn derive(def: &MetricDef, defs: &[&MetricDef], values: &[Option<MetricValue>]) -> Option<MetricValue> {
    let mut total = None;
    for (component, weight) in &def.components {
        let value = defs
            .iter()
            .position(|d| &d.name == component)
            .and_then(|idx| values[idx].as_ref())
            .and_then(MetricValue::as_f64);
        if let Some(v) = value {
            *total.get_or_insert(0.0) += v * weight;
        }
    }
    total.map(MetricValue::Number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, hour, 0, 0).unwrap()
    }

    fn num(entity: &str, d: u32, metric: &str, v: f64) -> MetricSample {
        MetricSample::new(entity, date(d), metric, Some(MetricValue::Number(v)))
    }

    #[test]
    fn test_pivot_one_row_with_nulls_for_absent() {
        let registry = MetricRegistry::standard().unwrap();
        let mut report = QualityReport::new();
        let samples = vec![
            num("E1", 1, "steps", 8000.0),
            num("E1", 1, "sleep_hours", 7.5),
        ];

        let table = MetricPivot::new(&registry, Domain::Health).pivot("daily_health", samples, &mut report);

        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.columns.len(), registry.columns(Domain::Health).len());
        assert_eq!(table.get("E1", date(1), "steps"), Some(&MetricValue::Number(8000.0)));
        assert_eq!(table.get("E1", date(1), "sleep_hours"), Some(&MetricValue::Number(7.5)));

        let row = table.row("E1", date(1)).unwrap();
        let nulls = row.values.iter().filter(|v| v.is_none()).count();
        assert_eq!(nulls, table.columns.len() - 2);
    }

    #[test]
    fn test_pivot_one_row_per_entity_date() {
        let registry = MetricRegistry::standard().unwrap();
        let mut report = QualityReport::new();
        let samples = vec![
            num("E1", 1, "steps", 1.0),
            num("E1", 2, "steps", 2.0),
            num("E2", 1, "steps", 3.0),
            num("E2", 1, "weight_kg", 80.0),
        ];

        let table = MetricPivot::new(&registry, Domain::Health).pivot("daily_health", samples, &mut report);

        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.entities(), vec!["E1", "E2"]);
    }

    #[test]
    fn test_unknown_metrics_dropped_but_row_kept() {
        let registry = MetricRegistry::standard().unwrap();
        let mut report = QualityReport::new();
        let samples = vec![num("E1", 3, "walking_asymmetry", 2.0)];

        let table = MetricPivot::new(&registry, Domain::Health).pivot("daily_health", samples, &mut report);

        assert_eq!(table.rows.len(), 1);
        assert!(table.rows[0].values.iter().all(Option::is_none));
        assert!(table.column_index("walking_asymmetry").is_none());
        assert_eq!(report.unknown_metrics["walking_asymmetry"], 1);
    }

    #[test]
    fn test_duplicate_samples_take_max() {
        let registry = MetricRegistry::standard().unwrap();
        let mut report = QualityReport::new();
        let samples = vec![
            num("E1", 1, "steps", 8000.0).with_source("Apple Watch"),
            num("E1", 1, "step_count", 9500.0).with_source("iPhone"),
        ];

        let table = MetricPivot::new(&registry, Domain::Health).pivot("daily_health", samples, &mut report);

        assert_eq!(table.get("E1", date(1), "steps"), Some(&MetricValue::Number(9500.0)));
    }

    #[test]
    fn test_first_non_null_prefers_latest_load() {
        let registry = MetricRegistry::standard().unwrap();
        let mut report = QualityReport::new();
        let mood = |v: Option<&str>, hour: u32| {
            MetricSample::new("E1", date(1), "mood", v.map(MetricValue::from)).with_loaded_at(at(hour))
        };
        let samples = vec![mood(Some("tired"), 1), mood(None, 9), mood(Some("calm"), 5)];

        let table = MetricPivot::new(&registry, Domain::Health).pivot("daily_health", samples, &mut report);

        assert_eq!(
            table.get("E1", date(1), "mood"),
            Some(&MetricValue::Text("calm".to_string()))
        );
    }

    #[test]
    fn test_derived_calories_from_macros() {
        let registry = MetricRegistry::standard().unwrap();
        let mut report = QualityReport::new();
        let samples = vec![
            num("E1", 1, "protein_g", 150.0),
            num("E1", 1, "carbs_g", 250.0),
            num("E1", 1, "fat_g", 60.0),
            num("E1", 2, "steps", 100.0),
        ];

        let table = MetricPivot::new(&registry, Domain::Health).pivot("daily_health", samples, &mut report);

        assert_eq!(
            table.get("E1", date(1), "calculated_calories"),
            Some(&MetricValue::Number(150.0 * 4.0 + 250.0 * 4.0 + 60.0 * 9.0))
        );
        assert_eq!(table.get("E1", date(2), "calculated_calories"), None);
    }

    #[test]
    fn test_pivot_is_order_independent() {
        let registry = MetricRegistry::standard().unwrap();
        let samples = vec![
            num("E1", 1, "steps", 8000.0).with_source("a"),
            num("E1", 1, "steps", 7000.0).with_source("b"),
            num("E1", 2, "weight_kg", 81.0),
        ];
        let mut reversed = samples.clone();
        reversed.reverse();

        let pivot = MetricPivot::new(&registry, Domain::Health);
        let a = pivot.pivot("t", samples, &mut QualityReport::new());
        let b = pivot.pivot("t", reversed, &mut QualityReport::new());
        assert_eq!(a, b);
    }
}
