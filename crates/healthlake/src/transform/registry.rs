//! Metric registry: the one place that maps external metric vocabulary to
//! internal columns.
//!
//! Each metric belongs to a domain, has a canonical unit with linear
//! conversions from accepted units, and an aggregation policy used when
//! a pivot cell receives more than one sample.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{HealthlakeError, Result};
use crate::models::{Column, Domain, MetricSample, MetricValue, ValueKind};

use super::report::QualityReport;

/// How multiple values for one pivot cell collapse into one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// Largest value by total order
    Max,
    /// Weighted sum of distinct component metrics; derived metrics only
    Sum,
    /// First non-null value in sample order (most recently loaded first)
    FirstNonNull,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricDef {
    pub name: String,
    pub domain: Domain,
    pub kind: ValueKind,
    pub unit: Option<String>,
    pub aggregation: Aggregation,
    pub aliases: Vec<String>,
    /// (accepted unit, factor to canonical unit)
    pub conversions: Vec<(String, f64)>,
    /// (component metric, weight) for derived metrics
    pub components: Vec<(String, f64)>,
}

impl MetricDef {
    pub fn number(name: impl Into<String>, domain: Domain) -> Self {
        Self {
            name: name.into(),
            domain,
            kind: ValueKind::Number,
            unit: None,
            aggregation: Aggregation::Max,
            aliases: Vec::new(),
            conversions: Vec::new(),
            components: Vec::new(),
        }
    }

    pub fn text(name: impl Into<String>, domain: Domain) -> Self {
        Self {
            kind: ValueKind::Text,
            aggregation: Aggregation::FirstNonNull,
            ..Self::number(name, domain)
        }
    }

    /// A metric computed as the weighted sum of other metrics of the same row
    pub fn derived(name: impl Into<String>, domain: Domain, components: &[(&str, f64)]) -> Self {
        Self {
            aggregation: Aggregation::Sum,
            components: components
                .iter()
                .map(|(c, w)| (c.to_string(), *w))
                .collect(),
            ..Self::number(name, domain)
        }
    }

    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn convert(mut self, unit: impl Into<String>, factor: f64) -> Self {
        self.conversions.push((unit.into(), factor));
        self
    }

    pub fn aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = aggregation;
        self
    }

    pub fn is_derived(&self) -> bool {
        !self.components.is_empty()
    }

    pub fn column(&self) -> Column {
        Column {
            name: self.name.clone(),
            kind: self.kind,
        }
    }

    /// Factor converting `unit` into the canonical unit, if accepted
    fn conversion_factor(&self, unit: &str) -> Option<f64> {
        match &self.unit {
            None => Some(1.0),
            Some(canonical) if canonical.eq_ignore_ascii_case(unit) => Some(1.0),
            Some(_) => self
                .conversions
                .iter()
                .find(|(u, _)| u.eq_ignore_ascii_case(unit))
                .map(|(_, f)| *f),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MetricRegistry {
    metrics: Vec<MetricDef>,
    lookup: HashMap<String, usize>,
}

fn lookup_key(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a metric, validating it against what is already registered.
    ///
    /// Registration order is column order.
    pub fn register(&mut self, def: MetricDef) -> Result<()> {
        if def.aggregation == Aggregation::Sum && !def.is_derived() {
            return Err(HealthlakeError::invalid_param(format!(
                "metric '{}': sum aggregation is only allowed on derived metrics",
                def.name
            )));
        }
        if def.is_derived() {
            if def.aggregation != Aggregation::Sum || def.kind != ValueKind::Number {
                return Err(HealthlakeError::invalid_param(format!(
                    "derived metric '{}' must be numeric with sum aggregation",
                    def.name
                )));
            }
            for (component, _) in &def.components {
                let ok = self.get(component).is_some_and(|c| {
                    c.domain == def.domain && c.kind == ValueKind::Number && !c.is_derived()
                });
                if !ok {
                    return Err(HealthlakeError::invalid_param(format!(
                        "derived metric '{}': component '{}' must be a registered numeric {} metric",
                        def.name, component, def.domain
                    )));
                }
            }
        }

        let idx = self.metrics.len();
        let mut keys = vec![lookup_key(&def.name)];
        keys.extend(def.aliases.iter().map(|a| lookup_key(a)));
        for key in &keys {
            if self.lookup.contains_key(key) {
                return Err(HealthlakeError::invalid_param(format!(
                    "metric name '{}' is already registered",
                    key
                )));
            }
        }
        for key in keys {
            self.lookup.insert(key, idx);
        }
        self.metrics.push(def);
        Ok(())
    }

    /// Builder form of [`register`](Self::register)
    pub fn with(mut self, def: MetricDef) -> Result<Self> {
        self.register(def)?;
        Ok(self)
    }

    /// Look up by internal name or any alias (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&MetricDef> {
        self.lookup
            .get(&lookup_key(name))
            .and_then(|&idx| self.metrics.get(idx))
    }

    pub fn metrics(&self, domain: Domain) -> impl Iterator<Item = &MetricDef> {
        self.metrics.iter().filter(move |m| m.domain == domain)
    }

    pub fn columns(&self, domain: Domain) -> Vec<Column> {
        self.metrics(domain).map(MetricDef::column).collect()
    }

    /// Map a sample onto its registered metric for `domain`: rename to the
    /// internal name, convert to the canonical unit and check the value
    /// kind. Returns `None` (and counts why) if the sample cannot be used.
    pub fn normalize(
        &self,
        mut sample: MetricSample,
        domain: Domain,
        report: &mut QualityReport,
    ) -> Option<MetricSample> {
        let Some(def) = self.get(&sample.metric).filter(|d| d.domain == domain) else {
            report.record_unknown_metric(&sample.metric);
            debug!(metric = %sample.metric, %domain, "Unknown metric excluded from pivot");
            return None;
        };
        if def.is_derived() {
            debug!(metric = %def.name, "Ignoring sample for derived metric");
            return None;
        }

        let value = match (def.kind, sample.value.take()) {
            (_, None) => None,
            (ValueKind::Number, Some(MetricValue::Number(n))) if n.is_finite() => {
                let factor = match sample.unit.as_deref() {
                    None => 1.0,
                    Some(unit) => match def.conversion_factor(unit) {
                        Some(f) => f,
                        None => {
                            report.unconvertible_units += 1;
                            debug!(metric = %def.name, unit, "No conversion to canonical unit");
                            return None;
                        }
                    },
                };
                Some(MetricValue::Number(n * factor))
            }
            (ValueKind::Text, Some(MetricValue::Text(t))) => Some(MetricValue::Text(t)),
            (_, Some(other)) => {
                report.invalid_values += 1;
                debug!(metric = %def.name, value = %other, "Value does not match metric kind");
                return None;
            }
        };

        sample.metric = def.name.clone();
        sample.unit = def.unit.clone();
        sample.value = value;
        Some(sample)
    }

    /// Build a registry from `defs` in order, failing on the first invalid
    /// definition
    pub fn from_defs<I>(defs: I) -> Result<Self>
    where
        I: IntoIterator<Item = MetricDef>,
    {
        let mut registry = Self::new();
        for def in defs {
            registry.register(def)?;
        }
        Ok(registry)
    }

    /// Built-in vocabulary for Apple Health, Hevy and Strava derived data
    pub fn standard() -> Result<Self> {
        Self::from_defs(vec![
            // Health
            MetricDef::number("steps", Domain::Health)
                .unit("count")
                .alias("step_count"),
            MetricDef::number("sleep_hours", Domain::Health)
                .unit("hr")
                .alias("sleep_analysis")
                .alias("sleep_asleep")
                .convert("min", 1.0 / 60.0),
            MetricDef::number("sleep_deep_hours", Domain::Health)
                .unit("hr")
                .alias("sleep_deep")
                .convert("min", 1.0 / 60.0),
            MetricDef::number("sleep_rem_hours", Domain::Health)
                .unit("hr")
                .alias("sleep_rem")
                .convert("min", 1.0 / 60.0),
            MetricDef::number("sleep_light_hours", Domain::Health)
                .unit("hr")
                .alias("sleep_core")
                .convert("min", 1.0 / 60.0),
            MetricDef::number("resting_heart_rate", Domain::Health)
                .unit("count/min")
                .convert("bpm", 1.0),
            MetricDef::number("heart_rate_variability", Domain::Health).unit("ms"),
            MetricDef::number("weight_kg", Domain::Health)
                .unit("kg")
                .alias("weight_body_mass")
                .alias("body_mass")
                .convert("lb", 0.453_592_37)
                .convert("lbs", 0.453_592_37),
            MetricDef::number("protein_g", Domain::Health)
                .unit("g")
                .alias("protein")
                .alias("dietary_protein"),
            MetricDef::number("carbs_g", Domain::Health)
                .unit("g")
                .alias("carbohydrates")
                .alias("dietary_carbohydrates"),
            MetricDef::number("fat_g", Domain::Health)
                .unit("g")
                .alias("total_fat")
                .alias("dietary_fat_total"),
            MetricDef::number("logged_calories", Domain::Health)
                .unit("kcal")
                .alias("dietary_energy")
                .convert("kJ", 1.0 / 4.184),
            MetricDef::derived(
                "calculated_calories",
                Domain::Health,
                &[("protein_g", 4.0), ("carbs_g", 4.0), ("fat_g", 9.0)],
            )
            .unit("kcal"),
            MetricDef::text("mood", Domain::Health).alias("state_of_mind"),
            // Training
            MetricDef::number("workout_count", Domain::Workouts).unit("count"),
            MetricDef::number("set_count", Domain::Workouts).unit("count"),
            MetricDef::number("volume_kg", Domain::Workouts)
                .unit("kg")
                .convert("lb", 0.453_592_37),
            // Activities
            MetricDef::number("activity_count", Domain::Activities).unit("count"),
            MetricDef::number("distance_km", Domain::Activities)
                .unit("km")
                .alias("distance")
                .convert("m", 0.001),
            MetricDef::number("moving_minutes", Domain::Activities)
                .unit("min")
                .alias("moving_time")
                .convert("s", 1.0 / 60.0),
            MetricDef::number("elevation_gain_m", Domain::Activities)
                .unit("m")
                .alias("total_elevation_gain"),
            MetricDef::number("avg_heart_rate", Domain::Activities)
                .unit("bpm")
                .alias("average_heartrate"),
            MetricDef::text("sport_types", Domain::Activities),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample(metric: &str, value: Option<MetricValue>, unit: Option<&str>) -> MetricSample {
        let mut s = MetricSample::new(
            "me",
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            metric,
            value,
        );
        s.unit = unit.map(str::to_string);
        s
    }

    #[test]
    fn test_standard_registry_is_complete() {
        let registry = MetricRegistry::standard().unwrap();
        assert_eq!(registry.columns(Domain::Health).len(), 14);
        assert_eq!(registry.columns(Domain::Workouts).len(), 3);
        assert_eq!(registry.columns(Domain::Activities).len(), 6);
        assert!(registry.get("calculated_calories").unwrap().is_derived());
    }

    #[test]
    fn test_invalid_definition_fails_the_whole_registry() {
        let result = MetricRegistry::from_defs(vec![
            MetricDef::number("steps", Domain::Health).alias("step_count"),
            MetricDef::number("daily_steps", Domain::Health).alias("Step_Count"),
        ]);
        assert!(matches!(result, Err(HealthlakeError::InvalidParameter(_))));

        let result = MetricRegistry::from_defs(vec![MetricDef::derived(
            "calculated_calories",
            Domain::Health,
            &[("protein_g", 4.0)],
        )]);
        assert!(result.is_err());
    }

    #[test]
    fn test_alias_resolution_is_case_insensitive() {
        let registry = MetricRegistry::standard().unwrap();
        assert_eq!(registry.get("Step_Count").unwrap().name, "steps");
        assert_eq!(registry.get("dietary_energy").unwrap().name, "logged_calories");
        assert!(registry.get("walking_asymmetry").is_none());
    }

    #[test]
    fn test_sum_rejected_on_plain_metric() {
        let result = MetricRegistry::new()
            .with(MetricDef::number("steps", Domain::Health).aggregation(Aggregation::Sum));
        assert!(matches!(result, Err(HealthlakeError::InvalidParameter(_))));
    }

    #[test]
    fn test_derived_requires_registered_components() {
        let result = MetricRegistry::new().with(MetricDef::derived(
            "calculated_calories",
            Domain::Health,
            &[("protein_g", 4.0)],
        ));
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_alias_rejected() {
        let result = MetricRegistry::new()
            .with(MetricDef::number("steps", Domain::Health).alias("step_count"))
            .and_then(|r| r.with(MetricDef::number("step_count", Domain::Health)));
        assert!(result.is_err());
    }

    #[test]
    fn test_normalize_converts_units() {
        let registry = MetricRegistry::standard().unwrap();
        let mut report = QualityReport::new();

        let weight = registry
            .normalize(
                sample("weight_body_mass", Some(MetricValue::Number(200.0)), Some("lb")),
                Domain::Health,
                &mut report,
            )
            .unwrap();
        assert_eq!(weight.metric, "weight_kg");
        assert_eq!(weight.unit.as_deref(), Some("kg"));
        let kg = weight.value.unwrap().as_f64().unwrap();
        assert!((kg - 90.718474).abs() < 1e-9);

        let sleep = registry
            .normalize(
                sample("sleep_analysis", Some(MetricValue::Number(450.0)), Some("min")),
                Domain::Health,
                &mut report,
            )
            .unwrap();
        let hours = sleep.value.unwrap().as_f64().unwrap();
        assert!((hours - 7.5).abs() < 1e-9);
        assert!(report.is_clean());
    }

    #[test]
    fn test_normalize_counts_problems() {
        let registry = MetricRegistry::standard().unwrap();
        let mut report = QualityReport::new();

        let unknown = sample("vo2max", Some(MetricValue::Number(50.0)), None);
        assert!(registry.normalize(unknown, Domain::Health, &mut report).is_none());

        let wrong_domain = sample("volume_kg", Some(MetricValue::Number(1.0)), None);
        assert!(registry.normalize(wrong_domain, Domain::Health, &mut report).is_none());

        let bad_unit = sample("steps", Some(MetricValue::Number(1.0)), Some("furlong"));
        assert!(registry.normalize(bad_unit, Domain::Health, &mut report).is_none());

        let bad_kind = sample("steps", Some(MetricValue::Text("many".into())), None);
        assert!(registry.normalize(bad_kind, Domain::Health, &mut report).is_none());

        let nan = sample("steps", Some(MetricValue::Number(f64::NAN)), None);
        assert!(registry.normalize(nan, Domain::Health, &mut report).is_none());

        assert_eq!(report.unknown_metrics["vo2max"], 1);
        assert_eq!(report.unknown_metrics["volume_kg"], 1);
        assert_eq!(report.unconvertible_units, 1);
        assert_eq!(report.invalid_values, 2);
    }

    #[test]
    fn test_null_value_survives_normalize() {
        let registry = MetricRegistry::standard().unwrap();
        let mut report = QualityReport::new();
        let out = registry
            .normalize(sample("step_count", None, Some("count")), Domain::Health, &mut report)
            .unwrap();
        assert_eq!(out.metric, "steps");
        assert!(out.value.is_none());
    }
}
