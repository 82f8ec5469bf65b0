//! Data-quality counters surfaced to the caller
//!
//! None of these are fatal: the affected record is dropped (or resolved
//! deterministically) and the category is counted here.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QualityReport {
    /// Records without a complete natural key or any freshness field
    pub unkeyable: usize,
    /// Dedup winners chosen by the final fingerprint tie-break
    pub ambiguous_ties: usize,
    /// Records superseded by a fresher delivery of the same key
    pub superseded: usize,
    /// Samples dropped because the metric is not registered, by name
    pub unknown_metrics: BTreeMap<String, usize>,
    /// Samples whose unit has no conversion to the canonical unit
    pub unconvertible_units: usize,
    /// Payloads that failed to decode or had no derivable date
    pub malformed: usize,
    /// Values of the wrong kind or not finite
    pub invalid_values: usize,
    /// Records excluded by an incremental window
    pub outside_window: usize,
    /// Rolling points already covered by a seeded state
    pub replayed: usize,
}

impl QualityReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_unknown_metric(&mut self, name: &str) {
        *self.unknown_metrics.entry(name.to_string()).or_default() += 1;
    }

    pub fn unknown_metric_total(&self) -> usize {
        self.unknown_metrics.values().sum()
    }

    /// Total of the categories that indicate a data problem.
    ///
    /// `superseded`, `outside_window` and `replayed` are expected outcomes
    /// and are not counted.
    pub fn warnings(&self) -> usize {
        self.unkeyable
            + self.ambiguous_ties
            + self.unknown_metric_total()
            + self.unconvertible_units
            + self.malformed
            + self.invalid_values
    }

    pub fn is_clean(&self) -> bool {
        self.warnings() == 0
    }

    pub fn merge(&mut self, other: &QualityReport) {
        self.unkeyable += other.unkeyable;
        self.ambiguous_ties += other.ambiguous_ties;
        self.superseded += other.superseded;
        for (name, count) in &other.unknown_metrics {
            *self.unknown_metrics.entry(name.clone()).or_default() += count;
        }
        self.unconvertible_units += other.unconvertible_units;
        self.malformed += other.malformed;
        self.invalid_values += other.invalid_values;
        self.outside_window += other.outside_window;
        self.replayed += other.replayed;
    }
}

impl fmt::Display for QualityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Unkeyable: {}, Ambiguous ties: {}, Unknown metrics: {}, Unconvertible units: {}, Malformed: {}, Invalid values: {}",
            self.unkeyable,
            self.ambiguous_ties,
            self.unknown_metric_total(),
            self.unconvertible_units,
            self.malformed,
            self.invalid_values
        )?;
        if self.superseded > 0 {
            write!(f, ", Superseded: {}", self.superseded)?;
        }
        if self.outside_window > 0 {
            write!(f, ", Outside window: {}", self.outside_window)?;
        }
        if !self.unknown_metrics.is_empty() {
            let names: Vec<&str> = self.unknown_metrics.keys().map(String::as_str).collect();
            write!(f, " [unknown: {}]", names.join(", "))?;
        }
        Ok(())
    }
}
