//! Landed records and metric samples

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Business identifier of a record, made of one or more parts
/// (e.g. a workout id, or metric name + date + source)
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NaturalKey(Vec<String>);

impl NaturalKey {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }

    /// A key is usable only if it has at least one part and no blank parts
    pub fn is_complete(&self) -> bool {
        !self.0.is_empty() && self.0.iter().all(|p| !p.trim().is_empty())
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("|"))
    }
}

/// Freshness fields in tie-break priority order.
///
/// Comparison is lexicographic over the fields, with a missing
/// timestamp ranking below any present one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Freshness {
    pub updated_at: Option<DateTime<Utc>>,
    pub loaded_at: Option<DateTime<Utc>>,
}

impl Freshness {
    pub fn is_empty(&self) -> bool {
        self.updated_at.is_none() && self.loaded_at.is_none()
    }
}

/// A record as delivered by an upstream extractor.
///
/// Immutable once landed; a later extraction of the same natural key
/// supersedes it rather than replacing it in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(default)]
    pub key: NaturalKey,

    /// Primary date key, derived in the configured zone when staged
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,

    /// Primary value used by the non-null preference of deduplication
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,

    #[serde(default)]
    pub payload: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    /// Load or extraction time; Strava and Apple Health extractors call it
    /// `extracted_at` and `load_timestamp`
    #[serde(
        default,
        alias = "extracted_at",
        alias = "load_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub loaded_at: Option<DateTime<Utc>>,

    /// Extraction batch identifier, secondary tie-break after freshness
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_id: Option<String>,
}

impl RawRecord {
    pub fn new(key: NaturalKey, payload: serde_json::Value) -> Self {
        Self {
            key,
            date: None,
            value: None,
            payload,
            updated_at: None,
            loaded_at: None,
            load_id: None,
        }
    }

    pub fn with_value(mut self, value: serde_json::Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_updated_at(mut self, ts: DateTime<Utc>) -> Self {
        self.updated_at = Some(ts);
        self
    }

    pub fn with_loaded_at(mut self, ts: DateTime<Utc>) -> Self {
        self.loaded_at = Some(ts);
        self
    }

    pub fn with_load_id(mut self, id: impl Into<String>) -> Self {
        self.load_id = Some(id.into());
        self
    }

    pub fn freshness(&self) -> Freshness {
        Freshness {
            updated_at: self.updated_at,
            loaded_at: self.loaded_at,
        }
    }

    pub fn has_value(&self) -> bool {
        matches!(&self.value, Some(v) if !v.is_null())
    }
}

/// Value of a metric sample: numeric or textual
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Text(String),
}

impl MetricValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Number(n) => Some(*n),
            MetricValue::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetricValue::Number(_) => None,
            MetricValue::Text(s) => Some(s),
        }
    }

    /// Total order: numbers by IEEE total order, text lexically,
    /// and any number below any text.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (MetricValue::Number(a), MetricValue::Number(b)) => a.total_cmp(b),
            (MetricValue::Text(a), MetricValue::Text(b)) => a.cmp(b),
            (MetricValue::Number(_), MetricValue::Text(_)) => Ordering::Less,
            (MetricValue::Text(_), MetricValue::Number(_)) => Ordering::Greater,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Number(n) => write!(f, "{}", n),
            MetricValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for MetricValue {
    fn from(n: f64) -> Self {
        MetricValue::Number(n)
    }
}

impl From<&str> for MetricValue {
    fn from(s: &str) -> Self {
        MetricValue::Text(s.to_string())
    }
}

/// One (entity, date, metric) observation in long format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub entity: String,
    pub date: NaiveDate,
    pub metric: String,
    pub value: Option<MetricValue>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub loaded_at: Option<DateTime<Utc>>,
}

impl MetricSample {
    pub fn new(
        entity: impl Into<String>,
        date: NaiveDate,
        metric: impl Into<String>,
        value: Option<MetricValue>,
    ) -> Self {
        Self {
            entity: entity.into(),
            date,
            metric: metric.into(),
            value,
            unit: None,
            source: None,
            loaded_at: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_loaded_at(mut self, ts: DateTime<Utc>) -> Self {
        self.loaded_at = Some(ts);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_natural_key_completeness() {
        assert!(NaturalKey::new(["W1"]).is_complete());
        assert!(!NaturalKey::default().is_complete());
        assert!(!NaturalKey::new(["2024-01-01", " "]).is_complete());
        assert_eq!(NaturalKey::new(["a", "b"]).to_string(), "a|b");
    }

    #[test]
    fn test_freshness_ordering() {
        let early = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let late = DateTime::from_timestamp(1_700_003_600, 0).unwrap();

        let a = Freshness { updated_at: Some(early), loaded_at: Some(late) };
        let b = Freshness { updated_at: Some(late), loaded_at: None };
        let c = Freshness { updated_at: None, loaded_at: Some(late) };

        assert!(b > a, "updated_at takes priority over loaded_at");
        assert!(a > c, "missing updated_at ranks lowest");
        assert!(Freshness::default().is_empty());
    }

    #[test]
    fn test_null_value_is_not_a_value() {
        let record = RawRecord::new(NaturalKey::new(["1"]), serde_json::json!({}))
            .with_value(serde_json::Value::Null);
        assert!(!record.has_value());
        assert!(record.clone().with_value(serde_json::json!(3)).has_value());
    }

    #[test]
    fn test_metric_value_total_order() {
        let a = MetricValue::Number(1.0);
        let b = MetricValue::Number(2.5);
        let t = MetricValue::Text("high".to_string());
        assert_eq!(a.total_cmp(&b), Ordering::Less);
        assert_eq!(t.total_cmp(&b), Ordering::Greater);
    }

    #[test]
    fn test_raw_record_json_shape() {
        let json = r#"{"key":["W1"],"payload":{"title":"Push"},"updated_at":"2024-01-01T12:00:00Z"}"#;
        let record: RawRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.key.parts(), &["W1".to_string()]);
        assert!(record.updated_at.is_some());
        assert!(record.loaded_at.is_none());
    }

    #[test]
    fn test_extracted_at_alias() {
        let json = r#"{"key":["42"],"payload":{},"extracted_at":"2024-03-02T06:00:00Z"}"#;
        let record: RawRecord = serde_json::from_str(json).unwrap();
        assert!(record.loaded_at.is_some());
        assert!(!record.freshness().is_empty());
    }
}
