//! Health metric payloads (Apple Health JSON export, one data point per record)

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::transform::window::parse_local_date;

use super::{MetricSample, MetricValue, RawRecord};

/// A single exported data point, e.g.
/// `{"date": "2025-03-12 00:00:00 +1100", "name": "step_count", "qty": 8123, "units": "count"}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthPoint {
    /// Export timestamp with offset, or a bare calendar date
    pub date: String,

    /// External metric name, resolved through the metric registry
    pub name: String,

    #[serde(default)]
    pub qty: Option<f64>,

    /// Textual value for non-numeric metrics
    #[serde(default)]
    pub value: Option<String>,

    #[serde(default)]
    pub units: Option<String>,

    #[serde(default)]
    pub source: Option<String>,
}

impl HealthPoint {
    pub fn from_record(record: &RawRecord) -> Result<Self> {
        Ok(serde_json::from_value(record.payload.clone())?)
    }

    /// Convert to a long-format sample, deriving the calendar day in `zone`
    pub fn into_sample(self, entity: &str, zone: Tz, record: &RawRecord) -> Result<MetricSample> {
        let date = parse_local_date(&self.date, zone)?;
        let value = match (self.qty, self.value) {
            (Some(q), _) => Some(MetricValue::Number(q)),
            (None, Some(text)) => Some(MetricValue::Text(text)),
            (None, None) => None,
        };

        Ok(MetricSample {
            entity: entity.to_string(),
            date,
            metric: self.name,
            value,
            unit: self.units,
            source: self.source,
            loaded_at: record.loaded_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NaturalKey;
    use chrono::NaiveDate;

    #[test]
    fn test_health_point_into_sample() {
        let payload = serde_json::json!({
            "date": "2025-03-12 00:00:00 +1100",
            "name": "step_count",
            "qty": 8123.0,
            "units": "count",
            "source": "Apple Watch"
        });
        let record = RawRecord::new(NaturalKey::new(["2025-03-12", "step_count", "Apple Watch"]), payload);
        let point = HealthPoint::from_record(&record).unwrap();
        let melbourne: Tz = "Australia/Melbourne".parse().unwrap();
        let sample = point.into_sample("me", melbourne, &record).unwrap();

        assert_eq!(sample.date, NaiveDate::from_ymd_opt(2025, 3, 12).unwrap());
        assert_eq!(sample.metric, "step_count");
        assert_eq!(sample.value, Some(MetricValue::Number(8123.0)));
        assert_eq!(sample.source.as_deref(), Some("Apple Watch"));
    }

    #[test]
    fn test_health_point_text_value() {
        let payload = serde_json::json!({
            "date": "2025-03-12",
            "name": "state_of_mind",
            "value": "calm"
        });
        let record = RawRecord::new(NaturalKey::new(["x"]), payload);
        let melbourne: Tz = "Australia/Melbourne".parse().unwrap();
        let sample = HealthPoint::from_record(&record)
            .unwrap()
            .into_sample("me", melbourne, &record)
            .unwrap();

        assert_eq!(sample.value, Some(MetricValue::Text("calm".to_string())));
    }

    #[test]
    fn test_health_point_bad_date() {
        let payload = serde_json::json!({ "date": "yesterday", "name": "step_count", "qty": 1.0 });
        let record = RawRecord::new(NaturalKey::new(["x"]), payload);
        let melbourne: Tz = "Australia/Melbourne".parse().unwrap();
        let result = HealthPoint::from_record(&record)
            .unwrap()
            .into_sample("me", melbourne, &record);
        assert!(result.is_err());
    }
}
