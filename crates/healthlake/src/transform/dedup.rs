//! Natural-key deduplication
//!
//! For each natural key exactly one survivor is kept. Candidates are ranked by:
//!
//! 1. a non-null primary value over a null one
//! 2. the greatest freshness (`updated_at`, then `loaded_at`)
//! 3. the greatest load id
//! 4. the smallest canonical JSON fingerprint
//!
//! Step 4 only decides between records that differ in content but tie on
//! everything else; such wins are counted as ambiguous ties. The ranking is
//! a total order over record contents, so the survivor does not depend on
//! input order.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::models::{Freshness, MetricSample, NaturalKey, RawRecord};

use super::report::QualityReport;

/// Records that can be collapsed to one survivor per natural key
pub trait Deduplicate {
    /// The business identity, or `None` if the record cannot be keyed
    fn natural_key(&self) -> Option<NaturalKey>;

    fn freshness(&self) -> Freshness;

    fn has_primary_value(&self) -> bool;

    fn load_id(&self) -> Option<&str> {
        None
    }

    /// Canonical serialization of the whole record
    fn fingerprint(&self) -> String;
}

impl Deduplicate for RawRecord {
    fn natural_key(&self) -> Option<NaturalKey> {
        self.key.is_complete().then(|| self.key.clone())
    }

    fn freshness(&self) -> Freshness {
        RawRecord::freshness(self)
    }

    fn has_primary_value(&self) -> bool {
        self.has_value()
    }

    fn load_id(&self) -> Option<&str> {
        self.load_id.as_deref()
    }

    fn fingerprint(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Samples are keyed by (entity, date, metric, source); the most recently
/// loaded sample wins.
impl Deduplicate for MetricSample {
    fn natural_key(&self) -> Option<NaturalKey> {
        let key = NaturalKey::new([
            self.entity.clone(),
            self.date.to_string(),
            self.metric.clone(),
            self.source.clone().unwrap_or_else(|| "Unknown".to_string()),
        ]);
        key.is_complete().then_some(key)
    }

    fn freshness(&self) -> Freshness {
        Freshness {
            updated_at: None,
            loaded_at: self.loaded_at,
        }
    }

    fn has_primary_value(&self) -> bool {
        self.value.is_some()
    }

    fn fingerprint(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Rank {
    has_value: bool,
    freshness: Freshness,
    load_id: Option<String>,
}

struct Candidate<T> {
    rank: Rank,
    fingerprint: String,
    record: T,
}

impl<T: Deduplicate> Candidate<T> {
    fn new(record: T) -> Self {
        Self {
            rank: Rank {
                has_value: record.has_primary_value(),
                freshness: record.freshness(),
                load_id: record.load_id().map(str::to_string),
            },
            fingerprint: record.fingerprint(),
            record,
        }
    }
}

/// Keep one record per natural key.
///
/// Unkeyable records (incomplete key, or no freshness field at all) are
/// dropped and counted. Survivors are returned in natural-key order.
pub fn deduplicate<T, I>(records: I, report: &mut QualityReport) -> Vec<T>
where
    T: Deduplicate,
    I: IntoIterator<Item = T>,
{
    let mut groups: BTreeMap<NaturalKey, Vec<Candidate<T>>> = BTreeMap::new();

    for record in records {
        let Some(key) = record.natural_key() else {
            report.unkeyable += 1;
            warn!("Dropping unkeyable record: missing natural key");
            continue;
        };
        if record.freshness().is_empty() {
            report.unkeyable += 1;
            warn!(key = %key, "Dropping unkeyable record: no freshness field");
            continue;
        }
        groups.entry(key).or_default().push(Candidate::new(record));
    }

    let mut survivors = Vec::with_capacity(groups.len());

    for (key, mut candidates) in groups {
        candidates.sort_by(|a, b| {
            b.rank
                .cmp(&a.rank)
                .then_with(|| a.fingerprint.cmp(&b.fingerprint))
        });

        if candidates.len() > 1 {
            report.superseded += candidates.len() - 1;
            let (first, second) = (&candidates[0], &candidates[1]);
            if first.rank == second.rank && first.fingerprint != second.fingerprint {
                report.ambiguous_ties += 1;
                warn!(key = %key, "Ambiguous tie between deliveries; kept lowest fingerprint");
            } else {
                debug!(key = %key, dropped = candidates.len() - 1, "Superseded deliveries");
            }
        }

        if let Some(winner) = candidates.into_iter().next() {
            survivors.push(winner.record);
        }
    }

    survivors
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};
    use serde_json::json;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap()
    }

    fn workout(id: &str, title: &str) -> RawRecord {
        RawRecord::new(NaturalKey::new([id]), json!({ "title": title }))
            .with_value(json!(title))
    }

    #[test]
    fn test_latest_freshness_wins() {
        let mut report = QualityReport::new();
        let records = vec![
            workout("W1", "morning").with_updated_at(at(10)),
            workout("W1", "edited").with_updated_at(at(12)),
        ];

        let out = deduplicate(records, &mut report);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].updated_at, Some(at(12)));
        assert_eq!(out[0].payload["title"], "edited");
        assert_eq!(report.superseded, 1);
        assert!(report.is_clean());
    }

    #[test]
    fn test_non_null_value_beats_fresher_null() {
        let mut report = QualityReport::new();
        let stale = workout("W1", "kept").with_updated_at(at(8));
        let fresh_null = RawRecord::new(NaturalKey::new(["W1"]), json!({}))
            .with_value(serde_json::Value::Null)
            .with_updated_at(at(20));

        let out = deduplicate(vec![fresh_null, stale], &mut report);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].payload["title"], "kept");
    }

    #[test]
    fn test_load_id_breaks_freshness_tie() {
        let mut report = QualityReport::new();
        let records = vec![
            workout("W1", "a").with_updated_at(at(9)).with_load_id("1700000001"),
            workout("W1", "b").with_updated_at(at(9)).with_load_id("1700000002"),
        ];

        let out = deduplicate(records, &mut report);

        assert_eq!(out[0].payload["title"], "b");
        assert_eq!(report.ambiguous_ties, 0);
    }

    #[test]
    fn test_ambiguous_tie_is_flagged_and_deterministic() {
        let a = workout("W1", "alpha").with_updated_at(at(9));
        let b = workout("W1", "beta").with_updated_at(at(9));

        let mut report_ab = QualityReport::new();
        let out_ab = deduplicate(vec![a.clone(), b.clone()], &mut report_ab);
        let mut report_ba = QualityReport::new();
        let out_ba = deduplicate(vec![b, a], &mut report_ba);

        assert_eq!(out_ab, out_ba);
        assert_eq!(report_ab.ambiguous_ties, 1);
        assert_eq!(report_ba.ambiguous_ties, 1);
    }

    #[test]
    fn test_identical_redelivery_is_not_ambiguous() {
        let mut report = QualityReport::new();
        let record = workout("W1", "same").with_loaded_at(at(3));

        let out = deduplicate(vec![record.clone(), record], &mut report);

        assert_eq!(out.len(), 1);
        assert_eq!(report.ambiguous_ties, 0);
        assert_eq!(report.superseded, 1);
    }

    #[test]
    fn test_unkeyable_records_dropped() {
        let mut report = QualityReport::new();
        let records = vec![
            RawRecord::new(NaturalKey::default(), json!({})).with_loaded_at(at(1)),
            RawRecord::new(NaturalKey::new(["W2"]), json!({})),
            workout("W3", "ok").with_loaded_at(at(1)),
        ];

        let out = deduplicate(records, &mut report);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].key, NaturalKey::new(["W3"]));
        assert_eq!(report.unkeyable, 2);
    }

    #[test]
    fn test_dedup_is_idempotent() {
        let mut report = QualityReport::new();
        let records = vec![
            workout("W1", "a").with_updated_at(at(1)),
            workout("W1", "b").with_updated_at(at(2)),
            workout("W2", "c").with_updated_at(at(1)),
        ];

        let once = deduplicate(records, &mut report);
        let mut second_report = QualityReport::new();
        let twice = deduplicate(once.clone(), &mut second_report);

        assert_eq!(once, twice);
        assert_eq!(second_report.superseded, 0);
    }

    #[test]
    fn test_metric_samples_most_recently_loaded_wins() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let older = MetricSample::new("me", date, "steps", Some(7000.0.into()))
            .with_source("Apple Watch")
            .with_loaded_at(at(1));
        let newer = MetricSample::new("me", date, "steps", Some(8000.0.into()))
            .with_source("Apple Watch")
            .with_loaded_at(at(5));
        let other_source = MetricSample::new("me", date, "steps", Some(900.0.into()))
            .with_source("iPhone")
            .with_loaded_at(at(1));

        let mut report = QualityReport::new();
        let out = deduplicate(vec![older, newer, other_source], &mut report);

        assert_eq!(out.len(), 2);
        let watch = out
            .iter()
            .find(|s| s.source.as_deref() == Some("Apple Watch"))
            .unwrap();
        assert_eq!(watch.value, Some(8000.0.into()));
    }
}
