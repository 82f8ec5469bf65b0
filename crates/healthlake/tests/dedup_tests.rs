//! Deduplication must not depend on the order records arrive in

use chrono::{TimeZone, Utc};
use healthlake::models::{NaturalKey, RawRecord};
use healthlake::transform::{deduplicate, QualityReport};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

fn records() -> Vec<RawRecord> {
    let early = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let late = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    let key = |id: &str| NaturalKey::new([id]);
    let payload = |v: i64| serde_json::json!({ "v": v });

    vec![
        // Freshness decides
        RawRecord::new(key("a"), payload(1)).with_value(payload(1)).with_loaded_at(early),
        RawRecord::new(key("a"), payload(2)).with_value(payload(2)).with_loaded_at(late),
        // A value beats a fresher null
        RawRecord::new(key("b"), payload(3)).with_value(payload(3)).with_loaded_at(early),
        RawRecord::new(key("b"), payload(4)).with_loaded_at(late),
        // Load id breaks a freshness tie
        RawRecord::new(key("c"), payload(5)).with_value(payload(5)).with_loaded_at(late).with_load_id("1"),
        RawRecord::new(key("c"), payload(6)).with_value(payload(6)).with_loaded_at(late).with_load_id("2"),
        // Nothing breaks the tie but the content itself
        RawRecord::new(key("d"), payload(7)).with_value(payload(7)).with_loaded_at(late),
        RawRecord::new(key("d"), payload(8)).with_value(payload(8)).with_loaded_at(late),
        RawRecord::new(key("e"), payload(9)).with_value(payload(9)).with_loaded_at(early),
        // Unkeyable
        RawRecord::new(NaturalKey::default(), payload(10)),
    ]
}

#[test]
fn test_winners() {
    let mut report = QualityReport::new();
    let kept = deduplicate(records(), &mut report);

    let values: Vec<(String, serde_json::Value)> = kept
        .iter()
        .map(|r| (r.key.to_string(), r.payload["v"].clone()))
        .collect();
    assert_eq!(
        values,
        vec![
            ("a".to_string(), serde_json::json!(2)),
            ("b".to_string(), serde_json::json!(3)),
            ("c".to_string(), serde_json::json!(6)),
            ("d".to_string(), serde_json::json!(7)),
            ("e".to_string(), serde_json::json!(9)),
        ]
    );
    assert_eq!(report.unkeyable, 1);
    assert_eq!(report.ambiguous_ties, 1);
    assert_eq!(report.superseded, 4);
}

#[test]
fn test_result_independent_of_arrival_order() {
    let expected = deduplicate(records(), &mut QualityReport::new());

    for seed in 0..32 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut shuffled = records();
        shuffled.shuffle(&mut rng);

        let mut report = QualityReport::new();
        assert_eq!(deduplicate(shuffled, &mut report), expected, "seed {}", seed);
        assert_eq!(report.ambiguous_ties, 1);
    }
}
