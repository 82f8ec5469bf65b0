//! Running maximum (personal record) and previous-value lookback per partition
//!
//! Points are always sorted explicitly by (partition, order key) before
//! the scan; input order is irrelevant. An aggregator can be seeded with the
//! state left by an earlier run so that an incremental tail produces the same
//! values as a full recompute.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::report::QualityReport;

/// Input point: a value at an order key within a partition (e.g. exercise)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint<K> {
    pub partition: String,
    pub order: K,
    pub value: f64,
}

impl<K> SeriesPoint<K> {
    pub fn new(partition: impl Into<String>, order: K, value: f64) -> Self {
        Self {
            partition: partition.into(),
            order,
            value,
        }
    }
}

/// Output point with derived running max and lookback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingPoint<K> {
    pub partition: String,
    pub order: K,
    pub value: f64,
    /// Max of all values in the partition with order key <= this one
    pub running_max: f64,
    /// Value of the immediately preceding point in the partition
    pub previous_value: Option<f64>,
    /// First point to reach a new running max (strictly above all earlier points)
    pub is_new_record: bool,
}

impl<K> RollingPoint<K> {
    /// Session-over-session change
    pub fn delta(&self) -> Option<f64> {
        self.previous_value.map(|prev| self.value - prev)
    }
}

/// What a partition looks like after its last processed point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionState<K> {
    pub running_max: f64,
    pub last_value: f64,
    pub last_order: K,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingState<K> {
    partitions: BTreeMap<String, PartitionState<K>>,
}

impl<K> Default for RollingState<K> {
    fn default() -> Self {
        Self {
            partitions: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Clone> RollingState<K> {
    /// Rebuild the state from previously computed output
    pub fn from_history<'a, I>(points: I) -> Self
    where
        I: IntoIterator<Item = &'a RollingPoint<K>>,
        K: 'a,
    {
        let mut state = Self::default();
        for point in points {
            let entry = state
                .partitions
                .entry(point.partition.clone())
                .or_insert_with(|| PartitionState {
                    running_max: point.running_max,
                    last_value: point.value,
                    last_order: point.order.clone(),
                });
            if point.order >= entry.last_order {
                entry.last_value = point.value;
                entry.last_order = point.order.clone();
            }
            entry.running_max = entry.running_max.max(point.running_max);
        }
        state
    }

    pub fn get(&self, partition: &str) -> Option<&PartitionState<K>> {
        self.partitions.get(partition)
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }
}

pub struct RollingAggregator<K> {
    state: RollingState<K>,
}

impl<K: Ord + Clone> Default for RollingAggregator<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord + Clone> RollingAggregator<K> {
    pub fn new() -> Self {
        Self {
            state: RollingState::default(),
        }
    }

    /// Continue from the state of an earlier run
    pub fn with_seed(state: RollingState<K>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &RollingState<K> {
        &self.state
    }

    /// Compute rolling fields for `points`, continuing from the current state.
    ///
    /// Points at or before a partition's order key as it stood when this call
    /// started are skipped as replays, so re-delivering an overlapping batch
    /// changes nothing. Non-finite values are dropped and counted.
    pub fn compute(
        &mut self,
        points: Vec<SeriesPoint<K>>,
        report: &mut QualityReport,
    ) -> Vec<RollingPoint<K>> {
        let seeded: HashMap<String, K> = self
            .state
            .partitions
            .iter()
            .map(|(p, s)| (p.clone(), s.last_order.clone()))
            .collect();

        let mut points: Vec<SeriesPoint<K>> = points
            .into_iter()
            .filter(|p| {
                let ok = p.value.is_finite();
                if !ok {
                    report.invalid_values += 1;
                }
                ok
            })
            .collect();

        // Equal order keys put the larger value first so the record lands on it
        points.sort_by(|a, b| {
            a.partition
                .cmp(&b.partition)
                .then_with(|| a.order.cmp(&b.order))
                .then_with(|| b.value.total_cmp(&a.value))
        });

        let mut out = Vec::with_capacity(points.len());

        for point in points {
            if seeded
                .get(&point.partition)
                .is_some_and(|last| point.order <= *last)
            {
                report.replayed += 1;
                continue;
            }

            let rolled = match self.state.partitions.get_mut(&point.partition) {
                Some(state) => {
                    let is_new_record = point.value > state.running_max;
                    let previous_value = Some(state.last_value);
                    state.running_max = state.running_max.max(point.value);
                    state.last_value = point.value;
                    state.last_order = point.order.clone();
                    RollingPoint {
                        partition: point.partition,
                        order: point.order,
                        value: point.value,
                        running_max: state.running_max,
                        previous_value,
                        is_new_record,
                    }
                }
                None => {
                    self.state.partitions.insert(
                        point.partition.clone(),
                        PartitionState {
                            running_max: point.value,
                            last_value: point.value,
                            last_order: point.order.clone(),
                        },
                    );
                    RollingPoint {
                        partition: point.partition,
                        order: point.order,
                        value: point.value,
                        running_max: point.value,
                        previous_value: None,
                        is_new_record: true,
                    }
                }
            };
            out.push(rolled);
        }

        debug!(points = out.len(), partitions = self.state.len(), "Computed rolling series");
        out
    }
}
