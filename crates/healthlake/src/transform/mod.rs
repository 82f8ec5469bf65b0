//! Transformation core: dedup, pivot, rolling series, spine join, windowing

pub mod dedup;
pub mod pivot;
pub mod registry;
pub mod report;
pub mod rolling;
pub mod rollup;
pub mod spine;
pub mod strength;
pub mod window;

pub use dedup::{deduplicate, Deduplicate};
pub use pivot::MetricPivot;
pub use registry::{Aggregation, MetricDef, MetricRegistry};
pub use report::QualityReport;
pub use rolling::{PartitionState, RollingAggregator, RollingPoint, RollingState, SeriesPoint};
pub use rollup::{ExerciseRecord, SessionOrder};
pub use spine::{date_spine, SpineJoiner, SpineOrder};
pub use strength::{dots_score, estimate_one_rep_max, Sex};
pub use window::{resolve_zone, IncrementalWindow};
