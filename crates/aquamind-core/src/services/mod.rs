pub mod anchors;
pub mod assimilation;
pub mod dispatcher;
pub mod forecast;
pub mod live_projection;
pub mod mortality;
pub mod projection;
pub mod scheduler;
pub mod settings;

#[cfg(test)]
pub(crate) mod test_support;

#[cfg(test)]
mod assimilation_tests;



pub use anchors::AnchorSetBuilder;
pub use assimilation::{
    recompute_batch_window, AssimilationEngine, BatchRecomputeOutcome, CancelFlag,
    RecomputeOutcome,
};
pub use dispatcher::{
    assignment_dedup_key, batch_dedup_key, DedupCache, InMemoryDedupCache, ObservationWriter,
    RecomputeTask, TaskQueue,
};
pub use forecast::{build_summary, find_crossing, ForecastThresholds, SummaryInputs};
pub use live_projection::{LiveProjectionEngine, LiveRunOutcome};
pub use mortality::distribute_mortality;
pub use projection::{
    ProjectionEngine, ProjectionOutcome, ProjectionSummary, SensitivityOutcome,
    SensitivityParameter,
};
pub use scheduler::{recompute_recent, CatchUpOutcome, DEFAULT_CATCHUP_DAYS};
pub use settings::LiveForwardSettings;

/// Round to two decimals, the precision daily states and projections are
/// stored at.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
