use crate::domain::{
    ContainerForecastSummary, DailyState, LiveForwardProjection, ScenarioProjection,
};
use async_trait::async_trait;
use chrono::NaiveDate;

/// Counts returned by a daily-state window write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpsertCounts {
    pub created: u64,
    pub updated: u64,
}

/// Access to computed state: daily states, projections, live forward rows
/// and forecast summaries.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait StateRepository: Send + Sync {
    /// Most recent daily state strictly before a date.
    async fn latest_state_before(
        &self,
        assignment_id: i64,
        date: NaiveDate,
    ) -> anyhow::Result<Option<DailyState>>;

    /// Most recent daily state for an assignment.
    async fn latest_state(&self, assignment_id: i64) -> anyhow::Result<Option<DailyState>>;

    /// Daily states in a closed date window, ordered by date.
    async fn states_in_range(
        &self,
        assignment_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<DailyState>>;

    /// Write a full assimilation window in one transaction: existing dates
    /// are updated in place, new dates inserted.
    async fn upsert_daily_states(&self, states: &[DailyState]) -> anyhow::Result<UpsertCounts>;

    /// Replace a scenario's stored projections (delete then bulk-insert,
    /// one transaction).
    async fn replace_scenario_projections(
        &self,
        scenario_id: i64,
        projections: &[ScenarioProjection],
    ) -> anyhow::Result<()>;

    /// First stored projection of a scenario at or above a weight, by day
    /// number. Used to recover the planned harvest date.
    async fn first_projection_at_or_above(
        &self,
        scenario_id: i64,
        weight_g: f64,
    ) -> anyhow::Result<Option<ScenarioProjection>>;

    /// Replace one generation of live projections for (assignment,
    /// computed_date); idempotent.
    async fn replace_live_projections(
        &self,
        assignment_id: i64,
        computed_date: NaiveDate,
        projections: &[LiveForwardProjection],
    ) -> anyhow::Result<()>;

    /// Live rows of one generation, ordered by projection date.
    async fn live_projections(
        &self,
        assignment_id: i64,
        computed_date: NaiveDate,
    ) -> anyhow::Result<Vec<LiveForwardProjection>>;

    /// Drop generations computed before the cutoff. Returns rows deleted.
    async fn prune_live_projections(
        &self,
        assignment_id: i64,
        computed_before: NaiveDate,
    ) -> anyhow::Result<u64>;

    /// Thin aged generations, keeping only the newest computed_date per ISO
    /// week before the cutoff. Returns rows deleted.
    async fn compress_live_projections(
        &self,
        assignment_id: i64,
        computed_before: NaiveDate,
    ) -> anyhow::Result<u64>;

    async fn upsert_forecast_summary(
        &self,
        summary: &ContainerForecastSummary,
    ) -> anyhow::Result<()>;

    async fn forecast_summary(
        &self,
        assignment_id: i64,
    ) -> anyhow::Result<Option<ContainerForecastSummary>>;
}
