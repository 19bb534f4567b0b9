use crate::domain::{Assignment, Batch, ProjectionRun, Scenario};
use async_trait::async_trait;
use chrono::NaiveDate;

/// Access to the slowly-changing catalog: batches, assignments, scenarios
/// and their model aggregates.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait BatchRepository: Send + Sync {
    async fn batch(&self, id: i64) -> anyhow::Result<Option<Batch>>;

    async fn assignment(&self, id: i64) -> anyhow::Result<Option<Assignment>>;

    /// Assignments of a batch whose active period overlaps the window.
    async fn assignments_for_batch(
        &self,
        batch_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<Assignment>>;

    /// ACTIVE batches, optionally narrowed to one id.
    async fn active_batches(&self, batch_id: Option<i64>) -> anyhow::Result<Vec<Batch>>;

    /// Fully assembled scenario (models, profile, constraints, changes).
    async fn scenario(&self, id: i64) -> anyhow::Result<Option<Scenario>>;

    /// Scenario governing a batch: the pinned projection run's scenario,
    /// else the pinned scenario, else the first attached one.
    async fn scenario_for_batch(&self, batch_id: i64) -> anyhow::Result<Option<Scenario>>;

    async fn projection_run(&self, id: i64) -> anyhow::Result<Option<ProjectionRun>>;

    /// Record a completed projection run for a scenario, returning its id.
    async fn create_projection_run(&self, scenario_id: i64) -> anyhow::Result<i64>;

    async fn scenario_ids(&self) -> anyhow::Result<Vec<i64>>;

    async fn create_scenario(&self, scenario: &Scenario) -> anyhow::Result<i64>;
}
