use crate::domain::PlannedActivityKind;
use async_trait::async_trait;

/// External planning collaborator: tells the summarizer whether a harvest or
/// transfer is already planned for a batch.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PlanningRepository: Send + Sync {
    /// True when a PENDING or IN_PROGRESS activity of this kind exists.
    async fn has_pending_activity(
        &self,
        batch_id: i64,
        kind: PlannedActivityKind,
    ) -> anyhow::Result<bool>;
}
