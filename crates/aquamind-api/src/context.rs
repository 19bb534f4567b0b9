use aquamind_core::ports::{
    BatchRepository, ObservationRepository, PlanningRepository, StateRepository,
};
use aquamind_core::services::{
    recompute_batch_window, AssimilationEngine, CancelFlag, InMemoryDedupCache,
    LiveForwardSettings, ObservationWriter, RecomputeTask, TaskQueue,
};
use aquamind_storage::{
    init_db, SqliteBatchRepository, SqliteObservationRepository, SqlitePlanningRepository,
    SqliteStateRepository,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Task queue that executes recompute tasks inline on enqueue.
///
/// The scheduled jobs are synchronous processes, so "enqueue" here means
/// "run now"; a deployment with a real queue substitutes its own
/// implementation at wiring time.
pub struct InlineTaskQueue {
    batches: Arc<dyn BatchRepository>,
    observations: Arc<dyn ObservationRepository>,
    states: Arc<dyn StateRepository>,
}

impl InlineTaskQueue {
    pub fn new(
        batches: Arc<dyn BatchRepository>,
        observations: Arc<dyn ObservationRepository>,
        states: Arc<dyn StateRepository>,
    ) -> Self {
        Self {
            batches,
            observations,
            states,
        }
    }
}

#[async_trait]
impl TaskQueue for InlineTaskQueue {
    async fn enqueue(&self, task: RecomputeTask) -> anyhow::Result<()> {
        match task {
            RecomputeTask::AssignmentWindow {
                assignment_id,
                start,
                end,
            } => {
                let engine = AssimilationEngine::for_assignment(
                    assignment_id,
                    Arc::clone(&self.batches),
                    Arc::clone(&self.observations),
                    Arc::clone(&self.states),
                )
                .await?;
                let outcome = engine
                    .recompute_range(start, Some(end), &CancelFlag::new())
                    .await?;
                tracing::info!(
                    assignment_id,
                    created = outcome.rows_created,
                    updated = outcome.rows_updated,
                    skipped = outcome.skipped,
                    "Assignment window recomputed"
                );
            }
            RecomputeTask::BatchWindow {
                batch_id,
                start,
                end,
            } => {
                let outcome = recompute_batch_window(
                    batch_id,
                    start,
                    Some(end),
                    Arc::clone(&self.batches),
                    Arc::clone(&self.observations),
                    Arc::clone(&self.states),
                )
                .await?;
                tracing::info!(
                    batch_id,
                    assignments = outcome.assignments_processed,
                    created = outcome.rows_created,
                    updated = outcome.rows_updated,
                    "Batch window recomputed"
                );
            }
        }
        Ok(())
    }
}

/// Wired repositories and services over one database.
pub struct AppContext {
    pub batches: Arc<dyn BatchRepository>,
    pub observations: Arc<dyn ObservationRepository>,
    pub states: Arc<dyn StateRepository>,
    pub planning: Arc<dyn PlanningRepository>,
    pub writer: ObservationWriter,
    pub queue: Arc<dyn TaskQueue>,
    pub dedup: Arc<InMemoryDedupCache>,
    pub settings: LiveForwardSettings,
}

impl AppContext {
    /// Open the database and wire repositories, writer and inline queue.
    pub async fn init(db_path: &str) -> anyhow::Result<Self> {
        let pool = init_db(db_path).await?;

        let batches: Arc<dyn BatchRepository> = Arc::new(SqliteBatchRepository::new(pool.clone()));
        let observations: Arc<dyn ObservationRepository> =
            Arc::new(SqliteObservationRepository::new(pool.clone()));
        let states: Arc<dyn StateRepository> = Arc::new(SqliteStateRepository::new(pool.clone()));
        let planning: Arc<dyn PlanningRepository> =
            Arc::new(SqlitePlanningRepository::new(pool.clone()));

        let queue: Arc<dyn TaskQueue> = Arc::new(InlineTaskQueue::new(
            Arc::clone(&batches),
            Arc::clone(&observations),
            Arc::clone(&states),
        ));
        let dedup = Arc::new(InMemoryDedupCache::new());

        let dedup_port: Arc<dyn aquamind_core::services::DedupCache> = dedup.clone();
        let writer = ObservationWriter::new(
            Arc::clone(&observations),
            Arc::clone(&queue),
            dedup_port,
        );

        Ok(Self {
            batches,
            observations,
            states,
            planning,
            writer,
            queue,
            dedup,
            settings: LiveForwardSettings::from_env(),
        })
    }
}
