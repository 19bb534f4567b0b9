use crate::ports::BatchRepository;
use crate::services::dispatcher::{batch_dedup_key, DedupCache, RecomputeTask, TaskQueue, RECOMPUTE_DEDUP_TTL};
use chrono::{Days, NaiveDate};
use std::sync::Arc;

/// Default lookback window for the periodic catch-up.
pub const DEFAULT_CATCHUP_DAYS: u64 = 7;

/// Result of one catch-up sweep.
#[derive(Debug, Clone, Default)]
pub struct CatchUpOutcome {
    pub batches_seen: u64,
    pub enqueued: u64,
    pub skipped_no_scenario: u64,
    pub dry_run: bool,
    /// Tasks that were (or, in dry-run, would have been) enqueued.
    pub tasks: Vec<RecomputeTask>,
}

/// Fleet-wide recompute over a recent window.
///
/// Walks every ACTIVE batch with a governing scenario (optionally one batch
/// only) and enqueues a batch-level recompute covering the last `days` days.
/// This is the safety net behind the event-driven dispatcher: whatever the
/// dispatcher missed, this sweep repairs.
pub async fn recompute_recent(
    batches: Arc<dyn BatchRepository>,
    queue: Arc<dyn TaskQueue>,
    dedup: Arc<dyn DedupCache>,
    batch_id: Option<i64>,
    days: u64,
    dry_run: bool,
    today: NaiveDate,
) -> anyhow::Result<CatchUpOutcome> {
    let start = today - Days::new(days);

    let mut outcome = CatchUpOutcome {
        dry_run,
        ..Default::default()
    };

    for batch in batches.active_batches(batch_id).await? {
        outcome.batches_seen += 1;

        if batches.scenario_for_batch(batch.id).await?.is_none() {
            tracing::warn!(
                batch_id = batch.id,
                batch_number = %batch.batch_number,
                "Batch has no scenario; skipping catch-up recompute"
            );
            outcome.skipped_no_scenario += 1;
            continue;
        }

        let task = RecomputeTask::BatchWindow {
            batch_id: batch.id,
            start,
            end: today,
        };

        if dry_run {
            outcome.tasks.push(task);
            continue;
        }

        let key = batch_dedup_key(batch.id, today);
        let fresh = match dedup.add(&key, RECOMPUTE_DEDUP_TTL).await {
            Ok(fresh) => fresh,
            Err(e) => {
                tracing::warn!(batch_id = batch.id, error = %e, "Dedup cache unavailable; enqueueing anyway");
                true
            }
        };
        if !fresh {
            continue;
        }

        match queue.enqueue(task.clone()).await {
            Ok(()) => {
                outcome.enqueued += 1;
                outcome.tasks.push(task);
            }
            Err(e) => {
                tracing::warn!(batch_id = batch.id, error = %e, "Failed to enqueue catch-up recompute");
            }
        }
    }

    tracing::info!(
        batches = outcome.batches_seen,
        enqueued = outcome.enqueued,
        skipped = outcome.skipped_no_scenario,
        dry_run,
        "Catch-up sweep finished"
    );

    Ok(outcome)
}
