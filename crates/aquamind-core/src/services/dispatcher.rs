use crate::domain::{
    EnvironmentalReading, FeedingEvent, GrowthSample, MortalityApplication, MortalityEvent,
    TransferAction, Treatment,
};
use crate::ports::ObservationRepository;
use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Days either side of a triggering observation for an assignment window.
pub const ASSIGNMENT_WINDOW_DAYS: u64 = 2;
/// Days either side for a batch-scoped window (mortality events).
pub const BATCH_WINDOW_DAYS: u64 = 1;
/// Dedup entries expire after this long.
pub const RECOMPUTE_DEDUP_TTL: Duration = Duration::from_secs(60);

/// A queued recompute request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecomputeTask {
    AssignmentWindow {
        assignment_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    },
    BatchWindow {
        batch_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    },
}

/// Sink for recompute tasks. The CLI wires an inline executor; services and
/// tests inject fakes.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, task: RecomputeTask) -> anyhow::Result<()>;
}

/// Add-if-absent cache used to debounce recompute enqueues.
///
/// `add` returns true when the key was newly set. A broken cache must not
/// stop ingestion: callers treat errors as "not seen" and enqueue anyway.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DedupCache: Send + Sync {
    async fn add(&self, key: &str, ttl: Duration) -> anyhow::Result<bool>;
}

/// In-process dedup cache with TTL expiry.
#[derive(Default)]
pub struct InMemoryDedupCache {
    entries: Mutex<HashMap<String, Instant>>,
}

impl InMemoryDedupCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DedupCache for InMemoryDedupCache {
    async fn add(&self, key: &str, ttl: Duration) -> anyhow::Result<bool> {
        let mut entries = self.entries.lock().expect("dedup cache poisoned");
        let now = Instant::now();
        entries.retain(|_, expires| *expires > now);

        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), now + ttl);
        Ok(true)
    }
}

pub fn assignment_dedup_key(assignment_id: i64, date: NaiveDate) -> String {
    format!("recompute:dedup:{}:{}", assignment_id, date)
}

pub fn batch_dedup_key(batch_id: i64, date: NaiveDate) -> String {
    format!("recompute:dedup:batch:{}:{}", batch_id, date)
}

/// Writes observations and schedules the assimilation windows they dirty.
///
/// Only creations trigger recomputes; edits to these records are modeled as
/// delete-and-recreate upstream. Enqueueing is best effort: a dead queue or
/// cache is logged and ignored, the periodic catch-up job will repair any
/// missed window.
pub struct ObservationWriter {
    observations: Arc<dyn ObservationRepository>,
    queue: Arc<dyn TaskQueue>,
    dedup: Arc<dyn DedupCache>,
}

impl ObservationWriter {
    pub fn new(
        observations: Arc<dyn ObservationRepository>,
        queue: Arc<dyn TaskQueue>,
        dedup: Arc<dyn DedupCache>,
    ) -> Self {
        Self {
            observations,
            queue,
            dedup,
        }
    }

    /// Persist a growth sample and schedule [date-2, date+2].
    pub async fn record_growth_sample(&self, sample: GrowthSample) -> anyhow::Result<i64> {
        let id = self.observations.insert_growth_sample(&sample).await?;
        self.enqueue_assignment_window(sample.assignment_id, sample.sample_date)
            .await;
        Ok(id)
    }

    /// Persist and distribute a mortality event, then schedule a batch-level
    /// recompute over [date-1, date+1].
    pub async fn record_mortality_event(
        &self,
        event: MortalityEvent,
    ) -> anyhow::Result<MortalityApplication> {
        let application = self.observations.apply_mortality_event(&event).await?;
        self.enqueue_batch_window(event.batch_id, event.event_date)
            .await;
        Ok(application)
    }

    /// Persist a treatment; only weighed treatments anchor the series and
    /// need a recompute.
    pub async fn record_treatment(&self, treatment: Treatment) -> anyhow::Result<i64> {
        let id = self.observations.insert_treatment(&treatment).await?;
        if treatment.includes_weighing {
            self.enqueue_assignment_window(treatment.assignment_id, treatment.treatment_date)
                .await;
        }
        Ok(id)
    }

    /// Persist a completed transfer; both ends of the move get a window.
    pub async fn record_transfer(&self, transfer: TransferAction) -> anyhow::Result<i64> {
        let id = self.observations.insert_transfer(&transfer).await?;

        if let Some(date) = transfer.actual_execution_date {
            if let Some(source) = transfer.source_assignment_id {
                self.enqueue_assignment_window(source, date).await;
            }
            if let Some(dest) = transfer.dest_assignment_id {
                self.enqueue_assignment_window(dest, date).await;
            }
        }
        Ok(id)
    }

    /// Sensor readings are aggregated lazily; no recompute trigger.
    pub async fn record_environmental_reading(
        &self,
        reading: EnvironmentalReading,
    ) -> anyhow::Result<i64> {
        self.observations
            .insert_environmental_reading(&reading)
            .await
    }

    /// Feed totals are read at assimilation time; no recompute trigger.
    pub async fn record_feeding_event(&self, event: FeedingEvent) -> anyhow::Result<i64> {
        self.observations.insert_feeding_event(&event).await
    }

    async fn enqueue_assignment_window(&self, assignment_id: i64, date: NaiveDate) {
        let key = assignment_dedup_key(assignment_id, date);
        if !self.should_enqueue(&key).await {
            tracing::debug!(assignment_id, %date, "Recompute already queued; skipping");
            return;
        }

        let task = RecomputeTask::AssignmentWindow {
            assignment_id,
            start: date - Days::new(ASSIGNMENT_WINDOW_DAYS),
            end: date + Days::new(ASSIGNMENT_WINDOW_DAYS),
        };
        if let Err(e) = self.queue.enqueue(task).await {
            tracing::warn!(assignment_id, %date, error = %e, "Failed to enqueue recompute; catch-up will cover it");
        }
    }

    async fn enqueue_batch_window(&self, batch_id: i64, date: NaiveDate) {
        let key = batch_dedup_key(batch_id, date);
        if !self.should_enqueue(&key).await {
            tracing::debug!(batch_id, %date, "Batch recompute already queued; skipping");
            return;
        }

        let task = RecomputeTask::BatchWindow {
            batch_id,
            start: date - Days::new(BATCH_WINDOW_DAYS),
            end: date + Days::new(BATCH_WINDOW_DAYS),
        };
        if let Err(e) = self.queue.enqueue(task).await {
            tracing::warn!(batch_id, %date, error = %e, "Failed to enqueue batch recompute; catch-up will cover it");
        }
    }

    /// Dedup degrades open: a cache failure never blocks an enqueue.
    async fn should_enqueue(&self, key: &str) -> bool {
        match self.dedup.add(key, RECOMPUTE_DEDUP_TTL).await {
            Ok(fresh) => fresh,
            Err(e) => {
                tracing::warn!(key, error = %e, "Dedup cache unavailable; enqueueing anyway");
                true
            }
        }
    }
}
