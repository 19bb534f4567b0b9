use crate::domain::{
    EnvironmentalReading, FeedingEvent, GrowthSample, MortalityApplication, MortalityEvent,
    TransferAction, Treatment,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;

/// Access to the observation stream: samples, transfers, treatments, sensor
/// readings, mortality and feeding.
///
/// Read methods are bulk-by-window so an assimilation run touches the store
/// once per source, never once per day.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ObservationRepository: Send + Sync {
    /// Growth samples with a measured weight for an assignment in a window.
    async fn growth_samples(
        &self,
        assignment_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<GrowthSample>>;

    /// Completed transfers out of an assignment in a window.
    async fn completed_transfers_out(
        &self,
        source_assignment_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<TransferAction>>;

    /// Completed transfers into an assignment in a window (placements).
    async fn completed_transfers_in(
        &self,
        dest_assignment_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<TransferAction>>;

    /// First completed transfer into an assignment, regardless of date.
    /// Used to bootstrap a transfer destination's weight.
    async fn transfer_into(
        &self,
        dest_assignment_id: i64,
    ) -> anyhow::Result<Option<TransferAction>>;

    /// (date, avg weight) pairs from treatments that included weighing.
    async fn treatment_weighings(
        &self,
        assignment_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<(NaiveDate, f64)>>;

    /// Per-day mean water temperature for a container in a window.
    async fn daily_mean_temperatures(
        &self,
        container_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<HashMap<NaiveDate, f64>>;

    /// Per-day observed mortality totals for an assignment, from the
    /// persisted event allocations.
    async fn mortality_totals(
        &self,
        assignment_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<HashMap<NaiveDate, i64>>;

    /// Per-day feed totals for a container in a window.
    async fn feeding_totals(
        &self,
        container_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<HashMap<NaiveDate, f64>>;

    // ========================================================================
    // Writes (observation ingestion)
    // ========================================================================

    async fn insert_growth_sample(&self, sample: &GrowthSample) -> anyhow::Result<i64>;

    /// Persist a mortality event and distribute its count across the batch's
    /// active assignments, inside one locking transaction. Assignments
    /// depleted to zero are closed with the event date as departure date.
    async fn apply_mortality_event(
        &self,
        event: &MortalityEvent,
    ) -> anyhow::Result<MortalityApplication>;

    async fn insert_treatment(&self, treatment: &Treatment) -> anyhow::Result<i64>;

    /// Record a completed transfer with its measured weight.
    async fn insert_transfer(&self, transfer: &TransferAction) -> anyhow::Result<i64>;

    async fn insert_environmental_reading(
        &self,
        reading: &EnvironmentalReading,
    ) -> anyhow::Result<i64>;

    async fn insert_feeding_event(&self, event: &FeedingEvent) -> anyhow::Result<i64>;
}
