//! Observation write operations.
//!
//! Thin wrappers over the core `ObservationWriter`: each persists the record
//! and lets the writer schedule whatever recompute window the observation
//! dirties (per the trigger rules, some never do).

use crate::context::AppContext;
use aquamind_core::domain::{
    EnvironmentalReading, FeedingEvent, GrowthSample, MortalityApplication, MortalityEvent,
    TransferAction, Treatment,
};

/// Record a weight sample; schedules [date-2, date+2] for the assignment.
pub async fn record_growth_sample(
    ctx: &AppContext,
    sample: GrowthSample,
) -> anyhow::Result<i64> {
    ctx.writer.record_growth_sample(sample).await
}

/// Record and distribute a mortality event; schedules a batch-level
/// [date-1, date+1] window.
pub async fn record_mortality_event(
    ctx: &AppContext,
    event: MortalityEvent,
) -> anyhow::Result<MortalityApplication> {
    ctx.writer.record_mortality_event(event).await
}

/// Record a completed transfer; both source and destination assignments get
/// a recompute window and the destination reseeds from the measured weight.
pub async fn record_transfer(
    ctx: &AppContext,
    transfer: TransferAction,
) -> anyhow::Result<i64> {
    ctx.writer.record_transfer(transfer).await
}

/// Record a treatment; only ones that include weighing anchor the series.
pub async fn record_treatment(ctx: &AppContext, treatment: Treatment) -> anyhow::Result<i64> {
    ctx.writer.record_treatment(treatment).await
}

/// Record a sensor reading; aggregated lazily at assimilation time.
pub async fn record_environmental_reading(
    ctx: &AppContext,
    reading: EnvironmentalReading,
) -> anyhow::Result<i64> {
    ctx.writer.record_environmental_reading(reading).await
}

/// Record a feeding event; read back as per-day totals.
pub async fn record_feeding_event(
    ctx: &AppContext,
    event: FeedingEvent,
) -> anyhow::Result<i64> {
    ctx.writer.record_feeding_event(event).await
}
