use crate::calc::{MortalityCalculator, TgcCalculator};
use crate::domain::{
    Anchor, Assignment, Batch, DailyState, DomainError, LifecycleStage, Scenario, SourceTag,
    Sourced, StateProvenance,
};
use crate::ports::{BatchRepository, ObservationRepository, StateRepository, UpsertCounts};
use crate::services::anchors::AnchorSetBuilder;
use crate::stage::StageConstraintSet;
use chrono::{Days, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::round2;

/// Cooperative cancellation flag for recompute tasks.
///
/// Checked between the load and write phases: a cancelled run either commits
/// the whole window or writes nothing.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of one assimilation window.
#[derive(Debug, Clone, Default)]
pub struct RecomputeOutcome {
    pub rows_created: u64,
    pub rows_updated: u64,
    pub anchors_found: usize,
    pub skipped: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl RecomputeOutcome {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }
}

/// Aggregate outcome of a batch-level recompute.
#[derive(Debug, Clone, Default)]
pub struct BatchRecomputeOutcome {
    pub batch_id: i64,
    pub assignments_processed: u64,
    pub rows_created: u64,
    pub rows_updated: u64,
    pub errors: Vec<String>,
}

/// All observation inputs for a window, loaded once.
struct DailyInputs {
    anchors: HashMap<NaiveDate, Anchor>,
    temperatures: HashMap<NaiveDate, f64>,
    mortality: HashMap<NaiveDate, i64>,
    feeding: HashMap<NaiveDate, f64>,
    placements: HashMap<NaiveDate, i64>,
}

struct SeedState {
    weight: f64,
    population: i64,
    biomass: f64,
    stage: LifecycleStage,
}

/// Reconstructs a dense daily state series for one assignment.
///
/// All inputs for the window are bulk-loaded up front; the day loop itself
/// never touches the repositories. The finished window is written back in a
/// single transaction, so overlapping or repeated runs over the same inputs
/// are idempotent.
pub struct AssimilationEngine {
    assignment: Assignment,
    batch: Batch,
    scenario: Scenario,
    tgc: TgcCalculator,
    mortality: MortalityCalculator,
    constraints: StageConstraintSet,
    batches: Arc<dyn BatchRepository>,
    observations: Arc<dyn ObservationRepository>,
    states: Arc<dyn StateRepository>,
}

impl AssimilationEngine {
    /// Load the assignment, its batch and the governing scenario.
    pub async fn for_assignment(
        assignment_id: i64,
        batches: Arc<dyn BatchRepository>,
        observations: Arc<dyn ObservationRepository>,
        states: Arc<dyn StateRepository>,
    ) -> anyhow::Result<Self> {
        let assignment = batches
            .assignment(assignment_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("assignment {}", assignment_id)))?;
        let batch = batches
            .batch(assignment.batch_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("batch {}", assignment.batch_id)))?;
        let scenario = batches
            .scenario_for_batch(batch.id)
            .await?
            .ok_or_else(|| {
                DomainError::Configuration(format!(
                    "No scenario for batch {}; pin a scenario to enable assimilation",
                    batch.batch_number
                ))
            })?;

        Ok(Self::new(
            assignment,
            batch,
            scenario,
            batches,
            observations,
            states,
        ))
    }

    pub fn new(
        assignment: Assignment,
        batch: Batch,
        scenario: Scenario,
        batches: Arc<dyn BatchRepository>,
        observations: Arc<dyn ObservationRepository>,
        states: Arc<dyn StateRepository>,
    ) -> Self {
        let tgc = TgcCalculator::new(&scenario.tgc_model);
        let mortality = MortalityCalculator::new(&scenario.mortality_model);
        let constraints =
            StageConstraintSet::from_constraints(scenario.biological_constraints.as_ref());

        Self {
            assignment,
            batch,
            scenario,
            tgc,
            mortality,
            constraints,
            batches,
            observations,
            states,
        }
    }

    /// Recompute daily states over `[start, end]` (end defaults to today).
    ///
    /// The window is clipped to the assignment's own bounds: nothing before
    /// the assignment date, nothing on or after departure. An empty clipped
    /// window returns a skipped outcome, not an error.
    pub async fn recompute_range(
        &self,
        start: NaiveDate,
        end: Option<NaiveDate>,
        cancel: &CancelFlag,
    ) -> anyhow::Result<RecomputeOutcome> {
        let end = end.unwrap_or_else(|| Utc::now().date_naive());
        if start > end {
            anyhow::bail!("start_date ({}) must be <= end_date ({})", start, end);
        }

        let mut start = start;
        let mut end = end;

        if start < self.assignment.assignment_date {
            start = self.assignment.assignment_date;
        }
        if start > end {
            return Ok(RecomputeOutcome::skipped());
        }
        if let Some(departure) = self.assignment.departure_date {
            if end >= departure {
                match departure.checked_sub_days(Days::new(1)) {
                    Some(last) if start <= last => end = last,
                    _ => return Ok(RecomputeOutcome::skipped()),
                }
            }
        }

        let inputs = self.bulk_load(start, end).await?;
        let seed = self.initial_state(start).await?;

        let mut outcome = RecomputeOutcome {
            anchors_found: inputs.anchors.len(),
            ..Default::default()
        };

        let mut states = Vec::with_capacity((end - start).num_days() as usize + 1);
        let mut prev_weight = seed.weight;
        let mut prev_population = seed.population;
        let mut prev_biomass = seed.biomass;
        let mut current_stage = seed.stage;

        let mut current = start;
        while current <= end {
            let state = self.daily_step(
                &inputs,
                current,
                prev_weight,
                prev_population,
                prev_biomass,
                current_stage,
                &mut outcome.warnings,
            );

            prev_weight = state.avg_weight_g;
            prev_population = state.population;
            prev_biomass = state.biomass_kg;
            current_stage = state.lifecycle_stage;

            states.push(state);
            current = current.succ_opt().expect("date overflow");
        }

        if cancel.is_cancelled() {
            tracing::info!(
                assignment_id = self.assignment.id,
                "Recompute cancelled before write; window skipped"
            );
            outcome.skipped = true;
            outcome.warnings.push("cancelled before write".to_string());
            return Ok(outcome);
        }

        let UpsertCounts { created, updated } = self.states.upsert_daily_states(&states).await?;
        outcome.rows_created = created;
        outcome.rows_updated = updated;

        tracing::debug!(
            assignment_id = self.assignment.id,
            created,
            updated,
            anchors = outcome.anchors_found,
            "Assimilation window written"
        );

        Ok(outcome)
    }

    /// One bulk query per source; the day loop reads only these maps.
    async fn bulk_load(&self, start: NaiveDate, end: NaiveDate) -> anyhow::Result<DailyInputs> {
        let anchors = AnchorSetBuilder::new(Arc::clone(&self.observations))
            .build(self.assignment.id, start, end)
            .await?;

        let temperatures = self
            .observations
            .daily_mean_temperatures(self.assignment.container_id, start, end)
            .await?;

        let mortality = self
            .observations
            .mortality_totals(self.assignment.id, start, end)
            .await?;

        let feeding = self
            .observations
            .feeding_totals(self.assignment.container_id, start, end)
            .await?;

        let mut placements: HashMap<NaiveDate, i64> = HashMap::new();
        for transfer in self
            .observations
            .completed_transfers_in(self.assignment.id, start, end)
            .await?
        {
            if let Some(date) = transfer.actual_execution_date {
                *placements.entry(date).or_insert(0) += transfer.transferred_count;
            }
        }

        Ok(DailyInputs {
            anchors,
            temperatures,
            mortality,
            feeding,
            placements,
        })
    }

    /// Seed the loop from the last computed state before the window, or
    /// bootstrap from the assignment.
    async fn initial_state(&self, start: NaiveDate) -> anyhow::Result<SeedState> {
        if let Some(prev) = self
            .states
            .latest_state_before(self.assignment.id, start)
            .await?
        {
            return Ok(SeedState {
                weight: prev.avg_weight_g,
                population: prev.population,
                biomass: prev.biomass_kg,
                stage: prev.lifecycle_stage,
            });
        }

        let weight = self.bootstrap_weight().await?;

        let mut population = self.assignment.population_count;
        // A transfer destination gets its fish through the placement on the
        // assignment date; seeding the count too would double-count them.
        let arrivals = self
            .observations
            .completed_transfers_in(
                self.assignment.id,
                self.assignment.assignment_date,
                self.assignment.assignment_date,
            )
            .await?;
        if !arrivals.is_empty() {
            population = 0;
        }

        Ok(SeedState {
            weight,
            population,
            biomass: population as f64 * weight / 1000.0,
            stage: self.assignment.lifecycle_stage,
        })
    }

    /// Bootstrap weight fallback chain.
    ///
    /// Transfer evidence is consulted before the assignment's own
    /// avg_weight_g: the event pipeline writes the destination stage's
    /// minimum weight into new assignments during transfers, and trusting it
    /// would spike the series at every stage transition.
    async fn bootstrap_weight(&self) -> anyhow::Result<f64> {
        if let Some(transfer) = self.observations.transfer_into(self.assignment.id).await? {
            if let Some(measured) = transfer.measured_avg_weight_g {
                return Ok(measured);
            }
            if let Some(source_id) = transfer.source_assignment_id {
                if let Some(last) = self.states.latest_state(source_id).await? {
                    return Ok(last.avg_weight_g);
                }
                // Source never assimilated: its recorded weight is still a
                // better seed than the destination's.
                if let Some(source) = self.batches.assignment(source_id).await? {
                    if let Some(weight) = source.avg_weight_g {
                        return Ok(weight);
                    }
                }
            }
        }

        if let Some(weight) = self.assignment.avg_weight_g {
            return Ok(weight);
        }

        if let Some(min) = self
            .constraints
            .configured_min_weight(self.assignment.lifecycle_stage)
        {
            return Ok(min);
        }

        if let Some(initial) = self.scenario.initial_weight_g {
            return Ok(initial);
        }

        let (band_min, _) = self.assignment.lifecycle_stage.expected_weight_range();
        if band_min > 0.0 {
            return Ok(band_min);
        }

        Ok(1.0)
    }

    /// Compute one day from the preloaded inputs. No repository access.
    #[allow(clippy::too_many_arguments)]
    fn daily_step(
        &self,
        inputs: &DailyInputs,
        date: NaiveDate,
        prev_weight: f64,
        prev_population: i64,
        prev_biomass: f64,
        current_stage: LifecycleStage,
        warnings: &mut Vec<String>,
    ) -> DailyState {
        // Temperature: sensor mean, else profile by batch day number.
        let day_number = (date - self.batch.start_date).num_days() + 1;
        let (temp_c, temp_sourced) = match inputs.temperatures.get(&date) {
            Some(&t) => (Some(t), Sourced::new(SourceTag::Measured, 1.0)),
            None => match self.tgc.profile() {
                Some(profile) => (
                    Some(profile.temperature_for_day(day_number)),
                    Sourced::new(SourceTag::Profile, 0.5),
                ),
                None => (None, Sourced::none()),
            },
        };

        // Weight: anchor wins, then TGC growth, then carry forward. Kept at
        // storage precision so the row and the next day's input agree.
        let anchor = inputs.anchors.get(&date);
        let (new_weight, weight_sourced) = match (anchor, temp_c) {
            (Some(anchor), _) => (
                round2(anchor.weight_g),
                Sourced::new(SourceTag::Measured, anchor.confidence),
            ),
            (None, Some(temp)) => (
                round2(self.tgc.grow(prev_weight, temp, 1, Some(current_stage))),
                Sourced::new(SourceTag::TgcComputed, temp_sourced.confidence.min(0.8)),
            ),
            (None, None) => (prev_weight, Sourced::new(SourceTag::Unchanged, 0.3)),
        };

        // Mortality: observed events win, else the model rate.
        let observed_mortality = inputs.mortality.get(&date).copied().unwrap_or(0);
        let (mortality_count, mortality_sourced) = if observed_mortality > 0 {
            (observed_mortality, Sourced::new(SourceTag::Actual, 1.0))
        } else {
            let rate = self
                .mortality
                .rate_for(Some(current_stage), crate::domain::RateFrequency::Daily);
            (
                (prev_population as f64 * rate).round() as i64,
                Sourced::new(SourceTag::Model, 0.4),
            )
        };

        // Feed: observed only.
        let feed_kg = inputs.feeding.get(&date).copied().unwrap_or(0.0);
        let feed_sourced = if feed_kg > 0.0 {
            Sourced::new(SourceTag::Actual, 1.0)
        } else {
            Sourced::none()
        };

        let placements_in = inputs.placements.get(&date).copied().unwrap_or(0);

        let new_population = (prev_population + placements_in - mortality_count).max(0);
        if prev_population + placements_in - mortality_count < 0 {
            warnings.push(format!(
                "{}: mortality {} exceeds population {}; clamped at 0",
                date,
                mortality_count,
                prev_population + placements_in
            ));
        }

        let new_biomass = new_population as f64 * new_weight / 1000.0;

        // Observed FCR, only when both feed and a meaningful gain exist.
        let biomass_gain = new_biomass - prev_biomass;
        let (observed_fcr, fcr_sourced) = if feed_kg > 0.0 && biomass_gain > 1.0 {
            let fcr = (feed_kg / biomass_gain).min(10.0);
            if fcr > 3.0 {
                warnings.push(format!(
                    "{}: observed FCR {:.2} above 3.0; check feed records",
                    date, fcr
                ));
            }
            (Some(fcr), Some(Sourced::new(SourceTag::Observed, 1.0)))
        } else {
            (None, None)
        };

        let new_stage = self.constraints.transition_by_weight(current_stage, new_weight);

        DailyState {
            assignment_id: self.assignment.id,
            batch_id: self.batch.id,
            container_id: self.assignment.container_id,
            lifecycle_stage: new_stage,
            date,
            day_number,
            avg_weight_g: new_weight,
            population: new_population,
            biomass_kg: round2(new_biomass),
            temp_c: temp_c.map(round2),
            mortality_count,
            feed_kg: round2(feed_kg),
            observed_fcr: observed_fcr.map(|f| (f * 1000.0).round() / 1000.0),
            anchor_type: anchor.map(|a| a.kind),
            provenance: StateProvenance {
                weight: weight_sourced,
                temp: temp_sourced,
                mortality: mortality_sourced,
                feed: feed_sourced,
                fcr: fcr_sourced,
            },
        }
    }
}

/// Recompute every assignment of a batch that overlaps the window.
pub async fn recompute_batch_window(
    batch_id: i64,
    start: NaiveDate,
    end: Option<NaiveDate>,
    batches: Arc<dyn BatchRepository>,
    observations: Arc<dyn ObservationRepository>,
    states: Arc<dyn StateRepository>,
) -> anyhow::Result<BatchRecomputeOutcome> {
    let end_date = end.unwrap_or_else(|| Utc::now().date_naive());
    let assignments = batches
        .assignments_for_batch(batch_id, start, end_date)
        .await?;

    let mut outcome = BatchRecomputeOutcome {
        batch_id,
        ..Default::default()
    };

    let cancel = CancelFlag::new();
    for assignment in assignments {
        let assignment_id = assignment.id;
        let engine = match AssimilationEngine::for_assignment(
            assignment_id,
            Arc::clone(&batches),
            Arc::clone(&observations),
            Arc::clone(&states),
        )
        .await
        {
            Ok(engine) => engine,
            Err(e) => {
                tracing::error!(assignment_id, error = %e, "Skipping assignment");
                outcome.errors.push(format!("assignment {}: {}", assignment_id, e));
                continue;
            }
        };

        match engine.recompute_range(start, Some(end_date), &cancel).await {
            Ok(result) if !result.skipped => {
                outcome.assignments_processed += 1;
                outcome.rows_created += result.rows_created;
                outcome.rows_updated += result.rows_updated;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(assignment_id, error = %e, "Recompute failed");
                outcome.errors.push(format!("assignment {}: {}", assignment_id, e));
            }
        }
    }

    tracing::info!(
        batch_id,
        assignments = outcome.assignments_processed,
        created = outcome.rows_created,
        updated = outcome.rows_updated,
        "Batch recompute finished"
    );

    Ok(outcome)
}
