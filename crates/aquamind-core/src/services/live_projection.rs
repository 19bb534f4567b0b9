use crate::calc::{mortality_seed, MortalityCalculator, TgcCalculator};
use crate::domain::{
    Assignment, Batch, DailyState, DomainError, LiveForwardProjection, RateFrequency, Scenario,
};
use crate::ports::{BatchRepository, PlanningRepository, StateRepository};
use crate::services::forecast::{self, ForecastThresholds, SummaryInputs};
use crate::services::settings::LiveForwardSettings;
use crate::stage::{StageConstraintSet, StageSchedule};
use chrono::{Days, NaiveDate, Utc};
use std::sync::Arc;

use super::round2;

/// Outcome of one live forward run.
#[derive(Debug, Clone, Default)]
pub struct LiveRunOutcome {
    pub success: bool,
    pub error: Option<String>,
    pub assignment_id: i64,
    pub rows_created: u64,
    pub start_day: i64,
    pub horizon_days: i64,
    pub bias_c: f64,
    pub bias_window_days: i64,
}

/// Temperature bias derived from recent sensor-sourced states.
#[derive(Debug, Clone, Copy, PartialEq)]
struct TempBias {
    bias_c: f64,
    raw_bias_c: f64,
    window_days_used: i64,
    clamped: bool,
}

/// Projects an assignment forward from its latest assimilated state.
///
/// Future temperatures are profile values shifted by the sensor bias; growth
/// is TGC with time-based stage transitions, mirroring the scenario
/// projection so the two never disagree on stage timing. Persistence is
/// idempotent per (assignment, computed_date).
pub struct LiveProjectionEngine {
    assignment: Assignment,
    batch: Batch,
    scenario: Scenario,
    tgc: TgcCalculator,
    mortality: MortalityCalculator,
    schedule: StageSchedule,
    constraints: StageConstraintSet,
    settings: LiveForwardSettings,
    batches: Arc<dyn BatchRepository>,
    states: Arc<dyn StateRepository>,
    planning: Arc<dyn PlanningRepository>,
}

impl LiveProjectionEngine {
    pub async fn for_assignment(
        assignment_id: i64,
        batches: Arc<dyn BatchRepository>,
        states: Arc<dyn StateRepository>,
        planning: Arc<dyn PlanningRepository>,
        settings: LiveForwardSettings,
    ) -> anyhow::Result<Self> {
        let assignment = batches
            .assignment(assignment_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("assignment {}", assignment_id)))?;
        let batch = batches
            .batch(assignment.batch_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("batch {}", assignment.batch_id)))?;

        let scenario = batches.scenario_for_batch(batch.id).await?.ok_or_else(|| {
            DomainError::Configuration(format!(
                "No scenario available for batch {}. Pin a projection run or assign a scenario.",
                batch.batch_number
            ))
        })?;

        let tgc = TgcCalculator::new(&scenario.tgc_model);
        let mortality = MortalityCalculator::new(&scenario.mortality_model);
        let schedule = StageSchedule::from_fcr_model(&scenario.fcr_model);
        let constraints =
            StageConstraintSet::from_constraints(scenario.biological_constraints.as_ref());

        Ok(Self {
            assignment,
            batch,
            scenario,
            tgc,
            mortality,
            schedule,
            constraints,
            settings,
            batches,
            states,
            planning,
        })
    }

    /// Compute and persist one generation of projections, then refresh the
    /// forecast summary and apply retention.
    pub async fn compute_and_store(
        &self,
        computed_date: Option<NaiveDate>,
    ) -> anyhow::Result<LiveRunOutcome> {
        let computed_date = computed_date.unwrap_or_else(|| Utc::now().date_naive());

        let Some(latest_state) = self.states.latest_state(self.assignment.id).await? else {
            tracing::warn!(
                assignment_id = self.assignment.id,
                "No actual state; cannot compute live projection"
            );
            return Ok(LiveRunOutcome {
                success: false,
                error: Some("No actual state available".to_string()),
                assignment_id: self.assignment.id,
                ..Default::default()
            });
        };

        let bias = self.temperature_bias(&latest_state).await?;

        let start_day = latest_state.day_number;
        let remaining_days = self.scenario.duration_days - start_day;
        let horizon_days = remaining_days.min(self.settings.max_horizon_days);

        if horizon_days <= 0 {
            tracing::info!(
                assignment_id = self.assignment.id,
                start_day,
                "At or past scenario end; nothing to project"
            );
            return Ok(LiveRunOutcome {
                success: true,
                assignment_id: self.assignment.id,
                start_day,
                ..Default::default()
            });
        }

        tracing::info!(
            assignment_id = self.assignment.id,
            start_day,
            horizon_days,
            bias_c = bias.bias_c,
            "Computing live forward projection"
        );

        let projections = self.project_forward(&latest_state, horizon_days, computed_date, bias);

        self.states
            .replace_live_projections(self.assignment.id, computed_date, &projections)
            .await?;

        self.update_forecast_summary(&latest_state, &projections, computed_date, bias)
            .await?;

        // Retention: drop aged generations, thin the middle-aged ones.
        if let Some(cutoff) =
            computed_date.checked_sub_days(Days::new(self.settings.retention_days as u64))
        {
            self.states
                .prune_live_projections(self.assignment.id, cutoff)
                .await?;
        }
        if let Some(cutoff) =
            computed_date.checked_sub_days(Days::new(self.settings.compress_after_days as u64))
        {
            self.states
                .compress_live_projections(self.assignment.id, cutoff)
                .await?;
        }

        Ok(LiveRunOutcome {
            success: true,
            error: None,
            assignment_id: self.assignment.id,
            rows_created: projections.len() as u64,
            start_day,
            horizon_days,
            bias_c: bias.bias_c,
            bias_window_days: bias.window_days_used,
        })
    }

    /// Mean sensor-vs-profile delta over the recent window, clamped to the
    /// configured bounds. Only states whose temperature came from a sensor
    /// count; profile-sourced days would bias the bias.
    async fn temperature_bias(&self, latest_state: &DailyState) -> anyhow::Result<TempBias> {
        let window_start = latest_state.date
            - Days::new(self.settings.bias_window_days.max(0) as u64);
        let recent = self
            .states
            .states_in_range(self.assignment.id, window_start, latest_state.date)
            .await?;

        let mut deltas = Vec::new();
        for state in &recent {
            let Some(temp) = state.temp_c else { continue };
            if !state.provenance.temp.tag.is_sensor_derived() {
                continue;
            }
            let profile_temp = self.tgc.temperature_for_day(state.day_number);
            if profile_temp > 0.0 {
                deltas.push(temp - profile_temp);
            }
        }

        let (raw, clamped_value) = if deltas.is_empty() {
            (0.0, 0.0)
        } else {
            let raw = deltas.iter().sum::<f64>() / deltas.len() as f64;
            let (min, max) = self.settings.bias_clamp_c;
            (raw, raw.clamp(min, max))
        };

        let bias = TempBias {
            bias_c: round2(clamped_value),
            raw_bias_c: round2(raw),
            window_days_used: deltas.len() as i64,
            clamped: (raw - clamped_value).abs() > 0.01,
        };

        tracing::debug!(
            assignment_id = self.assignment.id,
            bias_c = bias.bias_c,
            raw = bias.raw_bias_c,
            days = bias.window_days_used,
            clamped = bias.clamped,
            "Temperature bias computed"
        );

        Ok(bias)
    }

    fn project_forward(
        &self,
        start_state: &DailyState,
        horizon_days: i64,
        computed_date: NaiveDate,
        bias: TempBias,
    ) -> Vec<LiveForwardProjection> {
        let mut projections = Vec::with_capacity(horizon_days as usize);

        let mut current_weight = start_state.avg_weight_g;
        let mut current_population = start_state.population;
        let mut current_stage = start_state.lifecycle_stage;

        let (profile_id, profile_name) = match self.tgc.profile() {
            Some(p) => (Some(p.id), p.name.clone()),
            None => (None, String::new()),
        };

        for day_offset in 1..=horizon_days {
            let projection_date = start_state.date + Days::new(day_offset as u64);
            let day_number = start_state.day_number + day_offset;

            // Days at or before the run date belong to assimilation, not to
            // the forward projection.
            if projection_date <= computed_date {
                continue;
            }

            let new_stage = self.schedule.stage_for_day(day_number);
            if new_stage != current_stage {
                tracing::debug!(
                    day_number,
                    from = %current_stage,
                    to = %new_stage,
                    "Stage transition in live projection"
                );
                current_stage = new_stage;
            }

            let profile_temp = self.tgc.temperature_for_day(day_number);
            let temp_used = profile_temp + bias.bias_c;

            let new_weight =
                round2(self.tgc.grow(current_weight, temp_used, 1, Some(current_stage)));

            let rate = self
                .mortality
                .rate_for(Some(current_stage), RateFrequency::Daily);
            let mortality = self.mortality.daily_mortality(
                current_population,
                Some(rate),
                mortality_seed(self.assignment.id, projection_date),
            );
            let new_population = mortality.surviving.max(0);
            let new_biomass = new_weight * new_population as f64 / 1000.0;

            projections.push(LiveForwardProjection {
                assignment_id: self.assignment.id,
                batch_id: self.batch.id,
                container_id: self.assignment.container_id,
                computed_date,
                projection_date,
                day_number,
                projected_weight_g: new_weight,
                projected_population: new_population,
                projected_biomass_kg: round2(new_biomass),
                temperature_used_c: round2(temp_used),
                tgc_value_used: (self.tgc.tgc_for_stage(Some(current_stage)) * 10_000.0).round()
                    / 10_000.0,
                temp_profile_id: profile_id,
                temp_profile_name: profile_name.clone(),
                temp_bias_c: bias.bias_c,
                temp_bias_window_days: bias.window_days_used,
                temp_bias_clamp_min_c: self.settings.bias_clamp_c.0,
                temp_bias_clamp_max_c: self.settings.bias_clamp_c.1,
            });

            current_weight = new_weight;
            current_population = new_population;
        }

        projections
    }

    async fn update_forecast_summary(
        &self,
        latest_state: &DailyState,
        projections: &[LiveForwardProjection],
        computed_date: NaiveDate,
        bias: TempBias,
    ) -> anyhow::Result<()> {
        let thresholds = ForecastThresholds::from_constraints(&self.constraints);

        let has_planned_harvest = self
            .planning
            .has_pending_activity(self.batch.id, crate::domain::PlannedActivityKind::Harvest)
            .await?;
        let has_planned_transfer = self
            .planning
            .has_pending_activity(self.batch.id, crate::domain::PlannedActivityKind::Transfer)
            .await?;

        let original_harvest_date = self.original_harvest_date(thresholds.harvest_g).await?;

        let summary = forecast::build_summary(SummaryInputs {
            latest_state,
            projections,
            computed_date,
            thresholds,
            original_harvest_date,
            has_planned_harvest,
            has_planned_transfer,
            attention_threshold_days: self.settings.attention_threshold_days,
            temp_profile_name: self
                .tgc
                .profile()
                .map(|p| p.name.clone())
                .unwrap_or_default(),
            temp_bias_c: bias.bias_c,
            temp_bias_window_days: bias.window_days_used,
        });

        self.states.upsert_forecast_summary(&summary).await
    }

    /// Planned harvest date: when the batch pins a projection run, the first
    /// stored projection of that run's scenario crossing the harvest
    /// threshold.
    async fn original_harvest_date(
        &self,
        harvest_threshold_g: f64,
    ) -> anyhow::Result<Option<NaiveDate>> {
        let Some(run_id) = self.batch.pinned_projection_run_id else {
            return Ok(None);
        };
        let Some(run) = self.batches.projection_run(run_id).await? else {
            tracing::warn!(run_id, "Pinned projection run missing");
            return Ok(None);
        };

        let crossing = self
            .states
            .first_projection_at_or_above(run.scenario_id, harvest_threshold_g)
            .await?;

        Ok(crossing.map(|p| p.projection_date))
    }
}
