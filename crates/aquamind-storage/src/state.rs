use crate::models::{
    date_str, DailyStateRow, ForecastSummaryRow, LiveProjectionRow, ScenarioProjectionRow,
};
use aquamind_core::domain::{
    ContainerForecastSummary, DailyState, LiveForwardProjection, ScenarioProjection,
};
use aquamind_core::ports::{StateRepository, UpsertCounts};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use sqlx::{query, query_as, Row, SqlitePool};
use std::collections::HashSet;

pub struct SqliteStateRepository {
    pool: SqlitePool,
}

impl SqliteStateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const DAILY_STATE_COLUMNS: &str = "assignment_id, batch_id, container_id, lifecycle_stage, date, \
     day_number, avg_weight_g, population, biomass_kg, temp_c, mortality_count, feed_kg, \
     observed_fcr, anchor_type, sources, confidence_scores";

#[async_trait]
impl StateRepository for SqliteStateRepository {
    async fn latest_state_before(
        &self,
        assignment_id: i64,
        date: NaiveDate,
    ) -> anyhow::Result<Option<DailyState>> {
        let row = query_as::<_, DailyStateRow>(&format!(
            "SELECT {} FROM daily_states
             WHERE assignment_id = ? AND date < ?
             ORDER BY date DESC LIMIT 1",
            DAILY_STATE_COLUMNS
        ))
        .bind(assignment_id)
        .bind(date_str(date))
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_domain().map_err(Into::into)).transpose()
    }

    async fn latest_state(&self, assignment_id: i64) -> anyhow::Result<Option<DailyState>> {
        let row = query_as::<_, DailyStateRow>(&format!(
            "SELECT {} FROM daily_states
             WHERE assignment_id = ?
             ORDER BY date DESC LIMIT 1",
            DAILY_STATE_COLUMNS
        ))
        .bind(assignment_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_domain().map_err(Into::into)).transpose()
    }

    async fn states_in_range(
        &self,
        assignment_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<DailyState>> {
        let rows = query_as::<_, DailyStateRow>(&format!(
            "SELECT {} FROM daily_states
             WHERE assignment_id = ? AND date >= ? AND date <= ?
             ORDER BY date",
            DAILY_STATE_COLUMNS
        ))
        .bind(assignment_id)
        .bind(date_str(start))
        .bind(date_str(end))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| r.into_domain().map_err(Into::into))
            .collect()
    }

    /// Whole-window write in one transaction: existing (assignment, date)
    /// rows are updated on the fixed field list, new dates inserted.
    async fn upsert_daily_states(&self, states: &[DailyState]) -> anyhow::Result<UpsertCounts> {
        if states.is_empty() {
            return Ok(UpsertCounts::default());
        }

        let assignment_id = states[0].assignment_id;
        let min_date = states.iter().map(|s| s.date).min().expect("non-empty");
        let max_date = states.iter().map(|s| s.date).max().expect("non-empty");

        let mut tx = self.pool.begin().await?;

        let existing: HashSet<String> = query(
            "SELECT date FROM daily_states
             WHERE assignment_id = ? AND date >= ? AND date <= ?",
        )
        .bind(assignment_id)
        .bind(date_str(min_date))
        .bind(date_str(max_date))
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(|r| r.get::<String, _>("date"))
        .collect();

        let mut counts = UpsertCounts::default();

        for state in states {
            let (sources, confidence) = state.provenance.to_maps();
            let sources_json = serde_json::to_string(&sources)?;
            let confidence_json = serde_json::to_string(&confidence)?;

            query(
                "INSERT INTO daily_states
                 (assignment_id, batch_id, container_id, lifecycle_stage, date, day_number,
                  avg_weight_g, population, biomass_kg, temp_c, mortality_count, feed_kg,
                  observed_fcr, anchor_type, sources, confidence_scores)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT (assignment_id, date) DO UPDATE SET
                    batch_id = excluded.batch_id,
                    container_id = excluded.container_id,
                    lifecycle_stage = excluded.lifecycle_stage,
                    day_number = excluded.day_number,
                    avg_weight_g = excluded.avg_weight_g,
                    population = excluded.population,
                    biomass_kg = excluded.biomass_kg,
                    temp_c = excluded.temp_c,
                    mortality_count = excluded.mortality_count,
                    feed_kg = excluded.feed_kg,
                    observed_fcr = excluded.observed_fcr,
                    anchor_type = excluded.anchor_type,
                    sources = excluded.sources,
                    confidence_scores = excluded.confidence_scores",
            )
            .bind(state.assignment_id)
            .bind(state.batch_id)
            .bind(state.container_id)
            .bind(state.lifecycle_stage.as_str())
            .bind(date_str(state.date))
            .bind(state.day_number)
            .bind(state.avg_weight_g)
            .bind(state.population)
            .bind(state.biomass_kg)
            .bind(state.temp_c)
            .bind(state.mortality_count)
            .bind(state.feed_kg)
            .bind(state.observed_fcr)
            .bind(state.anchor_type.map(|a| a.as_str()))
            .bind(sources_json)
            .bind(confidence_json)
            .execute(&mut *tx)
            .await?;

            if existing.contains(&date_str(state.date)) {
                counts.updated += 1;
            } else {
                counts.created += 1;
            }
        }

        tx.commit().await?;
        Ok(counts)
    }

    async fn replace_scenario_projections(
        &self,
        scenario_id: i64,
        projections: &[ScenarioProjection],
    ) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        query("DELETE FROM scenario_projections WHERE scenario_id = ?")
            .bind(scenario_id)
            .execute(&mut *tx)
            .await?;

        for p in projections {
            query(
                "INSERT INTO scenario_projections
                 (scenario_id, projection_date, day_number, avg_weight_g, population,
                  biomass_kg, daily_feed_kg, cumulative_feed_kg, temperature_c, lifecycle_stage)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(p.scenario_id)
            .bind(date_str(p.projection_date))
            .bind(p.day_number)
            .bind(p.avg_weight_g)
            .bind(p.population)
            .bind(p.biomass_kg)
            .bind(p.daily_feed_kg)
            .bind(p.cumulative_feed_kg)
            .bind(p.temperature_c)
            .bind(p.lifecycle_stage.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn first_projection_at_or_above(
        &self,
        scenario_id: i64,
        weight_g: f64,
    ) -> anyhow::Result<Option<ScenarioProjection>> {
        let row = query_as::<_, ScenarioProjectionRow>(
            "SELECT scenario_id, projection_date, day_number, avg_weight_g, population,
                    biomass_kg, daily_feed_kg, cumulative_feed_kg, temperature_c, lifecycle_stage
             FROM scenario_projections
             WHERE scenario_id = ? AND avg_weight_g >= ?
             ORDER BY day_number LIMIT 1",
        )
        .bind(scenario_id)
        .bind(weight_g)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_domain().map_err(Into::into)).transpose()
    }

    async fn replace_live_projections(
        &self,
        assignment_id: i64,
        computed_date: NaiveDate,
        projections: &[LiveForwardProjection],
    ) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        query(
            "DELETE FROM live_forward_projections
             WHERE assignment_id = ? AND computed_date = ?",
        )
        .bind(assignment_id)
        .bind(date_str(computed_date))
        .execute(&mut *tx)
        .await?;

        for p in projections {
            query(
                "INSERT INTO live_forward_projections
                 (assignment_id, batch_id, container_id, computed_date, projection_date,
                  day_number, projected_weight_g, projected_population, projected_biomass_kg,
                  temperature_used_c, tgc_value_used, temp_profile_id, temp_profile_name,
                  temp_bias_c, temp_bias_window_days, temp_bias_clamp_min_c, temp_bias_clamp_max_c)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(p.assignment_id)
            .bind(p.batch_id)
            .bind(p.container_id)
            .bind(date_str(p.computed_date))
            .bind(date_str(p.projection_date))
            .bind(p.day_number)
            .bind(p.projected_weight_g)
            .bind(p.projected_population)
            .bind(p.projected_biomass_kg)
            .bind(p.temperature_used_c)
            .bind(p.tgc_value_used)
            .bind(p.temp_profile_id)
            .bind(&p.temp_profile_name)
            .bind(p.temp_bias_c)
            .bind(p.temp_bias_window_days)
            .bind(p.temp_bias_clamp_min_c)
            .bind(p.temp_bias_clamp_max_c)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn live_projections(
        &self,
        assignment_id: i64,
        computed_date: NaiveDate,
    ) -> anyhow::Result<Vec<LiveForwardProjection>> {
        let rows = query_as::<_, LiveProjectionRow>(
            "SELECT assignment_id, batch_id, container_id, computed_date, projection_date,
                    day_number, projected_weight_g, projected_population, projected_biomass_kg,
                    temperature_used_c, tgc_value_used, temp_profile_id, temp_profile_name,
                    temp_bias_c, temp_bias_window_days, temp_bias_clamp_min_c, temp_bias_clamp_max_c
             FROM live_forward_projections
             WHERE assignment_id = ? AND computed_date = ?
             ORDER BY projection_date",
        )
        .bind(assignment_id)
        .bind(date_str(computed_date))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| r.into_domain().map_err(Into::into))
            .collect()
    }

    async fn prune_live_projections(
        &self,
        assignment_id: i64,
        computed_before: NaiveDate,
    ) -> anyhow::Result<u64> {
        let result = query(
            "DELETE FROM live_forward_projections
             WHERE assignment_id = ? AND computed_date < ?",
        )
        .bind(assignment_id)
        .bind(date_str(computed_before))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Thin aged generations to one per ISO week (the newest in each week
    /// survives).
    async fn compress_live_projections(
        &self,
        assignment_id: i64,
        computed_before: NaiveDate,
    ) -> anyhow::Result<u64> {
        let rows = query(
            "SELECT DISTINCT computed_date FROM live_forward_projections
             WHERE assignment_id = ? AND computed_date < ?
             ORDER BY computed_date DESC",
        )
        .bind(assignment_id)
        .bind(date_str(computed_before))
        .fetch_all(&self.pool)
        .await?;

        let mut kept_weeks: HashSet<(i32, u32)> = HashSet::new();
        let mut doomed = Vec::new();
        for row in rows {
            let raw: String = row.get("computed_date");
            let date = crate::models::parse_date(&raw)?;
            let week = (date.iso_week().year(), date.iso_week().week());
            if !kept_weeks.insert(week) {
                doomed.push(raw);
            }
        }

        let mut deleted = 0;
        for raw in doomed {
            let result = query(
                "DELETE FROM live_forward_projections
                 WHERE assignment_id = ? AND computed_date = ?",
            )
            .bind(assignment_id)
            .bind(raw)
            .execute(&self.pool)
            .await?;
            deleted += result.rows_affected();
        }

        Ok(deleted)
    }

    async fn upsert_forecast_summary(
        &self,
        summary: &ContainerForecastSummary,
    ) -> anyhow::Result<()> {
        query(
            "INSERT INTO container_forecast_summaries
             (assignment_id, current_weight_g, current_population, current_biomass_kg,
              state_date, state_day_number, state_confidence,
              projected_harvest_date, projected_harvest_weight_g, days_to_harvest,
              harvest_threshold_g,
              projected_transfer_date, projected_transfer_weight_g, days_to_transfer,
              transfer_threshold_g,
              original_harvest_date, harvest_variance_days,
              has_planned_harvest, has_planned_transfer, needs_planning_attention,
              temp_profile_name, temp_bias_c, temp_bias_window_days, computed_date)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (assignment_id) DO UPDATE SET
                current_weight_g = excluded.current_weight_g,
                current_population = excluded.current_population,
                current_biomass_kg = excluded.current_biomass_kg,
                state_date = excluded.state_date,
                state_day_number = excluded.state_day_number,
                state_confidence = excluded.state_confidence,
                projected_harvest_date = excluded.projected_harvest_date,
                projected_harvest_weight_g = excluded.projected_harvest_weight_g,
                days_to_harvest = excluded.days_to_harvest,
                harvest_threshold_g = excluded.harvest_threshold_g,
                projected_transfer_date = excluded.projected_transfer_date,
                projected_transfer_weight_g = excluded.projected_transfer_weight_g,
                days_to_transfer = excluded.days_to_transfer,
                transfer_threshold_g = excluded.transfer_threshold_g,
                original_harvest_date = excluded.original_harvest_date,
                harvest_variance_days = excluded.harvest_variance_days,
                has_planned_harvest = excluded.has_planned_harvest,
                has_planned_transfer = excluded.has_planned_transfer,
                needs_planning_attention = excluded.needs_planning_attention,
                temp_profile_name = excluded.temp_profile_name,
                temp_bias_c = excluded.temp_bias_c,
                temp_bias_window_days = excluded.temp_bias_window_days,
                computed_date = excluded.computed_date",
        )
        .bind(summary.assignment_id)
        .bind(summary.current_weight_g)
        .bind(summary.current_population)
        .bind(summary.current_biomass_kg)
        .bind(date_str(summary.state_date))
        .bind(summary.state_day_number)
        .bind(summary.state_confidence)
        .bind(summary.projected_harvest_date.map(date_str))
        .bind(summary.projected_harvest_weight_g)
        .bind(summary.days_to_harvest)
        .bind(summary.harvest_threshold_g)
        .bind(summary.projected_transfer_date.map(date_str))
        .bind(summary.projected_transfer_weight_g)
        .bind(summary.days_to_transfer)
        .bind(summary.transfer_threshold_g)
        .bind(summary.original_harvest_date.map(date_str))
        .bind(summary.harvest_variance_days)
        .bind(summary.has_planned_harvest as i64)
        .bind(summary.has_planned_transfer as i64)
        .bind(summary.needs_planning_attention as i64)
        .bind(&summary.temp_profile_name)
        .bind(summary.temp_bias_c)
        .bind(summary.temp_bias_window_days)
        .bind(date_str(summary.computed_date))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn forecast_summary(
        &self,
        assignment_id: i64,
    ) -> anyhow::Result<Option<ContainerForecastSummary>> {
        let row = query_as::<_, ForecastSummaryRow>(
            "SELECT assignment_id, current_weight_g, current_population, current_biomass_kg,
                    state_date, state_day_number, state_confidence,
                    projected_harvest_date, projected_harvest_weight_g, days_to_harvest,
                    harvest_threshold_g,
                    projected_transfer_date, projected_transfer_weight_g, days_to_transfer,
                    transfer_threshold_g,
                    original_harvest_date, harvest_variance_days,
                    has_planned_harvest, has_planned_transfer, needs_planning_attention,
                    temp_profile_name, temp_bias_c, temp_bias_window_days, computed_date
             FROM container_forecast_summaries WHERE assignment_id = ?",
        )
        .bind(assignment_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_domain().map_err(Into::into)).transpose()
    }
}
