//! Database row types and their conversions into domain values.
//!
//! Dates are ISO-8601 TEXT; enum-like columns hold the domain `as_str`
//! spellings. Conversions fail loudly with `StorageError::CorruptRow` rather
//! than guessing.

use crate::error::{Result, StorageError};
use aquamind_core::domain::*;
use chrono::NaiveDate;
use sqlx::FromRow;
use std::collections::BTreeMap;

pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| StorageError::corrupt(format!("bad date '{}': {}", raw, e)))
}

pub fn parse_date_opt(raw: Option<&str>) -> Result<Option<NaiveDate>> {
    raw.map(parse_date).transpose()
}

pub fn date_str(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn parse_stage(raw: &str) -> Result<LifecycleStage> {
    LifecycleStage::parse(raw).map_err(StorageError::corrupt)
}

#[derive(Debug, Clone, FromRow)]
pub struct BatchRow {
    pub id: i64,
    pub batch_number: String,
    pub species: String,
    pub start_date: String,
    pub actual_end_date: Option<String>,
    pub status: String,
    pub pinned_scenario_id: Option<i64>,
    pub pinned_projection_run_id: Option<i64>,
}

impl BatchRow {
    pub fn into_domain(self) -> Result<Batch> {
        Ok(Batch {
            id: self.id,
            batch_number: self.batch_number,
            species: self.species,
            start_date: parse_date(&self.start_date)?,
            actual_end_date: parse_date_opt(self.actual_end_date.as_deref())?,
            status: BatchStatus::parse(&self.status).map_err(StorageError::corrupt)?,
            pinned_scenario_id: self.pinned_scenario_id,
            pinned_projection_run_id: self.pinned_projection_run_id,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct AssignmentRow {
    pub id: i64,
    pub batch_id: i64,
    pub container_id: i64,
    pub lifecycle_stage: String,
    pub assignment_date: String,
    pub departure_date: Option<String>,
    pub population_count: i64,
    pub avg_weight_g: Option<f64>,
    pub biomass_kg: f64,
    pub is_active: i64,
}

impl AssignmentRow {
    pub fn into_domain(self) -> Result<Assignment> {
        Ok(Assignment {
            id: self.id,
            batch_id: self.batch_id,
            container_id: self.container_id,
            lifecycle_stage: parse_stage(&self.lifecycle_stage)?,
            assignment_date: parse_date(&self.assignment_date)?,
            departure_date: parse_date_opt(self.departure_date.as_deref())?,
            population_count: self.population_count,
            avg_weight_g: self.avg_weight_g,
            biomass_kg: self.biomass_kg,
            is_active: self.is_active != 0,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct GrowthSampleRow {
    pub id: i64,
    pub assignment_id: i64,
    pub sample_date: String,
    pub avg_weight_g: Option<f64>,
    pub sample_size: Option<i64>,
}

impl GrowthSampleRow {
    pub fn into_domain(self) -> Result<GrowthSample> {
        Ok(GrowthSample {
            id: self.id,
            assignment_id: self.assignment_id,
            sample_date: parse_date(&self.sample_date)?,
            avg_weight_g: self.avg_weight_g,
            sample_size: self.sample_size,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct TransferRow {
    pub id: i64,
    pub source_assignment_id: Option<i64>,
    pub dest_assignment_id: Option<i64>,
    pub status: String,
    pub actual_execution_date: Option<String>,
    pub transferred_count: i64,
    pub measured_avg_weight_g: Option<f64>,
    pub selection_method: Option<String>,
}

impl TransferRow {
    pub fn into_domain(self) -> Result<TransferAction> {
        Ok(TransferAction {
            id: self.id,
            source_assignment_id: self.source_assignment_id,
            dest_assignment_id: self.dest_assignment_id,
            status: TransferStatus::parse(&self.status).map_err(StorageError::corrupt)?,
            actual_execution_date: parse_date_opt(self.actual_execution_date.as_deref())?,
            transferred_count: self.transferred_count,
            measured_avg_weight_g: self.measured_avg_weight_g,
            selection_method: self
                .selection_method
                .as_deref()
                .map(SelectionMethod::parse)
                .transpose()
                .map_err(StorageError::corrupt)?,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DailyStateRow {
    pub assignment_id: i64,
    pub batch_id: i64,
    pub container_id: i64,
    pub lifecycle_stage: String,
    pub date: String,
    pub day_number: i64,
    pub avg_weight_g: f64,
    pub population: i64,
    pub biomass_kg: f64,
    pub temp_c: Option<f64>,
    pub mortality_count: i64,
    pub feed_kg: f64,
    pub observed_fcr: Option<f64>,
    pub anchor_type: Option<String>,
    pub sources: String,
    pub confidence_scores: String,
}

impl DailyStateRow {
    pub fn into_domain(self) -> Result<DailyState> {
        let sources: BTreeMap<String, String> = serde_json::from_str(&self.sources)
            .map_err(|e| StorageError::corrupt(format!("sources json: {}", e)))?;
        let confidence: BTreeMap<String, f64> = serde_json::from_str(&self.confidence_scores)
            .map_err(|e| StorageError::corrupt(format!("confidence json: {}", e)))?;
        let provenance =
            StateProvenance::from_maps(&sources, &confidence).map_err(StorageError::corrupt)?;

        Ok(DailyState {
            assignment_id: self.assignment_id,
            batch_id: self.batch_id,
            container_id: self.container_id,
            lifecycle_stage: parse_stage(&self.lifecycle_stage)?,
            date: parse_date(&self.date)?,
            day_number: self.day_number,
            avg_weight_g: self.avg_weight_g,
            population: self.population,
            biomass_kg: self.biomass_kg,
            temp_c: self.temp_c,
            mortality_count: self.mortality_count,
            feed_kg: self.feed_kg,
            observed_fcr: self.observed_fcr,
            anchor_type: self
                .anchor_type
                .as_deref()
                .map(AnchorKind::parse)
                .transpose()
                .map_err(StorageError::corrupt)?,
            provenance,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ScenarioRow {
    pub id: i64,
    pub name: String,
    pub start_date: String,
    pub duration_days: i64,
    pub initial_count: i64,
    pub initial_weight_g: Option<f64>,
    pub tgc_model_id: i64,
    pub fcr_model_id: i64,
    pub mortality_model_id: i64,
    pub biological_constraints_id: Option<i64>,
    pub batch_id: Option<i64>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ScenarioProjectionRow {
    pub scenario_id: i64,
    pub projection_date: String,
    pub day_number: i64,
    pub avg_weight_g: f64,
    pub population: i64,
    pub biomass_kg: f64,
    pub daily_feed_kg: f64,
    pub cumulative_feed_kg: f64,
    pub temperature_c: f64,
    pub lifecycle_stage: String,
}

impl ScenarioProjectionRow {
    pub fn into_domain(self) -> Result<ScenarioProjection> {
        Ok(ScenarioProjection {
            scenario_id: self.scenario_id,
            projection_date: parse_date(&self.projection_date)?,
            day_number: self.day_number,
            avg_weight_g: self.avg_weight_g,
            population: self.population,
            biomass_kg: self.biomass_kg,
            daily_feed_kg: self.daily_feed_kg,
            cumulative_feed_kg: self.cumulative_feed_kg,
            temperature_c: self.temperature_c,
            lifecycle_stage: parse_stage(&self.lifecycle_stage)?,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct LiveProjectionRow {
    pub assignment_id: i64,
    pub batch_id: i64,
    pub container_id: i64,
    pub computed_date: String,
    pub projection_date: String,
    pub day_number: i64,
    pub projected_weight_g: f64,
    pub projected_population: i64,
    pub projected_biomass_kg: f64,
    pub temperature_used_c: f64,
    pub tgc_value_used: f64,
    pub temp_profile_id: Option<i64>,
    pub temp_profile_name: String,
    pub temp_bias_c: f64,
    pub temp_bias_window_days: i64,
    pub temp_bias_clamp_min_c: f64,
    pub temp_bias_clamp_max_c: f64,
}

impl LiveProjectionRow {
    pub fn into_domain(self) -> Result<LiveForwardProjection> {
        Ok(LiveForwardProjection {
            assignment_id: self.assignment_id,
            batch_id: self.batch_id,
            container_id: self.container_id,
            computed_date: parse_date(&self.computed_date)?,
            projection_date: parse_date(&self.projection_date)?,
            day_number: self.day_number,
            projected_weight_g: self.projected_weight_g,
            projected_population: self.projected_population,
            projected_biomass_kg: self.projected_biomass_kg,
            temperature_used_c: self.temperature_used_c,
            tgc_value_used: self.tgc_value_used,
            temp_profile_id: self.temp_profile_id,
            temp_profile_name: self.temp_profile_name,
            temp_bias_c: self.temp_bias_c,
            temp_bias_window_days: self.temp_bias_window_days,
            temp_bias_clamp_min_c: self.temp_bias_clamp_min_c,
            temp_bias_clamp_max_c: self.temp_bias_clamp_max_c,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ForecastSummaryRow {
    pub assignment_id: i64,
    pub current_weight_g: f64,
    pub current_population: i64,
    pub current_biomass_kg: f64,
    pub state_date: String,
    pub state_day_number: i64,
    pub state_confidence: f64,
    pub projected_harvest_date: Option<String>,
    pub projected_harvest_weight_g: Option<f64>,
    pub days_to_harvest: Option<i64>,
    pub harvest_threshold_g: f64,
    pub projected_transfer_date: Option<String>,
    pub projected_transfer_weight_g: Option<f64>,
    pub days_to_transfer: Option<i64>,
    pub transfer_threshold_g: f64,
    pub original_harvest_date: Option<String>,
    pub harvest_variance_days: Option<i64>,
    pub has_planned_harvest: i64,
    pub has_planned_transfer: i64,
    pub needs_planning_attention: i64,
    pub temp_profile_name: String,
    pub temp_bias_c: f64,
    pub temp_bias_window_days: i64,
    pub computed_date: String,
}

impl ForecastSummaryRow {
    pub fn into_domain(self) -> Result<ContainerForecastSummary> {
        Ok(ContainerForecastSummary {
            assignment_id: self.assignment_id,
            current_weight_g: self.current_weight_g,
            current_population: self.current_population,
            current_biomass_kg: self.current_biomass_kg,
            state_date: parse_date(&self.state_date)?,
            state_day_number: self.state_day_number,
            state_confidence: self.state_confidence,
            projected_harvest_date: parse_date_opt(self.projected_harvest_date.as_deref())?,
            projected_harvest_weight_g: self.projected_harvest_weight_g,
            days_to_harvest: self.days_to_harvest,
            harvest_threshold_g: self.harvest_threshold_g,
            projected_transfer_date: parse_date_opt(self.projected_transfer_date.as_deref())?,
            projected_transfer_weight_g: self.projected_transfer_weight_g,
            days_to_transfer: self.days_to_transfer,
            transfer_threshold_g: self.transfer_threshold_g,
            original_harvest_date: parse_date_opt(self.original_harvest_date.as_deref())?,
            harvest_variance_days: self.harvest_variance_days,
            has_planned_harvest: self.has_planned_harvest != 0,
            has_planned_transfer: self.has_planned_transfer != 0,
            needs_planning_attention: self.needs_planning_attention != 0,
            temp_profile_name: self.temp_profile_name,
            temp_bias_c: self.temp_bias_c,
            temp_bias_window_days: self.temp_bias_window_days,
            computed_date: parse_date(&self.computed_date)?,
        })
    }
}
