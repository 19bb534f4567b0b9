use aquamind_core::domain::{
    BiologicalConstraints, FcrModel, MortalityModel, Scenario, ScenarioModelChange, TgcModel,
    SCENARIO_MAX_DURATION_DAYS, SCENARIO_MAX_INITIAL_COUNT, SCENARIO_MAX_INITIAL_WEIGHT_G,
    SCENARIO_MIN_INITIAL_WEIGHT_G,
};
use aquamind_core::services::{LiveRunOutcome, ProjectionSummary, SensitivityOutcome};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Field name -> messages, the shape user-facing writes validate into.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Scenario creation payload; model definitions are carried inline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioCreateRequest {
    pub name: String,
    pub start_date: NaiveDate,
    pub duration_days: i64,
    pub initial_count: i64,
    pub initial_weight_g: Option<f64>,
    pub tgc_model: TgcModel,
    pub fcr_model: FcrModel,
    pub mortality_model: MortalityModel,
    #[serde(default)]
    pub biological_constraints: Option<BiologicalConstraints>,
    #[serde(default)]
    pub batch_id: Option<i64>,
    #[serde(default)]
    pub model_changes: Vec<ScenarioModelChange>,
}

impl ScenarioCreateRequest {
    /// Up-front field validation; writes never reach the store when this
    /// returns errors.
    pub fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        let mut push = |field: &str, message: String| {
            errors.entry(field.to_string()).or_default().push(message);
        };

        if self.name.trim().is_empty() {
            push("name", "Name is required".to_string());
        }

        if !(1..=SCENARIO_MAX_DURATION_DAYS).contains(&self.duration_days) {
            push(
                "duration_days",
                format!("Duration must be between 1 and {} days", SCENARIO_MAX_DURATION_DAYS),
            );
        }

        if !(1..=SCENARIO_MAX_INITIAL_COUNT).contains(&self.initial_count) {
            push(
                "initial_count",
                format!("Initial count must be between 1 and {}", SCENARIO_MAX_INITIAL_COUNT),
            );
        }

        match self.initial_weight_g {
            None => push(
                "initial_weight_g",
                "Initial weight is required to run projections".to_string(),
            ),
            Some(w) if !(SCENARIO_MIN_INITIAL_WEIGHT_G..=SCENARIO_MAX_INITIAL_WEIGHT_G)
                .contains(&w) =>
            {
                push(
                    "initial_weight_g",
                    format!(
                        "Initial weight must be between {} and {} grams",
                        SCENARIO_MIN_INITIAL_WEIGHT_G, SCENARIO_MAX_INITIAL_WEIGHT_G
                    ),
                )
            }
            _ => {}
        }

        for (index, change) in self.model_changes.iter().enumerate() {
            if !(1..=self.duration_days).contains(&change.change_day) {
                push(
                    "model_changes",
                    format!(
                        "Change {} day {} is outside the scenario duration",
                        index + 1,
                        change.change_day
                    ),
                );
            }
            if change.new_tgc_model.is_none()
                && change.new_fcr_model.is_none()
                && change.new_mortality_model.is_none()
            {
                push(
                    "model_changes",
                    format!("Change {} must reference at least one model", index + 1),
                );
            }
        }

        errors
    }

    pub fn into_scenario(self) -> Scenario {
        Scenario {
            id: 0,
            name: self.name,
            start_date: self.start_date,
            duration_days: self.duration_days,
            initial_count: self.initial_count,
            initial_weight_g: self.initial_weight_g,
            tgc_model: self.tgc_model,
            fcr_model: self.fcr_model,
            mortality_model: self.mortality_model,
            biological_constraints: self.biological_constraints,
            batch_id: self.batch_id,
            model_changes: self.model_changes,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateScenarioResponse {
    pub success: bool,
    pub scenario_id: Option<i64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub field_errors: FieldErrors,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunProjectionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub projection_run_id: Option<i64>,
    pub days_projected: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<ProjectionSummaryDto>,
}

/// Serializable projection summary.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectionSummaryDto {
    pub duration_days: i64,
    pub initial_weight_g: f64,
    pub initial_population: i64,
    pub initial_biomass_kg: f64,
    pub final_weight_g: f64,
    pub final_population: i64,
    pub final_biomass_kg: f64,
    pub total_weight_gain_g: f64,
    pub average_daily_gain_g: f64,
    pub total_deaths: i64,
    pub mortality_percent: f64,
    pub total_feed_kg: f64,
    pub average_fcr: f64,
    pub temperature_min_c: f64,
    pub temperature_max_c: f64,
    pub temperature_mean_c: f64,
}

impl From<&ProjectionSummary> for ProjectionSummaryDto {
    fn from(s: &ProjectionSummary) -> Self {
        Self {
            duration_days: s.duration_days,
            initial_weight_g: s.initial.weight_g,
            initial_population: s.initial.population,
            initial_biomass_kg: s.initial.biomass_kg,
            final_weight_g: s.final_state.weight_g,
            final_population: s.final_state.population,
            final_biomass_kg: s.final_state.biomass_kg,
            total_weight_gain_g: s.total_weight_gain_g,
            average_daily_gain_g: s.average_daily_gain_g,
            total_deaths: s.total_deaths,
            mortality_percent: s.mortality_percent,
            total_feed_kg: s.total_feed_kg,
            average_fcr: s.average_fcr,
            temperature_min_c: s.temperature_min_c,
            temperature_max_c: s.temperature_max_c,
            temperature_mean_c: s.temperature_mean_c,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SensitivityResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub parameter: String,
    pub original_value: f64,
    pub variations: BTreeMap<String, ProjectionSummaryDto>,
}

impl SensitivityResponse {
    pub fn from_outcome(outcome: &SensitivityOutcome) -> Self {
        Self {
            success: true,
            error: None,
            parameter: outcome.parameter.as_str().to_string(),
            original_value: outcome.original_value,
            variations: outcome
                .variations
                .iter()
                .map(|(label, v)| (label.clone(), ProjectionSummaryDto::from(&v.summary)))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LiveRunResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub assignment_id: i64,
    pub rows_created: u64,
    pub start_day: i64,
    pub horizon_days: i64,
    pub bias_c: f64,
    pub bias_window_days: i64,
}

impl From<LiveRunOutcome> for LiveRunResponse {
    fn from(o: LiveRunOutcome) -> Self {
        Self {
            success: o.success,
            error: o.error,
            assignment_id: o.assignment_id,
            rows_created: o.rows_created,
            start_day: o.start_day,
            horizon_days: o.horizon_days,
            bias_c: o.bias_c,
            bias_window_days: o.bias_window_days,
        }
    }
}
