use crate::calc::{projection_seed, FcrCalculator, MortalityCalculator, TgcCalculator};
use crate::domain::{RateFrequency, Scenario, ScenarioModelChange, ScenarioProjection};
use crate::ports::StateRepository;
use crate::stage::StageSchedule;
use chrono::{Days, NaiveDate};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::round2;

/// Result of a projection run.
#[derive(Debug, Clone, Default)]
pub struct ProjectionOutcome {
    pub success: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub projections: Vec<ScenarioProjection>,
    pub summary: Option<ProjectionSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Conditions {
    pub weight_g: f64,
    pub population: i64,
    pub biomass_kg: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionSummary {
    pub duration_days: i64,
    pub initial: Conditions,
    pub final_state: Conditions,
    pub total_weight_gain_g: f64,
    pub weight_gain_percent: f64,
    pub average_daily_gain_g: f64,
    pub total_deaths: i64,
    pub mortality_percent: f64,
    pub survival_percent: f64,
    pub total_feed_kg: f64,
    pub average_fcr: f64,
    pub daily_average_feed_kg: f64,
    pub temperature_min_c: f64,
    pub temperature_max_c: f64,
    pub temperature_mean_c: f64,
}

/// Parameter varied by a sensitivity analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensitivityParameter {
    Tgc,
    Fcr,
    Mortality,
}

impl SensitivityParameter {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensitivityParameter::Tgc => "tgc",
            SensitivityParameter::Fcr => "fcr",
            SensitivityParameter::Mortality => "mortality",
        }
    }

    pub fn parse(s: &str) -> std::result::Result<Self, String> {
        match s {
            "tgc" => Ok(Self::Tgc),
            "fcr" => Ok(Self::Fcr),
            "mortality" => Ok(Self::Mortality),
            _ => Err(format!("Unknown parameter: {}", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SensitivityOutcome {
    pub parameter: SensitivityParameter,
    pub original_value: f64,
    /// Keyed by signed percentage label, e.g. "+10%".
    pub variations: BTreeMap<String, SensitivityVariation>,
}

#[derive(Debug, Clone)]
pub struct SensitivityVariation {
    pub parameter_value: f64,
    pub summary: ProjectionSummary,
}

/// The calculators in effect on a given projection day.
///
/// Mid-run model changes swap these values; there is no hierarchy to
/// override, just a new calculator from the changed model.
#[derive(Clone)]
struct CalculatorSet {
    tgc: TgcCalculator,
    fcr: FcrCalculator,
    mortality: MortalityCalculator,
    schedule: StageSchedule,
}

/// Deterministic scenario projection: one row per day from start_date for
/// duration_days, under stage-aware TGC growth, FCR feed and mortality
/// decay, with scheduled model changes applied on their absolute dates.
pub struct ProjectionEngine {
    scenario: Scenario,
    errors: Vec<String>,
}

impl ProjectionEngine {
    pub fn new(scenario: Scenario) -> Self {
        let mut errors = Vec::new();

        match scenario.initial_weight_g {
            None => errors.push(
                "Scenario requires initial_weight to run projections. Provide the starting \
                 weight in grams (e.g. 50.0 for smolt stage, 0.1 for egg stage)."
                    .to_string(),
            ),
            Some(w) if w <= 0.0 => {
                errors.push(format!("initial_weight must be greater than 0 (got {}g)", w))
            }
            _ => {}
        }

        let calculators = CalculatorSet::from_models(&scenario);
        for (name, (ok, messages)) in [
            ("TGC", calculators.tgc.validate()),
            ("FCR", calculators.fcr.validate()),
            ("Mortality", calculators.mortality.validate()),
        ] {
            if !ok {
                errors.extend(messages.into_iter().map(|m| format!("{}: {}", name, m)));
            }
        }

        Self { scenario, errors }
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Run the projection in memory.
    pub fn run(&self) -> ProjectionOutcome {
        if !self.errors.is_empty() {
            return ProjectionOutcome {
                success: false,
                errors: self.errors.clone(),
                ..Default::default()
            };
        }

        let mut warnings = Vec::new();
        let mut calculators = CalculatorSet::from_models(&self.scenario);
        let model_changes = self.model_changes_by_date();

        let initial_weight = self
            .scenario
            .initial_weight_g
            .expect("validated initial weight");
        let mut current_weight = initial_weight;
        let mut current_population = self.scenario.initial_count;
        let mut current_stage = calculators.schedule.stage_for_day(1);

        let mut cumulative_feed = 0.0;
        let mut projections = Vec::with_capacity(self.scenario.duration_days as usize);

        for day_number in 1..=self.scenario.duration_days {
            let date = self
                .scenario
                .start_date
                .checked_add_days(Days::new(day_number as u64 - 1))
                .expect("date overflow");

            if let Some(change) = model_changes.get(&date) {
                calculators.apply_change(&self.scenario, change, date, &mut warnings);
            }

            // Time-based stage transition keeps scenario and live
            // projections in lockstep.
            let new_stage = calculators.schedule.stage_for_day(day_number);
            if new_stage != current_stage {
                warnings.push(format!(
                    "Stage transition on day {}: {} -> {}",
                    day_number, current_stage, new_stage
                ));
                current_stage = new_stage;
            }

            let profile_temp = calculators.tgc.temperature_for_day(day_number);
            let temperature = calculators
                .tgc
                .effective_temperature(profile_temp, Some(current_stage));

            // Egg and Alevin live off the yolk sac: no growth, no feed.
            // Weights are carried at storage precision so the emitted row
            // and the next day's input agree.
            let (new_weight, weight_gain) = if current_stage.has_external_feeding() {
                let grown = round2(calculators.tgc.grow(
                    current_weight,
                    temperature,
                    1,
                    Some(current_stage),
                ));
                (grown, grown - current_weight)
            } else {
                (current_weight, 0.0)
            };

            let rate = calculators
                .mortality
                .rate_for(Some(current_stage), RateFrequency::Daily);
            let mortality = calculators.mortality.daily_mortality(
                current_population,
                Some(rate),
                projection_seed(self.scenario.id, day_number),
            );
            let new_population = mortality.surviving.max(0);

            let daily_feed_kg = if current_stage.has_external_feeding() {
                let fcr = calculators.fcr.fcr_for(current_stage, Some(current_weight));
                let feed = calculators
                    .fcr
                    .daily_feed(current_weight, weight_gain, new_population, fcr);
                feed.daily_feed_kg
            } else {
                0.0
            };
            cumulative_feed += daily_feed_kg;

            let biomass = new_weight * new_population as f64 / 1000.0;

            projections.push(ScenarioProjection {
                scenario_id: self.scenario.id,
                projection_date: date,
                day_number,
                avg_weight_g: new_weight,
                population: new_population,
                biomass_kg: round2(biomass),
                daily_feed_kg,
                cumulative_feed_kg: (cumulative_feed * 1000.0).round() / 1000.0,
                temperature_c: temperature,
                lifecycle_stage: current_stage,
            });

            current_weight = new_weight;
            current_population = new_population;
        }

        let summary = self.summarize(&projections);

        ProjectionOutcome {
            success: true,
            errors: Vec::new(),
            warnings,
            projections,
            summary: Some(summary),
        }
    }

    /// Run and persist: existing projections for the scenario are replaced
    /// in one transaction.
    pub async fn run_and_store(
        &self,
        states: Arc<dyn StateRepository>,
    ) -> anyhow::Result<ProjectionOutcome> {
        let outcome = self.run();
        if outcome.success {
            states
                .replace_scenario_projections(self.scenario.id, &outcome.projections)
                .await?;
        }
        Ok(outcome)
    }

    /// Sensitivity analysis: rerun with one parameter scaled by each
    /// variation, never persisting. Calculators are rebuilt per variation
    /// rather than mutated and restored.
    pub fn sensitivity(
        &self,
        parameter: SensitivityParameter,
        variations: &[f64],
    ) -> SensitivityOutcome {
        let base = CalculatorSet::from_models(&self.scenario);
        let original_value = match parameter {
            SensitivityParameter::Tgc => base.tgc.tgc_value(),
            SensitivityParameter::Fcr => base.fcr.average_fcr(),
            SensitivityParameter::Mortality => base.mortality.base_rate_percent(),
        };

        let mut results = BTreeMap::new();

        for &variation in variations {
            let factor = 1.0 + variation / 100.0;
            let varied = self.scaled_scenario(parameter, factor);
            let outcome = ProjectionEngine::new(varied).run();

            if let Some(summary) = outcome.summary {
                results.insert(
                    format!("{:+.0}%", variation),
                    SensitivityVariation {
                        parameter_value: ((original_value * factor) * 1000.0).round() / 1000.0,
                        summary,
                    },
                );
            }
        }

        SensitivityOutcome {
            parameter,
            original_value: (original_value * 1000.0).round() / 1000.0,
            variations: results,
        }
    }

    fn scaled_scenario(&self, parameter: SensitivityParameter, factor: f64) -> Scenario {
        let mut scenario = self.scenario.clone();
        match parameter {
            SensitivityParameter::Tgc => {
                scenario.tgc_model.tgc_value *= factor;
            }
            SensitivityParameter::Fcr => {
                for stage in &mut scenario.fcr_model.stages {
                    stage.fcr_value *= factor;
                    for band in &mut stage.overrides {
                        band.fcr_value *= factor;
                    }
                }
            }
            SensitivityParameter::Mortality => {
                scenario.mortality_model.rate_percent *= factor;
            }
        }
        scenario
    }

    fn model_changes_by_date(&self) -> HashMap<NaiveDate, ScenarioModelChange> {
        self.scenario
            .model_changes
            .iter()
            .filter_map(|change| {
                self.scenario
                    .start_date
                    .checked_add_days(Days::new(change.change_day as u64 - 1))
                    .map(|date| (date, change.clone()))
            })
            .collect()
    }

    fn summarize(&self, projections: &[ScenarioProjection]) -> ProjectionSummary {
        let initial_weight = self.scenario.initial_weight_g.unwrap_or(0.0);
        let initial = Conditions {
            weight_g: initial_weight,
            population: self.scenario.initial_count,
            biomass_kg: round2(initial_weight * self.scenario.initial_count as f64 / 1000.0),
        };

        let last = projections.last().expect("non-empty projection");
        let final_state = Conditions {
            weight_g: last.avg_weight_g,
            population: last.population,
            biomass_kg: last.biomass_kg,
        };

        let total_gain = last.avg_weight_g - initial_weight;
        let total_deaths = self.scenario.initial_count - last.population;
        let mortality_percent = if self.scenario.initial_count > 0 {
            total_deaths as f64 / self.scenario.initial_count as f64 * 100.0
        } else {
            0.0
        };

        let total_biomass_gain = last.biomass_kg - initial.biomass_kg;
        let average_fcr = if total_biomass_gain > 0.0 {
            last.cumulative_feed_kg / total_biomass_gain
        } else {
            0.0
        };

        let temps: Vec<f64> = projections.iter().map(|p| p.temperature_c).collect();
        let temp_min = temps.iter().copied().fold(f64::INFINITY, f64::min);
        let temp_max = temps.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let temp_mean = temps.iter().sum::<f64>() / temps.len() as f64;

        ProjectionSummary {
            duration_days: self.scenario.duration_days,
            initial,
            final_state,
            total_weight_gain_g: round2(total_gain),
            weight_gain_percent: if initial_weight > 0.0 {
                ((total_gain / initial_weight * 100.0) * 10.0).round() / 10.0
            } else {
                0.0
            },
            average_daily_gain_g: round2(total_gain / self.scenario.duration_days as f64),
            total_deaths,
            mortality_percent: round2(mortality_percent),
            survival_percent: round2(100.0 - mortality_percent),
            total_feed_kg: round2(last.cumulative_feed_kg),
            average_fcr: ((average_fcr * 1000.0).round()) / 1000.0,
            daily_average_feed_kg: round2(
                last.cumulative_feed_kg / self.scenario.duration_days as f64,
            ),
            temperature_min_c: (temp_min * 10.0).round() / 10.0,
            temperature_max_c: (temp_max * 10.0).round() / 10.0,
            temperature_mean_c: (temp_mean * 10.0).round() / 10.0,
        }
    }
}

impl CalculatorSet {
    fn from_models(scenario: &Scenario) -> Self {
        Self {
            tgc: TgcCalculator::new(&scenario.tgc_model),
            fcr: FcrCalculator::new(&scenario.fcr_model),
            mortality: MortalityCalculator::new(&scenario.mortality_model),
            schedule: StageSchedule::from_fcr_model(&scenario.fcr_model),
        }
    }

    fn apply_change(
        &mut self,
        _scenario: &Scenario,
        change: &ScenarioModelChange,
        date: NaiveDate,
        warnings: &mut Vec<String>,
    ) {
        if let Some(tgc_model) = &change.new_tgc_model {
            self.tgc = TgcCalculator::new(tgc_model);
            warnings.push(format!("Applied TGC model change on {}: {}", date, tgc_model.name));
        }
        if let Some(fcr_model) = &change.new_fcr_model {
            self.fcr = FcrCalculator::new(fcr_model);
            self.schedule = StageSchedule::from_fcr_model(fcr_model);
            warnings.push(format!("Applied FCR model change on {}: {}", date, fcr_model.name));
        }
        if let Some(mortality_model) = &change.new_mortality_model {
            self.mortality = MortalityCalculator::new(mortality_model);
            warnings.push(format!(
                "Applied mortality model change on {}: {}",
                date, mortality_model.name
            ));
        }
    }
}
