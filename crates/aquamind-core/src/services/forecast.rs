use crate::domain::{
    ContainerForecastSummary, DailyState, LifecycleStage, LiveForwardProjection,
};
use crate::stage::StageConstraintSet;
use chrono::NaiveDate;

/// Default harvest weight for Atlantic salmon when no constraint is set.
pub const DEFAULT_HARVEST_THRESHOLD_G: f64 = 5000.0;
/// Default smolt sea-transfer weight when no constraint is set.
pub const DEFAULT_TRANSFER_THRESHOLD_G: f64 = 100.0;

/// Weight thresholds the summarizer scans for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastThresholds {
    pub harvest_g: f64,
    pub transfer_g: f64,
}

impl ForecastThresholds {
    /// Harvest from the Adult stage's max weight, transfer from the Smolt
    /// stage's max weight; industry defaults otherwise.
    pub fn from_constraints(constraints: &StageConstraintSet) -> Self {
        // Adult has no expected upper band, so only an explicit constraint
        // can override the default here.
        let harvest_g = constraints
            .max_weight(LifecycleStage::Adult)
            .unwrap_or(DEFAULT_HARVEST_THRESHOLD_G);
        let transfer_g = constraints
            .max_weight(LifecycleStage::Smolt)
            .unwrap_or(DEFAULT_TRANSFER_THRESHOLD_G);

        Self { harvest_g, transfer_g }
    }
}

/// First projected day at or above a weight threshold.
pub fn find_crossing(
    projections: &[LiveForwardProjection],
    threshold_g: f64,
) -> Option<&LiveForwardProjection> {
    projections
        .iter()
        .find(|p| p.projected_weight_g >= threshold_g)
}

/// Inputs gathered by the live engine for one summary update.
pub struct SummaryInputs<'a> {
    pub latest_state: &'a DailyState,
    pub projections: &'a [LiveForwardProjection],
    pub computed_date: NaiveDate,
    pub thresholds: ForecastThresholds,
    pub original_harvest_date: Option<NaiveDate>,
    pub has_planned_harvest: bool,
    pub has_planned_transfer: bool,
    pub attention_threshold_days: i64,
    pub temp_profile_name: String,
    pub temp_bias_c: f64,
    pub temp_bias_window_days: i64,
}

/// Build the per-assignment planning rollup from a stored projection run.
///
/// The attention flag fires when a crossing sits inside the attention window
/// and no matching activity is planned; transfer and harvest share the same
/// lead time.
pub fn build_summary(inputs: SummaryInputs<'_>) -> ContainerForecastSummary {
    let harvest = find_crossing(inputs.projections, inputs.thresholds.harvest_g);
    let transfer = find_crossing(inputs.projections, inputs.thresholds.transfer_g);

    let days_to = |p: &LiveForwardProjection| (p.projection_date - inputs.computed_date).num_days();

    let mut needs_attention = false;
    if let Some(crossing) = harvest {
        if !inputs.has_planned_harvest && days_to(crossing) <= inputs.attention_threshold_days {
            needs_attention = true;
        }
    }
    if let Some(crossing) = transfer {
        if !inputs.has_planned_transfer && days_to(crossing) <= inputs.attention_threshold_days {
            needs_attention = true;
        }
    }

    let harvest_variance_days = match (harvest, inputs.original_harvest_date) {
        (Some(crossing), Some(original)) => {
            Some((crossing.projection_date - original).num_days())
        }
        _ => None,
    };

    ContainerForecastSummary {
        assignment_id: inputs.latest_state.assignment_id,

        current_weight_g: inputs.latest_state.avg_weight_g,
        current_population: inputs.latest_state.population,
        current_biomass_kg: inputs.latest_state.biomass_kg,
        state_date: inputs.latest_state.date,
        state_day_number: inputs.latest_state.day_number,
        state_confidence: (inputs.latest_state.overall_confidence() * 100.0).round() / 100.0,

        projected_harvest_date: harvest.map(|p| p.projection_date),
        projected_harvest_weight_g: harvest.map(|p| p.projected_weight_g),
        days_to_harvest: harvest.map(days_to),
        harvest_threshold_g: inputs.thresholds.harvest_g,

        projected_transfer_date: transfer.map(|p| p.projection_date),
        projected_transfer_weight_g: transfer.map(|p| p.projected_weight_g),
        days_to_transfer: transfer.map(days_to),
        transfer_threshold_g: inputs.thresholds.transfer_g,

        original_harvest_date: inputs.original_harvest_date,
        harvest_variance_days,

        has_planned_harvest: inputs.has_planned_harvest,
        has_planned_transfer: inputs.has_planned_transfer,
        needs_planning_attention: needs_attention,

        temp_profile_name: inputs.temp_profile_name,
        temp_bias_c: inputs.temp_bias_c,
        temp_bias_window_days: inputs.temp_bias_window_days,
        computed_date: inputs.computed_date,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SourceTag, Sourced, StateProvenance};

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    fn state() -> DailyState {
        DailyState {
            assignment_id: 4,
            batch_id: 1,
            container_id: 2,
            lifecycle_stage: LifecycleStage::PostSmolt,
            date: date(6, 1),
            day_number: 200,
            avg_weight_g: 80.0,
            population: 10_000,
            biomass_kg: 800.0,
            temp_c: Some(10.0),
            mortality_count: 0,
            feed_kg: 0.0,
            observed_fcr: None,
            anchor_type: None,
            provenance: StateProvenance {
                weight: Sourced::new(SourceTag::Measured, 1.0),
                temp: Sourced::new(SourceTag::Measured, 1.0),
                mortality: Sourced::new(SourceTag::Model, 0.4),
                feed: Sourced::new(SourceTag::Actual, 1.0),
                fcr: None,
            },
        }
    }

    fn projection(day_offset: i64, weight: f64) -> LiveForwardProjection {
        LiveForwardProjection {
            assignment_id: 4,
            batch_id: 1,
            container_id: 2,
            computed_date: date(6, 1),
            projection_date: date(6, 1) + chrono::Days::new(day_offset as u64),
            day_number: 200 + day_offset,
            projected_weight_g: weight,
            projected_population: 10_000,
            projected_biomass_kg: weight * 10.0,
            temperature_used_c: 10.0,
            tgc_value_used: 1.664,
            temp_profile_id: Some(1),
            temp_profile_name: "P".to_string(),
            temp_bias_c: 0.0,
            temp_bias_window_days: 0,
            temp_bias_clamp_min_c: -2.0,
            temp_bias_clamp_max_c: 2.0,
        }
    }

    fn inputs<'a>(
        state: &'a DailyState,
        projections: &'a [LiveForwardProjection],
        has_planned_transfer: bool,
    ) -> SummaryInputs<'a> {
        SummaryInputs {
            latest_state: state,
            projections,
            computed_date: date(6, 1),
            thresholds: ForecastThresholds {
                harvest_g: 5000.0,
                transfer_g: 100.0,
            },
            original_harvest_date: None,
            has_planned_harvest: false,
            has_planned_transfer,
            attention_threshold_days: 30,
            temp_profile_name: "P".to_string(),
            temp_bias_c: 0.0,
            temp_bias_window_days: 0,
        }
    }

    #[test]
    fn transfer_crossing_and_attention() {
        let state = state();
        let projections: Vec<_> = (1..=40)
            .map(|d| projection(d, 80.0 + d as f64))
            .collect();
        // Weight reaches 100 on day offset 20

        let summary = build_summary(inputs(&state, &projections, false));
        assert_eq!(summary.projected_transfer_date, Some(date(6, 21)));
        assert_eq!(summary.days_to_transfer, Some(20));
        assert!(summary.needs_planning_attention);
        assert!(summary.projected_harvest_date.is_none());

        // A planned transfer silences the flag
        let planned = build_summary(inputs(&state, &projections, true));
        assert!(!planned.needs_planning_attention);
    }

    #[test]
    fn crossing_outside_attention_window() {
        let state = state();
        // Crossing at offset 35, beyond the 30-day window
        let projections: Vec<_> = (1..=60)
            .map(|d| projection(d, if d >= 35 { 120.0 } else { 90.0 }))
            .collect();

        let summary = build_summary(inputs(&state, &projections, false));
        assert_eq!(summary.days_to_transfer, Some(35));
        assert!(!summary.needs_planning_attention);
    }

    #[test]
    fn harvest_variance_against_plan() {
        let state = state();
        let projections: Vec<_> = (1..=20)
            .map(|d| projection(d, if d >= 10 { 5100.0 } else { 4000.0 }))
            .collect();

        let mut i = inputs(&state, &projections, true);
        i.has_planned_harvest = true;
        i.original_harvest_date = Some(date(6, 6));
        let summary = build_summary(i);

        assert_eq!(summary.projected_harvest_date, Some(date(6, 11)));
        // Five days behind plan
        assert_eq!(summary.harvest_variance_days, Some(5));
    }

    #[test]
    fn confidence_is_min_of_scores() {
        let state = state();
        let projections = vec![projection(1, 80.0)];
        let summary = build_summary(inputs(&state, &projections, true));
        assert_eq!(summary.state_confidence, 0.4);
    }
}
