use crate::domain::{BiologicalConstraints, FcrModel, LifecycleStage, StageConstraint};
use std::collections::HashMap;

/// Stage duration assumed when an FCR model entry has none configured.
const DEFAULT_STAGE_DURATION_DAYS: i64 = 90;

/// Cached per-stage weight bounds.
///
/// Explicit biological constraints win; otherwise the stage's expected
/// weight band applies. Shared by assimilation (weight-triggered
/// transitions) and the forecast thresholds.
#[derive(Debug, Clone, Default)]
pub struct StageConstraintSet {
    constraints: HashMap<LifecycleStage, StageConstraint>,
}

impl StageConstraintSet {
    pub fn from_constraints(constraints: Option<&BiologicalConstraints>) -> Self {
        Self {
            constraints: constraints.map(|c| c.stages.clone()).unwrap_or_default(),
        }
    }

    pub fn min_weight(&self, stage: LifecycleStage) -> Option<f64> {
        self.constraints
            .get(&stage)
            .and_then(|c| c.min_weight_g)
            .or(Some(stage.expected_weight_range().0))
    }

    pub fn max_weight(&self, stage: LifecycleStage) -> Option<f64> {
        self.constraints
            .get(&stage)
            .and_then(|c| c.max_weight_g)
            .or_else(|| stage.expected_weight_range().1)
    }

    /// Explicitly configured minimum, without the expected-band fallback.
    /// Used by the bootstrap weight priority chain, where the band minimum
    /// sits lower in the fallback order.
    pub fn configured_min_weight(&self, stage: LifecycleStage) -> Option<f64> {
        self.constraints.get(&stage).and_then(|c| c.min_weight_g)
    }

    /// Weight-triggered transition: at or above the stage's max weight the
    /// fish move to the next stage in species order.
    pub fn transition_by_weight(&self, stage: LifecycleStage, weight_g: f64) -> LifecycleStage {
        match self.max_weight(stage) {
            Some(max) if weight_g >= max => stage.next().unwrap_or(stage),
            _ => stage,
        }
    }
}

/// Time-based stage schedule built from FCR model durations.
///
/// Projections (scenario and live) advance stages by elapsed days against
/// this schedule, never by weight, so both engines agree on when a batch
/// changes stage.
#[derive(Debug, Clone)]
pub struct StageSchedule {
    /// (stage, first elapsed day, duration), in model order.
    entries: Vec<(LifecycleStage, i64, i64)>,
}

impl StageSchedule {
    pub fn from_fcr_model(model: &FcrModel) -> Self {
        let mut entries = Vec::new();
        let mut cumulative = 0;

        for stage_entry in &model.stages {
            let duration = stage_entry
                .duration_days
                .unwrap_or(DEFAULT_STAGE_DURATION_DAYS);
            entries.push((stage_entry.stage, cumulative, duration));
            cumulative += duration;
        }

        if entries.is_empty() {
            // No stage data at all: fall back to the typical ladder.
            for stage in LifecycleStage::ALL {
                let duration = stage.typical_duration_days();
                entries.push((stage, cumulative, duration));
                cumulative += duration;
            }
        }

        Self { entries }
    }

    /// Stage in effect on a 1-based day number. Past the end of the schedule
    /// the last stage applies.
    pub fn stage_for_day(&self, day_number: i64) -> LifecycleStage {
        let elapsed = day_number - 1;

        for (stage, start, duration) in &self.entries {
            if elapsed >= *start && elapsed < start + duration {
                return *stage;
            }
        }

        self.entries
            .last()
            .map(|(stage, _, _)| *stage)
            .unwrap_or(LifecycleStage::Adult)
    }

    pub fn total_days(&self) -> i64 {
        self.entries
            .last()
            .map(|(_, start, duration)| start + duration)
            .unwrap_or(0)
    }
}

/// Stage whose expected weight band covers the given weight; used to seed a
/// projection's initial stage from the initial weight.
pub fn stage_for_weight(weight_g: f64) -> LifecycleStage {
    for stage in LifecycleStage::ALL {
        let (min, max) = stage.expected_weight_range();
        match max {
            Some(max) if weight_g >= min && weight_g < max => return stage,
            None if weight_g >= min => return stage,
            _ => {}
        }
    }
    LifecycleStage::Egg
}
