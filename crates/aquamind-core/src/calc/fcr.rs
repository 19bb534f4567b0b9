use crate::domain::{FcrModel, FcrWeightBand, LifecycleStage};
use std::collections::HashMap;

/// Fallback FCR when a stage has no configured value.
pub const DEFAULT_FCR: f64 = 1.2;

/// Daily feed requirement derived from weight gain and FCR.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailyFeed {
    pub daily_feed_kg: f64,
    pub feed_per_fish_g: f64,
    pub feeding_rate_percent: f64,
    pub fcr_used: f64,
    pub biomass_gain_kg: f64,
}

/// Feed Conversion Ratio calculator.
///
/// FCR = feed consumed (kg) / biomass gained (kg). Values are configured per
/// lifecycle stage, optionally refined by weight bands within a stage.
#[derive(Debug, Clone)]
pub struct FcrCalculator {
    stage_fcr: HashMap<LifecycleStage, f64>,
    stage_duration: HashMap<LifecycleStage, i64>,
    overrides: HashMap<LifecycleStage, Vec<FcrWeightBand>>,
}

impl FcrCalculator {
    pub fn new(model: &FcrModel) -> Self {
        let mut stage_fcr = HashMap::new();
        let mut stage_duration = HashMap::new();
        let mut overrides: HashMap<LifecycleStage, Vec<FcrWeightBand>> = HashMap::new();

        for entry in &model.stages {
            stage_fcr.insert(entry.stage, entry.fcr_value);
            if let Some(d) = entry.duration_days {
                stage_duration.insert(entry.stage, d);
            }
            if !entry.overrides.is_empty() {
                let mut bands = entry.overrides.clone();
                bands.sort_by(|a, b| a.min_weight_g.total_cmp(&b.min_weight_g));
                overrides.insert(entry.stage, bands);
            }
        }

        Self {
            stage_fcr,
            stage_duration,
            overrides,
        }
    }

    /// FCR for a stage, refined by the fish weight when a band override
    /// covers it.
    pub fn fcr_for(&self, stage: LifecycleStage, weight_g: Option<f64>) -> f64 {
        let Some(&stage_value) = self.stage_fcr.get(&stage) else {
            return DEFAULT_FCR;
        };

        if let (Some(weight), Some(bands)) = (weight_g, self.overrides.get(&stage)) {
            for band in bands {
                if band.min_weight_g <= weight && weight <= band.max_weight_g {
                    return band.fcr_value;
                }
            }
        }

        stage_value
    }

    /// Configured duration for a stage, if any. Drives the time-based stage
    /// schedule shared by the projection engines.
    pub fn duration_for(&self, stage: LifecycleStage) -> Option<i64> {
        self.stage_duration.get(&stage).copied()
    }

    /// Daily feed from per-fish weight gain.
    ///
    /// `daily_feed_kg = max(0, gain_g * population / 1000) * fcr`; a
    /// shrinking population or negative gain never produces negative feed.
    pub fn daily_feed(
        &self,
        avg_weight_g: f64,
        weight_gain_g: f64,
        population: i64,
        fcr: f64,
    ) -> DailyFeed {
        let biomass_gain_kg = weight_gain_g * population as f64 / 1000.0;
        let daily_feed_kg = biomass_gain_kg.max(0.0) * fcr;

        let feed_per_fish_g = if population > 0 {
            daily_feed_kg * 1000.0 / population as f64
        } else {
            0.0
        };
        let feeding_rate_percent = if avg_weight_g > 0.0 {
            feed_per_fish_g / avg_weight_g * 100.0
        } else {
            0.0
        };

        DailyFeed {
            daily_feed_kg: round_to(daily_feed_kg, 3),
            feed_per_fish_g: round_to(feed_per_fish_g, 2),
            feeding_rate_percent: round_to(feeding_rate_percent, 2),
            fcr_used: fcr,
            biomass_gain_kg: round_to(biomass_gain_kg, 3),
        }
    }

    /// Estimate days remaining in a stage under compound growth, capped at
    /// the stage's configured duration when one exists.
    pub fn estimate_days_in_stage(
        &self,
        stage: LifecycleStage,
        current_weight_g: f64,
        target_weight_g: f64,
        daily_growth_rate: f64,
    ) -> i64 {
        if current_weight_g >= target_weight_g || daily_growth_rate <= 0.0 {
            return 0;
        }

        // target = current * (1 + rate)^days
        let days = (target_weight_g / current_weight_g).ln() / (1.0 + daily_growth_rate).ln();
        let days = days.ceil() as i64;

        match self.duration_for(stage) {
            Some(limit) => days.min(limit),
            None => days,
        }
    }

    /// Validate configured FCR values.
    ///
    /// Egg and Alevin may legitimately carry FCR 0 (yolk-sac feeding); every
    /// other stage needs a positive value, and values outside [0.5, 3.0] are
    /// flagged.
    pub fn validate(&self) -> (bool, Vec<String>) {
        let mut errors = Vec::new();

        if self.stage_fcr.is_empty() {
            errors.push("No lifecycle stages defined for FCR model".to_string());
        }

        let mut stages: Vec<_> = self.stage_fcr.iter().collect();
        stages.sort_by_key(|(stage, _)| stage.order());

        for (stage, &fcr) in stages {
            if fcr < 0.0 {
                errors.push(format!("FCR value must be non-negative for stage {}", stage));
            } else if fcr == 0.0 && stage.has_external_feeding() {
                errors.push(format!("FCR value must be positive for stage {}", stage));
            } else if fcr > 0.0 && fcr < 0.5 {
                errors.push(format!("FCR value unusually low (<0.5) for stage {}", stage));
            }

            if fcr > 3.0 {
                errors.push(format!("FCR value unusually high (>3.0) for stage {}", stage));
            }
        }

        for (stage, &duration) in &self.stage_duration {
            if duration <= 0 {
                errors.push(format!("Duration must be positive for stage {}", stage));
            }
        }

        (errors.is_empty(), errors)
    }

    /// Mean of the configured stage values, used as the sensitivity baseline.
    pub fn average_fcr(&self) -> f64 {
        if self.stage_fcr.is_empty() {
            return DEFAULT_FCR;
        }
        self.stage_fcr.values().sum::<f64>() / self.stage_fcr.len() as f64
    }

    /// Copy with every stage value (and band override) scaled, for
    /// sensitivity analysis.
    pub fn scaled(&self, factor: f64) -> Self {
        let mut scaled = self.clone();
        for value in scaled.stage_fcr.values_mut() {
            *value *= factor;
        }
        for bands in scaled.overrides.values_mut() {
            for band in bands {
                band.fcr_value *= factor;
            }
        }
        scaled
    }
}

pub(crate) fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10_f64.powi(places as i32);
    (value * factor).round() / factor
}
