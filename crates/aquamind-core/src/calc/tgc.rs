use crate::domain::{LifecycleStage, TemperatureProfile, TgcModel, DEFAULT_PROFILE_TEMP_C};
use std::collections::HashMap;

/// Controlled rearing temperature applied to all freshwater stages.
pub const FRESHWATER_REARING_TEMP_C: f64 = 12.0;

/// Thermal Growth Coefficient calculator, cube-root form:
///
/// `W_new^(1/m) = W_current^(1/m) + (TGC/1000) * T^n * days`
///
/// with the salmonid defaults m = 1/3 and n = 1. Supports the forward
/// calculation (weight from TGC), the inverse (TGC from observed growth)
/// and day-to-target estimation.
#[derive(Debug, Clone)]
pub struct TgcCalculator {
    tgc_value: f64,
    exponent_n: f64,
    exponent_m: f64,
    profile: Option<TemperatureProfile>,
    stage_overrides: HashMap<LifecycleStage, f64>,
}

impl TgcCalculator {
    pub fn new(model: &TgcModel) -> Self {
        Self {
            tgc_value: model.tgc_value,
            exponent_n: model.exponent_n,
            exponent_m: model.exponent_m,
            profile: model.profile.clone(),
            stage_overrides: model.stage_overrides.clone(),
        }
    }

    pub fn tgc_value(&self) -> f64 {
        self.tgc_value
    }

    pub fn profile(&self) -> Option<&TemperatureProfile> {
        self.profile.as_ref()
    }

    /// TGC in effect for a stage, honoring per-stage overrides.
    pub fn tgc_for_stage(&self, stage: Option<LifecycleStage>) -> f64 {
        stage
            .and_then(|s| self.stage_overrides.get(&s).copied())
            .unwrap_or(self.tgc_value)
    }

    fn weight_exponent(&self) -> f64 {
        if self.exponent_m == 0.0 {
            1.0 / 3.0
        } else {
            self.exponent_m
        }
    }

    fn temperature_factor(&self, temperature_c: f64) -> f64 {
        if self.exponent_n == 1.0 {
            temperature_c
        } else {
            temperature_c.powf(self.exponent_n)
        }
    }

    /// Grow a weight over `days` at the given temperature.
    ///
    /// Applies the stage-specific TGC override when one exists, then clamps
    /// the result at the stage safety cap. Non-positive weight, temperature
    /// or days leave the weight unchanged.
    pub fn grow(
        &self,
        weight_g: f64,
        temperature_c: f64,
        days: i64,
        stage: Option<LifecycleStage>,
    ) -> f64 {
        if weight_g <= 0.0 || temperature_c <= 0.0 || days <= 0 {
            return weight_g;
        }

        let tgc = self.tgc_for_stage(stage);
        let exp = self.weight_exponent();

        let root = weight_g.powf(exp)
            + (tgc / 1000.0) * self.temperature_factor(temperature_c) * days as f64;
        let mut new_weight = root.powf(1.0 / exp);

        if let Some(cap) = stage.map(stage_weight_cap) {
            if new_weight > cap {
                new_weight = cap;
            }
        }

        new_weight
    }

    /// Inverse form: back-compute the TGC that explains an observed weight
    /// change. Returns 0.0 on non-positive inputs.
    pub fn growth_from_observed(
        &self,
        initial_weight_g: f64,
        final_weight_g: f64,
        mean_temperature_c: f64,
        days: i64,
    ) -> f64 {
        if initial_weight_g <= 0.0
            || final_weight_g <= 0.0
            || mean_temperature_c <= 0.0
            || days <= 0
        {
            return 0.0;
        }

        let exp = self.weight_exponent();
        let w1_root = initial_weight_g.powf(exp);
        let w2_root = final_weight_g.powf(exp);

        ((w2_root - w1_root) / (self.temperature_factor(mean_temperature_c) * days as f64)) * 1000.0
    }

    /// Days to reach a target weight at a constant mean temperature.
    ///
    /// Returns 0 when already at or above target, otherwise at least 1.
    pub fn days_to_target(
        &self,
        initial_weight_g: f64,
        target_weight_g: f64,
        mean_temperature_c: f64,
    ) -> i64 {
        if initial_weight_g >= target_weight_g || mean_temperature_c <= 0.0 {
            return 0;
        }

        let exp = self.weight_exponent();
        let w1_root = initial_weight_g.powf(exp);
        let w2_root = target_weight_g.powf(exp);

        let days = ((w2_root - w1_root) * 1000.0)
            / (self.tgc_value * self.temperature_factor(mean_temperature_c));

        (days.ceil() as i64).max(1)
    }

    /// Profile temperature for a 1-based day number (interpolated / boundary
    /// clamped by the profile itself); default when no profile is attached.
    pub fn temperature_for_day(&self, day_number: i64) -> f64 {
        match &self.profile {
            Some(profile) => profile.temperature_for_day(day_number),
            None => DEFAULT_PROFILE_TEMP_C,
        }
    }

    /// Temperature actually experienced by a stage.
    ///
    /// Freshwater stages are reared at a controlled 12 °C regardless of the
    /// profile; seawater stages see the profile value.
    pub fn effective_temperature(
        &self,
        profile_temperature_c: f64,
        stage: Option<LifecycleStage>,
    ) -> f64 {
        match stage {
            Some(s) if s.is_freshwater() => FRESHWATER_REARING_TEMP_C,
            _ => profile_temperature_c,
        }
    }

    /// Cumulative degree-days over a profile day range, for development
    /// timing of non-feeding stages (salmon eggs hatch around 400-500
    /// degree-days).
    pub fn degree_days(&self, start_day: i64, end_day: i64, base_temperature_c: f64) -> f64 {
        let mut total = 0.0;
        for day in start_day..=end_day {
            let temp = self.temperature_for_day(day);
            if temp > base_temperature_c {
                total += temp - base_temperature_c;
            }
        }
        (total * 10.0).round() / 10.0
    }

    /// Validate model parameters. Errors abort a projection run.
    pub fn validate(&self) -> (bool, Vec<String>) {
        let mut errors = Vec::new();

        if self.tgc_value <= 0.0 {
            errors.push("TGC value must be positive".to_string());
        }
        if self.tgc_value > 5.0 {
            errors.push("TGC value unusually high (>5)".to_string());
        }
        if self.tgc_value > 0.0 && self.tgc_value <= 0.1 {
            tracing::warn!(tgc = self.tgc_value, "TGC value unusually low (<=0.1)");
        }
        if self.exponent_n < 0.0 || self.exponent_n > 2.0 {
            errors.push("Temperature exponent should be between 0 and 2".to_string());
        }
        if self.exponent_m <= 0.0 || self.exponent_m > 1.0 {
            errors.push("Weight exponent should be between 0 and 1".to_string());
        }
        if self.profile.is_none() {
            errors.push("No temperature profile associated with TGC model".to_string());
        }

        (errors.is_empty(), errors)
    }

    /// Copy with a scaled base TGC, for sensitivity analysis.
    pub fn scaled(&self, factor: f64) -> Self {
        let mut scaled = self.clone();
        scaled.tgc_value *= factor;
        scaled
    }
}

/// Stage safety cap in grams.
///
/// Caps are permissive: set well above the usual transition weights so a
/// time-based stage transition always fires before the cap bites. They exist
/// to stop runaway growth when a model is misconfigured.
pub fn stage_weight_cap(stage: LifecycleStage) -> f64 {
    match stage {
        LifecycleStage::Egg | LifecycleStage::Alevin => 1.0,
        LifecycleStage::Fry => 10.0,
        LifecycleStage::Parr => 100.0,
        LifecycleStage::Smolt => 250.0,
        LifecycleStage::PostSmolt => 700.0,
        LifecycleStage::Adult => 8000.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ProfileReading;
    use proptest::prelude::*;

    fn model(tgc: f64) -> TgcModel {
        TgcModel {
            id: 1,
            name: "test".to_string(),
            tgc_value: tgc,
            exponent_n: 1.0,
            exponent_m: 1.0 / 3.0,
            profile: Some(TemperatureProfile::new(
                1,
                "constant 10",
                vec![
                    ProfileReading { day_number: 1, temperature_c: 10.0 },
                    ProfileReading { day_number: 900, temperature_c: 10.0 },
                ],
            )),
            stage_overrides: HashMap::new(),
        }
    }

    #[test]
    fn grow_matches_cube_root_formula() {
        let calc = TgcCalculator::new(&model(0.025));
        // W = (120^(1/3) + 0.025/1000 * 10 * 5)^3
        let grown = calc.grow(120.0, 10.0, 5, None);
        let expected = (120.0_f64.powf(1.0 / 3.0) + 0.025 / 1000.0 * 10.0 * 5.0).powi(3);
        assert!((grown - expected).abs() < 1e-9);
        assert!((grown - 120.75).abs() < 0.05);
    }

    #[test]
    fn grow_ignores_non_positive_inputs() {
        let calc = TgcCalculator::new(&model(0.025));
        assert_eq!(calc.grow(100.0, 0.0, 1, None), 100.0);
        assert_eq!(calc.grow(100.0, -3.0, 1, None), 100.0);
        assert_eq!(calc.grow(0.0, 10.0, 1, None), 0.0);
        assert_eq!(calc.grow(100.0, 10.0, 0, None), 100.0);
    }

    #[test]
    fn grow_applies_stage_cap() {
        let calc = TgcCalculator::new(&model(5.0));
        // Aggressive TGC would overshoot the fry cap
        let grown = calc.grow(9.9, 15.0, 30, Some(LifecycleStage::Fry));
        assert_eq!(grown, 10.0);
        // No stage, no cap
        let uncapped = calc.grow(9.9, 15.0, 30, None);
        assert!(uncapped > 10.0);
    }

    #[test]
    fn grow_uses_stage_override() {
        let mut m = model(0.025);
        m.stage_overrides.insert(LifecycleStage::Adult, 0.05);
        let calc = TgcCalculator::new(&m);

        let base = calc.grow(1000.0, 10.0, 1, None);
        let with_override = calc.grow(1000.0, 10.0, 1, Some(LifecycleStage::Adult));
        assert!(with_override > base);
    }

    #[test]
    fn days_to_target_is_inverse_of_grow() {
        let calc = TgcCalculator::new(&model(0.025));
        let days = calc.days_to_target(100.0, 120.0, 10.0);
        assert!(days > 0);
        let grown = calc.grow(100.0, 10.0, days, None);
        assert!(grown >= 120.0);
        // One day fewer must fall short
        let short = calc.grow(100.0, 10.0, days - 1, None);
        assert!(short < 120.0);
    }

    #[test]
    fn days_to_target_at_or_above_target() {
        let calc = TgcCalculator::new(&model(0.025));
        assert_eq!(calc.days_to_target(120.0, 100.0, 10.0), 0);
        assert_eq!(calc.days_to_target(100.0, 100.0, 10.0), 0);
    }

    #[test]
    fn effective_temperature_pins_freshwater_stages() {
        let calc = TgcCalculator::new(&model(0.025));
        for stage in [
            LifecycleStage::Egg,
            LifecycleStage::Alevin,
            LifecycleStage::Fry,
            LifecycleStage::Parr,
            LifecycleStage::Smolt,
        ] {
            assert_eq!(calc.effective_temperature(8.3, Some(stage)), 12.0);
        }
        assert_eq!(calc.effective_temperature(8.3, Some(LifecycleStage::PostSmolt)), 8.3);
        assert_eq!(calc.effective_temperature(8.3, Some(LifecycleStage::Adult)), 8.3);
        assert_eq!(calc.effective_temperature(8.3, None), 8.3);
    }

    #[test]
    fn temperature_without_profile_defaults() {
        let mut m = model(0.025);
        m.profile = None;
        let calc = TgcCalculator::new(&m);
        assert_eq!(calc.temperature_for_day(42), DEFAULT_PROFILE_TEMP_C);
    }

    #[test]
    fn validate_flags_bad_parameters() {
        let mut m = model(0.025);
        m.tgc_value = -1.0;
        m.exponent_n = 3.0;
        m.profile = None;
        let (ok, errors) = TgcCalculator::new(&m).validate();
        assert!(!ok);
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn validate_accepts_defaults() {
        let (ok, errors) = TgcCalculator::new(&model(0.025)).validate();
        assert!(ok, "{:?}", errors);
    }

    #[test]
    fn degree_days_accumulate() {
        let calc = TgcCalculator::new(&model(0.025));
        // Constant 10 degrees over 10 days
        assert_eq!(calc.degree_days(1, 10, 0.0), 100.0);
        assert_eq!(calc.degree_days(1, 10, 4.0), 60.0);
    }

    proptest! {
        // Inverse round trip: deriving TGC from a grown weight recovers the
        // configured coefficient.
        #[test]
        fn growth_from_observed_recovers_tgc(
            w1 in 1.0_f64..5000.0,
            temp in 1.0_f64..20.0,
            days in 1_i64..200,
            tgc in 0.005_f64..3.0,
        ) {
            let calc = TgcCalculator::new(&model(tgc));
            let w2 = calc.grow(w1, temp, days, None);
            let recovered = calc.growth_from_observed(w1, w2, temp, days);
            prop_assert!((recovered - tgc).abs() < 1e-6);
        }
    }
}
