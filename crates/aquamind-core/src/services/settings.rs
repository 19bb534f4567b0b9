/// Tunables for the live forward projection pipeline.
///
/// Read once from the environment at wiring time; every field has a coded
/// default so a bare environment behaves sensibly.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveForwardSettings {
    /// Days of recent sensor temperatures used for the bias estimate.
    pub bias_window_days: i64,
    /// (min, max) clamp on the sensor-vs-profile bias, in Celsius.
    pub bias_clamp_c: (f64, f64),
    /// Safety cap on the projection horizon.
    pub max_horizon_days: i64,
    /// A crossing closer than this without a matching plan raises the
    /// attention flag.
    pub attention_threshold_days: i64,
    /// Generations older than this are deleted.
    pub retention_days: i64,
    /// Generations older than this are thinned to one per week.
    pub compress_after_days: i64,
}

impl Default for LiveForwardSettings {
    fn default() -> Self {
        Self {
            bias_window_days: 14,
            bias_clamp_c: (-2.0, 2.0),
            max_horizon_days: 1000,
            attention_threshold_days: 30,
            retention_days: 90,
            compress_after_days: 7,
        }
    }
}

impl LiveForwardSettings {
    /// Load from `LIVE_FORWARD_*` environment variables, keeping defaults
    /// for anything unset or unparsable. The clamp is given as "min,max".
    pub fn from_env() -> Self {
        let mut settings = Self::default();

        if let Some(v) = env_i64("LIVE_FORWARD_TEMP_BIAS_WINDOW_DAYS") {
            settings.bias_window_days = v;
        }
        if let Ok(raw) = std::env::var("LIVE_FORWARD_TEMP_BIAS_CLAMP_C") {
            if let Some((min, max)) = parse_clamp(&raw) {
                settings.bias_clamp_c = (min, max);
            } else {
                tracing::warn!(value = %raw, "Ignoring malformed LIVE_FORWARD_TEMP_BIAS_CLAMP_C");
            }
        }
        if let Some(v) = env_i64("LIVE_FORWARD_MAX_HORIZON_DAYS") {
            settings.max_horizon_days = v;
        }
        if let Some(v) = env_i64("LIVE_FORWARD_ATTENTION_THRESHOLD_DAYS") {
            settings.attention_threshold_days = v;
        }
        if let Some(v) = env_i64("LIVE_FORWARD_PROJECTION_RETENTION_DAYS") {
            settings.retention_days = v;
        }
        if let Some(v) = env_i64("LIVE_FORWARD_PROJECTION_COMPRESS_AFTER_DAYS") {
            settings.compress_after_days = v;
        }

        settings
    }
}

fn env_i64(key: &str) -> Option<i64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn parse_clamp(raw: &str) -> Option<(f64, f64)> {
    let (min, max) = raw.split_once(',')?;
    let min: f64 = min.trim().parse().ok()?;
    let max: f64 = max.trim().parse().ok()?;
    (min <= max).then_some((min, max))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let s = LiveForwardSettings::default();
        assert_eq!(s.bias_window_days, 14);
        assert_eq!(s.bias_clamp_c, (-2.0, 2.0));
        assert_eq!(s.max_horizon_days, 1000);
        assert_eq!(s.attention_threshold_days, 30);
        assert_eq!(s.retention_days, 90);
        assert_eq!(s.compress_after_days, 7);
    }

    #[test]
    fn clamp_parsing() {
        assert_eq!(parse_clamp("-2,2"), Some((-2.0, 2.0)));
        assert_eq!(parse_clamp(" -1.5 , 1.5 "), Some((-1.5, 1.5)));
        assert_eq!(parse_clamp("3,-3"), None);
        assert_eq!(parse_clamp("nope"), None);
    }
}
