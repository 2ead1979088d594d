use std::time::Duration;

use rfctl_model::{ChallengeConfig, ModulationParams};

const MIN_DURATION_SECS: f64 = 1.0;
const DEFAULT_AUDIO_DURATION_SECS: f64 = 30.0;
const FHSS_DEFAULT_SECS: f64 = 30.0;
const PAGER_BAUD_RATE: f64 = 512.0;
const PAGER_OVERHEAD_BITS: f64 = 1000.0;
const PAGER_MIN_SECS: f64 = 2.0;

/// Estimates a challenge transmission's duration. An explicit `duration`
/// key in the config always wins. Audio-probing modulations (`nbfm`/`ssb`/`freedv`/spectrum
/// paint) fall back to a fixed estimate here since this crate has no file
/// access to measure a WAV/paint file's real length; callers that can
/// measure it should set `duration` in the stored config instead.
#[must_use]
pub fn estimate_duration(config: &ChallengeConfig) -> Duration {
    Duration::from_secs_f64(raw_estimate_secs(config).max(MIN_DURATION_SECS))
}

fn raw_estimate_secs(config: &ChallengeConfig) -> f64 {
    if let Some(explicit) = config.extra.get("duration").and_then(serde_json::Value::as_f64) {
        return explicit;
    }

    let flag = config.flag.as_deref().unwrap_or_default();
    match config.modulation_params() {
        Ok(ModulationParams::Cw { speed }) => cw_duration_secs(flag, speed),
        Ok(ModulationParams::Ask { .. }) => flag.chars().count() as f64 * 0.1,
        Ok(ModulationParams::Pocsag { .. } | ModulationParams::Lrs { .. }) => {
            pager_duration_secs(flag)
        }
        Ok(ModulationParams::Fhss { .. }) => FHSS_DEFAULT_SECS,
        _ => DEFAULT_AUDIO_DURATION_SECS,
    }
}

/// PARIS-standard CW timing: 50 dot-units per word, ~10 dot-units/char.
fn cw_duration_secs(message: &str, wpm: u32) -> f64 {
    let wpm = f64::from(wpm.max(1));
    let dot_unit = 1.2 / wpm;
    let units = message.chars().count() as f64 * 10.0;
    units * dot_unit * 1.3
}

/// POCSAG/LRS pager timing: ~10 bits/char plus preamble overhead.
fn pager_duration_secs(message: &str) -> f64 {
    let bits = message.chars().count() as f64 * 10.0 + PAGER_OVERHEAD_BITS;
    bits / PAGER_BAUD_RATE + PAGER_MIN_SECS
}

#[cfg(test)]
mod tests {
    use super::*;
    use rfctl_model::{FrequencySpec, PublicVisibility};

    fn base_config(modulation: &str, extra: serde_json::Map<String, serde_json::Value>) -> ChallengeConfig {
        ChallengeConfig {
            modulation: modulation.to_owned(),
            frequency: FrequencySpec::Fixed { frequency: 7_050_000 },
            min_delay: 1,
            max_delay: 2,
            flag: Some("flag{test}".into()),
            flag_file_hash: None,
            public_view: PublicVisibility::default(),
            extra,
        }
    }

    #[test]
    fn explicit_duration_wins() {
        let mut extra = serde_json::Map::new();
        extra.insert("duration".to_owned(), serde_json::json!(42.0));
        extra.insert("speed".to_owned(), serde_json::json!(20));
        let config = base_config("cw", extra);
        assert_eq!(estimate_duration(&config).as_secs_f64(), 42.0);
    }

    #[test]
    fn cw_scales_with_message_length_and_speed() {
        let mut extra = serde_json::Map::new();
        extra.insert("speed".to_owned(), serde_json::json!(20));
        let fast = base_config("cw", extra);
        let mut extra_slow = serde_json::Map::new();
        extra_slow.insert("speed".to_owned(), serde_json::json!(5));
        let slow = base_config("cw", extra_slow);
        assert!(estimate_duration(&slow).as_secs_f64() > estimate_duration(&fast).as_secs_f64());
    }

    #[test]
    fn unknown_modulation_falls_back_to_default() {
        let config = base_config("nbfm", serde_json::Map::new());
        assert_eq!(estimate_duration(&config).as_secs_f64(), DEFAULT_AUDIO_DURATION_SECS);
    }

    #[test]
    fn duration_floor_is_one_second() {
        let mut extra = serde_json::Map::new();
        extra.insert("duration".to_owned(), serde_json::json!(0.01));
        let config = base_config("cw", extra);
        assert_eq!(estimate_duration(&config).as_secs_f64(), MIN_DURATION_SECS);
    }
}
