use std::collections::HashMap;

use rand::seq::SliceRandom;
use rand::Rng;
use rfctl_model::{ChallengeConfig, FrequencySpec, ManualRange};

use crate::error::AssignmentError;

/// `name -> range` table from the controller's static config, e.g.
/// `ham_144: 144000000-148000000`. Not part of `rfctl-model` since it's
/// operator-configured, not per-challenge data.
pub type NamedFrequencyRanges = HashMap<String, ManualRange>;

/// Resolves a challenge's frequency spec to a concrete Hz value:
/// a random named range then a uniform draw within it, a uniform draw
/// within the manual range, or the fixed value verbatim.
pub fn resolve_frequency(
    spec: &FrequencySpec,
    named_ranges: &NamedFrequencyRanges,
    rng: &mut impl Rng,
) -> Result<u64, AssignmentError> {
    match spec {
        FrequencySpec::Fixed { frequency } => Ok(*frequency),
        FrequencySpec::Manual { manual_frequency_range } => {
            Ok(rng.gen_range(manual_frequency_range.min_hz..=manual_frequency_range.max_hz))
        }
        FrequencySpec::Named { frequency_ranges } => {
            let name = frequency_ranges
            .choose(rng)
            .ok_or(AssignmentError::EmptyFrequencyRanges)?;
            let range = named_ranges
            .get(name)
            .ok_or_else(|| AssignmentError::UnknownFrequencyRange(name.clone()))?;
            Ok(rng.gen_range(range.min_hz..=range.max_hz))
        }
    }
}

/// The config delivered to the runner: the resolved frequency substituted
/// in place of `frequency_ranges`/`manual_frequency_range`, which are
/// absent from the output since `FrequencySpec::Fixed` carries no such
/// fields ("range fields are stripped from the payload").
#[must_use]
pub fn resolved_runner_config(config: &ChallengeConfig, resolved_hz: u64) -> ChallengeConfig {
    ChallengeConfig {
        frequency: FrequencySpec::Fixed { frequency: resolved_hz },
        ..config.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    #[test]
    fn fixed_frequency_passes_through() {
        let mut rng = StepRng::new(0, 1);
        let resolved = resolve_frequency(
            &FrequencySpec::Fixed { frequency: 7_050_000 },
            &NamedFrequencyRanges::new(),
            &mut rng,
        )
        .unwrap();
        assert_eq!(resolved, 7_050_000);
    }

    #[test]
    fn manual_range_draws_within_bounds() {
        let mut rng = rand::thread_rng();
        let spec = FrequencySpec::Manual {
            manual_frequency_range: ManualRange { min_hz: 100, max_hz: 200 },
        };
        for _ in 0..50 {
            let resolved = resolve_frequency(&spec, &NamedFrequencyRanges::new(), &mut rng).unwrap();
            assert!((100..=200).contains(&resolved));
        }
    }

    #[test]
    fn named_range_draws_within_configured_bounds() {
        let mut rng = rand::thread_rng();
        let mut ranges = NamedFrequencyRanges::new();
        ranges.insert(
            "ham_144".to_owned(),
            ManualRange { min_hz: 144_000_000, max_hz: 148_000_000 },
        );
        let spec = FrequencySpec::Named { frequency_ranges: vec!["ham_144".to_owned()] };
        for _ in 0..50 {
            let resolved = resolve_frequency(&spec, &ranges, &mut rng).unwrap();
            assert!((144_000_000..=148_000_000).contains(&resolved));
        }
    }

    #[test]
    fn unknown_named_range_errors() {
        let mut rng = rand::thread_rng();
        let spec = FrequencySpec::Named { frequency_ranges: vec!["nope".to_owned()] };
        let err = resolve_frequency(&spec, &NamedFrequencyRanges::new(), &mut rng).unwrap_err();
        assert_eq!(err, AssignmentError::UnknownFrequencyRange("nope".to_owned()));
    }

    #[test]
    fn resolved_runner_config_strips_range_fields() {
        let config = ChallengeConfig {
            modulation: "cw".to_owned(),
            frequency: FrequencySpec::Named { frequency_ranges: vec!["ham_144".to_owned()] },
            min_delay: 10,
            max_delay: 20,
            flag: Some("flag{x}".into()),
            flag_file_hash: None,
            public_view: Default::default(),
            extra: serde_json::Map::new(),
        };
        let resolved = resolved_runner_config(&config, 144_500_000);
        let json = serde_json::to_value(&resolved).unwrap();
        assert_eq!(json["frequency"], 144_500_000);
        assert!(json.get("frequency_ranges").is_none());
        assert!(json.get("manual_frequency_range").is_none());
    }
}
