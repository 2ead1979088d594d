use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ModelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeStatus {
    Queued,
    Waiting,
    Assigned,
}

/// How the per-call transmit frequency is resolved. Exactly one
/// variant may be present on a given `ChallengeConfig`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FrequencySpec {
    Fixed { frequency: u64 },
    Named { frequency_ranges: Vec<String> },
    Manual { manual_frequency_range: ManualRange },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ManualRange {
    pub min_hz: u64,
    pub max_hz: u64,
}

/// Modulation-specific parameters. The `modulation` discriminator selects
/// which SDR flowgraph plugin the runner invokes; the controller never
/// interprets these fields beyond passing them through unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "modulation", rename_all = "snake_case")]
pub enum ModulationParams {
    Ask { speed: u32 },
    Cw { speed: u32 },
    Nbfm {},
    Ssb { mode: String },
    Pocsag { capcode: u32 },
    Lrs { wav_samplerate: u32 },
    Fhss {
        hop_time: f64,
        hop_rate: f64,
        channel_spacing: u64,
        seed: Option<u64>,
    },
    Freedv { mode: String },
    SpectrumPaint { text: String },
}

impl ModulationParams {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ask {.. } => "ask",
            Self::Cw {.. } => "cw",
            Self::Nbfm {} => "nbfm",
            Self::Ssb {.. } => "ssb",
            Self::Pocsag {.. } => "pocsag",
            Self::Lrs {.. } => "lrs",
            Self::Fhss {.. } => "fhss",
            Self::Freedv {.. } => "freedv",
            Self::SpectrumPaint {.. } => "spectrum_paint",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PublicVisibility {
    #[serde(default)]
    pub show_modulation: bool,
    #[serde(default)]
    pub show_frequency: bool,
    #[serde(default)]
    pub show_last_tx_time: bool,
    #[serde(default)]
    pub show_active_status: bool,
}

/// The semi-structured challenge config bag ("Dynamic runtime →
/// static shape"). `extra` round-trips any key this model doesn't
/// recognize so admin-authored YAML never silently loses data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeConfig {
    pub modulation: String,
    #[serde(flatten)]
    pub frequency: FrequencySpec,
    pub min_delay: u64,
    pub max_delay: u64,
    #[serde(default)]
    pub flag: Option<String>,
    #[serde(default)]
    pub flag_file_hash: Option<String>,
    #[serde(default)]
    pub public_view: PublicVisibility,
    /// Modulation-specific parameters (`speed`, `capcode`, `mode`,...) plus
    /// any key this model doesn't otherwise recognize, round-tripped
    /// verbatim. Use [`ChallengeConfig::modulation_params`] for a typed view.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl ChallengeConfig {
    /// Typed view of `modulation` + `extra`, built on demand so the enum's
    /// internal tagging never has to interact with this struct's own
    /// `#[serde(flatten)]` fields.
    pub fn modulation_params(&self) -> Result<ModulationParams, ModelError> {
        let mut obj = self.extra.clone();
        obj.insert("modulation".to_owned(), Value::String(self.modulation.clone()));
        serde_json::from_value(Value::Object(obj))
        .map_err(|_| ModelError::MissingField("modulation-specific parameter"))
    }

    /// Checks the invariants this crate can verify without external
    /// configuration (named frequency ranges live in the controller's
    /// static config, not here).
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.min_delay > self.max_delay {
            return Err(ModelError::DelayOrder {
                    min: self.min_delay,
                    max: self.max_delay,
            });
        }
        if let FrequencySpec::Named { frequency_ranges } = &self.frequency {
            if frequency_ranges.is_empty() {
                return Err(ModelError::EmptyFrequencyRanges);
            }
        }
        Ok(())
    }

    /// Rejects a raw config body that names more than one of
    /// `frequency` / `frequency_ranges` / `manual_frequency_range` before
    /// it ever reaches the untagged `FrequencySpec` parser, which would
    /// otherwise silently pick the first match and drop the conflict.
    pub fn check_frequency_exclusivity(raw: &Value) -> Result<(), ModelError> {
        let Some(obj) = raw.as_object() else {
            return Ok(());
        };
        let present = ["frequency", "frequency_ranges", "manual_frequency_range"]
        .iter().filter(|k| obj.contains_key(**k))
        .count();
        if present > 1 {
            return Err(ModelError::ConflictingFrequencySpec(
                    "exactly one of frequency, frequency_ranges, manual_frequency_range is allowed",
            ));
        }
        Ok(())
    }
}

/// A named, configured RF transmission recipe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    pub challenge_id: String,
    pub name: String,
    pub config: ChallengeConfig,
    pub enabled: bool,
    pub status: ChallengeStatus,
    pub priority: i64,
    pub assigned_to: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub assignment_expires: Option<DateTime<Utc>>,
    pub last_tx_time: Option<DateTime<Utc>>,
    pub transmission_count: u64,
    pub created_at: DateTime<Utc>,
}

/// What an anonymous caller is allowed to see of a challenge (`GET
/// /public/challenges`, and the `challenges_update` EventBus kind), gated
/// field-by-field on `config.public_view`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicChallengeView {
    pub challenge_id: String,
    pub name: String,
    pub modulation: Option<String>,
    pub frequency_hz: Option<u64>,
    pub last_tx_time: Option<DateTime<Utc>>,
    pub active: Option<bool>,
}

impl Challenge {
    /// Projects to the public-safe view, honoring each `show_*` flag
    /// independently. A fixed frequency is shown when permitted; a
    /// ranged/manual spec has no single value to show and is omitted.
    #[must_use]
    pub fn to_public_view(&self) -> PublicChallengeView {
        let view = &self.config.public_view;
        PublicChallengeView {
            challenge_id: self.challenge_id.clone(),
            name: self.name.clone(),
            modulation: view.show_modulation.then(|| self.config.modulation.clone()),
            frequency_hz: view.show_frequency.then(|| match self.config.frequency {
                    FrequencySpec::Fixed { frequency } => Some(frequency),
                    _ => None,
            }).flatten(),
            last_tx_time: view.show_last_tx_time.then_some(self.last_tx_time).flatten(),
            active: view
            .show_active_status
            .then_some(matches!(self.status, ChallengeStatus::Assigned)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cw_config(min_delay: u64, max_delay: u64) -> ChallengeConfig {
        let mut extra = serde_json::Map::new();
        extra.insert("speed".to_owned(), json!(20));
        ChallengeConfig {
            modulation: "cw".to_owned(),
            frequency: FrequencySpec::Fixed { frequency: 7_050_000 },
            min_delay,
            max_delay,
            flag: Some("flag{test}".into()),
            flag_file_hash: None,
            public_view: PublicVisibility::default(),
            extra,
        }
    }

    #[test]
    fn modulation_params_builds_typed_view() {
        let cfg = cw_config(60, 90);
        assert!(matches!(
                cfg.modulation_params().unwrap(),
                ModulationParams::Cw { speed: 20 }
        ));
    }

    #[test]
    fn rejects_min_delay_greater_than_max() {
        let err = cw_config(90, 60).validate().unwrap_err();
        assert_eq!(err, ModelError::DelayOrder { min: 90, max: 60 });
    }

    #[test]
    fn equal_min_max_delay_is_accepted() {
        assert!(cw_config(60, 60).validate().is_ok());
    }

    #[test]
    fn empty_named_ranges_rejected() {
        let mut cfg = cw_config(60, 90);
        cfg.frequency = FrequencySpec::Named { frequency_ranges: vec![] };
        assert_eq!(cfg.validate().unwrap_err(), ModelError::EmptyFrequencyRanges);
    }

    #[test]
    fn detects_conflicting_frequency_keys() {
        let raw = json!({
                "frequency": 7_050_000,
                "frequency_ranges": ["ham_144"],
                "min_delay": 60,
                "max_delay": 90,
        });
        assert!(ChallengeConfig::check_frequency_exclusivity(&raw).is_err());
    }

    #[test]
    fn single_frequency_key_is_fine() {
        let raw = json!({ "frequency": 7_050_000 });
        assert!(ChallengeConfig::check_frequency_exclusivity(&raw).is_ok());
    }

    #[test]
    fn unknown_keys_round_trip_through_extra() {
        let raw = json!({
                "modulation": "cw",
                "speed": 20,
                "frequency": 7_050_000,
                "min_delay": 60,
                "max_delay": 90,
                "some_future_field": "kept",
        });
        let cfg: ChallengeConfig = serde_json::from_value(raw).unwrap();
        assert_eq!(
            cfg.extra.get("some_future_field"),
            Some(&json!("kept"))
        );
    }

    fn sample_challenge(public_view: PublicVisibility) -> Challenge {
        let mut cfg = cw_config(60, 90);
        cfg.public_view = public_view;
        Challenge {
            challenge_id: "c1".to_owned(),
            name: "Challenge 1".to_owned(),
            config: cfg,
            enabled: true,
            status: ChallengeStatus::Assigned,
            priority: 0,
            assigned_to: Some("runner-1".to_owned()),
            assigned_at: None,
            assignment_expires: None,
            last_tx_time: Some(Utc::now()),
            transmission_count: 3,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn public_view_hides_everything_by_default() {
        let view = sample_challenge(PublicVisibility::default()).to_public_view();
        assert!(view.modulation.is_none());
        assert!(view.frequency_hz.is_none());
        assert!(view.last_tx_time.is_none());
        assert!(view.active.is_none());
    }

    #[test]
    fn public_view_reveals_only_flagged_fields() {
        let view = sample_challenge(PublicVisibility {
                show_modulation: true,
                show_frequency: true,
                show_last_tx_time: false,
                show_active_status: true,
        })
        .to_public_view();
        assert_eq!(view.modulation.as_deref(), Some("cw"));
        assert_eq!(view.frequency_hz, Some(7_050_000));
        assert!(view.last_tx_time.is_none());
        assert_eq!(view.active, Some(true));
    }
}
