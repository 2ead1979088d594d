//! Runner config YAML rendering for `provision`. Built by hand rather than
//! through a YAML serializer: this document is never round-tripped through
//! a parser, it is a one-shot paste-and-edit artifact for the operator.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// A device entry as supplied to `provision`, cosmetic only: it seeds the
/// generated config, it is never persisted or matched against an enrolled
/// agent's actual hardware.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvisionDevice {
    pub name: String,
    pub model: String,
    pub rf_gain: Option<i64>,
    pub if_gain: Option<i64>,
    pub frequency_limits: Vec<String>,
}

#[allow(clippy::too_many_arguments)]
#[must_use]
pub fn render(
    runner_name: &str,
    runner_id: &str,
    provisioning_key_id: &str,
    server_url: &str,
    enrollment_token: &str,
    api_key: &str,
    verify_ssl: bool,
    devices: &[ProvisionDevice],
    generated_at: DateTime<Utc>,
) -> String {
    let mut out = format!(
        r#"---
        # ChallengeCtl Runner Configuration
        # Provisioned for: {runner_name}
        # Provisioned by: {provisioning_key_id}
        # Generated: {generated_at}

        runner:
        # Runner identification
        runner_id: "{runner_id}"

        # Server connection
        server_url: "{server_url}"

        # Enrollment credentials
        # Note: enrollment_token can be left in config, it will be ignored once enrolled
        enrollment_token: "{enrollment_token}"
        api_key: "{api_key}"

        # TLS/SSL Configuration
        ca_cert: ""
        verify_ssl: {verify_ssl}

        # Intervals
        heartbeat_interval: 30
        poll_interval: 10

        # Cache
        cache_dir: "cache"

        # Spectrum paint before challenges
        spectrum_paint_before_challenge: true

        # Radio/SDR Device Configuration
        radios:
        # Model defaults
        models:
        - model: hackrf
        rf_gain: 14
        if_gain: 32
        bias_t: true
        rf_samplerate: 2000000
        ppm: 0

        - model: bladerf
        rf_gain: 43
        bias_t: true
        rf_samplerate: 2000000
        ppm: 0

        - model: usrp
        rf_gain: 20
        bias_t: false
        rf_samplerate: 2000000
        ppm: 0

        # Individual devices
        devices:
        "#,
        runner_name = runner_name,
        provisioning_key_id = provisioning_key_id,
        generated_at = generated_at.to_rfc3339(),
        runner_id = runner_id,
        server_url = server_url,
        enrollment_token = enrollment_token,
        api_key = api_key,
        verify_ssl = verify_ssl,
    );

    if devices.is_empty() {
        out.push_str(
            " - name: 0\n model: hackrf\n rf_gain: 14\n if_gain: 32\n \
            frequency_limits:\n - \"144000000-148000000\" # 2m ham band\n \
            - \"420000000-450000000\" # 70cm ham band\n",
        );
        return out;
    }

    for device in devices {
        let name = if device.name.is_empty() { "0" } else { &device.name };
        let model = if device.model.is_empty() { "hackrf" } else { &device.model };
        out.push_str(&format!(" - name: {name}\n model: {model}\n"));
        out.push_str(&format!(" rf_gain: {}\n", device.rf_gain.unwrap_or(14)));
        if model == "hackrf" {
            if let Some(if_gain) = device.if_gain {
                out.push_str(&format!(" if_gain: {if_gain}\n"));
            }
        }
        if !device.frequency_limits.is_empty() {
            out.push_str(" frequency_limits:\n");
            for limit in &device.frequency_limits {
                out.push_str(&format!(" - \"{limit}\"\n"));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_device_is_used_when_none_supplied() {
        let yaml = render(
            "ci-runner",
            "ci-runner",
            "key-1",
            "https://example.test",
            "tok",
            "key",
            true,
            &[],
            Utc::now(),
        );
        assert!(yaml.contains("2m ham band"));
        assert!(yaml.contains(r#"enrollment_token: "tok""#));
    }

    #[test]
    fn explicit_devices_override_the_default() {
        let devices = vec![ProvisionDevice {
                name: "0".to_owned(),
                model: "bladerf".to_owned(),
                rf_gain: Some(30),
                if_gain: None,
                frequency_limits: vec!["900000000-920000000".to_owned()],
        }];
        let yaml = render(
            "ci-runner",
            "ci-runner",
            "key-1",
            "https://example.test",
            "tok",
            "key",
            false,
            &devices,
            Utc::now(),
        );
        assert!(!yaml.contains("2m ham band"));
        assert!(yaml.contains("model: bladerf"));
        assert!(yaml.contains("900000000-920000000"));
        assert!(yaml.contains("verify_ssl: false"));
    }
}
