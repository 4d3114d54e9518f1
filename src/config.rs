//! Runtime configuration read from the environment

use crate::capture::DEFAULT_BARGE_IN_THRESHOLD;
use crate::error::ConfigError;
use crate::frame::DEFAULT_JPEG_QUALITY;
use crate::gemini::GeminiClientConfig;
use crate::media_in::MediaConfig;
use std::str::FromStr;
use std::time::Duration;

pub const API_KEY_VAR: &str = "GEMINI_API_KEY";

/// Typical PulseAudio source rate
pub const DEFAULT_CAPTURE_RATE: u32 = 48_000;

/// Display refresh cadence
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_micros(16_667);

#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub app_name: String,
    pub gemini: GeminiClientConfig,
    /// Microphone rate; blocks are resampled from this to 16 kHz
    pub capture_rate: u32,
    pub barge_in_threshold: f32,
    pub frame_interval: Duration,
    pub jpeg_quality: u8,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            app_name: "ayin".to_string(),
            gemini: GeminiClientConfig::default(),
            capture_rate: DEFAULT_CAPTURE_RATE,
            barge_in_threshold: DEFAULT_BARGE_IN_THRESHOLD,
            frame_interval: DEFAULT_FRAME_INTERVAL,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl AssistantConfig {
    /// Read `GEMINI_API_KEY` (required) and the optional `AYIN_*` overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(API_KEY_VAR)
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::Missing(API_KEY_VAR))?;

        let mut config = Self {
            gemini: GeminiClientConfig::from_api_key(api_key.trim()),
            ..Default::default()
        };

        if let Some(model) = lookup("AYIN_MODEL") {
            config.gemini.model = if model.starts_with("models/") {
                model
            } else {
                format!("models/{}", model)
            };
        }
        if let Some(instruction) = lookup("AYIN_SYSTEM_INSTRUCTION") {
            config.gemini.system_instruction = Some(instruction).filter(|s| !s.is_empty());
        }
        if let Some(rate) = parse_var::<u32, _>(&lookup, "AYIN_CAPTURE_RATE")? {
            if rate == 0 {
                return Err(ConfigError::Invalid {
                    var: "AYIN_CAPTURE_RATE",
                    value: "0".into(),
                });
            }
            config.capture_rate = rate;
        }
        if let Some(threshold) = parse_var::<f32, _>(&lookup, "AYIN_BARGE_IN_RMS")? {
            if !(threshold > 0.0 && threshold <= 1.0) {
                return Err(ConfigError::Invalid {
                    var: "AYIN_BARGE_IN_RMS",
                    value: threshold.to_string(),
                });
            }
            config.barge_in_threshold = threshold;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "AYIN_FRAME_INTERVAL_MS")? {
            config.frame_interval = Duration::from_millis(ms.max(1));
        }

        Ok(config)
    }

    pub fn media(&self) -> MediaConfig {
        MediaConfig {
            app_name: self.app_name.clone(),
            capture_rate: self.capture_rate,
            frame_interval: self.frame_interval,
        }
    }
}

fn parse_var<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => match value.trim().parse() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(ConfigError::Invalid { var, value }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn test_api_key_is_required() {
        assert!(matches!(
            AssistantConfig::from_lookup(lookup(&[])),
            Err(ConfigError::Missing(API_KEY_VAR))
        ));
        assert!(AssistantConfig::from_lookup(lookup(&[(API_KEY_VAR, "  ")])).is_err());
    }

    #[test]
    fn test_defaults() {
        let config = AssistantConfig::from_lookup(lookup(&[(API_KEY_VAR, "k")])).unwrap();
        assert!(config.gemini.url.ends_with("?key=k"));
        assert_eq!(config.capture_rate, 48_000);
        assert_eq!(config.barge_in_threshold, 0.02);
        assert_eq!(config.frame_interval, DEFAULT_FRAME_INTERVAL);
        assert_eq!(config.media().capture_rate, 48_000);
    }

    #[test]
    fn test_overrides() {
        let config = AssistantConfig::from_lookup(lookup(&[
            (API_KEY_VAR, "k"),
            ("AYIN_MODEL", "gemini-live-test"),
            ("AYIN_CAPTURE_RATE", "44100"),
            ("AYIN_BARGE_IN_RMS", "0.05"),
            ("AYIN_FRAME_INTERVAL_MS", "500"),
            ("AYIN_SYSTEM_INSTRUCTION", ""),
        ]))
        .unwrap();
        assert_eq!(config.gemini.model, "models/gemini-live-test");
        assert_eq!(config.capture_rate, 44_100);
        assert_eq!(config.barge_in_threshold, 0.05);
        assert_eq!(config.frame_interval, Duration::from_millis(500));
        assert!(config.gemini.system_instruction.is_none());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        for (var, value) in [
            ("AYIN_CAPTURE_RATE", "fast"),
            ("AYIN_CAPTURE_RATE", "0"),
            ("AYIN_BARGE_IN_RMS", "-1"),
            ("AYIN_FRAME_INTERVAL_MS", "1.5"),
        ] {
            let result = AssistantConfig::from_lookup(lookup(&[(API_KEY_VAR, "k"), (var, value)]));
            assert!(
                matches!(result, Err(ConfigError::Invalid { var: v, .. }) if v == var),
                "{var}={value}"
            );
        }
    }
}
