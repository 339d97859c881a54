//! Runtime configuration, read from `MONEYMIND_*` environment variables.
//!
//! Every setting has a default, so an empty environment yields a working
//! configuration with the completion service disabled.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub(crate) const DEFAULT_AI_HOST: &str = "https://api.openai.com";
const DEFAULT_AI_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_AI_TIMEOUT_SECS: u64 = 10;
const DEFAULT_AI_TEMPERATURE: f32 = 0.7;
const DEFAULT_CURRENCY: &str = "DH";

#[derive(Debug, Clone)]
pub(crate) struct Config {
    /// `None` means the platform data directory.
    pub(crate) db_path: Option<PathBuf>,
    pub(crate) advice: AdviceSettings,
    /// `None` when no completion endpoint is configured.
    pub(crate) completion: Option<CompletionConfig>,
}

#[derive(Debug, Clone)]
pub(crate) struct AdviceSettings {
    pub(crate) thresholds: AdviceThresholds,
    /// Label printed after every amount in a report.
    pub(crate) currency: String,
}

impl Default for AdviceSettings {
    fn default() -> Self {
        Self {
            thresholds: AdviceThresholds::default(),
            currency: DEFAULT_CURRENCY.into(),
        }
    }
}

/// Ratios are fractions of a budget limit (0.90 = 90%).
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AdviceThresholds {
    pub(crate) high: Decimal,
    pub(crate) moderate: Decimal,
    pub(crate) targeted: Decimal,
    /// A category needs strictly more expense transactions than this to be reported as frequent.
    pub(crate) frequency_min: usize,
    /// Unbudgeted spending above this amount earns a "create a budget" line.
    pub(crate) unbudgeted_min: Decimal,
}

impl Default for AdviceThresholds {
    fn default() -> Self {
        Self {
            high: Decimal::new(90, 2),
            moderate: Decimal::new(70, 2),
            targeted: Decimal::new(80, 2),
            frequency_min: 5,
            unbudgeted_min: Decimal::new(100, 0),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct CompletionConfig {
    pub(crate) base_url: String,
    pub(crate) model: String,
    pub(crate) api_key: Option<String>,
    pub(crate) timeout: Duration,
    pub(crate) temperature: f32,
}

impl Config {
    pub(crate) fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let defaults = AdviceThresholds::default();
        let thresholds = AdviceThresholds {
            high: parse_or(&get, "MONEYMIND_THRESHOLD_HIGH", defaults.high)?,
            moderate: parse_or(&get, "MONEYMIND_THRESHOLD_MODERATE", defaults.moderate)?,
            targeted: parse_or(&get, "MONEYMIND_THRESHOLD_TARGETED", defaults.targeted)?,
            frequency_min: parse_or(&get, "MONEYMIND_FREQUENCY_MIN", defaults.frequency_min)?,
            unbudgeted_min: parse_or(&get, "MONEYMIND_UNBUDGETED_MIN", defaults.unbudgeted_min)?,
        };
        if thresholds.moderate > thresholds.high {
            anyhow::bail!(
                "MONEYMIND_THRESHOLD_MODERATE ({}) must not exceed MONEYMIND_THRESHOLD_HIGH ({})",
                thresholds.moderate,
                thresholds.high
            );
        }

        let advice = AdviceSettings {
            thresholds,
            currency: get("MONEYMIND_CURRENCY").unwrap_or_else(|| DEFAULT_CURRENCY.into()),
        };

        let host = get("MONEYMIND_AI_HOST");
        let api_key = get("MONEYMIND_AI_KEY").or_else(|| get("OPENAI_API_KEY"));
        // The default host needs a key; a custom (usually local) host may not.
        let completion = if host.is_some() || api_key.is_some() {
            let timeout_secs = parse_or(&get, "MONEYMIND_AI_TIMEOUT_SECS", DEFAULT_AI_TIMEOUT_SECS)?;
            Some(CompletionConfig {
                base_url: host
                    .unwrap_or_else(|| DEFAULT_AI_HOST.into())
                    .trim_end_matches('/')
                    .to_string(),
                model: get("MONEYMIND_AI_MODEL").unwrap_or_else(|| DEFAULT_AI_MODEL.into()),
                api_key,
                timeout: Duration::from_secs(timeout_secs),
                temperature: parse_or(&get, "MONEYMIND_AI_TEMPERATURE", DEFAULT_AI_TEMPERATURE)?,
            })
        } else {
            None
        };

        Ok(Self {
            db_path: get("MONEYMIND_DB").map(PathBuf::from),
            advice,
            completion,
        })
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("Invalid value for {key}: '{raw}'")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert!(config.db_path.is_none());
        assert!(config.completion.is_none());
        assert_eq!(config.advice.currency, "DH");
        let t = config.advice.thresholds;
        assert_eq!(t.high, dec!(0.90));
        assert_eq!(t.moderate, dec!(0.70));
        assert_eq!(t.targeted, dec!(0.80));
        assert_eq!(t.frequency_min, 5);
        assert_eq!(t.unbudgeted_min, dec!(100));
    }

    #[test]
    fn test_api_key_enables_completion_with_default_host() {
        let config = config_from(&[("OPENAI_API_KEY", "sk-test")]).unwrap();
        let completion = config.completion.unwrap();
        assert_eq!(completion.base_url, DEFAULT_AI_HOST);
        assert_eq!(completion.api_key.as_deref(), Some("sk-test"));
        assert_eq!(completion.model, "gpt-3.5-turbo");
        assert_eq!(completion.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_custom_host_without_key() {
        let config = config_from(&[
            ("MONEYMIND_AI_HOST", "http://localhost:8080/"),
            ("MONEYMIND_AI_MODEL", "llama3.2"),
            ("MONEYMIND_AI_TIMEOUT_SECS", "3"),
        ])
        .unwrap();
        let completion = config.completion.unwrap();
        assert_eq!(completion.base_url, "http://localhost:8080");
        assert_eq!(completion.model, "llama3.2");
        assert!(completion.api_key.is_none());
        assert_eq!(completion.timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_moneymind_key_wins_over_openai_key() {
        let config = config_from(&[
            ("MONEYMIND_AI_KEY", "mine"),
            ("OPENAI_API_KEY", "theirs"),
        ])
        .unwrap();
        assert_eq!(config.completion.unwrap().api_key.as_deref(), Some("mine"));
    }

    #[test]
    fn test_threshold_overrides() {
        let config = config_from(&[
            ("MONEYMIND_THRESHOLD_HIGH", "0.95"),
            ("MONEYMIND_FREQUENCY_MIN", "3"),
            ("MONEYMIND_UNBUDGETED_MIN", "250.50"),
            ("MONEYMIND_CURRENCY", "EUR"),
            ("MONEYMIND_DB", "/tmp/mm.db"),
        ])
        .unwrap();
        assert_eq!(config.advice.thresholds.high, dec!(0.95));
        assert_eq!(config.advice.thresholds.frequency_min, 3);
        assert_eq!(config.advice.thresholds.unbudgeted_min, dec!(250.50));
        assert_eq!(config.advice.currency, "EUR");
        assert_eq!(config.db_path, Some(PathBuf::from("/tmp/mm.db")));
    }

    #[test]
    fn test_invalid_values_name_the_variable() {
        let err = config_from(&[("MONEYMIND_FREQUENCY_MIN", "many")]).unwrap_err();
        assert!(err.to_string().contains("MONEYMIND_FREQUENCY_MIN"));

        let err = config_from(&[("MONEYMIND_AI_HOST", "http://x"), ("MONEYMIND_AI_TIMEOUT_SECS", "-1")])
            .unwrap_err();
        assert!(err.to_string().contains("MONEYMIND_AI_TIMEOUT_SECS"));
    }

    #[test]
    fn test_moderate_above_high_rejected() {
        assert!(config_from(&[("MONEYMIND_THRESHOLD_MODERATE", "0.95")]).is_err());
    }

    #[test]
    fn test_blank_values_use_defaults() {
        let config = config_from(&[("MONEYMIND_CURRENCY", "  "), ("OPENAI_API_KEY", "")]).unwrap();
        assert_eq!(config.advice.currency, "DH");
        assert!(config.completion.is_none());
    }
}
