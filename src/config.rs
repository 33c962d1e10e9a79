//! Guardrail policy configuration.
//!
//! Thresholds and budgets are data, not code: they load once, validate,
//! and are then passed by value into the pipeline. There is no hot reload
//! and no process-global mutable state.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GuardrailConfig {
    /// Combined threat score at or above which a query is blocked.
    pub block_threshold: f64,
    /// Combined threat score at or above which warnings are recorded.
    pub warning_threshold: f64,
    /// Average chunk trust at or above which the high budget tier applies.
    pub trust_threshold: f64,
    /// Context budget in characters for low-trust retrievals.
    pub context_budget_low: usize,
    /// Context budget in characters for high-trust retrievals.
    pub context_budget_high: usize,
    /// How far back to look for a sentence boundary when cutting a chunk.
    pub truncation_tolerance: usize,
    pub default_top_k: usize,
    pub default_temperature: f64,
    pub generation_timeout_secs: u64,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            block_threshold: 0.75,
            warning_threshold: 0.5,
            trust_threshold: 0.6,
            context_budget_low: 2000,
            context_budget_high: 4000,
            truncation_tolerance: 120,
            default_top_k: 5,
            default_temperature: 0.7,
            generation_timeout_secs: 120,
        }
    }
}

impl GuardrailConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("block_threshold", self.block_threshold),
            ("warning_threshold", self.warning_threshold),
            ("trust_threshold", self.trust_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Validation(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.warning_threshold > self.block_threshold {
            return Err(ConfigError::Validation(
                "warning_threshold must not exceed block_threshold".into(),
            ));
        }
        if self.context_budget_low == 0 || self.context_budget_low > self.context_budget_high {
            return Err(ConfigError::Validation(
                "context budgets must satisfy 0 < low <= high".into(),
            ));
        }
        if self.default_top_k == 0 {
            return Err(ConfigError::Validation("default_top_k must be > 0".into()));
        }
        if self.generation_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "generation_timeout_secs must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(GuardrailConfig::default().validate().is_ok());
    }

    #[test]
    fn toml_overrides_selected_fields() {
        let config = GuardrailConfig::from_toml_str(
            "block_threshold = 0.8\ncontext_budget_high = 6000\n",
        )
        .unwrap();
        assert_eq!(config.block_threshold, 0.8);
        assert_eq!(config.context_budget_high, 6000);
        // Everything else keeps its default.
        assert_eq!(config.context_budget_low, 2000);
        assert_eq!(config.default_top_k, 5);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(GuardrailConfig::from_toml_str("no_such_field = 1\n").is_err());
    }

    #[test]
    fn out_of_range_threshold_fails_validation() {
        let mut config = GuardrailConfig::default();
        config.block_threshold = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn inverted_budgets_fail_validation() {
        let mut config = GuardrailConfig::default();
        config.context_budget_low = 8000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn inverted_thresholds_fail_validation() {
        let mut config = GuardrailConfig::default();
        config.warning_threshold = 0.9;
        assert!(config.validate().is_err());
    }
}
