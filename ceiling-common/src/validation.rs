//! Configuration validation.
//!
//! Checks ranges and cross-field constraints before the scanner starts so
//! that a bad weight or breakpoint fails at load time instead of mid-scan.

use std::collections::HashSet;
use thiserror::Error;

use crate::config::{Config, ModelSettings, ObservabilityConfig, ProviderSettings, ScanSettings};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Configuration conflict: {reason}")]
    Conflict { reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = self.observability.validate() {
            errors.push(e);
        }
        if let Err(e) = self.scan.validate() {
            errors.push(e);
        }
        if let Err(e) = self.model.validate() {
            errors.push(e);
        }
        for provider in &self.providers {
            if let Err(e) = provider.validate() {
                errors.push(e);
            }
        }
        if let Err(e) = self.check_provider_names() {
            errors.push(e);
        }

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }

    /// Provider names key the health table and rate limiters.
    fn check_provider_names(&self) -> ValidationResult<()> {
        let mut seen = HashSet::new();
        for provider in &self.providers {
            if !seen.insert(provider.name.as_str()) {
                return Err(ValidationError::Conflict {
                    reason: format!("Provider name '{}' is used more than once", provider.name),
                });
            }
        }
        Ok(())
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            });
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.log_format.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            });
        }

        Ok(())
    }
}

impl Validate for ScanSettings {
    fn validate(&self) -> ValidationResult<()> {
        if self.preset.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "scan.preset".into(),
            });
        }

        if let Some(weights) = &self.weights {
            let named = [
                ("volume", weights.volume),
                ("momentum", weights.momentum),
                ("size", weights.size),
                ("rsi", weights.rsi),
                ("resistance", weights.resistance),
            ];
            for (name, value) in named {
                if let Some(v) = value {
                    if !v.is_finite() || v < 0.0 {
                        return Err(ValidationError::InvalidValue {
                            field: format!("scan.weights.{}", name),
                            reason: "must be a non-negative number".into(),
                        });
                    }
                }
            }
        }

        if let Some(breakpoints) = &self.risk_breakpoints {
            if breakpoints.len() != 4 {
                return Err(ValidationError::InvalidValue {
                    field: "scan.risk_breakpoints".into(),
                    reason: format!("expected 4 values, got {}", breakpoints.len()),
                });
            }
            if breakpoints.windows(2).any(|w| w[0] <= w[1]) {
                return Err(ValidationError::InvalidValue {
                    field: "scan.risk_breakpoints".into(),
                    reason: "must be strictly descending".into(),
                });
            }
        }

        check_unit_interval("scan.min_probability", self.min_probability)?;
        check_unit_interval("scan.sentiment", self.sentiment)?;
        check_unit_interval("scan.market_penalty", self.market_penalty)?;

        if self.max_concurrency == 0 {
            return Err(ValidationError::InvalidValue {
                field: "scan.max_concurrency".into(),
                reason: "must be at least 1".into(),
            });
        }

        if self.bars_limit < 20 {
            return Err(ValidationError::InvalidValue {
                field: "scan.bars_limit".into(),
                reason: "must cover at least 20 bars".into(),
            });
        }

        Ok(())
    }
}

impl Validate for ProviderSettings {
    fn validate(&self) -> ValidationResult<()> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "providers[].name".into(),
            });
        }

        let (calls, window) = self.rate_limit();
        if calls == 0 || window == 0 {
            return Err(ValidationError::InvalidValue {
                field: format!("providers.{}.max_calls", self.name),
                reason: "rate limit calls and window must be positive".into(),
            });
        }

        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: format!("providers.{}.timeout_secs", self.name),
                reason: "must be positive".into(),
            });
        }

        if matches!(self.kind, crate::config::ProviderKind::Snapshot) && self.snapshot_path.is_none()
        {
            return Err(ValidationError::MissingField {
                field: format!("providers.{}.snapshot_path", self.name),
            });
        }

        Ok(())
    }
}

impl Validate for ModelSettings {
    fn validate(&self) -> ValidationResult<()> {
        check_unit_interval("model.forest_weight", self.forest_weight)?;
        check_unit_interval("model.boosting_weight", self.boosting_weight)?;

        if ((self.forest_weight + self.boosting_weight) - 1.0).abs() > 1e-9 {
            return Err(ValidationError::InvalidValue {
                field: "model.forest_weight".into(),
                reason: "ensemble weights must sum to 1.0".into(),
            });
        }

        if self.min_samples == 0 || self.n_trees == 0 {
            return Err(ValidationError::InvalidValue {
                field: "model.min_samples".into(),
                reason: "sample and tree counts must be positive".into(),
            });
        }

        if self.ceiling_threshold.is_nan() || self.ceiling_threshold <= 0.0 {
            return Err(ValidationError::InvalidValue {
                field: "model.ceiling_threshold".into(),
                reason: "must be a positive percentage".into(),
            });
        }

        Ok(())
    }
}

fn check_unit_interval(field: &str, value: f64) -> ValidationResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::InvalidValue {
            field: field.into(),
            reason: format!("{} is outside [0, 1]", value),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProviderKind, WeightOverrides};
    use test_case::test_case;

    fn provider(name: &str) -> ProviderSettings {
        ProviderSettings {
            name: name.into(),
            kind: ProviderKind::TwelveData,
            priority: None,
            enabled: true,
            max_calls: None,
            window_secs: None,
            timeout_secs: 30,
            base_url: None,
            api_key: None,
            api_key_env: None,
            snapshot_path: None,
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test_case("verbose", "pretty" ; "bad level")]
    #[test_case("info", "xml" ; "bad format")]
    fn test_invalid_observability(level: &str, format: &str) {
        let config = ObservabilityConfig {
            log_level: level.into(),
            log_format: format.into(),
            excluded_targets: vec![],
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_breakpoints_must_descend() {
        let mut scan = ScanSettings::default();
        scan.risk_breakpoints = Some(vec![8.0, 6.0, 6.0, 2.0]);
        assert!(scan.validate().is_err());

        scan.risk_breakpoints = Some(vec![8.0, 6.0, 4.0, 2.0]);
        assert!(scan.validate().is_ok());
    }

    #[test]
    fn test_negative_weight_rejected() {
        let mut scan = ScanSettings::default();
        scan.weights = Some(WeightOverrides {
            volume: Some(-0.1),
            ..Default::default()
        });
        let err = scan.validate().unwrap_err();
        assert!(err.to_string().contains("scan.weights.volume"));
    }

    #[test_case(1.2 ; "above one")]
    #[test_case(-0.1 ; "negative")]
    fn test_probability_range(value: f64) {
        let mut scan = ScanSettings::default();
        scan.min_probability = value;
        assert!(scan.validate().is_err());
    }

    #[test]
    fn test_ensemble_weights_must_sum_to_one() {
        let model = ModelSettings {
            forest_weight: 0.7,
            boosting_weight: 0.4,
            ..Default::default()
        };
        assert!(model.validate().is_err());
    }

    #[test]
    fn test_duplicate_provider_names() {
        let mut config = Config::default();
        config.providers = vec![provider("td"), provider("td")];
        match config.validate() {
            Err(ValidationError::Conflict { reason }) => assert!(reason.contains("td")),
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[test]
    fn test_snapshot_requires_path() {
        let mut p = provider("local");
        p.kind = ProviderKind::Snapshot;
        assert!(p.validate().is_err());
        p.snapshot_path = Some("/tmp/snapshot.json".into());
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_multiple_errors_collected() {
        let mut config = Config::default();
        config.observability.log_level = "loud".into();
        config.scan.max_concurrency = 0;
        assert!(matches!(config.validate(), Err(ValidationError::Multiple(v)) if v.len() == 2));
    }
}
