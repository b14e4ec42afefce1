//! # Configuration Settings
//!
//! Process-level settings for the broker. Backend configuration and roles are
//! written at runtime through [`crate::services::CredentialBroker`]; these are
//! the knobs the host fixes at startup.

use crate::errors::{Error, Result};
use crate::resilience::circuit_breaker::{DEFAULT_MAX_FAILURES, DEFAULT_RESET_TIMEOUT};
use crate::telemetry::{TelemetryConfig, TelemetryInput};
use std::str::FromStr;
use std::time::Duration;
use validator::Validate;

const ENV_BREAKER_MAX_FAILURES: &str = "CREDBROKER_BREAKER_MAX_FAILURES";
const ENV_BREAKER_RESET_TIMEOUT: &str = "CREDBROKER_BREAKER_RESET_TIMEOUT";
const ENV_LOG_LEVEL: &str = "CREDBROKER_LOG_LEVEL";
const ENV_LOG_JSON: &str = "CREDBROKER_LOG_JSON";

/// Main broker settings
#[derive(Debug, Clone, Default)]
pub struct BrokerSettings {
    pub breaker: BreakerSettings,

    pub logging: LoggingSettings,

    pub telemetry: TelemetryConfig,
}

/// Circuit breaker thresholds shared by every request
#[derive(Debug, Clone, Validate)]
pub struct BreakerSettings {
    /// Consecutive request failures before the breaker opens
    #[validate(range(min = 1, max = 100, message = "max_failures must be between 1 and 100"))]
    pub max_failures: u32,

    /// How long the breaker stays open before admitting a trial call
    pub reset_timeout: Duration,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self { max_failures: DEFAULT_MAX_FAILURES, reset_timeout: DEFAULT_RESET_TIMEOUT }
    }
}

#[derive(Debug, Clone, Validate)]
pub struct LoggingSettings {
    /// Default filter directive, overridden by `RUST_LOG`
    #[validate(length(min = 1, message = "log level cannot be empty"))]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e| Error::config(format!("Invalid {} '{}': {}", key, raw, e)))
}

impl BrokerSettings {
    /// Resolve settings from an environment lookup.
    pub fn resolve<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut settings = Self::default();

        if let Some(raw) = env(ENV_BREAKER_MAX_FAILURES) {
            settings.breaker.max_failures = parse_var(ENV_BREAKER_MAX_FAILURES, &raw)?;
        }
        if let Some(raw) = env(ENV_BREAKER_RESET_TIMEOUT) {
            settings.breaker.reset_timeout = humantime::parse_duration(raw.trim()).map_err(|e| {
                Error::config(format!("Invalid {} '{}': {}", ENV_BREAKER_RESET_TIMEOUT, raw, e))
            })?;
        }
        if let Some(level) = env(ENV_LOG_LEVEL) {
            settings.logging.level = level;
        }
        if let Some(raw) = env(ENV_LOG_JSON) {
            settings.logging.json = parse_var(ENV_LOG_JSON, &raw.to_ascii_lowercase())?;
        }

        settings.telemetry = TelemetryConfig::resolve(TelemetryInput::default(), &lookup);
        settings.validate()?;
        Ok(settings)
    }

    /// Resolve settings from the process environment
    pub fn from_env() -> Result<Self> {
        Self::resolve(|key| std::env::var(key).ok())
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(&self.breaker).map_err(Error::from)?;
        Validate::validate(&self.logging).map_err(Error::from)?;

        if self.breaker.reset_timeout.is_zero() {
            return Err(Error::validation_field(
                "reset_timeout must be greater than zero",
                "reset_timeout",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn resolve_with(vars: &[(&str, &str)]) -> Result<BrokerSettings> {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        BrokerSettings::resolve(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let settings = resolve_with(&[]).unwrap();
        assert_eq!(settings.breaker.max_failures, 5);
        assert_eq!(settings.breaker.reset_timeout, Duration::from_secs(60));
        assert_eq!(settings.logging.level, "info");
        assert!(!settings.logging.json);
        assert_eq!(settings.telemetry.service_name, "credbroker");
    }

    #[test]
    fn environment_overrides() {
        let settings = resolve_with(&[
            ("CREDBROKER_BREAKER_MAX_FAILURES", "3"),
            ("CREDBROKER_BREAKER_RESET_TIMEOUT", "2m 30s"),
            ("CREDBROKER_LOG_LEVEL", "credbroker=debug"),
            ("CREDBROKER_LOG_JSON", "TRUE"),
            ("ENV", "dev"),
        ])
        .unwrap();
        assert_eq!(settings.breaker.max_failures, 3);
        assert_eq!(settings.breaker.reset_timeout, Duration::from_secs(150));
        assert_eq!(settings.logging.level, "credbroker=debug");
        assert!(settings.logging.json);
        assert_eq!(settings.telemetry.environment, "dev");
    }

    #[test]
    fn unparsable_values_are_config_errors() {
        assert!(matches!(
            resolve_with(&[("CREDBROKER_BREAKER_MAX_FAILURES", "many")]),
            Err(Error::Config { .. })
        ));
        assert!(matches!(
            resolve_with(&[("CREDBROKER_BREAKER_RESET_TIMEOUT", "later")]),
            Err(Error::Config { .. })
        ));
        assert!(matches!(
            resolve_with(&[("CREDBROKER_LOG_JSON", "yes")]),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn out_of_range_values_fail_validation() {
        let err = resolve_with(&[("CREDBROKER_BREAKER_MAX_FAILURES", "0")]).unwrap_err();
        assert!(err.to_string().contains("max_failures must be between 1 and 100"));

        let err = resolve_with(&[("CREDBROKER_BREAKER_RESET_TIMEOUT", "0s")]).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }
}
