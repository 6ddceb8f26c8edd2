//! Runtime configuration
//!
//! Defaults and presets are plain constructors; `from_env` layers
//! `OPTIMIST_*` environment variables on top of the defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use optimist_core::{OptimistError, OptimistResult};
use optimist_state::{LedgerConfig, PlainActionPolicy};

use crate::RemoteConfig;

pub const ENV_LOG: &str = "OPTIMIST_LOG";
pub const ENV_LOG_FORMAT: &str = "OPTIMIST_LOG_FORMAT";
pub const ENV_MAX_OPEN: &str = "OPTIMIST_MAX_OPEN";
pub const ENV_PLAIN_POLICY: &str = "OPTIMIST_PLAIN_POLICY";
pub const ENV_REMOTE_DELAY: &str = "OPTIMIST_REMOTE_DELAY";
pub const ENV_REMOTE_SUCCESS_RATE: &str = "OPTIMIST_REMOTE_SUCCESS_RATE";

/// Log output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> OptimistResult<Self> {
        match value.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(OptimistError::Config(format!(
                "{ENV_LOG_FORMAT}: unknown format {other:?}"
            ))),
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive, e.g. `info,optimist_state=debug`
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            filter: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Runtime configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub ledger: LedgerConfig,
    pub log: LogConfig,
    pub remote: RemoteConfig,
}

impl RuntimeConfig {
    /// Deterministic setup for tests: strict ledger, instant remote
    pub fn testing() -> Self {
        RuntimeConfig {
            ledger: LedgerConfig::strict(),
            log: LogConfig {
                filter: "debug".to_string(),
                format: LogFormat::Compact,
            },
            remote: RemoteConfig::instant(),
        }
    }

    /// Defaults overridden by `OPTIMIST_*` environment variables
    pub fn from_env() -> OptimistResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable
    pub fn from_lookup<F>(lookup: F) -> OptimistResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = RuntimeConfig::default();

        if let Some(filter) = lookup(ENV_LOG) {
            config.log.filter = filter;
        }
        if let Some(format) = lookup(ENV_LOG_FORMAT) {
            config.log.format = LogFormat::parse(&format)?;
        }
        if let Some(max_open) = lookup(ENV_MAX_OPEN) {
            config.ledger.max_open_transactions = parse_max_open(&max_open)?;
        }
        if let Some(policy) = lookup(ENV_PLAIN_POLICY) {
            config.ledger.plain_action_policy = parse_policy(&policy)?;
        }
        if let Some(delay) = lookup(ENV_REMOTE_DELAY) {
            config.remote.delay = parse_duration(&delay)?;
        }
        if let Some(rate) = lookup(ENV_REMOTE_SUCCESS_RATE) {
            config.remote.success_rate = parse_rate(&rate)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> OptimistResult<()> {
        if !(0.0..=1.0).contains(&self.remote.success_rate) {
            return Err(OptimistError::Config(format!(
                "remote success rate {} outside 0.0..=1.0",
                self.remote.success_rate
            )));
        }
        if self.ledger.max_open_transactions == Some(0) {
            return Err(OptimistError::Config(
                "max open transactions must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Effective configuration as pretty JSON
    pub fn to_json(&self) -> OptimistResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| OptimistError::Config(e.to_string()))
    }
}

fn parse_max_open(value: &str) -> OptimistResult<Option<usize>> {
    if value.eq_ignore_ascii_case("unbounded") {
        return Ok(None);
    }
    value
        .parse::<usize>()
        .map(Some)
        .map_err(|e| OptimistError::Config(format!("{ENV_MAX_OPEN}: {e}")))
}

fn parse_policy(value: &str) -> OptimistResult<PlainActionPolicy> {
    match value.to_ascii_lowercase().as_str() {
        "bypass" => Ok(PlainActionPolicy::Bypass),
        "rebase" => Ok(PlainActionPolicy::Rebase),
        other => Err(OptimistError::Config(format!(
            "{ENV_PLAIN_POLICY}: unknown policy {other:?}"
        ))),
    }
}

fn parse_duration(value: &str) -> OptimistResult<Duration> {
    humantime::parse_duration(value)
        .map_err(|e| OptimistError::Config(format!("{ENV_REMOTE_DELAY}: {e}")))
}

fn parse_rate(value: &str) -> OptimistResult<f64> {
    value
        .parse::<f64>()
        .map_err(|e| OptimistError::Config(format!("{ENV_REMOTE_SUCCESS_RATE}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.remote.delay, Duration::from_secs(2));
        assert_eq!(config.ledger.max_open_transactions, None);
    }

    #[test]
    fn test_overrides() {
        let config = RuntimeConfig::from_lookup(lookup(&[
            (ENV_LOG, "debug"),
            (ENV_LOG_FORMAT, "JSON"),
            (ENV_MAX_OPEN, "16"),
            (ENV_PLAIN_POLICY, "rebase"),
            (ENV_REMOTE_DELAY, "250ms"),
            (ENV_REMOTE_SUCCESS_RATE, "0.75"),
        ]))
        .unwrap();

        assert_eq!(config.log.filter, "debug");
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.ledger.max_open_transactions, Some(16));
        assert_eq!(config.ledger.plain_action_policy, PlainActionPolicy::Rebase);
        assert_eq!(config.remote.delay, Duration::from_millis(250));
        assert_eq!(config.remote.success_rate, 0.75);
    }

    #[test]
    fn test_unbounded_max_open() {
        let config =
            RuntimeConfig::from_lookup(lookup(&[(ENV_MAX_OPEN, "unbounded")])).unwrap();
        assert_eq!(config.ledger.max_open_transactions, None);
    }

    #[test]
    fn test_invalid_values_rejected() {
        for (key, value) in [
            (ENV_LOG_FORMAT, "xml"),
            (ENV_MAX_OPEN, "many"),
            (ENV_MAX_OPEN, "0"),
            (ENV_PLAIN_POLICY, "merge"),
            (ENV_REMOTE_DELAY, "soon"),
            (ENV_REMOTE_SUCCESS_RATE, "1.5"),
        ] {
            let err = RuntimeConfig::from_lookup(lookup(&[(key, value)])).unwrap_err();
            assert!(matches!(err, OptimistError::Config(_)), "{key}={value}");
        }
    }

    #[test]
    fn test_json_roundtrip() {
        let config = RuntimeConfig::testing();
        let json = config.to_json().unwrap();
        let parsed: RuntimeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    #[serial]
    fn test_from_env() {
        std::env::set_var(ENV_REMOTE_DELAY, "1s");
        std::env::set_var(ENV_LOG, "warn");
        let config = RuntimeConfig::from_env();
        std::env::remove_var(ENV_REMOTE_DELAY);
        std::env::remove_var(ENV_LOG);

        let config = config.unwrap();
        assert_eq!(config.remote.delay, Duration::from_secs(1));
        assert_eq!(config.log.filter, "warn");
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_garbage() {
        std::env::set_var(ENV_REMOTE_SUCCESS_RATE, "often");
        let result = RuntimeConfig::from_env();
        std::env::remove_var(ENV_REMOTE_SUCCESS_RATE);

        assert!(result.is_err());
    }
}
