//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

use optimist_core::{OptimistError, OptimistResult};

use crate::{LogConfig, LogFormat};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured filter when set. Fails if a global
/// subscriber is already installed or the filter does not parse.
pub fn init_tracing(config: &LogConfig) -> OptimistResult<()> {
    let filter = build_filter(config)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = match config.format {
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| OptimistError::Config(format!("tracing: {e}")))
}

fn build_filter(config: &LogConfig) -> OptimistResult<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.filter)
        .map_err(|e| OptimistError::Config(format!("log filter {:?}: {e}", config.filter)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_filter_from_config() {
        std::env::remove_var("RUST_LOG");
        let config = LogConfig {
            filter: "optimist_state=debug,warn".to_string(),
            format: LogFormat::Compact,
        };
        let filter = build_filter(&config).unwrap();
        assert!(filter.to_string().contains("optimist_state=debug"));
    }

    #[test]
    #[serial]
    fn test_bad_filter_rejected() {
        std::env::remove_var("RUST_LOG");
        let config = LogConfig {
            filter: "optimist_state=verbose".to_string(),
            format: LogFormat::Pretty,
        };
        assert!(matches!(build_filter(&config), Err(OptimistError::Config(_))));
    }
}
