//! Simulated remote API
//!
//! Stands in for the network call behind an optimistic update: resolves
//! after a fixed delay, succeeding with a configurable probability.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Remote API configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Time until the call settles
    pub delay: Duration,
    /// Probability of success (0.0 - 1.0)
    pub success_rate: f64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        RemoteConfig {
            delay: Duration::from_secs(2),
            success_rate: 1.0,
        }
    }
}

impl RemoteConfig {
    /// Fast and always successful
    pub fn instant() -> Self {
        RemoteConfig {
            delay: Duration::ZERO,
            success_rate: 1.0,
        }
    }

    /// Half of all calls fail
    pub fn flaky() -> Self {
        RemoteConfig {
            delay: Duration::from_millis(500),
            success_rate: 0.5,
        }
    }
}

/// Successful remote response
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAck {
    pub success: bool,
}

/// Failed remote response
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Remote rejected update of {0}")]
    Rejected(String),
}

/// Remote endpoint with simulated latency and failures
#[derive(Clone, Debug)]
pub struct SimulatedRemote {
    config: RemoteConfig,
    rng: Arc<Mutex<StdRng>>,
}

impl SimulatedRemote {
    pub fn new(config: RemoteConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Deterministic failure pattern for tests
    pub fn with_seed(config: RemoteConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: RemoteConfig, rng: StdRng) -> Self {
        SimulatedRemote {
            config,
            rng: Arc::new(Mutex::new(rng)),
        }
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    /// Send an update for `subject`
    pub async fn update(&self, subject: &str) -> Result<RemoteAck, RemoteError> {
        tokio::time::sleep(self.config.delay).await;
        let roll: f64 = self.rng.lock().gen();
        let succeed = roll < self.config.success_rate;
        debug!(subject, succeed, "remote settled");
        if succeed {
            Ok(RemoteAck { success: true })
        } else {
            Err(RemoteError::Rejected(subject.to_string()))
        }
    }
}

/// Settle after `delay` with a predetermined result
pub async fn settle_after(delay: Duration, succeed: bool) -> Result<RemoteAck, RemoteError> {
    tokio::time::sleep(delay).await;
    if succeed {
        Ok(RemoteAck { success: true })
    } else {
        Err(RemoteError::Rejected("scheduled failure".to_string()))
    }
}
