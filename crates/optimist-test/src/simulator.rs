//! Async interleaving simulator
//!
//! Runs many coordinated transactions concurrently, each settling after a
//! random delay with a random outcome, and checks that the final state
//! reflects exactly the scheduled outcomes once everything settled.
//! Meant for a paused tokio clock so long delays cost nothing.

use std::collections::HashMap;
use std::time::Duration;

use optimist_runtime::{settle_after, Coordinator, RemoteAck, RemoteError, Speculation};
use optimist_state::{Dispatcher, LedgerConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::{Journal, JournalOp, Status};

/// Simulator configuration
#[derive(Clone, Debug)]
pub struct SimulatorConfig {
    /// Concurrent operations to launch
    pub operations: usize,
    /// Settle delays are drawn from `0..=max_delay`
    pub max_delay: Duration,
    /// Probability that an operation fails (0.0 - 1.0)
    pub failure_rate: f64,
    /// Random seed
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        SimulatorConfig {
            operations: 50,
            max_delay: Duration::from_secs(5),
            failure_rate: 0.3,
            seed: 42,
        }
    }
}

impl SimulatorConfig {
    /// Everything succeeds, nearly at once
    pub fn calm() -> Self {
        SimulatorConfig {
            operations: 10,
            max_delay: Duration::from_millis(100),
            failure_rate: 0.0,
            seed: 42,
        }
    }

    /// Many long, flaky operations
    pub fn stormy() -> Self {
        SimulatorConfig {
            operations: 500,
            max_delay: Duration::from_secs(30),
            failure_rate: 0.5,
            seed: 42,
        }
    }
}

/// Speculation recording one journal tag
#[derive(Clone, Copy, Debug)]
pub struct Tagged {
    pub tag: u64,
}

impl Speculation<JournalOp> for Tagged {
    type Output = RemoteAck;
    type Error = RemoteError;

    fn pending(&self) -> JournalOp {
        JournalOp::pending(self.tag)
    }

    fn confirmed(&self, _output: &RemoteAck) -> JournalOp {
        JournalOp::done(self.tag)
    }

    fn failed(&self, _error: &RemoteError) -> JournalOp {
        JournalOp::failed(self.tag)
    }
}

/// Simulation result
#[derive(Debug, Default)]
pub struct SimulationReport {
    pub launched: usize,
    pub committed: usize,
    pub reverted: usize,
    /// Most transactions observed open at once
    pub peak_open: usize,
    /// Tags whose final status differs from the scheduled outcome
    pub mismatched: Vec<u64>,
    /// Protocol violations surfaced by the coordinator
    pub aborted: usize,
    pub final_state: Journal,
}

impl SimulationReport {
    pub fn is_valid(&self) -> bool {
        self.mismatched.is_empty()
            && self.aborted == 0
            && self.committed + self.reverted == self.launched
            && self.final_state.entries.len() == self.launched
    }
}

/// Interleaving simulator
pub struct InterleavingSimulator {
    config: SimulatorConfig,
    coordinator: Coordinator<Journal, JournalOp>,
}

impl InterleavingSimulator {
    pub fn new(config: SimulatorConfig) -> Self {
        let ledger = LedgerConfig {
            max_open_transactions: None,
            ..LedgerConfig::strict()
        };
        let dispatcher = Dispatcher::with_config(Journal::default(), ledger);
        InterleavingSimulator {
            config,
            coordinator: Coordinator::new(dispatcher),
        }
    }

    pub fn coordinator(&self) -> &Coordinator<Journal, JournalOp> {
        &self.coordinator
    }

    /// Launch every operation, wait for all of them and check the outcome
    pub async fn run(&self) -> SimulationReport {
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let max_delay = self.config.max_delay.as_millis() as u64;

        let mut scheduled = HashMap::new();
        let mut handles = Vec::with_capacity(self.config.operations);
        for tag in 0..self.config.operations as u64 {
            let delay = Duration::from_millis(rng.gen_range(0..=max_delay));
            let succeed = rng.gen::<f64>() >= self.config.failure_rate;
            scheduled.insert(tag, succeed);

            handles.push(
                self.coordinator
                    .spawn(Tagged { tag }, move || settle_after(delay, succeed)),
            );
        }
        debug!(launched = handles.len(), "operations launched");

        let mut report = SimulationReport {
            launched: handles.len(),
            ..SimulationReport::default()
        };

        // Sample how deep the window gets while operations are in flight
        tokio::task::yield_now().await;
        report.peak_open = self.coordinator.open_transactions().len();

        for handle in handles {
            match handle.await {
                Ok(Ok(settlement)) if settlement.is_committed() => report.committed += 1,
                Ok(Ok(_)) => report.reverted += 1,
                Ok(Err(_)) | Err(_) => report.aborted += 1,
            }
        }

        let state = self.coordinator.state();
        for (tag, succeed) in scheduled {
            let expected = if succeed { Status::Done } else { Status::Failed };
            if state.status_of(tag) != Some(expected) {
                report.mismatched.push(tag);
            }
        }
        report.mismatched.sort_unstable();
        report.final_state = state;
        report
    }
}
