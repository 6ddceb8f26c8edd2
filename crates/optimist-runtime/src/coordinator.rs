//! Async operation coordinator
//!
//! Wraps an asynchronous operation in an optimistic transaction:
//! BEGIN with the speculative mutation, await the operation, then COMMIT
//! (success) or REVERT (failure) under the same transaction id.
//!
//! The dispatcher lock is taken once per dispatch and is never held across
//! an `.await`, so dispatches stay totally ordered while any number of
//! operations are in flight.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use optimist_core::{Action, OptimistResult, TransactionId};
use optimist_state::{Dispatched, Dispatcher, Mutation};

/// Dispatcher shared between coordinators
pub type SharedDispatcher<S, M> = Arc<Mutex<Dispatcher<S, M>>>;

/// The three mutations of one optimistic transaction
pub trait Speculation<M> {
    /// Value produced by a successful operation
    type Output;
    /// Business-level failure of the operation
    type Error: fmt::Display;

    /// Speculative effect, applied at BEGIN
    fn pending(&self) -> M;

    /// Final effect after success, applied at COMMIT
    fn confirmed(&self, output: &Self::Output) -> M;

    /// Final effect after failure, applied at REVERT.
    ///
    /// This is not "as if nothing happened": the usual choice is to keep the
    /// entity visible and flag it as errored.
    fn failed(&self, error: &Self::Error) -> M;
}

/// How a coordinated transaction closed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Settlement {
    Committed(TransactionId),
    Reverted(TransactionId),
}

impl Settlement {
    pub fn id(self) -> TransactionId {
        match self {
            Settlement::Committed(id) | Settlement::Reverted(id) => id,
        }
    }

    pub fn is_committed(self) -> bool {
        matches!(self, Settlement::Committed(_))
    }
}

/// Async operation coordinator
pub struct Coordinator<S, M> {
    dispatcher: SharedDispatcher<S, M>,
}

impl<S, M> Clone for Coordinator<S, M> {
    fn clone(&self) -> Self {
        Coordinator {
            dispatcher: Arc::clone(&self.dispatcher),
        }
    }
}

impl<S, M> Coordinator<S, M>
where
    S: Clone,
    M: Mutation<S>,
{
    /// Coordinator owning a fresh dispatcher
    pub fn new(dispatcher: Dispatcher<S, M>) -> Self {
        Self::with_shared(Arc::new(Mutex::new(dispatcher)))
    }

    /// Coordinator over a dispatcher shared with other coordinators
    pub fn with_shared(dispatcher: SharedDispatcher<S, M>) -> Self {
        Coordinator { dispatcher }
    }

    pub fn shared(&self) -> SharedDispatcher<S, M> {
        Arc::clone(&self.dispatcher)
    }

    /// Dispatch a single action outside any coordinated transaction
    pub fn dispatch(&self, action: Action<M>) -> OptimistResult<Dispatched> {
        self.dispatcher.lock().dispatch(action)
    }

    /// Copy of the current canonical state
    pub fn state(&self) -> S {
        self.dispatcher.lock().state().clone()
    }

    /// Read the current state without copying it
    pub fn with_state<R>(&self, read: impl FnOnce(&S) -> R) -> R {
        read(self.dispatcher.lock().state())
    }

    /// Ids of transactions still waiting on their operation
    pub fn open_transactions(&self) -> Vec<TransactionId> {
        self.dispatcher.lock().ledger().open_transactions()
    }

    /// Run `operation` as an optimistic transaction.
    ///
    /// Operation failures are not errors here: they close the transaction
    /// with REVERT and yield [`Settlement::Reverted`]. Only protocol
    /// violations raised by the dispatcher are returned as `Err`. An
    /// operation that never settles leaves its transaction open.
    pub async fn run<I, F, Fut>(&self, intent: I, operation: F) -> OptimistResult<Settlement>
    where
        I: Speculation<M>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<I::Output, I::Error>>,
    {
        let id = {
            let mut dispatcher = self.dispatcher.lock();
            let id = dispatcher.next_transaction_id()?;
            dispatcher.dispatch(Action::begin(id, intent.pending()))?;
            id
        };
        debug!(%id, "awaiting operation");

        let (action, settlement) = match operation().await {
            Ok(output) => (
                Action::commit(id, intent.confirmed(&output)),
                Settlement::Committed(id),
            ),
            Err(err) => {
                warn!(%id, error = %err, "operation failed, reverting");
                (
                    Action::revert(id, intent.failed(&err)),
                    Settlement::Reverted(id),
                )
            }
        };

        self.dispatcher.lock().dispatch(action)?;
        Ok(settlement)
    }
}

impl<S, M> Coordinator<S, M>
where
    S: Clone + Send + 'static,
    M: Mutation<S> + Send + 'static,
{
    /// Fire-and-forget [`Coordinator::run`] on the tokio runtime.
    ///
    /// The outcome is observable through state; protocol violations are
    /// also logged here.
    pub fn spawn<I, F, Fut>(
        &self,
        intent: I,
        operation: F,
    ) -> JoinHandle<OptimistResult<Settlement>>
    where
        I: Speculation<M> + Send + 'static,
        I::Output: Send,
        I::Error: Send,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<I::Output, I::Error>> + Send + 'static,
    {
        let coordinator = self.clone();
        tokio::spawn(async move {
            let result = coordinator.run(intent, operation).await;
            if let Err(err) = &result {
                error!(error = %err, "optimistic transaction aborted");
            }
            result
        })
    }
}
