//! Error types for the optimistic state engine

use thiserror::Error;

use crate::TransactionId;

/// Core Optimist errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OptimistError {
    // Protocol violations
    #[error("Transaction {0} is already open")]
    DuplicateTransaction(TransactionId),

    #[error("Transaction {0} is not open (already closed or never opened)")]
    UnknownTransaction(TransactionId),

    #[error("Cannot close {0}: no speculative window is open")]
    NoOpenWindow(TransactionId),

    #[error("Action carries no optimistic metadata")]
    NotOptimistic,

    #[error("Invalid payload for {kind}: {reason}")]
    InvalidPayload { kind: &'static str, reason: String },

    // Resource errors
    #[error("Open transaction limit reached: {limit}")]
    CapacityExceeded { limit: usize },

    #[error("Transaction ids exhausted")]
    IdsExhausted,

    // Internal consistency
    #[error("Ledger invariant violated: {0}")]
    Invariant(String),

    // Configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl OptimistError {
    /// Caller misuse of the transaction lifecycle
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            OptimistError::DuplicateTransaction(_)
                | OptimistError::UnknownTransaction(_)
                | OptimistError::NoOpenWindow(_)
                | OptimistError::NotOptimistic
                | OptimistError::InvalidPayload { .. }
        )
    }
}

/// Result type for Optimist operations
pub type OptimistResult<T> = Result<T, OptimistError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_violation_classification() {
        let id = TransactionId::new(1);
        assert!(OptimistError::DuplicateTransaction(id).is_protocol_violation());
        assert!(OptimistError::UnknownTransaction(id).is_protocol_violation());
        assert!(OptimistError::NoOpenWindow(id).is_protocol_violation());
        assert!(!OptimistError::CapacityExceeded { limit: 4 }.is_protocol_violation());
        assert!(!OptimistError::Config("bad".into()).is_protocol_violation());
    }

    #[test]
    fn test_error_messages() {
        let err = OptimistError::UnknownTransaction(TransactionId::new(9));
        assert_eq!(
            err.to_string(),
            "Transaction txn#9 is not open (already closed or never opened)"
        );
    }
}
