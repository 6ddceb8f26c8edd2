//! Transaction identity
//!
//! Transaction ids are 64-bit, issued in strictly increasing order by an
//! [`IdGenerator`] owned by the dispatch path. An id is never reissued.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{OptimistError, OptimistResult};

/// Identifier shared by every action of one optimistic transaction
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct TransactionId(pub u64);

impl TransactionId {
    pub const ZERO: TransactionId = TransactionId(0);

    #[inline]
    pub fn new(id: u64) -> Self {
        TransactionId(id)
    }

    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Txn({})", self.0)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn#{}", self.0)
    }
}

/// Monotonic transaction id source
#[derive(Debug, Default)]
pub struct IdGenerator {
    next: u64,
    exhausted: bool,
}

impl IdGenerator {
    /// Generator whose first id is 0
    pub fn new() -> Self {
        IdGenerator::default()
    }

    /// Generator whose first id is `first`
    pub fn starting_at(first: u64) -> Self {
        IdGenerator {
            next: first,
            exhausted: false,
        }
    }

    /// Issue the next id.
    ///
    /// Never wraps: once `u64::MAX` has been handed out every further call
    /// fails with [`OptimistError::IdsExhausted`].
    pub fn next(&mut self) -> OptimistResult<TransactionId> {
        if self.exhausted {
            return Err(OptimistError::IdsExhausted);
        }
        let id = TransactionId(self.next);
        match self.next.checked_add(1) {
            Some(next) => self.next = next,
            None => self.exhausted = true,
        }
        Ok(id)
    }

    /// The id the next call to [`IdGenerator::next`] would return
    pub fn peek(&self) -> Option<TransactionId> {
        if self.exhausted {
            None
        } else {
            Some(TransactionId(self.next))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generator_starts_at_zero() {
        let mut ids = IdGenerator::new();
        assert_eq!(ids.next().unwrap(), TransactionId(0));
        assert_eq!(ids.next().unwrap(), TransactionId(1));
        assert_eq!(ids.next().unwrap(), TransactionId(2));
    }

    #[test]
    fn test_generator_strictly_increasing() {
        let mut ids = IdGenerator::new();
        let mut last = ids.next().unwrap();
        for _ in 0..1000 {
            let id = ids.next().unwrap();
            assert!(id > last);
            last = id;
        }
    }

    #[test]
    fn test_generator_never_wraps() {
        let mut ids = IdGenerator::starting_at(u64::MAX - 1);
        assert_eq!(ids.next().unwrap(), TransactionId(u64::MAX - 1));
        assert_eq!(ids.next().unwrap(), TransactionId(u64::MAX));
        assert!(ids.peek().is_none());
        assert!(matches!(ids.next(), Err(OptimistError::IdsExhausted)));
    }

    #[test]
    fn test_transaction_id_display() {
        assert_eq!(TransactionId::new(7).to_string(), "txn#7");
        assert_eq!(format!("{:?}", TransactionId::new(7)), "Txn(7)");
    }
}
