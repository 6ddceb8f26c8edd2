//! Journal state and reference model
//!
//! The journal is a small state tree whose mutations do not commute, so any
//! replay in the wrong order shows up as a divergence. The reference model
//! tracks the same transactions as a flat log instead of snapshot + queue.

use optimist_core::{OptimistError, OptimistResult, TransactionId};
use optimist_state::Mutation;

/// Status of a journal entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Status {
    Pending,
    Done,
    Failed,
}

/// Journal state
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Journal {
    pub entries: Vec<(u64, Status)>,
}

impl Journal {
    pub fn status_of(&self, tag: u64) -> Option<Status> {
        self.entries
            .iter()
            .rev()
            .find(|(t, _)| *t == tag)
            .map(|(_, status)| *status)
    }
}

/// Journal mutations
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JournalOp {
    /// Append an entry
    Record { tag: u64, status: Status },
    /// Remove every entry with `tag`
    Forget { tag: u64 },
}

impl JournalOp {
    pub fn pending(tag: u64) -> Self {
        JournalOp::Record {
            tag,
            status: Status::Pending,
        }
    }

    pub fn done(tag: u64) -> Self {
        JournalOp::Record {
            tag,
            status: Status::Done,
        }
    }

    pub fn failed(tag: u64) -> Self {
        JournalOp::Record {
            tag,
            status: Status::Failed,
        }
    }
}

impl Mutation<Journal> for JournalOp {
    fn kind(&self) -> &'static str {
        match self {
            JournalOp::Record { .. } => "RECORD",
            JournalOp::Forget { .. } => "FORGET",
        }
    }

    fn apply(&self, state: &mut Journal) {
        match self {
            JournalOp::Record { tag, status } => state.entries.push((*tag, *status)),
            JournalOp::Forget { tag } => state.entries.retain(|(t, _)| t != tag),
        }
    }

    fn validate(&self, _state: &Journal) -> OptimistResult<()> {
        match self {
            JournalOp::Record { tag: u64::MAX, .. } => Err(OptimistError::InvalidPayload {
                kind: self.kind(),
                reason: "reserved tag".to_string(),
            }),
            _ => Ok(()),
        }
    }
}

#[derive(Clone, Debug)]
struct ModelEntry {
    id: TransactionId,
    op: JournalOp,
    settled: bool,
}

/// Log-based model of what the store should show.
///
/// `log` holds every mutation that is final and ordered; `open` holds the
/// transactions of the current window in arrival order. The expected state
/// is the initial state with `log` and then `open` applied.
#[derive(Clone, Debug, Default)]
pub struct ReferenceModel {
    initial: Journal,
    log: Vec<JournalOp>,
    open: Vec<ModelEntry>,
}

impl ReferenceModel {
    pub fn new(initial: Journal) -> Self {
        ReferenceModel {
            initial,
            log: Vec::new(),
            open: Vec::new(),
        }
    }

    pub fn begin(&mut self, id: TransactionId, op: JournalOp) {
        self.open.push(ModelEntry {
            id,
            op,
            settled: false,
        });
    }

    /// Close `id`; returns false if it was not open
    pub fn close(&mut self, id: TransactionId, op: JournalOp) -> bool {
        let Some(entry) = self.open.iter_mut().find(|e| e.id == id && !e.settled) else {
            return false;
        };
        entry.op = op;
        entry.settled = true;

        while self.open.first().map_or(false, |e| e.settled) {
            let entry = self.open.remove(0);
            self.log.push(entry.op);
        }
        true
    }

    /// A plain mutation ordered before every open transaction
    pub fn rebase(&mut self, op: JournalOp) {
        self.log.push(op);
    }

    pub fn is_open(&self, id: TransactionId) -> bool {
        self.open.iter().any(|e| e.id == id && !e.settled)
    }

    pub fn was_issued(&self, id: TransactionId) -> bool {
        self.open.iter().any(|e| e.id == id)
    }

    pub fn open_transactions(&self) -> Vec<TransactionId> {
        self.open
            .iter()
            .filter(|e| !e.settled)
            .map(|e| e.id)
            .collect()
    }

    pub fn is_quiescent(&self) -> bool {
        self.open.is_empty()
    }

    pub fn expected(&self) -> Journal {
        let mut state = self.initial.clone();
        for op in &self.log {
            op.apply(&mut state);
        }
        for entry in &self.open {
            entry.op.apply(&mut state);
        }
        state
    }
}
