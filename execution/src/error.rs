use thiserror::Error;
use wagerhall_types::{
    LedgerCause, LedgerEntryType, MatchId, StateConflict, UserId, ValidationError,
};

/// Rejection of a join, leave or action. Match state is untouched.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Conflict(#[from] StateConflict),
}

impl ActionError {
    pub fn code(&self) -> &'static str {
        match self {
            ActionError::Invalid(err) => err.code(),
            ActionError::Conflict(err) => err.code(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// An entry exists for a cause whose settlement was never recorded.
    #[error("orphaned {kind:?} entry for {user} on {cause}")]
    OrphanedEntry {
        user: UserId,
        cause: LedgerCause,
        kind: LedgerEntryType,
    },
    /// Same (user, cause, kind) recorded with a different amount.
    #[error("conflicting {kind:?} entry for {user} on {cause}: stored {stored}, requested {requested}")]
    ConflictingEntry {
        user: UserId,
        cause: LedgerCause,
        kind: LedgerEntryType,
        stored: i64,
        requested: i64,
    },
    #[error("insufficient balance for {user}: {balance} < {requested}")]
    InsufficientBalance {
        user: UserId,
        balance: i64,
        requested: u64,
    },
    #[error("amount out of range")]
    AmountOutOfRange,
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SettlementError {
    #[error("match {0} is not completed")]
    NotCompleted(MatchId),
    /// Half-applied or inconsistent money state. Never retried automatically.
    #[error("match {match_id} requires manual reconciliation: {reason}")]
    ReconciliationRequired { match_id: MatchId, reason: String },
    /// Transient storage failure; nothing was written and a retry is safe.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Raised by a chess engine that cannot apply a move.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("engine rejected move: {0}")]
pub struct EngineError(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PaymentError {
    #[error("payment provider rejected credit: {0}")]
    Rejected(String),
    #[error("payment provider unavailable: {0}")]
    Unavailable(String),
}
