//! Errors surfaced to clients. Both leave match state untouched.

use crate::chess::Square;
use crate::matches::{GameType, MatchId, MatchStatus};
use crate::yahtzee::Category;
use thiserror::Error;

/// An action or join that is not allowed in the current state.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("actor is not a participant")]
    NotAParticipant,
    #[error("not your turn")]
    NotYourTurn,
    #[error("category {0} already used")]
    CategoryAlreadyUsed(Category),
    #[error("no rolls remaining this turn")]
    NoRollRemaining,
    #[error("roll before holding or scoring")]
    MustRollFirst,
    #[error("die index {0} out of range")]
    UnknownDie(u8),
    #[error("illegal move {from}-{to}")]
    IllegalMove { from: Square, to: Square },
    #[error("action is for {got}, match plays {expected}")]
    WrongGame { expected: GameType, got: GameType },
    #[error("participant already forfeited")]
    AlreadyForfeited,
    #[error("user already joined")]
    AlreadyJoined,
    #[error("user left this match and cannot rejoin")]
    AlreadyLeft,
    #[error("match is full")]
    MatchFull,
    #[error("entry fee mismatch: expected {expected}, got {got}")]
    EntryFeeMismatch { expected: u64, got: u64 },
    #[error("invalid user id")]
    InvalidUserId,
    #[error("invalid match config: {0}")]
    InvalidConfig(&'static str),
}

impl ValidationError {
    /// Stable reason code for clients.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::NotAParticipant => "not-a-participant",
            ValidationError::NotYourTurn => "not-your-turn",
            ValidationError::CategoryAlreadyUsed(_) => "category-already-used",
            ValidationError::NoRollRemaining => "no-roll-remaining",
            ValidationError::MustRollFirst => "must-roll-first",
            ValidationError::UnknownDie(_) => "unknown-die",
            ValidationError::IllegalMove { .. } => "illegal-move",
            ValidationError::WrongGame { .. } => "wrong-game",
            ValidationError::AlreadyForfeited => "already-forfeited",
            ValidationError::AlreadyJoined => "already-joined",
            ValidationError::AlreadyLeft => "already-left",
            ValidationError::MatchFull => "match-full",
            ValidationError::EntryFeeMismatch { .. } => "entry-fee-mismatch",
            ValidationError::InvalidUserId => "invalid-user-id",
            ValidationError::InvalidConfig(_) => "invalid-config",
        }
    }
}

/// The request raced another change; refetch and decide again.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StateConflict {
    #[error("match {0} not found")]
    MatchNotFound(MatchId),
    #[error("match {match_id} is {status}, not running")]
    MatchNotRunning { match_id: MatchId, status: MatchStatus },
    #[error("match {match_id} already started ({status})")]
    MatchAlreadyStarted { match_id: MatchId, status: MatchStatus },
    #[error("stale version: expected {expected}, current {current}")]
    StaleVersion { expected: u64, current: u64 },
}

impl StateConflict {
    pub fn code(&self) -> &'static str {
        match self {
            StateConflict::MatchNotFound(_) => "match-not-found",
            StateConflict::MatchNotRunning { .. } => "match-not-running",
            StateConflict::MatchAlreadyStarted { .. } => "match-already-started",
            StateConflict::StaleVersion { .. } => "stale-version",
        }
    }
}
