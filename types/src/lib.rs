//! Shared data model for wagerhall matches and settlement.

pub mod action;
pub mod chess;
pub mod codec;
pub mod constants;
pub mod error;
pub mod matches;
pub mod settlement;
pub mod yahtzee;

pub use action::{Action, ActionRequest, ForfeitReason};
pub use chess::{ChessBoard, ChessOutcome, Color, MoveOutcome, Promotion, Square};
pub use error::{StateConflict, ValidationError};
pub use matches::{
    FeeReceipt, GameType, Match, MatchConfig, MatchId, MatchStatus, Participant, PrizePool,
    UserId,
};
pub use settlement::{
    LedgerCause, LedgerDraft, LedgerEntry, LedgerEntryType, LedgerKey, MatchResult, ResultRow,
};
pub use yahtzee::{Category, Dice, Die, PlayerScoreboard, TurnState};

#[cfg(test)]
mod tests;
