//! Wagerhall match engine.
//!
//! This crate holds the rules and the money path for turn-based real-money
//! matches: scoring, bot decisions, move validation, the per-match state
//! machine, and exactly-once settlement into the ledger.
//!
//! ## Invariants
//! - A match result is written once; every later settle call returns it unchanged.
//! - A prize credit exists only together with its match result.
//! - A rejected action never mutates match state.
//! - Dice derive only from the match seed and the roll's position in the match.
//!
//! The primary entrypoint is [`MatchStateMachine`], driven under a per-match
//! lock by the server's registry.

pub mod ai;
pub mod chess;
pub mod dice;
pub mod error;
pub mod ledger;
pub mod machine;
pub mod payout;
pub mod scoring;
pub mod settlement;
pub mod validator;
pub mod yahtzee;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

#[cfg(test)]
mod machine_tests;

pub use chess::ChessEngine;
pub use error::{ActionError, EngineError, LedgerError, PaymentError, SettlementError};
pub use ledger::{Appended, Ledger, MemoryLedger, SettlementCommit};
pub use machine::{GameState, MatchSnapshot, MatchStateMachine, Refund, Transition};
pub use payout::{PaymentProvider, PayoutInstruction};
pub use settlement::SettlementEngine;
pub use validator::MoveValidator;

/// Wall-clock milliseconds since the unix epoch.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
