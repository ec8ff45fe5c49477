//! Chess matches delegate every rule to an external engine.

use crate::error::EngineError;
use crate::validator::MoveValidator;
use serde::Serialize;
use std::collections::BTreeSet;
use wagerhall_types::{
    Action, ChessBoard, ChessOutcome, Color, MoveOutcome, Promotion, Square, ValidationError,
};

/// Rules engine for chess. Positions are opaque to the match engine.
pub trait ChessEngine: Send + Sync {
    /// Destinations the piece on `from` may legally reach.
    fn legal_moves(&self, board: &ChessBoard, turn: Color, from: Square) -> BTreeSet<Square>;

    fn apply_move(
        &self,
        board: &ChessBoard,
        from: Square,
        to: Square,
        promotion: Option<Promotion>,
    ) -> Result<MoveOutcome, EngineError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PlayedMove {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<Promotion>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChessState {
    pub board: ChessBoard,
    pub turn: Color,
    pub move_number: u32,
    pub in_check: bool,
    pub outcome: Option<ChessOutcome>,
    pub history: Vec<PlayedMove>,
}

impl ChessState {
    pub fn new() -> Self {
        Self {
            board: ChessBoard::default(),
            turn: Color::White,
            move_number: 1,
            in_check: false,
            outcome: None,
            history: Vec::new(),
        }
    }

    /// Seat whose move it is.
    pub fn current_seat(&self) -> u8 {
        self.turn.seat()
    }

    /// Record an engine-approved move made by the side to move.
    pub fn record(&mut self, played: PlayedMove, outcome: MoveOutcome) {
        let mover = self.turn;
        self.board = outcome.board;
        self.in_check = outcome.is_check;
        self.history.push(played);
        if mover == Color::Black {
            self.move_number += 1;
        }
        self.turn = mover.opponent();
        self.outcome = if outcome.is_checkmate {
            Some(ChessOutcome::Checkmate { winner: mover })
        } else if outcome.is_stalemate {
            Some(ChessOutcome::Stalemate)
        } else if outcome.is_draw {
            Some(ChessOutcome::Draw)
        } else {
            None
        };
    }
}

impl Default for ChessState {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ChessValidator<'a> {
    engine: &'a dyn ChessEngine,
}

impl<'a> ChessValidator<'a> {
    pub fn new(engine: &'a dyn ChessEngine) -> Self {
        Self { engine }
    }
}

impl MoveValidator for ChessValidator<'_> {
    type State = ChessState;

    fn validate(&self, state: &ChessState, seat: u8, action: &Action) -> Result<(), ValidationError> {
        let Action::Move { from, to, .. } = action else {
            return Ok(());
        };
        if seat != state.current_seat() {
            return Err(ValidationError::NotYourTurn);
        }
        if !self
            .engine
            .legal_moves(&state.board, state.turn, *from)
            .contains(to)
        {
            return Err(ValidationError::IllegalMove {
                from: *from,
                to: *to,
            });
        }
        Ok(())
    }
}
