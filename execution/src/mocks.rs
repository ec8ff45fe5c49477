//! Test doubles for external collaborators.

use crate::chess::ChessEngine;
use crate::error::EngineError;
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use wagerhall_types::{ChessBoard, Color, MoveOutcome, Promotion, Square};

/// How a scripted move ends the game, if at all.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scripted {
    Quiet,
    Check,
    Checkmate,
    Stalemate,
    Draw,
}

/// Chess engine that knows only the moves it was given.
///
/// Legality ignores the side to move; the match engine owns turn order.
#[derive(Default)]
pub struct ScriptedEngine {
    moves: HashMap<(Square, Square), Scripted>,
    applied: Mutex<Vec<(Square, Square)>>,
}

fn square(name: &str) -> Square {
    name.parse()
        .unwrap_or_else(|_| panic!("scripted square {name} is not valid"))
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow(self, from: &str, to: &str) -> Self {
        self.script(from, to, Scripted::Quiet)
    }

    pub fn script(mut self, from: &str, to: &str, ending: Scripted) -> Self {
        self.moves.insert((square(from), square(to)), ending);
        self
    }

    pub fn applied(&self) -> Vec<(Square, Square)> {
        self.applied
            .lock()
            .map(|applied| applied.clone())
            .unwrap_or_default()
    }
}

impl ChessEngine for ScriptedEngine {
    fn legal_moves(&self, _board: &ChessBoard, _turn: Color, from: Square) -> BTreeSet<Square> {
        self.moves
            .keys()
            .filter(|(origin, _)| *origin == from)
            .map(|(_, to)| *to)
            .collect()
    }

    fn apply_move(
        &self,
        board: &ChessBoard,
        from: Square,
        to: Square,
        _promotion: Option<Promotion>,
    ) -> Result<MoveOutcome, EngineError> {
        let ending = self
            .moves
            .get(&(from, to))
            .copied()
            .ok_or_else(|| EngineError(format!("{from}{to} not scripted")))?;
        if let Ok(mut applied) = self.applied.lock() {
            applied.push((from, to));
        }
        Ok(MoveOutcome {
            board: ChessBoard(format!("{} {from}{to}", board.0)),
            is_check: matches!(ending, Scripted::Check | Scripted::Checkmate),
            is_checkmate: ending == Scripted::Checkmate,
            is_stalemate: ending == Scripted::Stalemate,
            is_draw: ending == Scripted::Draw,
        })
    }
}
