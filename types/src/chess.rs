//! Chess primitives. Rules live behind an external engine; the board is opaque.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Standard starting position in FEN.
pub const STARTING_POSITION: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub fn opponent(self) -> Self {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }

    /// Seat 0 plays white.
    pub fn for_seat(seat: u8) -> Self {
        if seat == 0 {
            Color::White
        } else {
            Color::Black
        }
    }

    pub fn seat(self) -> u8 {
        match self {
            Color::White => 0,
            Color::Black => 1,
        }
    }
}

/// Board square in algebraic notation (`a1`..`h8`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Square {
    file: u8,
    rank: u8,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid square: {0}")]
pub struct InvalidSquare(pub String);

impl Square {
    pub fn new(file: u8, rank: u8) -> Option<Self> {
        (file < 8 && rank < 8).then_some(Self { file, rank })
    }

    pub fn file(self) -> u8 {
        self.file
    }

    pub fn rank(self) -> u8 {
        self.rank
    }
}

impl FromStr for Square {
    type Err = InvalidSquare;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != 2 {
            return Err(InvalidSquare(s.to_string()));
        }
        let file = bytes[0].wrapping_sub(b'a');
        let rank = bytes[1].wrapping_sub(b'1');
        Square::new(file, rank).ok_or_else(|| InvalidSquare(s.to_string()))
    }
}

impl TryFrom<String> for Square {
    type Error = InvalidSquare;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Square> for String {
    fn from(square: Square) -> Self {
        square.to_string()
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", (b'a' + self.file) as char, self.rank + 1)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Promotion {
    Queen,
    Rook,
    Bishop,
    Knight,
}

/// Opaque position owned by the engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChessBoard(pub String);

impl Default for ChessBoard {
    fn default() -> Self {
        Self(STARTING_POSITION.to_string())
    }
}

/// What the engine reports after applying a move.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MoveOutcome {
    pub board: ChessBoard,
    pub is_check: bool,
    pub is_checkmate: bool,
    pub is_stalemate: bool,
    /// Draw by rule (repetition, fifty moves, insufficient material).
    pub is_draw: bool,
}

/// How a chess game ended on the board.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChessOutcome {
    Checkmate { winner: Color },
    Stalemate,
    Draw,
}

impl ChessOutcome {
    pub fn winner(self) -> Option<Color> {
        match self {
            ChessOutcome::Checkmate { winner } => Some(winner),
            ChessOutcome::Stalemate | ChessOutcome::Draw => None,
        }
    }
}
