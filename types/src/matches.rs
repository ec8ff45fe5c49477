//! Matches, participants and the prize pool.

use crate::codec::{read_string, string_encode_size, write_string};
use crate::constants::{
    BASIS_POINTS, CHESS_PLAYERS, MAX_ENTRY_FEE, MAX_PLATFORM_FEE_BPS, MAX_USER_ID_LENGTH,
    MAX_YAHTZEE_PLAYERS, MIN_PLAYERS,
};
use crate::error::ValidationError;
use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, FixedSize, Read, ReadExt, Write};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type MatchId = u64;

/// Host platform user id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Ids are non-empty and bounded so they always encode.
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty() && self.0.len() <= MAX_USER_ID_LENGTH
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl Write for UserId {
    fn write(&self, writer: &mut impl BufMut) {
        write_string(&self.0, writer);
    }
}

impl Read for UserId {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &()) -> Result<Self, Error> {
        Ok(Self(read_string(reader, MAX_USER_ID_LENGTH)?))
    }
}

impl EncodeSize for UserId {
    fn encode_size(&self) -> usize {
        string_encode_size(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum GameType {
    Yahtzee = 0,
    Chess = 1,
}

impl GameType {
    pub fn as_str(self) -> &'static str {
        match self {
            GameType::Yahtzee => "yahtzee",
            GameType::Chess => "chess",
        }
    }

    /// Inclusive seat bounds for a match of this game.
    pub fn player_bounds(self) -> (u8, u8) {
        match self {
            GameType::Yahtzee => (MIN_PLAYERS, MAX_YAHTZEE_PLAYERS),
            GameType::Chess => (CHESS_PLAYERS, CHESS_PLAYERS),
        }
    }
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Write for GameType {
    fn write(&self, writer: &mut impl BufMut) {
        (*self as u8).write(writer);
    }
}

impl Read for GameType {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &()) -> Result<Self, Error> {
        let value = u8::read(reader)?;
        match value {
            0 => Ok(GameType::Yahtzee),
            1 => Ok(GameType::Chess),
            i => Err(Error::InvalidEnum(i)),
        }
    }
}

impl FixedSize for GameType {
    const SIZE: usize = 1;
}

/// Lifecycle of a match.
///
/// `Open`, `Filling` and `Waiting` make up the pre-start phase: nobody seated,
/// some seats taken, all seats taken with the start pending.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Open,
    Filling,
    Waiting,
    Running,
    Completed,
    Cancelled,
}

impl MatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchStatus::Open => "open",
            MatchStatus::Filling => "filling",
            MatchStatus::Waiting => "waiting",
            MatchStatus::Running => "running",
            MatchStatus::Completed => "completed",
            MatchStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_pre_start(self) -> bool {
        matches!(
            self,
            MatchStatus::Open | MatchStatus::Filling | MatchStatus::Waiting
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, MatchStatus::Completed | MatchStatus::Cancelled)
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters a match is created with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchConfig {
    pub game_type: GameType,
    /// Minor currency units.
    pub entry_fee: u64,
    pub max_players: u8,
    pub platform_fee_bps: u16,
}

impl MatchConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let (min, max) = self.game_type.player_bounds();
        if self.max_players < min || self.max_players > max {
            return Err(ValidationError::InvalidConfig("max_players"));
        }
        if self.entry_fee > MAX_ENTRY_FEE {
            return Err(ValidationError::InvalidConfig("entry_fee"));
        }
        if self.platform_fee_bps > MAX_PLATFORM_FEE_BPS {
            return Err(ValidationError::InvalidConfig("platform_fee_bps"));
        }
        Ok(())
    }
}

/// Split of the collected entry fees.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PrizePool {
    pub collected: u64,
    pub prize_amount: u64,
    pub platform_fee: u64,
}

impl PrizePool {
    /// `prize = collected * (10_000 - fee_bps) / 10_000`, rounded down; the
    /// rounding remainder stays with the platform fee.
    pub fn compute(entry_fee: u64, players: u8, platform_fee_bps: u16) -> Option<Self> {
        let collected = entry_fee.checked_mul(players as u64)?;
        let keep = BASIS_POINTS.checked_sub(platform_fee_bps as u64)?;
        let prize = (collected as u128 * keep as u128) / BASIS_POINTS as u128;
        let prize_amount = u64::try_from(prize).ok()?;
        Some(Self {
            collected,
            prize_amount,
            platform_fee: collected - prize_amount,
        })
    }
}

/// Captured entry fee handed over by the payment provider on join.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeReceipt {
    pub payment_ref: String,
    pub amount: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Participant {
    pub user_id: UserId,
    /// Join order; seat 0 moves first (white in chess).
    pub seat: u8,
    pub entry_fee: u64,
    pub payment_ref: String,
    pub forfeited: bool,
    pub is_bot: bool,
    pub joined_at: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Match {
    pub id: MatchId,
    pub game_type: GameType,
    pub status: MatchStatus,
    pub entry_fee: u64,
    pub platform_fee_bps: u16,
    /// Snapshot taken when the match fills; zero before.
    pub prize_amount: u64,
    pub platform_fee: u64,
    pub max_players: u8,
    pub current_players: u8,
    pub winner_id: Option<UserId>,
    pub created_at: u64,
    pub started_at: Option<u64>,
    pub completed_at: Option<u64>,
}

impl Match {
    pub fn new(id: MatchId, config: &MatchConfig, created_at: u64) -> Self {
        Self {
            id,
            game_type: config.game_type,
            status: MatchStatus::Open,
            entry_fee: config.entry_fee,
            platform_fee_bps: config.platform_fee_bps,
            prize_amount: 0,
            platform_fee: 0,
            max_players: config.max_players,
            current_players: 0,
            winner_id: None,
            created_at,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn is_full(&self) -> bool {
        self.current_players >= self.max_players
    }
}
