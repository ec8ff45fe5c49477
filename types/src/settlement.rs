//! Immutable settlement artifacts: match results and ledger entries.

use crate::constants::MAX_RESULT_ROWS;
use crate::matches::{GameType, MatchId, UserId};
use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, FixedSize, Read, ReadExt, ReadRangeExt, Write};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One participant's line in a match result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResultRow {
    pub user_id: UserId,
    /// 1-based, contiguous, unique within a result.
    pub rank: u32,
    pub total_score: u32,
    pub entry_fee: u64,
    pub net_change: i64,
    pub forfeited: bool,
}

impl Write for ResultRow {
    fn write(&self, writer: &mut impl BufMut) {
        self.user_id.write(writer);
        self.rank.write(writer);
        self.total_score.write(writer);
        self.entry_fee.write(writer);
        self.net_change.write(writer);
        self.forfeited.write(writer);
    }
}

impl Read for ResultRow {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &()) -> Result<Self, Error> {
        Ok(Self {
            user_id: UserId::read(reader)?,
            rank: u32::read(reader)?,
            total_score: u32::read(reader)?,
            entry_fee: u64::read(reader)?,
            net_change: i64::read(reader)?,
            forfeited: bool::read(reader)?,
        })
    }
}

impl EncodeSize for ResultRow {
    fn encode_size(&self) -> usize {
        self.user_id.encode_size()
            + self.rank.encode_size()
            + self.total_score.encode_size()
            + self.entry_fee.encode_size()
            + self.net_change.encode_size()
            + self.forfeited.encode_size()
    }
}

/// Final standings of a completed match. Written once, then read-only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub match_id: MatchId,
    pub game_type: GameType,
    pub winner_id: Option<UserId>,
    pub prize_amount: u64,
    pub platform_fee: u64,
    pub completed_at: u64,
    pub rows: Vec<ResultRow>,
}

impl MatchResult {
    pub fn row(&self, user: &UserId) -> Option<&ResultRow> {
        self.rows.iter().find(|row| &row.user_id == user)
    }

    /// Participant net changes plus the platform fee. Zero for every
    /// self-funded match.
    pub fn balance_check(&self) -> i128 {
        self.rows
            .iter()
            .map(|row| row.net_change as i128)
            .sum::<i128>()
            + self.platform_fee as i128
    }
}

impl Write for MatchResult {
    fn write(&self, writer: &mut impl BufMut) {
        self.match_id.write(writer);
        self.game_type.write(writer);
        self.winner_id.write(writer);
        self.prize_amount.write(writer);
        self.platform_fee.write(writer);
        self.completed_at.write(writer);
        self.rows.write(writer);
    }
}

impl Read for MatchResult {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &()) -> Result<Self, Error> {
        Ok(Self {
            match_id: u64::read(reader)?,
            game_type: GameType::read(reader)?,
            winner_id: Option::<UserId>::read(reader)?,
            prize_amount: u64::read(reader)?,
            platform_fee: u64::read(reader)?,
            completed_at: u64::read(reader)?,
            rows: Vec::<ResultRow>::read_range(reader, 0..=MAX_RESULT_ROWS)?,
        })
    }
}

impl EncodeSize for MatchResult {
    fn encode_size(&self) -> usize {
        self.match_id.encode_size()
            + self.game_type.encode_size()
            + self.winner_id.encode_size()
            + self.prize_amount.encode_size()
            + self.platform_fee.encode_size()
            + self.completed_at.encode_size()
            + self.rows.encode_size()
    }
}

/// What a ledger entry is attributed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum LedgerCause {
    Match(MatchId),
    Withdrawal(u64),
}

impl fmt::Display for LedgerCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerCause::Match(id) => write!(f, "match:{id}"),
            LedgerCause::Withdrawal(id) => write!(f, "withdrawal:{id}"),
        }
    }
}

impl Write for LedgerCause {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            LedgerCause::Match(id) => {
                0u8.write(writer);
                id.write(writer);
            }
            LedgerCause::Withdrawal(id) => {
                1u8.write(writer);
                id.write(writer);
            }
        }
    }
}

impl Read for LedgerCause {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &()) -> Result<Self, Error> {
        let kind = u8::read(reader)?;
        match kind {
            0 => Ok(LedgerCause::Match(u64::read(reader)?)),
            1 => Ok(LedgerCause::Withdrawal(u64::read(reader)?)),
            i => Err(Error::InvalidEnum(i)),
        }
    }
}

impl FixedSize for LedgerCause {
    const SIZE: usize = 1 + u64::SIZE;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum LedgerEntryType {
    EntryFee = 0,
    PrizeCredit = 1,
    Refund = 2,
    Withdrawal = 3,
}

impl LedgerEntryType {
    pub fn as_str(self) -> &'static str {
        match self {
            LedgerEntryType::EntryFee => "entry_fee",
            LedgerEntryType::PrizeCredit => "prize_credit",
            LedgerEntryType::Refund => "refund",
            LedgerEntryType::Withdrawal => "withdrawal",
        }
    }
}

impl Write for LedgerEntryType {
    fn write(&self, writer: &mut impl BufMut) {
        (*self as u8).write(writer);
    }
}

impl Read for LedgerEntryType {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &()) -> Result<Self, Error> {
        let value = u8::read(reader)?;
        match value {
            0 => Ok(LedgerEntryType::EntryFee),
            1 => Ok(LedgerEntryType::PrizeCredit),
            2 => Ok(LedgerEntryType::Refund),
            3 => Ok(LedgerEntryType::Withdrawal),
            i => Err(Error::InvalidEnum(i)),
        }
    }
}

impl FixedSize for LedgerEntryType {
    const SIZE: usize = 1;
}

/// Uniqueness key of the ledger: at most one entry per (user, cause, kind).
pub type LedgerKey = (UserId, LedgerCause, LedgerEntryType);

/// A ledger entry before the store assigns its id and timestamp.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LedgerDraft {
    pub user_id: UserId,
    pub cause: LedgerCause,
    pub kind: LedgerEntryType,
    /// Signed minor units; debits are negative.
    pub amount: i64,
}

fn signed(amount: u64) -> i64 {
    i64::try_from(amount).unwrap_or(i64::MAX)
}

impl LedgerDraft {
    /// Debit recorded when a captured entry fee seats a player.
    pub fn entry_fee(user_id: UserId, match_id: MatchId, amount: u64) -> Self {
        Self {
            user_id,
            cause: LedgerCause::Match(match_id),
            kind: LedgerEntryType::EntryFee,
            amount: -signed(amount),
        }
    }

    /// Credit returning an entry fee for a match that never started.
    pub fn refund(user_id: UserId, match_id: MatchId, amount: u64) -> Self {
        Self {
            user_id,
            cause: LedgerCause::Match(match_id),
            kind: LedgerEntryType::Refund,
            amount: signed(amount),
        }
    }

    pub fn key(&self) -> LedgerKey {
        (self.user_id.clone(), self.cause, self.kind)
    }
}

/// Append-only money movement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub id: u64,
    pub user_id: UserId,
    pub cause: LedgerCause,
    pub kind: LedgerEntryType,
    pub amount: i64,
    pub created_at: u64,
}

impl LedgerEntry {
    pub fn from_draft(id: u64, draft: LedgerDraft, created_at: u64) -> Self {
        Self {
            id,
            user_id: draft.user_id,
            cause: draft.cause,
            kind: draft.kind,
            amount: draft.amount,
            created_at,
        }
    }

    pub fn key(&self) -> LedgerKey {
        (self.user_id.clone(), self.cause, self.kind)
    }

    /// True when `draft` describes the same movement.
    pub fn matches(&self, draft: &LedgerDraft) -> bool {
        self.user_id == draft.user_id
            && self.cause == draft.cause
            && self.kind == draft.kind
            && self.amount == draft.amount
    }
}

impl Write for LedgerEntry {
    fn write(&self, writer: &mut impl BufMut) {
        self.id.write(writer);
        self.user_id.write(writer);
        self.cause.write(writer);
        self.kind.write(writer);
        self.amount.write(writer);
        self.created_at.write(writer);
    }
}

impl Read for LedgerEntry {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &()) -> Result<Self, Error> {
        Ok(Self {
            id: u64::read(reader)?,
            user_id: UserId::read(reader)?,
            cause: LedgerCause::read(reader)?,
            kind: LedgerEntryType::read(reader)?,
            amount: i64::read(reader)?,
            created_at: u64::read(reader)?,
        })
    }
}

impl EncodeSize for LedgerEntry {
    fn encode_size(&self) -> usize {
        self.id.encode_size()
            + self.user_id.encode_size()
            + self.cause.encode_size()
            + self.kind.encode_size()
            + self.amount.encode_size()
            + self.created_at.encode_size()
    }
}
