//! Exactly-once prize distribution.
//!
//! Settlement is keyed by match id. The result row set and every prize credit
//! are written in a single ledger transaction, so a match is either fully
//! settled or not settled at all.

use crate::error::{LedgerError, SettlementError};
use crate::ledger::{Ledger, SettlementCommit};
use crate::payout::PayoutInstruction;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info};
use wagerhall_types::{
    GameType, LedgerCause, LedgerDraft, LedgerEntryType, MatchId, MatchResult, ResultRow, UserId,
};

/// A participant's final standing as the state machine saw it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Standing {
    pub user_id: UserId,
    pub seat: u8,
    /// Card total for Yahtzee; 1 for a chess winner, 0 otherwise.
    pub score: u32,
    pub entry_fee: u64,
    pub forfeited: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrizeSplit {
    /// Best-ranked active participant takes the prize.
    Winner,
    /// Active participants share the prize (chess draw).
    Shared,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SettlementRequest {
    pub match_id: MatchId,
    pub game_type: GameType,
    pub prize_amount: u64,
    pub platform_fee: u64,
    pub completed_at: u64,
    pub split: PrizeSplit,
    pub standings: Vec<Standing>,
}

/// Order standings: active before forfeited, then score descending, then
/// join order. Duplicate users keep their best row.
pub fn rank(standings: &[Standing]) -> Vec<Standing> {
    let mut ordered = standings.to_vec();
    ordered.sort_by(|a, b| {
        a.forfeited
            .cmp(&b.forfeited)
            .then(b.score.cmp(&a.score))
            .then(a.seat.cmp(&b.seat))
    });
    let mut seen = HashSet::new();
    ordered.retain(|standing| seen.insert(standing.user_id.clone()));
    ordered
}

fn signed(amount: u64, match_id: MatchId) -> Result<i64, SettlementError> {
    i64::try_from(amount).map_err(|_| SettlementError::ReconciliationRequired {
        match_id,
        reason: format!("amount {amount} exceeds ledger range"),
    })
}

/// Build the result rows and the prize credits for `request`.
pub fn compute(request: &SettlementRequest) -> Result<(MatchResult, Vec<LedgerDraft>), SettlementError> {
    let ordered = rank(&request.standings);
    let eligible: Vec<usize> = ordered
        .iter()
        .enumerate()
        .filter(|(_, standing)| !standing.forfeited)
        .map(|(index, _)| index)
        .collect();
    let receivers: Vec<usize> = match request.split {
        PrizeSplit::Winner => eligible.first().copied().into_iter().collect(),
        PrizeSplit::Shared => eligible,
    };
    if receivers.is_empty() {
        return Err(SettlementError::ReconciliationRequired {
            match_id: request.match_id,
            reason: "no active participant to receive the prize".to_string(),
        });
    }

    // Even split; the rounding remainder goes to the best-ranked receivers.
    let count = receivers.len() as u64;
    let share = request.prize_amount / count;
    let remainder = request.prize_amount % count;
    let mut payouts = vec![0u64; ordered.len()];
    for (position, index) in receivers.iter().enumerate() {
        payouts[*index] = share + u64::from((position as u64) < remainder);
    }

    let mut rows = Vec::with_capacity(ordered.len());
    let mut credits = Vec::new();
    for (index, standing) in ordered.iter().enumerate() {
        let payout = signed(payouts[index], request.match_id)?;
        let fee = signed(standing.entry_fee, request.match_id)?;
        rows.push(ResultRow {
            user_id: standing.user_id.clone(),
            rank: index as u32 + 1,
            total_score: standing.score,
            entry_fee: standing.entry_fee,
            net_change: payout - fee,
            forfeited: standing.forfeited,
        });
        if payout > 0 {
            credits.push(LedgerDraft {
                user_id: standing.user_id.clone(),
                cause: LedgerCause::Match(request.match_id),
                kind: LedgerEntryType::PrizeCredit,
                amount: payout,
            });
        }
    }

    let winner_id = match request.split {
        PrizeSplit::Winner => rows.first().map(|row| row.user_id.clone()),
        PrizeSplit::Shared => None,
    };
    let result = MatchResult {
        match_id: request.match_id,
        game_type: request.game_type,
        winner_id,
        prize_amount: request.prize_amount,
        platform_fee: request.platform_fee,
        completed_at: request.completed_at,
        rows,
    };
    Ok((result, credits))
}

/// Payouts owed to the payment provider for a settled result.
pub fn payouts(result: &MatchResult) -> Vec<PayoutInstruction> {
    result
        .rows
        .iter()
        .filter_map(|row| {
            let credit = row.net_change + row.entry_fee as i64;
            (credit > 0).then(|| PayoutInstruction {
                user_id: row.user_id.clone(),
                cause: LedgerCause::Match(result.match_id),
                kind: LedgerEntryType::PrizeCredit,
                amount: credit as u64,
            })
        })
        .collect()
}

pub struct SettlementEngine<L: Ledger> {
    ledger: Arc<L>,
}

impl<L: Ledger> Clone for SettlementEngine<L> {
    fn clone(&self) -> Self {
        Self {
            ledger: self.ledger.clone(),
        }
    }
}

impl<L: Ledger> SettlementEngine<L> {
    pub fn new(ledger: Arc<L>) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    /// Settle a completed match. Calling again, concurrently or later,
    /// returns the stored result unchanged.
    pub async fn settle(&self, request: &SettlementRequest) -> Result<MatchResult, SettlementError> {
        if let Some(existing) = self.ledger.result(request.match_id).await? {
            debug!(match_id = request.match_id, "settlement already recorded");
            return Ok(existing);
        }
        let (result, credits) = compute(request)?;
        match self.ledger.commit_settlement(result, credits).await {
            Ok(SettlementCommit::Committed(result)) => {
                info!(
                    match_id = result.match_id,
                    game = %result.game_type,
                    winner = ?result.winner_id.as_ref().map(UserId::as_str),
                    prize = result.prize_amount,
                    platform_fee = result.platform_fee,
                    "match settled"
                );
                Ok(result)
            }
            Ok(SettlementCommit::AlreadySettled(result)) => {
                debug!(match_id = result.match_id, "settlement raced; using stored result");
                Ok(result)
            }
            Err(LedgerError::OrphanedEntry { user, cause, kind }) => {
                error!(
                    match_id = request.match_id,
                    user = %user,
                    %cause,
                    kind = kind.as_str(),
                    "ledger holds a credit without a result"
                );
                Err(SettlementError::ReconciliationRequired {
                    match_id: request.match_id,
                    reason: format!("orphaned {} for {user}", kind.as_str()),
                })
            }
            Err(err) => Err(err.into()),
        }
    }
}
