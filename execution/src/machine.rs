//! Per-match lifecycle: seating, turns, forfeits, completion and settlement.
//!
//! A `MatchStateMachine` is never shared; callers serialize access (the
//! registry holds one lock per match). Every successful mutation bumps
//! `version`, and once the match is completed or cancelled every further
//! mutation is rejected.

use crate::ai::{self, Decision};
use crate::chess::{ChessEngine, ChessState, ChessValidator, PlayedMove};
use crate::dice::DiceRoller;
use crate::error::{ActionError, SettlementError};
use crate::ledger::Ledger;
use crate::payout::PayoutInstruction;
use crate::settlement::{PrizeSplit, SettlementEngine, SettlementRequest, Standing};
use crate::validator::MoveValidator;
use crate::yahtzee::{first_open, YahtzeeState, YahtzeeValidator};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};
use wagerhall_types::{
    Action, ActionRequest, ChessOutcome, FeeReceipt, GameType, LedgerCause, LedgerDraft,
    LedgerEntryType, Match, MatchConfig, MatchId, MatchResult, MatchStatus, Participant,
    PrizePool, StateConflict, UserId, ValidationError,
};

/// Game-specific state, present once the match is running.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "game", rename_all = "snake_case")]
pub enum GameState {
    Yahtzee(YahtzeeState),
    Chess(ChessState),
}

/// Consistent view of a match at one version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MatchSnapshot {
    pub version: u64,
    #[serde(rename = "match")]
    pub record: Match,
    pub participants: Vec<Participant>,
    pub current_turn: Option<UserId>,
    pub state: Option<GameState>,
    pub result: Option<MatchResult>,
    pub needs_reconciliation: bool,
}

impl MatchSnapshot {
    /// Nothing further can change once a match is cancelled or settled.
    pub fn is_final(&self) -> bool {
        match self.record.status {
            MatchStatus::Cancelled => true,
            MatchStatus::Completed => self.result.is_some(),
            _ => false,
        }
    }
}

/// Entry fee owed back to a participant of a match that never started.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Refund {
    pub match_id: MatchId,
    pub user_id: UserId,
    pub amount: u64,
}

impl Refund {
    pub fn draft(&self) -> LedgerDraft {
        LedgerDraft::refund(self.user_id.clone(), self.match_id, self.amount)
    }

    pub fn instruction(&self) -> PayoutInstruction {
        PayoutInstruction {
            user_id: self.user_id.clone(),
            cause: LedgerCause::Match(self.match_id),
            kind: LedgerEntryType::Refund,
            amount: self.amount,
        }
    }
}

/// What an accepted action did to the match.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Applied,
    Started,
    Completed,
}

pub struct MatchStateMachine {
    record: Match,
    participants: Vec<Participant>,
    departed: HashSet<UserId>,
    game: Option<GameState>,
    roller: DiceRoller,
    chess_engine: Option<Arc<dyn ChessEngine>>,
    version: u64,
    result: Option<MatchResult>,
    reconciliation: Option<String>,
}

impl MatchStateMachine {
    pub fn new(
        id: MatchId,
        config: &MatchConfig,
        seed: u64,
        created_at: u64,
        chess_engine: Option<Arc<dyn ChessEngine>>,
    ) -> Result<Self, ValidationError> {
        config.validate()?;
        if config.game_type == GameType::Chess && chess_engine.is_none() {
            return Err(ValidationError::InvalidConfig("chess_engine"));
        }
        Ok(Self {
            record: Match::new(id, config, created_at),
            participants: Vec::new(),
            departed: HashSet::new(),
            game: None,
            roller: DiceRoller::new(seed),
            chess_engine,
            version: 0,
            result: None,
            reconciliation: None,
        })
    }

    pub fn id(&self) -> MatchId {
        self.record.id
    }

    pub fn record(&self) -> &Match {
        &self.record
    }

    pub fn status(&self) -> MatchStatus {
        self.record.status
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn game(&self) -> Option<&GameState> {
        self.game.as_ref()
    }

    pub fn result(&self) -> Option<&MatchResult> {
        self.result.as_ref()
    }

    pub fn needs_reconciliation(&self) -> bool {
        self.reconciliation.is_some()
    }

    /// Completed without a stored result and not flagged.
    pub fn awaiting_settlement(&self) -> bool {
        self.record.status == MatchStatus::Completed
            && self.result.is_none()
            && self.reconciliation.is_none()
    }

    fn seat_of(&self, user: &UserId) -> Option<u8> {
        self.participants
            .iter()
            .position(|participant| &participant.user_id == user)
            .map(|seat| seat as u8)
    }

    fn ensure_pre_start(&self) -> Result<(), StateConflict> {
        if self.record.status.is_pre_start() {
            Ok(())
        } else {
            Err(StateConflict::MatchAlreadyStarted {
                match_id: self.record.id,
                status: self.record.status,
            })
        }
    }

    /// Whether `user` could take a seat right now.
    pub fn check_join(
        &self,
        user: &UserId,
        receipt: &FeeReceipt,
        is_bot: bool,
    ) -> Result<(), ActionError> {
        self.ensure_pre_start()?;
        if !user.is_valid() {
            return Err(ValidationError::InvalidUserId.into());
        }
        if self.departed.contains(user) {
            return Err(ValidationError::AlreadyLeft.into());
        }
        if self.seat_of(user).is_some() {
            return Err(ValidationError::AlreadyJoined.into());
        }
        if self.record.is_full() {
            return Err(ValidationError::MatchFull.into());
        }
        if receipt.amount != self.record.entry_fee {
            return Err(ValidationError::EntryFeeMismatch {
                expected: self.record.entry_fee,
                got: receipt.amount,
            }
            .into());
        }
        if is_bot && self.record.game_type == GameType::Chess {
            return Err(ValidationError::InvalidConfig("is_bot").into());
        }
        Ok(())
    }

    /// Seat `user`. The join that fills the last seat starts the match.
    pub fn join(
        &mut self,
        user: UserId,
        receipt: FeeReceipt,
        is_bot: bool,
        now: u64,
    ) -> Result<Transition, ActionError> {
        self.check_join(&user, &receipt, is_bot)?;
        let players = self.record.current_players + 1;
        let pool = if players >= self.record.max_players {
            Some(
                PrizePool::compute(self.record.entry_fee, players, self.record.platform_fee_bps)
                    .ok_or(ValidationError::InvalidConfig("entry_fee"))?,
            )
        } else {
            None
        };

        self.participants.push(Participant {
            user_id: user,
            seat: self.participants.len() as u8,
            entry_fee: receipt.amount,
            payment_ref: receipt.payment_ref,
            forfeited: false,
            is_bot,
            joined_at: now,
        });
        self.record.current_players = players;
        self.record.status = MatchStatus::Filling;
        self.version += 1;

        let Some(pool) = pool else {
            return Ok(Transition::Applied);
        };
        self.record.status = MatchStatus::Waiting;
        self.start(pool, now);
        Ok(Transition::Started)
    }

    fn start(&mut self, pool: PrizePool, now: u64) {
        self.record.prize_amount = pool.prize_amount;
        self.record.platform_fee = pool.platform_fee;
        self.record.started_at = Some(now);
        self.record.status = MatchStatus::Running;
        self.game = Some(match self.record.game_type {
            GameType::Yahtzee => GameState::Yahtzee(YahtzeeState::new(self.record.current_players)),
            GameType::Chess => GameState::Chess(ChessState::new()),
        });
        info!(
            match_id = self.record.id,
            game = %self.record.game_type,
            players = self.record.current_players,
            prize = pool.prize_amount,
            "match started"
        );
    }

    /// Refund `user` would receive by leaving now.
    pub fn check_leave(&self, user: &UserId) -> Result<Refund, ActionError> {
        self.ensure_pre_start()?;
        let seat = self.seat_of(user).ok_or(ValidationError::NotAParticipant)?;
        Ok(self.refund(&self.participants[seat as usize]))
    }

    fn refund(&self, participant: &Participant) -> Refund {
        Refund {
            match_id: self.record.id,
            user_id: participant.user_id.clone(),
            amount: participant.entry_fee,
        }
    }

    /// Give up a seat before the match starts. The last one out cancels it.
    pub fn leave(&mut self, user: &UserId, now: u64) -> Result<Refund, ActionError> {
        let refund = self.check_leave(user)?;
        self.participants
            .retain(|participant| &participant.user_id != user);
        for (seat, remaining) in self.participants.iter_mut().enumerate() {
            remaining.seat = seat as u8;
        }
        self.departed.insert(refund.user_id.clone());
        self.record.current_players -= 1;
        if self.participants.is_empty() {
            self.record.status = MatchStatus::Cancelled;
            self.record.completed_at = Some(now);
            info!(match_id = self.record.id, "match cancelled: everyone left");
        } else {
            self.record.status = MatchStatus::Filling;
        }
        self.version += 1;
        Ok(refund)
    }

    /// Refunds owed if the match were cancelled now.
    pub fn refunds(&self) -> Result<Vec<Refund>, ActionError> {
        self.ensure_pre_start()?;
        Ok(self
            .participants
            .iter()
            .map(|participant| self.refund(participant))
            .collect())
    }

    /// Fill timeout: cancel and refund everyone seated.
    pub fn cancel_unfilled(&mut self, now: u64) -> Result<Vec<Refund>, ActionError> {
        let refunds = self.refunds()?;
        self.record.status = MatchStatus::Cancelled;
        self.record.completed_at = Some(now);
        self.version += 1;
        info!(
            match_id = self.record.id,
            players = refunds.len(),
            "match cancelled: not filled in time"
        );
        Ok(refunds)
    }

    /// Validate and apply one action.
    pub fn apply(&mut self, request: &ActionRequest, now: u64) -> Result<Transition, ActionError> {
        if let Some(expected) = request.expected_version {
            if expected != self.version {
                return Err(StateConflict::StaleVersion {
                    expected,
                    current: self.version,
                }
                .into());
            }
        }
        if self.record.status != MatchStatus::Running {
            return Err(StateConflict::MatchNotRunning {
                match_id: self.record.id,
                status: self.record.status,
            }
            .into());
        }
        let seat = self
            .seat_of(&request.actor)
            .ok_or(ValidationError::NotAParticipant)?;
        if self.participants[seat as usize].forfeited {
            return Err(ValidationError::AlreadyForfeited.into());
        }

        if request.action.ends_participation() {
            self.forfeit(seat, &request.action, now);
            self.version += 1;
            return Ok(self.transition());
        }

        if let Some(got) = request.action.game_type() {
            if got != self.record.game_type {
                return Err(ValidationError::WrongGame {
                    expected: self.record.game_type,
                    got,
                }
                .into());
            }
        }

        let roller = self.roller;
        let finished = match self.game.as_mut() {
            Some(GameState::Yahtzee(state)) => {
                YahtzeeValidator.validate(state, seat, &request.action)?;
                state.apply(&roller, &request.action);
                state.is_finished()
            }
            Some(GameState::Chess(state)) => {
                let engine = self
                    .chess_engine
                    .as_deref()
                    .ok_or(ValidationError::InvalidConfig("chess_engine"))?;
                ChessValidator::new(engine).validate(state, seat, &request.action)?;
                if let Action::Move {
                    from,
                    to,
                    promotion,
                } = request.action
                {
                    let outcome = engine
                        .apply_move(&state.board, from, to, promotion)
                        .map_err(|err| {
                            warn!(match_id = self.record.id, %err, "engine refused validated move");
                            ValidationError::IllegalMove { from, to }
                        })?;
                    state.record(
                        PlayedMove {
                            from,
                            to,
                            promotion,
                        },
                        outcome,
                    );
                }
                state.outcome.is_some()
            }
            None => false,
        };
        if finished {
            self.complete(now);
        }
        self.version += 1;
        Ok(self.transition())
    }

    fn transition(&self) -> Transition {
        if self.record.status == MatchStatus::Completed {
            Transition::Completed
        } else {
            Transition::Applied
        }
    }

    fn forfeit(&mut self, seat: u8, action: &Action, now: u64) {
        let participant = &mut self.participants[seat as usize];
        participant.forfeited = true;
        info!(
            match_id = self.record.id,
            user = %participant.user_id,
            action = action.kind(),
            reason = ?action,
            "participant forfeited"
        );
        let cards_full = match self.game.as_mut() {
            Some(GameState::Yahtzee(state)) => {
                state.forfeit(seat);
                state.is_finished()
            }
            _ => false,
        };
        let active = self
            .participants
            .iter()
            .filter(|participant| !participant.forfeited)
            .count();
        if active < 2 || cards_full {
            self.complete(now);
        }
    }

    fn complete(&mut self, now: u64) {
        self.record.status = MatchStatus::Completed;
        self.record.completed_at = Some(now);
        info!(match_id = self.record.id, "match completed");
    }

    /// Standings handed to settlement; `None` until the match completes.
    pub fn settlement_request(&self) -> Option<SettlementRequest> {
        if self.record.status != MatchStatus::Completed {
            return None;
        }
        let mut split = PrizeSplit::Winner;
        let standings = self
            .participants
            .iter()
            .map(|participant| {
                let score = match &self.game {
                    Some(GameState::Yahtzee(state)) => state
                        .seat(participant.seat)
                        .map(|seat| seat.scoreboard.total())
                        .unwrap_or(0),
                    Some(GameState::Chess(state)) => match state.outcome {
                        Some(ChessOutcome::Checkmate { winner }) => {
                            u32::from(winner.seat() == participant.seat)
                        }
                        Some(ChessOutcome::Stalemate | ChessOutcome::Draw) => {
                            split = PrizeSplit::Shared;
                            0
                        }
                        None => 0,
                    },
                    None => 0,
                };
                Standing {
                    user_id: participant.user_id.clone(),
                    seat: participant.seat,
                    score,
                    entry_fee: participant.entry_fee,
                    forfeited: participant.forfeited,
                }
            })
            .collect();
        Some(SettlementRequest {
            match_id: self.record.id,
            game_type: self.record.game_type,
            prize_amount: self.record.prize_amount,
            platform_fee: self.record.platform_fee,
            completed_at: self.record.completed_at.unwrap_or(0),
            split,
            standings,
        })
    }

    /// Settle a completed match at most once. Later calls return the stored
    /// result; a match flagged for reconciliation is never retried.
    pub async fn settle<L: Ledger>(
        &mut self,
        engine: &SettlementEngine<L>,
    ) -> Result<MatchResult, SettlementError> {
        if let Some(result) = &self.result {
            return Ok(result.clone());
        }
        if let Some(reason) = &self.reconciliation {
            return Err(SettlementError::ReconciliationRequired {
                match_id: self.record.id,
                reason: reason.clone(),
            });
        }
        let request = self
            .settlement_request()
            .ok_or(SettlementError::NotCompleted(self.record.id))?;
        match engine.settle(&request).await {
            Ok(result) => {
                self.record.winner_id = result.winner_id.clone();
                self.result = Some(result.clone());
                self.version += 1;
                Ok(result)
            }
            Err(SettlementError::ReconciliationRequired { match_id, reason }) => {
                error!(match_id, %reason, "match flagged for manual reconciliation");
                self.reconciliation = Some(reason.clone());
                self.version += 1;
                Err(SettlementError::ReconciliationRequired { match_id, reason })
            }
            Err(err) => {
                warn!(match_id = self.record.id, %err, "settlement failed; will retry");
                Err(err)
            }
        }
    }

    /// Participant whose turn it is.
    pub fn current_turn(&self) -> Option<&UserId> {
        if self.record.status != MatchStatus::Running {
            return None;
        }
        let seat = match self.game.as_ref()? {
            GameState::Yahtzee(state) => state.current_seat,
            GameState::Chess(state) => state.current_seat(),
        };
        self.participants
            .get(seat as usize)
            .map(|participant| &participant.user_id)
    }

    fn current_bot(&self) -> Option<(&Participant, &YahtzeeState)> {
        let user = self.current_turn()?;
        let participant = self.participants.iter().find(|p| &p.user_id == user)?;
        match self.game.as_ref()? {
            GameState::Yahtzee(state) if participant.is_bot => Some((participant, state)),
            _ => None,
        }
    }

    /// Next step for a bot holding the turn, pinned to the current version.
    pub fn bot_action(&self) -> Option<ActionRequest> {
        let (participant, state) = self.current_bot()?;
        let seat = state.seat(participant.seat)?;
        let turn = &seat.turn;
        let action = if turn.roll_count == 0 {
            Action::Roll
        } else {
            match ai::decide(&turn.values(), turn.roll_count, &seat.scoreboard) {
                Decision::Score(category) => Action::Score { category },
                Decision::Hold(pattern) if pattern != turn.holds() => Action::SetHolds { pattern },
                Decision::Hold(_) => Action::Roll,
            }
        };
        Some(ActionRequest::new(participant.user_id.clone(), action).at_version(self.version))
    }

    /// Always-legal move for a bot whose chosen action was rejected.
    pub fn bot_fallback(&self) -> Option<ActionRequest> {
        let (participant, state) = self.current_bot()?;
        let seat = state.seat(participant.seat)?;
        let action = if seat.turn.roll_count == 0 {
            Action::Roll
        } else {
            Action::Score {
                category: first_open(seat)?,
            }
        };
        Some(ActionRequest::new(participant.user_id.clone(), action).at_version(self.version))
    }

    pub fn snapshot(&self) -> MatchSnapshot {
        MatchSnapshot {
            version: self.version,
            record: self.record.clone(),
            participants: self.participants.clone(),
            current_turn: self.current_turn().cloned(),
            state: self.game.clone(),
            result: self.result.clone(),
            needs_reconciliation: self.reconciliation.is_some(),
        }
    }
}
