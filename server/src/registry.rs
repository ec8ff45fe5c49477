//! In-process registry of live matches.
//!
//! Each match sits behind its own async mutex: joins, leaves, actions, bot
//! turns and settlement for one match run one at a time while different
//! matches proceed in parallel. Readers never take that mutex. Every
//! mutation publishes an immutable snapshot on the match's watch channel and
//! a [`StateChange`] on the process-wide broadcast.
//!
//! Money leaves the process only after the match lock is released: payout
//! instructions are collected under the lock and queued for the dispatcher
//! afterwards.

use crate::config::ValidatedConfig;
use crate::metrics::ServerMetrics;
use crate::timeouts::{TimerEvent, Timers};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use wagerhall_execution::settlement::payouts;
use wagerhall_execution::{
    now_ms, ActionError, ChessEngine, Ledger, LedgerError, MatchSnapshot, MatchStateMachine,
    PayoutInstruction, Refund, SettlementEngine, SettlementError, Transition,
};
use wagerhall_types::{
    Action, ActionRequest, FeeReceipt, ForfeitReason, GameType, LedgerDraft, LedgerEntry,
    MatchConfig, MatchId, MatchResult, MatchStatus, StateConflict, UserId, ValidationError,
};

/// Upper bound on consecutive bot actions taken under one lock.
const MAX_BOT_STEPS: usize = 4_096;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Action(#[from] ActionError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Settlement(#[from] SettlementError),
}

impl From<ValidationError> for RegistryError {
    fn from(err: ValidationError) -> Self {
        RegistryError::Action(err.into())
    }
}

impl From<StateConflict> for RegistryError {
    fn from(err: StateConflict) -> Self {
        RegistryError::Action(err.into())
    }
}

impl RegistryError {
    /// Stable reason string for clients.
    pub fn code(&self) -> &'static str {
        match self {
            RegistryError::Action(err) => err.code(),
            RegistryError::Ledger(err) | RegistryError::Settlement(SettlementError::Ledger(err)) => {
                match err {
                    LedgerError::OrphanedEntry { .. } => "orphaned-entry",
                    LedgerError::ConflictingEntry { .. } => "conflicting-entry",
                    LedgerError::InsufficientBalance { .. } => "insufficient-balance",
                    LedgerError::AmountOutOfRange => "amount-out-of-range",
                    LedgerError::Unavailable(_) => "ledger-unavailable",
                }
            }
            RegistryError::Settlement(SettlementError::NotCompleted(_)) => "not-completed",
            RegistryError::Settlement(SettlementError::ReconciliationRequired { .. }) => {
                "reconciliation-required"
            }
        }
    }
}

/// Published after every accepted mutation.
#[derive(Clone, Debug)]
pub struct StateChange {
    pub match_id: MatchId,
    pub version: u64,
    pub snapshot: Arc<MatchSnapshot>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CreateMatch {
    pub game_type: GameType,
    pub entry_fee: u64,
    pub max_players: u8,
    /// Falls back to the configured default.
    #[serde(default)]
    pub platform_fee_bps: Option<u16>,
}

/// A seat request carrying the provider's receipt for the captured fee.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct JoinRequest {
    pub user_id: UserId,
    pub payment_ref: String,
    pub amount: u64,
    #[serde(default)]
    pub is_bot: bool,
}

#[derive(Clone, Debug)]
pub struct RegistrySettings {
    pub turn_timeout: Duration,
    pub fill_timeout: Duration,
    /// How long a finished match stays in memory.
    pub retention: Duration,
    pub default_platform_fee_bps: u16,
    pub dice_seed: Option<u64>,
    pub updates_buffer: usize,
    pub payout_queue: usize,
}

impl From<&ValidatedConfig> for RegistrySettings {
    fn from(config: &ValidatedConfig) -> Self {
        Self {
            turn_timeout: config.turn_timeout,
            fill_timeout: config.fill_timeout,
            retention: config.retention,
            default_platform_fee_bps: config.default_platform_fee_bps,
            dice_seed: config.dice_seed,
            updates_buffer: config.updates_buffer,
            payout_queue: config.payout_queue,
        }
    }
}

struct MatchEntry {
    machine: Mutex<MatchStateMachine>,
    snapshot: watch::Sender<Arc<MatchSnapshot>>,
}

pub struct MatchRegistry<L: Ledger> {
    matches: RwLock<HashMap<MatchId, Arc<MatchEntry>>>,
    next_id: AtomicU64,
    settings: RegistrySettings,
    settlement: SettlementEngine<L>,
    chess_engine: Option<Arc<dyn ChessEngine>>,
    updates: broadcast::Sender<StateChange>,
    payouts: mpsc::Sender<PayoutInstruction>,
    timers: Timers,
    timer_driver: JoinHandle<()>,
    metrics: Arc<ServerMetrics>,
}

fn spawn_timer_driver<L: Ledger>(
    registry: Weak<MatchRegistry<L>>,
    mut events: mpsc::UnboundedReceiver<TimerEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let Some(registry) = registry.upgrade() else {
                break;
            };
            tokio::spawn(registry.on_timer(event));
        }
    })
}

impl<L: Ledger> MatchRegistry<L> {
    /// Build the registry and start its timer driver. The returned receiver
    /// yields payout instructions for the dispatcher.
    pub fn start(
        settings: RegistrySettings,
        ledger: Arc<L>,
        chess_engine: Option<Arc<dyn ChessEngine>>,
        metrics: Arc<ServerMetrics>,
    ) -> (Arc<Self>, mpsc::Receiver<PayoutInstruction>) {
        let (timers, events) = Timers::new(
            settings.turn_timeout,
            settings.fill_timeout,
            settings.retention,
        );
        let (updates, _) = broadcast::channel(settings.updates_buffer);
        let (payouts, payout_rx) = mpsc::channel(settings.payout_queue);
        let registry = Arc::new_cyclic(|weak| Self {
            matches: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            settings,
            settlement: SettlementEngine::new(ledger),
            chess_engine,
            updates,
            payouts,
            timers,
            timer_driver: spawn_timer_driver(weak.clone(), events),
            metrics,
        });
        (registry, payout_rx)
    }

    pub fn ledger(&self) -> &Arc<L> {
        self.settlement.ledger()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.updates.subscribe()
    }

    async fn entry(&self, match_id: MatchId) -> Result<Arc<MatchEntry>, RegistryError> {
        self.matches
            .read()
            .await
            .get(&match_id)
            .cloned()
            .ok_or_else(|| StateConflict::MatchNotFound(match_id).into())
    }

    fn publish(&self, entry: &MatchEntry, machine: &MatchStateMachine) -> Arc<MatchSnapshot> {
        let snapshot = Arc::new(machine.snapshot());
        if snapshot.is_final() {
            self.timers.arm_eviction(machine.id());
        }
        entry.snapshot.send_replace(Arc::clone(&snapshot));
        // No subscribers is fine.
        let _ = self.updates.send(StateChange {
            match_id: machine.id(),
            version: snapshot.version,
            snapshot: Arc::clone(&snapshot),
        });
        snapshot
    }

    async fn dispatch(&self, instructions: Vec<PayoutInstruction>) {
        for instruction in instructions {
            if self.payouts.send(instruction).await.is_err() {
                warn!("payout dispatcher stopped; remaining credits stay in the ledger");
                return;
            }
        }
    }

    pub async fn create_match(
        &self,
        request: CreateMatch,
    ) -> Result<Arc<MatchSnapshot>, RegistryError> {
        let config = MatchConfig {
            game_type: request.game_type,
            entry_fee: request.entry_fee,
            max_players: request.max_players,
            platform_fee_bps: request
                .platform_fee_bps
                .unwrap_or(self.settings.default_platform_fee_bps),
        };
        let match_id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let seed = self
            .settings
            .dice_seed
            .map(|base| base.wrapping_add(match_id))
            .unwrap_or_else(rand::random::<u64>);
        let machine =
            MatchStateMachine::new(match_id, &config, seed, now_ms(), self.chess_engine.clone())?;
        let (snapshot, _) = watch::channel(Arc::new(machine.snapshot()));
        let entry = Arc::new(MatchEntry {
            machine: Mutex::new(machine),
            snapshot,
        });
        let published = {
            let machine = entry.machine.lock().await;
            self.matches.write().await.insert(match_id, Arc::clone(&entry));
            self.publish(&entry, &machine)
        };
        self.timers.arm_fill(match_id);
        self.metrics.inc_matches_created();
        info!(
            match_id,
            game = %config.game_type,
            entry_fee = config.entry_fee,
            max_players = config.max_players,
            platform_fee_bps = config.platform_fee_bps,
            "match created"
        );
        Ok(published)
    }

    /// Record the captured entry fee and seat the player.
    pub async fn join(
        &self,
        match_id: MatchId,
        request: JoinRequest,
    ) -> Result<Arc<MatchSnapshot>, RegistryError> {
        let entry = self.entry(match_id).await?;
        let mut credits = Vec::new();
        let snapshot = {
            let mut machine = entry.machine.lock().await;
            let receipt = FeeReceipt {
                payment_ref: request.payment_ref,
                amount: request.amount,
            };
            machine.check_join(&request.user_id, &receipt, request.is_bot)?;
            self.ledger()
                .append(LedgerDraft::entry_fee(
                    request.user_id.clone(),
                    match_id,
                    receipt.amount,
                ))
                .await?;
            let transition =
                machine.join(request.user_id.clone(), receipt, request.is_bot, now_ms())?;
            info!(
                match_id,
                user = %request.user_id,
                is_bot = request.is_bot,
                players = machine.record().current_players,
                "participant joined"
            );
            if transition == Transition::Started {
                self.timers.disarm_fill(match_id);
                self.metrics.inc_matches_started();
                self.advance(&mut machine, &mut credits).await;
            }
            self.publish(&entry, &machine)
        };
        self.dispatch(credits).await;
        Ok(snapshot)
    }

    /// Give up a seat before the start; the fee is refunded.
    pub async fn leave(
        &self,
        match_id: MatchId,
        user: &UserId,
    ) -> Result<(Refund, Arc<MatchSnapshot>), RegistryError> {
        let entry = self.entry(match_id).await?;
        let (refund, snapshot) = {
            let mut machine = entry.machine.lock().await;
            let refund = machine.check_leave(user)?;
            self.ledger().append(refund.draft()).await?;
            machine.leave(user, now_ms())?;
            info!(match_id, user = %user, amount = refund.amount, "participant left");
            if machine.status() == MatchStatus::Cancelled {
                self.timers.disarm_fill(match_id);
                self.metrics.inc_matches_cancelled();
            }
            (refund, self.publish(&entry, &machine))
        };
        self.dispatch(vec![refund.instruction()]).await;
        Ok((refund, snapshot))
    }

    /// Cancel a match that never filled and refund every seat.
    pub async fn cancel_unfilled(&self, match_id: MatchId) -> Result<Vec<Refund>, RegistryError> {
        let entry = self.entry(match_id).await?;
        let refunds = {
            let mut machine = entry.machine.lock().await;
            let refunds = machine.refunds()?;
            for refund in &refunds {
                self.ledger().append(refund.draft()).await?;
            }
            machine.cancel_unfilled(now_ms())?;
            self.timers.disarm_fill(match_id);
            self.metrics.inc_matches_cancelled();
            self.publish(&entry, &machine);
            refunds
        };
        self.dispatch(refunds.iter().map(Refund::instruction).collect())
            .await;
        Ok(refunds)
    }

    /// Apply a participant's action, then let bots respond under the same lock.
    pub async fn submit(
        &self,
        match_id: MatchId,
        request: ActionRequest,
    ) -> Result<Arc<MatchSnapshot>, RegistryError> {
        let entry = self.entry(match_id).await?;
        let started = Instant::now();
        let mut credits = Vec::new();
        let snapshot = {
            let mut machine = entry.machine.lock().await;
            if let Err(err) = machine.apply(&request, now_ms()) {
                self.metrics.inc_actions_rejected();
                return Err(err.into());
            }
            self.metrics.inc_actions_accepted();
            debug!(
                match_id,
                actor = %request.actor,
                action = request.action.kind(),
                version = machine.version(),
                "action applied"
            );
            self.advance(&mut machine, &mut credits).await;
            self.publish(&entry, &machine)
        };
        self.metrics.record_action(started.elapsed());
        self.dispatch(credits).await;
        Ok(snapshot)
    }

    /// Bring a match to rest after a mutation: bots move, a completed match
    /// settles, and the turn clock follows whoever must act next.
    async fn advance(&self, machine: &mut MatchStateMachine, credits: &mut Vec<PayoutInstruction>) {
        self.drive_bots(machine);
        let match_id = machine.id();
        if machine.status() != MatchStatus::Completed {
            match machine.current_turn() {
                Some(user) => self.timers.arm_turn(match_id, user.clone(), machine.version()),
                None => self.timers.disarm_turn(match_id),
            }
            return;
        }
        self.timers.disarm_turn(match_id);
        if machine.awaiting_settlement() {
            self.metrics.inc_matches_completed();
            if let Err(err) = self.settle_locked(machine, credits).await {
                debug!(match_id, code = err.code(), "settlement deferred");
            }
        }
    }

    fn drive_bots(&self, machine: &mut MatchStateMachine) {
        let mut steps = 0;
        while let Some(request) = machine.bot_action() {
            steps += 1;
            if steps > MAX_BOT_STEPS {
                error!(match_id = machine.id(), "bot step budget exhausted");
                return;
            }
            let now = now_ms();
            if let Err(err) = machine.apply(&request, now) {
                warn!(
                    match_id = machine.id(),
                    bot = %request.actor,
                    action = request.action.kind(),
                    %err,
                    "bot action rejected; falling back"
                );
                let Some(fallback) = machine.bot_fallback() else {
                    return;
                };
                if let Err(err) = machine.apply(&fallback, now) {
                    error!(match_id = machine.id(), bot = %fallback.actor, %err, "bot fallback rejected");
                    return;
                }
            }
            self.metrics.inc_bot_actions();
        }
    }

    async fn settle_locked(
        &self,
        machine: &mut MatchStateMachine,
        credits: &mut Vec<PayoutInstruction>,
    ) -> Result<MatchResult, RegistryError> {
        match machine.settle(&self.settlement).await {
            Ok(result) => {
                self.metrics.inc_settlements();
                credits.extend(payouts(&result));
                Ok(result)
            }
            Err(err @ SettlementError::ReconciliationRequired { .. }) => {
                self.metrics.inc_reconciliations();
                Err(err.into())
            }
            Err(err) => {
                self.metrics.inc_settlement_failures();
                Err(err.into())
            }
        }
    }

    /// Stored result of a completed match. A settlement that failed on a
    /// transient ledger error is retried here.
    pub async fn result(&self, match_id: MatchId) -> Result<MatchResult, RegistryError> {
        let entry = self.entry(match_id).await?;
        if let Some(result) = &entry.snapshot.borrow().result {
            return Ok(result.clone());
        }
        let mut credits = Vec::new();
        let result = {
            let mut machine = entry.machine.lock().await;
            if let Some(result) = machine.result() {
                return Ok(result.clone());
            }
            if machine.status() != MatchStatus::Completed {
                return Err(SettlementError::NotCompleted(match_id).into());
            }
            let version = machine.version();
            let result = self.settle_locked(&mut machine, &mut credits).await;
            if machine.version() != version {
                self.publish(&entry, &machine);
            }
            result?
        };
        self.dispatch(credits).await;
        Ok(result)
    }

    pub async fn snapshot(&self, match_id: MatchId) -> Result<Arc<MatchSnapshot>, RegistryError> {
        let entry = self.entry(match_id).await?;
        let snapshot = Arc::clone(&entry.snapshot.borrow());
        Ok(snapshot)
    }

    /// Latest snapshot of `match_id`, updated on every mutation.
    pub async fn watch(
        &self,
        match_id: MatchId,
    ) -> Result<watch::Receiver<Arc<MatchSnapshot>>, RegistryError> {
        Ok(self.entry(match_id).await?.snapshot.subscribe())
    }

    /// Every match, ordered by id.
    pub async fn list(&self) -> Vec<Arc<MatchSnapshot>> {
        let matches = self.matches.read().await;
        let mut snapshots: Vec<_> = matches
            .values()
            .map(|entry| Arc::clone(&entry.snapshot.borrow()))
            .collect();
        snapshots.sort_by_key(|snapshot| snapshot.record.id);
        snapshots
    }

    pub async fn ledger_entries(&self, user: &UserId) -> Result<Vec<LedgerEntry>, RegistryError> {
        Ok(self.ledger().entries_for(user).await?)
    }

    pub async fn balance(&self, user: &UserId) -> Result<i64, RegistryError> {
        Ok(self.ledger().balance(user).await?)
    }

    /// Debit a withdrawal against the user's ledger balance. Repeating the
    /// same withdrawal id returns the original entry.
    pub async fn withdraw(
        &self,
        user: UserId,
        withdrawal_id: u64,
        amount: u64,
    ) -> Result<LedgerEntry, RegistryError> {
        if amount == 0 {
            return Err(LedgerError::AmountOutOfRange.into());
        }
        let appended = self
            .ledger()
            .withdraw(user.clone(), withdrawal_id, amount)
            .await?;
        info!(user = %user, withdrawal_id, amount, "withdrawal recorded");
        Ok(appended.entry().clone())
    }

    async fn on_timer(self: Arc<Self>, event: TimerEvent) {
        match event {
            TimerEvent::TurnExpired {
                match_id,
                user,
                version,
            } => {
                let request = ActionRequest::new(
                    user.clone(),
                    Action::Forfeit {
                        reason: ForfeitReason::Timeout,
                    },
                )
                .at_version(version);
                match self.submit(match_id, request).await {
                    Ok(_) => {
                        self.metrics.inc_turn_timeouts();
                        info!(match_id, user = %user, "turn timed out; participant forfeited")
                    }
                    Err(RegistryError::Action(ActionError::Conflict(conflict))) => {
                        debug!(match_id, user = %user, %conflict, "turn timer superseded")
                    }
                    Err(err) => warn!(match_id, user = %user, %err, "turn timeout forfeit failed"),
                }
            }
            TimerEvent::FillExpired { match_id } => {
                match self.cancel_unfilled(match_id).await {
                    Ok(refunds) => {
                        self.metrics.inc_fill_timeouts();
                        info!(match_id, refunds = refunds.len(), "fill timeout cancelled match")
                    }
                    Err(RegistryError::Action(ActionError::Conflict(conflict))) => {
                        debug!(match_id, %conflict, "fill timer superseded")
                    }
                    Err(err) => warn!(match_id, %err, "fill timeout cancel failed"),
                }
            }
            TimerEvent::RetentionExpired { match_id } => {
                if self.evict(match_id).await {
                    self.metrics.inc_matches_evicted();
                    debug!(match_id, "finished match evicted");
                } else {
                    warn!(match_id, "retention expired for a match that is not finished");
                }
            }
        }
    }

    /// Drop a finished match. Its ledger entries remain; later lookups of
    /// the match report it as not found.
    async fn evict(&self, match_id: MatchId) -> bool {
        self.timers.disarm_eviction(match_id);
        let mut matches = self.matches.write().await;
        let finished = matches
            .get(&match_id)
            .is_some_and(|entry| entry.snapshot.borrow().is_final());
        if finished {
            matches.remove(&match_id);
        }
        finished
    }

    /// Stop timers. Matches stay readable; nothing further fires.
    pub fn shutdown(&self) {
        self.timers.shutdown();
        self.timer_driver.abort();
        info!("match registry stopped");
    }
}
