//! Append-only money ledger and settled results.

use crate::error::LedgerError;
use crate::now_ms;
use commonware_codec::{Encode, ReadExt};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use wagerhall_types::{
    LedgerCause, LedgerDraft, LedgerEntry, LedgerEntryType, LedgerKey, MatchId, MatchResult,
    UserId,
};

/// Outcome of a settlement write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SettlementCommit {
    /// This call wrote the result and its credits.
    Committed(MatchResult),
    /// A result already existed; nothing was written.
    AlreadySettled(MatchResult),
}

impl SettlementCommit {
    pub fn into_result(self) -> MatchResult {
        match self {
            SettlementCommit::Committed(result) | SettlementCommit::AlreadySettled(result) => {
                result
            }
        }
    }
}

/// Outcome of a single idempotent append.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Appended {
    Inserted(LedgerEntry),
    Existing(LedgerEntry),
}

impl Appended {
    pub fn entry(&self) -> &LedgerEntry {
        match self {
            Appended::Inserted(entry) | Appended::Existing(entry) => entry,
        }
    }
}

/// Durable store of results and ledger entries.
///
/// Every write is keyed: (user, cause, kind) for entries and match id for
/// results. Repeating a write is safe.
pub trait Ledger: Send + Sync + 'static {
    fn result(
        &self,
        match_id: MatchId,
    ) -> impl Future<Output = Result<Option<MatchResult>, LedgerError>> + Send;

    /// Store `result` and its `credits` in one transaction, or nothing.
    fn commit_settlement(
        &self,
        result: MatchResult,
        credits: Vec<LedgerDraft>,
    ) -> impl Future<Output = Result<SettlementCommit, LedgerError>> + Send;

    fn append(
        &self,
        draft: LedgerDraft,
    ) -> impl Future<Output = Result<Appended, LedgerError>> + Send;

    /// Debit a withdrawal if the ledger balance covers it.
    fn withdraw(
        &self,
        user: UserId,
        withdrawal_id: u64,
        amount: u64,
    ) -> impl Future<Output = Result<Appended, LedgerError>> + Send;

    fn entries_for(
        &self,
        user: &UserId,
    ) -> impl Future<Output = Result<Vec<LedgerEntry>, LedgerError>> + Send;

    fn balance(&self, user: &UserId) -> impl Future<Output = Result<i64, LedgerError>> + Send {
        async move {
            let entries = self.entries_for(user).await?;
            Ok(entries.iter().map(|entry| entry.amount).sum())
        }
    }
}

#[derive(Default)]
struct Tables {
    next_id: u64,
    entries: Vec<LedgerEntry>,
    index: HashMap<LedgerKey, usize>,
    /// Results are kept in their encoded form; reads decode the stored bytes.
    results: HashMap<MatchId, Vec<u8>>,
}

impl Tables {
    fn insert(&mut self, draft: LedgerDraft, created_at: u64) -> LedgerEntry {
        self.next_id += 1;
        let entry = LedgerEntry::from_draft(self.next_id, draft, created_at);
        self.index.insert(entry.key(), self.entries.len());
        self.entries.push(entry.clone());
        entry
    }

    fn existing(&self, key: &LedgerKey) -> Option<&LedgerEntry> {
        self.index.get(key).map(|position| &self.entries[*position])
    }

    fn result(&self, match_id: MatchId) -> Result<Option<MatchResult>, LedgerError> {
        let Some(bytes) = self.results.get(&match_id) else {
            return Ok(None);
        };
        MatchResult::read(&mut bytes.as_slice())
            .map(Some)
            .map_err(|err| LedgerError::Unavailable(format!("corrupt result {match_id}: {err}")))
    }

    fn balance(&self, user: &UserId) -> i64 {
        self.entries
            .iter()
            .filter(|entry| &entry.user_id == user)
            .map(|entry| entry.amount)
            .sum()
    }
}

/// In-process ledger. A single mutex makes every write transactional.
#[derive(Default)]
pub struct MemoryLedger {
    tables: Mutex<Tables>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("ledger lock poisoned; continuing with inner state");
            poisoned.into_inner()
        })
    }

    /// Every entry, in insertion order.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.tables().entries.clone()
    }

    pub fn count(&self, cause: LedgerCause, kind: LedgerEntryType) -> usize {
        self.tables()
            .entries
            .iter()
            .filter(|entry| entry.cause == cause && entry.kind == kind)
            .count()
    }
}

impl Ledger for MemoryLedger {
    async fn result(&self, match_id: MatchId) -> Result<Option<MatchResult>, LedgerError> {
        self.tables().result(match_id)
    }

    async fn commit_settlement(
        &self,
        result: MatchResult,
        credits: Vec<LedgerDraft>,
    ) -> Result<SettlementCommit, LedgerError> {
        let mut tables = self.tables();
        if let Some(existing) = tables.result(result.match_id)? {
            return Ok(SettlementCommit::AlreadySettled(existing));
        }
        // A credit without its result means an earlier write was cut short.
        if let Some(orphan) = credits
            .iter()
            .find(|draft| tables.existing(&draft.key()).is_some())
        {
            return Err(LedgerError::OrphanedEntry {
                user: orphan.user_id.clone(),
                cause: orphan.cause,
                kind: orphan.kind,
            });
        }
        let created_at = now_ms();
        for draft in credits {
            tables.insert(draft, created_at);
        }
        tables
            .results
            .insert(result.match_id, result.encode().to_vec());
        Ok(SettlementCommit::Committed(result))
    }

    async fn append(&self, draft: LedgerDraft) -> Result<Appended, LedgerError> {
        let mut tables = self.tables();
        if let Some(existing) = tables.existing(&draft.key()) {
            if !existing.matches(&draft) {
                return Err(LedgerError::ConflictingEntry {
                    user: draft.user_id,
                    cause: draft.cause,
                    kind: draft.kind,
                    stored: existing.amount,
                    requested: draft.amount,
                });
            }
            return Ok(Appended::Existing(existing.clone()));
        }
        Ok(Appended::Inserted(tables.insert(draft, now_ms())))
    }

    async fn withdraw(
        &self,
        user: UserId,
        withdrawal_id: u64,
        amount: u64,
    ) -> Result<Appended, LedgerError> {
        let debit = i64::try_from(amount).map_err(|_| LedgerError::AmountOutOfRange)?;
        let draft = LedgerDraft {
            user_id: user.clone(),
            cause: LedgerCause::Withdrawal(withdrawal_id),
            kind: LedgerEntryType::Withdrawal,
            amount: -debit,
        };
        let mut tables = self.tables();
        if let Some(existing) = tables.existing(&draft.key()) {
            if existing.matches(&draft) {
                return Ok(Appended::Existing(existing.clone()));
            }
            return Err(LedgerError::ConflictingEntry {
                user,
                cause: draft.cause,
                kind: draft.kind,
                stored: existing.amount,
                requested: draft.amount,
            });
        }
        let balance = tables.balance(&user);
        if balance < debit {
            return Err(LedgerError::InsufficientBalance {
                user,
                balance,
                requested: amount,
            });
        }
        Ok(Appended::Inserted(tables.insert(draft, now_ms())))
    }

    async fn entries_for(&self, user: &UserId) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(self
            .tables()
            .entries
            .iter()
            .filter(|entry| &entry.user_id == user)
            .cloned()
            .collect())
    }
}
