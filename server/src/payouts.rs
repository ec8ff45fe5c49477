//! Delivery of ledger credits to the payment provider.
//!
//! The registry queues instructions only after the ledger holds the matching
//! entry and the match lock is released. Providers are idempotent per
//! (user, cause, kind), so redelivery after a crash or retry is harmless.

use crate::metrics::ServerMetrics;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use wagerhall_execution::{PaymentError, PaymentProvider, PayoutInstruction};
use wagerhall_types::{LedgerCause, LedgerEntryType, UserId};

const MAX_ATTEMPTS: u32 = 5;
const INITIAL_BACKOFF: Duration = Duration::from_millis(200);

/// Provider that records credits in the log. Used when no external payment
/// provider is wired in.
#[derive(Default)]
pub struct TracingProvider {
    delivered: Mutex<HashSet<(UserId, LedgerCause, LedgerEntryType)>>,
}

impl TracingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered(&self) -> usize {
        self.delivered.lock().map(|set| set.len()).unwrap_or(0)
    }
}

impl PaymentProvider for TracingProvider {
    async fn credit(&self, instruction: &PayoutInstruction) -> Result<(), PaymentError> {
        let key = (
            instruction.user_id.clone(),
            instruction.cause,
            instruction.kind,
        );
        let fresh = self
            .delivered
            .lock()
            .map_err(|_| PaymentError::Unavailable("provider state poisoned".to_string()))?
            .insert(key);
        if fresh {
            info!(
                user = %instruction.user_id,
                cause = %instruction.cause,
                kind = instruction.kind.as_str(),
                amount = instruction.amount,
                "payout credited"
            );
        }
        Ok(())
    }
}

async fn deliver<P: PaymentProvider>(
    provider: &P,
    instruction: &PayoutInstruction,
) -> Result<(), PaymentError> {
    let mut backoff = INITIAL_BACKOFF;
    let mut attempt = 1;
    loop {
        match provider.credit(instruction).await {
            Ok(()) => return Ok(()),
            Err(PaymentError::Unavailable(reason)) if attempt < MAX_ATTEMPTS => {
                warn!(
                    user = %instruction.user_id,
                    cause = %instruction.cause,
                    attempt,
                    %reason,
                    "payment provider unavailable; retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Drain queued instructions into `provider` until every sender is gone.
pub fn spawn_dispatcher<P: PaymentProvider>(
    provider: Arc<P>,
    mut instructions: mpsc::Receiver<PayoutInstruction>,
    metrics: Arc<ServerMetrics>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(instruction) = instructions.recv().await {
            match deliver(provider.as_ref(), &instruction).await {
                Ok(()) => metrics.inc_payouts_sent(),
                Err(err) => {
                    metrics.inc_payouts_failed();
                    // The ledger entry stands; the provider is reconciled from it.
                    warn!(
                        user = %instruction.user_id,
                        cause = %instruction.cause,
                        kind = instruction.kind.as_str(),
                        amount = instruction.amount,
                        %err,
                        "payout delivery failed"
                    );
                }
            }
        }
        info!("payout dispatcher stopped");
    })
}
