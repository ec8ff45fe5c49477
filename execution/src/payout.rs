use crate::error::PaymentError;
use serde::Serialize;
use std::future::Future;
use wagerhall_types::{LedgerCause, LedgerEntryType, UserId};

/// Balance credit owed to a user by the payment provider.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct PayoutInstruction {
    pub user_id: UserId,
    pub cause: LedgerCause,
    /// `PrizeCredit` or `Refund`.
    pub kind: LedgerEntryType,
    pub amount: u64,
}

/// External payment provider. Credits are idempotent by (user, cause, kind):
/// delivering the same instruction twice moves money once.
pub trait PaymentProvider: Send + Sync + 'static {
    fn credit(
        &self,
        instruction: &PayoutInstruction,
    ) -> impl Future<Output = Result<(), PaymentError>> + Send;
}
