//! Transactional audit outbox
//!
//! A ledger backend that implements [`TransferOutbox`] can move funds and
//! record the pending audit intent in one atomic unit. The intent is later
//! projected into the audit log by the outbox projector.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::error::LedgerError;
use crate::audit::{EntryStatus, LedgerEntry};
use crate::core_types::{AccountId, Amount, TransactionId};

/// Pending audit record written alongside the balance mutations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxIntent {
    pub intent_id: Uuid,
    pub transaction_id: TransactionId,
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: Amount,
    pub currency: String,
    /// Becomes the ledger entry timestamp
    pub created_at: DateTime<Utc>,
    pub attempts: i32,
    /// Whoever holds the intent until then is the only one projecting it
    pub claimed_until: Option<DateTime<Utc>>,
}

impl OutboxIntent {
    /// Unclaimed, or the previous claim has run out
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        self.claimed_until.is_none_or(|until| until <= now)
    }

    /// The ledger entry this intent resolves to.
    ///
    /// The entry `_id` is the intent id so a re-projection is recognisable.
    pub fn to_entry(&self) -> LedgerEntry {
        LedgerEntry {
            id: self.intent_id.to_string(),
            transaction_id: self.transaction_id.clone(),
            from_account_id: self.from_account_id.clone(),
            to_account_id: self.to_account_id.clone(),
            amount: self.amount,
            currency: self.currency.clone(),
            status: EntryStatus::Success,
            timestamp: self.created_at,
        }
    }
}

#[async_trait]
pub trait TransferOutbox: Send + Sync {
    /// Conditional debit, credit and intent insert as one atomic unit.
    ///
    /// The intent is stored with its `claimed_until`, so the committing
    /// caller holds it until then. A second intent for the same transaction
    /// id fails with [`LedgerError::AlreadyCommitted`]. On any error nothing
    /// is applied.
    async fn commit_transfer(&self, intent: &OutboxIntent) -> Result<(), LedgerError>;

    /// Whether any intent (resolved or not) carries `transaction_id`
    async fn has_intent(&self, transaction_id: &TransactionId) -> Result<bool, LedgerError>;

    /// Claim up to `limit` unresolved, claimable intents for `lease`,
    /// oldest first. Concurrent claimers never receive the same intent.
    async fn claim_pending(
        &self,
        limit: usize,
        lease: Duration,
    ) -> Result<Vec<OutboxIntent>, LedgerError>;

    /// Mark an intent as projected
    async fn resolve(&self, intent_id: Uuid) -> Result<(), LedgerError>;

    /// Bump the attempt counter, remember the last error and release the claim
    async fn record_failure(&self, intent_id: Uuid, error: &str) -> Result<(), LedgerError>;
}

/// `now + lease`, saturating on absurd leases
pub fn lease_deadline(now: DateTime<Utc>, lease: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(lease)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
