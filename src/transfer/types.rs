//! Transfer request and result types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::audit::LedgerEntry;
use crate::core_types::{AccountId, Amount, TransactionId};

/// Lifecycle status of a transfer, shared with ledger entries
pub use crate::audit::EntryStatus as TransferStatus;

/// A transfer to execute, or a transfer record read back from history
///
/// Not persisted itself; its outcome is projected into a [`LedgerEntry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    /// Assigned by the engine when absent. A caller-supplied id is also the
    /// idempotency key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<TransactionId>,
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: Amount,
    pub currency: String,
    #[serde(default = "pending")]
    pub status: TransferStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

fn pending() -> TransferStatus {
    TransferStatus::Pending
}

impl TransferRequest {
    pub fn new(
        from: impl Into<AccountId>,
        to: impl Into<AccountId>,
        amount: Amount,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            from_account_id: from.into(),
            to_account_id: to.into(),
            amount,
            currency: currency.into(),
            status: TransferStatus::Pending,
            created_at: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<TransactionId>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// History projection: `createdAt := timestamp`
impl From<LedgerEntry> for TransferRequest {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            id: Some(entry.transaction_id),
            from_account_id: entry.from_account_id,
            to_account_id: entry.to_account_id,
            amount: entry.amount,
            currency: entry.currency,
            status: entry.status,
            created_at: Some(entry.timestamp),
        }
    }
}

/// Where the audit record of a settled transfer stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditState {
    /// Ledger entry written
    Recorded,
    /// Outbox intent committed, entry not yet projected
    Pending,
    /// An earlier attempt with the same transaction id already settled
    AlreadyRecorded,
}

/// Successful `process_transfer` outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferReceipt {
    pub transaction_id: TransactionId,
    pub status: TransferStatus,
    pub audit: AuditState,
}

impl TransferReceipt {
    pub(crate) fn settled(transaction_id: TransactionId, audit: AuditState) -> Self {
        Self {
            transaction_id,
            status: TransferStatus::Success,
            audit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::EntryStatus;

    #[test]
    fn test_request_defaults_when_deserialized() {
        let req: TransferRequest = serde_json::from_str(
            r#"{"fromAccountId":"alice","toAccountId":"bob","amount":2000,"currency":"USD"}"#,
        )
        .unwrap();
        assert_eq!(req.id, None);
        assert_eq!(req.status, TransferStatus::Pending);
        assert_eq!(req, TransferRequest::new("alice", "bob", Amount::from_minor(2000), "USD"));
    }

    #[test]
    fn test_entry_projection() {
        let at = Utc::now();
        let entry = LedgerEntry {
            id: "e1".into(),
            transaction_id: "tx1".into(),
            from_account_id: "alice".into(),
            to_account_id: "bob".into(),
            amount: Amount::from_minor(2000),
            currency: "USD".into(),
            status: EntryStatus::Success,
            timestamp: at,
        };
        let record = TransferRequest::from(entry);
        assert_eq!(record.id, Some("tx1".into()));
        assert_eq!(record.created_at, Some(at));
        assert_eq!(record.status, TransferStatus::Success);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["fromAccountId"], "alice");
        assert_eq!(json["status"], "SUCCESS");
    }
}
