//! Audit record model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::core_types::{AccountId, Amount, TransactionId};

/// Outcome recorded on a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryStatus {
    Pending,
    Success,
    Failed,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Pending => "PENDING",
            EntryStatus::Success => "SUCCESS",
            EntryStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(EntryStatus::Pending),
            "SUCCESS" => Ok(EntryStatus::Success),
            "FAILED" => Ok(EntryStatus::Failed),
            other => Err(format!("unknown entry status: {other}")),
        }
    }
}

/// Immutable audit record of one transfer
///
/// Stored in `ledger_entries`; the document-style `_id` is kept on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LedgerEntry {
    #[serde(rename = "_id")]
    pub id: String,
    pub transaction_id: TransactionId,
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: Amount,
    pub currency: String,
    pub status: EntryStatus,
    pub timestamp: DateTime<Utc>,
}

impl LedgerEntry {
    /// Whether `account` is either side of this entry
    pub fn involves(&self, account: &AccountId) -> bool {
        &self.from_account_id == account || &self.to_account_id == account
    }
}
