//! AuditLog contract

use async_trait::async_trait;
use thiserror::Error;

use super::models::LedgerEntry;
use crate::core_types::{AccountId, TransactionId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuditLogError {
    #[error("Audit store failure: {0}")]
    Persistence(String),

    #[error("Corrupt audit record {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

impl From<sqlx::Error> for AuditLogError {
    fn from(e: sqlx::Error) -> Self {
        AuditLogError::Persistence(e.to_string())
    }
}

/// Append-only transfer history
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Insert one record. Not idempotent: the same entry appended twice is
    /// stored twice.
    async fn append(&self, entry: &LedgerEntry) -> Result<(), AuditLogError>;

    /// Every entry where `account` is the source or the destination,
    /// newest first. Ties on `timestamp` go to the later insert.
    async fn query(&self, account: &AccountId) -> Result<Vec<LedgerEntry>, AuditLogError>;

    /// Every entry carrying `transaction_id`, in insertion order
    async fn find_by_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Vec<LedgerEntry>, AuditLogError>;

    async fn health_check(&self) -> Result<(), AuditLogError>;
}
