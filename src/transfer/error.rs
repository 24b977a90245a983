//! Transfer Error Types
//!
//! Every engine failure is one of a small set of kinds, and each kind maps
//! to a stable code and an HTTP status class.

use serde::Serialize;
use thiserror::Error;

use super::state::TransferStage;
use crate::account::LedgerError;
use crate::audit::AuditLogError;
use crate::context::Interrupted;
use crate::core_types::{AccountId, Amount, TransactionId};

/// Error classification shared with the gateway and the consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    NotFound,
    InsufficientFunds,
    Persistence,
    Audit,
    Cancelled,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    // === Rejections (nothing mutated) ===
    #[error("Invalid transfer request: {0}")]
    Validation(String),

    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("No transfer history for account {0}")]
    NoHistory(AccountId),

    #[error("Insufficient funds in {account}: available {available}, requested {requested}")]
    InsufficientFunds {
        account: AccountId,
        available: Amount,
        requested: Amount,
    },

    // === Store failures ===
    /// A balance store call failed after validation passed. At `CREDITING`
    /// the source debit has already committed.
    #[error("Balance store failure at {stage}: {reason}")]
    Persistence { stage: TransferStage, reason: String },

    /// Balances moved but the audit record was not written
    #[error("Transfer {transaction_id} settled but audit append failed: {reason}")]
    Audit {
        transaction_id: TransactionId,
        reason: String,
    },

    #[error("Audit log query failed: {0}")]
    HistoryUnavailable(String),

    #[error("Transfer interrupted at {stage}: {reason}")]
    Cancelled {
        stage: TransferStage,
        reason: Interrupted,
    },
}

impl TransferError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransferError::Validation(_) => ErrorKind::Validation,
            TransferError::AccountNotFound(_) | TransferError::NoHistory(_) => ErrorKind::NotFound,
            TransferError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            TransferError::Persistence { .. } | TransferError::HistoryUnavailable(_) => {
                ErrorKind::Persistence
            }
            TransferError::Audit { .. } => ErrorKind::Audit,
            TransferError::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::Validation(_) => "VALIDATION_ERROR",
            TransferError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            TransferError::NoHistory(_) => "NO_HISTORY",
            TransferError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            TransferError::Persistence { .. } => "PERSISTENCE_ERROR",
            TransferError::Audit { .. } => "AUDIT_ERROR",
            TransferError::HistoryUnavailable(_) => "HISTORY_UNAVAILABLE",
            TransferError::Cancelled { .. } => "CANCELLED",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::InsufficientFunds => 422,
            ErrorKind::Persistence | ErrorKind::Audit => 500,
            ErrorKind::Cancelled => 408,
        }
    }

    /// Whether balances may have changed even though the call failed
    pub fn may_have_mutated(&self) -> bool {
        match self {
            TransferError::Persistence { stage, .. } | TransferError::Cancelled { stage, .. } => {
                stage.may_leave_partial_state()
            }
            TransferError::Audit { .. } => true,
            _ => false,
        }
    }

    /// Map a ledger failure raised during `stage`
    pub(crate) fn from_ledger(stage: TransferStage, err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound(id) if stage == TransferStage::Validating => {
                TransferError::AccountNotFound(id)
            }
            LedgerError::InsufficientFunds {
                account,
                available,
                requested,
            } => TransferError::InsufficientFunds {
                account,
                available,
                requested,
            },
            other => TransferError::Persistence {
                stage,
                reason: other.to_string(),
            },
        }
    }

    pub(crate) fn from_audit(transaction_id: &TransactionId, err: AuditLogError) -> Self {
        TransferError::Audit {
            transaction_id: transaction_id.clone(),
            reason: err.to_string(),
        }
    }

    pub(crate) fn interrupted(stage: TransferStage, reason: Interrupted) -> Self {
        TransferError::Cancelled { stage, reason }
    }
}
