use thiserror::Error;

use crate::core_types::{AccountId, Amount, TransactionId};

/// Errors returned by [`AccountLedger`](super::AccountLedger) backends
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Account not found: {0}")]
    NotFound(AccountId),

    /// Only produced by the conditional debit primitives
    #[error("Insufficient funds in {account}: available {available}, requested {requested}")]
    InsufficientFunds {
        account: AccountId,
        available: Amount,
        requested: Amount,
    },

    #[error("Account already exists: {0}")]
    AlreadyExists(AccountId),

    /// An outbox intent for this transaction id is already stored
    #[error("Transfer already committed: {0}")]
    AlreadyCommitted(TransactionId),

    #[error("Balance store failure: {0}")]
    Persistence(String),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::Persistence(e.to_string())
    }
}
