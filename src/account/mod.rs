//! Account ledger module
//!
//! Balance storage behind the [`AccountLedger`] trait, with a PostgreSQL
//! backend and an in-process one.

pub mod error;
pub mod memory;
pub mod models;
pub mod outbox;
pub mod repository;

// Re-export commonly used types
pub use error::LedgerError;
pub use memory::InMemoryAccountLedger;
pub use models::Account;
pub use outbox::{OutboxIntent, TransferOutbox, lease_deadline};
pub use repository::{AccountLedger, PgAccountLedger};
