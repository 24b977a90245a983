//! Transfer Ledger - account-to-account transfers with an audit trail
//!
//! # Modules
//!
//! - [`core_types`] - Identifier and amount newtypes
//! - [`context`] - Caller cancellation and deadlines
//! - [`account`] - Balance store (`AccountLedger`) and audit outbox
//! - [`audit`] - Append-only ledger entries (`AuditLog`)
//! - [`transfer`] - Transfer engine, settlement modes, outbox projector
//! - [`channel`] - Durable ingestion queue, publisher and consumers
//! - [`gateway`] - HTTP API
//! - [`config`] / [`logging`] / [`db`] - Process plumbing

// Core types - must be first!
pub mod core_types;

pub mod config;
pub mod context;
pub mod db;
pub mod logging;

pub mod account;
pub mod audit;
pub mod channel;
pub mod transfer;

pub mod gateway;

// Convenient re-exports at crate root
pub use account::{Account, AccountLedger, InMemoryAccountLedger, LedgerError, PgAccountLedger};
pub use audit::{AuditLog, EntryStatus, InMemoryAuditLog, LedgerEntry, PgAuditLog};
pub use channel::{IngestionChannel, MemoryQueue, PgQueue, Publisher, TransferMessage};
pub use context::{CallContext, CancellationToken, Interrupted};
pub use core_types::{AccountId, Amount, TransactionId};
pub use transfer::{
    AuditState, OutboxProjector, SettlementMode, TransferEngine, TransferError, TransferReceipt,
    TransferRequest, TransferStatus,
};
