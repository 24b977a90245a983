//! Transfer Engine
//!
//! Moves funds between two accounts in the balance ledger and records the
//! result in the audit log.
//!
//! # Stages
//!
//! ```text
//! VALIDATING → DEBITING → CREDITING → AUDITING → DONE
//! ```
//!
//! # Settlement modes
//!
//! - **Sequential** (default): conditional debit, credit and audit append are
//!   independent writes. A failed credit leaves the debit committed; a failed
//!   append leaves the transfer settled but unaudited. Both are reported,
//!   neither is reversed.
//! - **Outbox**: debit, credit and a pending audit intent commit in one
//!   ledger transaction. The [`OutboxProjector`] writes the ledger entry and
//!   retries until it lands.

pub mod clock;
pub mod engine;
pub mod error;
pub mod projector;
pub mod state;
pub mod types;


// Re-exports for convenience
pub use engine::{SettlementMode, TransferEngine};
pub use error::{ErrorKind, TransferError};
pub use projector::{OutboxProjector, ProjectorConfig};
pub use state::TransferStage;
pub use types::{AuditState, TransferReceipt, TransferRequest, TransferStatus};
