//! Audit log module
//!
//! Append-only transfer records behind the [`AuditLog`] trait.

pub mod memory;
pub mod models;
pub mod pg;
pub mod store;

pub use memory::InMemoryAuditLog;
pub use models::{EntryStatus, LedgerEntry};
pub use pg::PgAuditLog;
pub use store::{AuditLog, AuditLogError};
