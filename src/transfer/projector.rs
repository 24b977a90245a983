//! Outbox Projector
//!
//! Background worker that writes ledger entries for committed outbox
//! intents and marks them resolved.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::account::{OutboxIntent, TransferOutbox};
use crate::audit::{AuditLog, AuditLogError};

/// Configuration for the outbox projector
#[derive(Debug, Clone)]
pub struct ProjectorConfig {
    /// How often to scan for unresolved intents
    pub scan_interval: Duration,
    /// Maximum intents to project per scan
    pub batch_size: usize,
    /// How long a claimed intent stays reserved for this projector
    pub lease: Duration,
}

impl Default for ProjectorConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(5),
            batch_size: 100,
            lease: Duration::from_secs(30),
        }
    }
}

/// Projects pending intents into the audit log.
///
/// Only intents nobody holds a claim on are picked up; a freshly committed
/// intent belongs to the engine's inline append until its lease runs out.
/// A projection is idempotent: if an entry with the intent's `_id` is
/// already in the audit log, the intent is only resolved.
pub struct OutboxProjector {
    outbox: Arc<dyn TransferOutbox>,
    audit: Arc<dyn AuditLog>,
    config: ProjectorConfig,
}

impl OutboxProjector {
    pub fn new(
        outbox: Arc<dyn TransferOutbox>,
        audit: Arc<dyn AuditLog>,
        config: ProjectorConfig,
    ) -> Self {
        Self {
            outbox,
            audit,
            config,
        }
    }

    /// Create with default configuration
    pub fn with_defaults(outbox: Arc<dyn TransferOutbox>, audit: Arc<dyn AuditLog>) -> Self {
        Self::new(outbox, audit, ProjectorConfig::default())
    }

    /// Run until `shutdown` flips to `true`
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            scan_interval_ms = self.config.scan_interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            lease_ms = self.config.lease.as_millis() as u64,
            "Starting outbox projector"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            if let Err(e) = self.scan_and_project().await {
                error!(error = %e, "Outbox scan failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.scan_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Outbox projector stopped");
    }

    /// Run a single scan; returns how many intents were resolved.
    ///
    /// Only the claim itself can fail the scan; a bookkeeping error on one
    /// intent is logged and the batch goes on.
    pub async fn scan_and_project(&self) -> Result<usize, crate::account::LedgerError> {
        let pending = self
            .outbox
            .claim_pending(self.config.batch_size, self.config.lease)
            .await?;

        if pending.is_empty() {
            debug!("No pending outbox intents");
            return Ok(0);
        }

        debug!(count = pending.len(), "Projecting outbox intents");

        let mut projected = 0;
        for intent in &pending {
            if intent.attempts > 10 {
                warn!(
                    intent_id = %intent.intent_id,
                    transaction_id = %intent.transaction_id,
                    attempts = intent.attempts,
                    "Outbox intent keeps failing to project"
                );
            }

            match self.project(intent).await {
                Ok(()) => match self.outbox.resolve(intent.intent_id).await {
                    Ok(()) => projected += 1,
                    Err(e) => {
                        // Entry is written; the next claim finds it and resolves
                        error!(
                            intent_id = %intent.intent_id,
                            error = %e,
                            "Failed to resolve projected outbox intent"
                        );
                    }
                },
                Err(e) => {
                    warn!(
                        intent_id = %intent.intent_id,
                        transaction_id = %intent.transaction_id,
                        error = %e,
                        "Failed to project outbox intent"
                    );
                    if let Err(e) = self
                        .outbox
                        .record_failure(intent.intent_id, &e.to_string())
                        .await
                    {
                        error!(
                            intent_id = %intent.intent_id,
                            error = %e,
                            "Failed to record outbox failure"
                        );
                    }
                }
            }
        }

        if projected > 0 {
            info!(count = projected, "Projected outbox intents");
        }
        Ok(projected)
    }

    async fn project(&self, intent: &OutboxIntent) -> Result<(), AuditLogError> {
        let entry = intent.to_entry();
        let existing = self
            .audit
            .find_by_transaction(&intent.transaction_id)
            .await?;

        if existing.iter().any(|e| e.id == entry.id) {
            debug!(intent_id = %intent.intent_id, "Entry already projected");
            return Ok(());
        }

        self.audit.append(&entry).await
    }
}
