//! Transfer Engine
//!
//! Orchestrates the account ledger and the audit log to execute transfers
//! and serve history. Shared by the synchronous gateway handlers and the
//! ingestion channel consumers.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::clock::MonotonicClock;
use super::error::TransferError;
use super::state::TransferStage;
use super::types::{AuditState, TransferReceipt, TransferRequest, TransferStatus};
use crate::account::{AccountLedger, LedgerError, OutboxIntent, TransferOutbox, lease_deadline};
use crate::audit::{AuditLog, EntryStatus, LedgerEntry};
use crate::context::CallContext;
use crate::core_types::{AccountId, TransactionId};

/// How a validated transfer is settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementMode {
    /// Debit, credit and audit append as three independent writes.
    /// A failed credit leaves the debit in place.
    #[default]
    Sequential,

    /// Debit, credit and a pending audit intent in one ledger transaction;
    /// the ledger entry is projected afterwards.
    Outbox,
}

/// How long a freshly committed intent is reserved for the inline append
pub const DEFAULT_OUTBOX_LEASE: Duration = Duration::from_secs(30);

pub struct TransferEngine {
    ledger: Arc<dyn AccountLedger>,
    audit: Arc<dyn AuditLog>,
    outbox: Option<Arc<dyn TransferOutbox>>,
    outbox_lease: Duration,
    clock: MonotonicClock,
}

impl TransferEngine {
    /// Engine settling in [`SettlementMode::Sequential`]
    pub fn new(ledger: Arc<dyn AccountLedger>, audit: Arc<dyn AuditLog>) -> Self {
        Self {
            ledger,
            audit,
            outbox: None,
            outbox_lease: DEFAULT_OUTBOX_LEASE,
            clock: MonotonicClock::new(),
        }
    }

    /// Engine settling in [`SettlementMode::Outbox`]. `outbox` must write to
    /// the same store as `ledger`.
    pub fn with_outbox(
        ledger: Arc<dyn AccountLedger>,
        audit: Arc<dyn AuditLog>,
        outbox: Arc<dyn TransferOutbox>,
    ) -> Self {
        Self {
            outbox: Some(outbox),
            ..Self::new(ledger, audit)
        }
    }

    /// Reservation taken on each committed intent. The inline append gets
    /// half of it; after the full lease the projector may take over.
    pub fn with_outbox_lease(mut self, lease: Duration) -> Self {
        self.outbox_lease = lease;
        self
    }

    pub fn settlement(&self) -> SettlementMode {
        if self.outbox.is_some() {
            SettlementMode::Outbox
        } else {
            SettlementMode::Sequential
        }
    }

    pub fn ledger(&self) -> &Arc<dyn AccountLedger> {
        &self.ledger
    }

    pub fn audit(&self) -> &Arc<dyn AuditLog> {
        &self.audit
    }

    pub fn outbox(&self) -> Option<&Arc<dyn TransferOutbox>> {
        self.outbox.as_ref()
    }

    /// Execute one transfer.
    ///
    /// A caller-supplied `request.id` is honoured as the transaction id; if a
    /// transfer with that id already settled, nothing is mutated and the
    /// receipt says [`AuditState::AlreadyRecorded`].
    pub async fn process_transfer(
        &self,
        ctx: &CallContext,
        request: TransferRequest,
    ) -> Result<TransferReceipt, TransferError> {
        validate(&request)?;

        let pre_assigned = request.id.is_some();
        let transaction_id = request.id.clone().unwrap_or_else(TransactionId::generate);

        debug!(
            transaction_id = %transaction_id,
            from = %request.from_account_id,
            to = %request.to_account_id,
            amount = request.amount.minor(),
            stage = %TransferStage::Validating,
            "Processing transfer"
        );

        if pre_assigned && self.already_settled(ctx, &transaction_id).await? {
            info!(transaction_id = %transaction_id, "Transfer already settled, skipping");
            return Ok(TransferReceipt::settled(
                transaction_id,
                AuditState::AlreadyRecorded,
            ));
        }

        // Source lookup and balance check, no side effects
        let source = ctx
            .run(self.ledger.get(&request.from_account_id))
            .await
            .map_err(|e| TransferError::interrupted(TransferStage::Validating, e))?
            .map_err(|e| TransferError::from_ledger(TransferStage::Validating, e))?;

        if !source.can_cover(request.amount) {
            debug!(
                transaction_id = %transaction_id,
                available = source.balance.minor(),
                requested = request.amount.minor(),
                "Insufficient funds"
            );
            return Err(TransferError::InsufficientFunds {
                account: source.id,
                available: source.balance,
                requested: request.amount,
            });
        }

        match &self.outbox {
            None => self.settle_sequential(ctx, &request, transaction_id).await,
            Some(outbox) => {
                self.settle_outbox(ctx, outbox.as_ref(), &request, transaction_id)
                    .await
            }
        }
    }

    async fn settle_sequential(
        &self,
        ctx: &CallContext,
        request: &TransferRequest,
        transaction_id: TransactionId,
    ) -> Result<TransferReceipt, TransferError> {
        let from = &request.from_account_id;
        let to = &request.to_account_id;
        let amount = request.amount;

        // === DEBITING ===
        ctx.run(self.ledger.debit_if_sufficient(from, amount))
            .await
            .map_err(|e| TransferError::interrupted(TransferStage::Debiting, e))?
            .map_err(|e| {
                warn!(transaction_id = %transaction_id, stage = %TransferStage::Debiting, error = %e, "Debit failed");
                match e {
                    // Source vanished between lookup and debit
                    LedgerError::NotFound(id) => TransferError::AccountNotFound(id),
                    other => TransferError::from_ledger(TransferStage::Debiting, other),
                }
            })?;

        // === CREDITING ===
        let credit = ctx
            .run(self.ledger.adjust_balance(to, amount))
            .await
            .map_err(|e| TransferError::interrupted(TransferStage::Crediting, e))
            .and_then(|r| r.map_err(|e| TransferError::from_ledger(TransferStage::Crediting, e)));

        if let Err(e) = credit {
            error!(
                transaction_id = %transaction_id,
                from = %from,
                to = %to,
                amount = amount.minor(),
                stage = %TransferStage::Crediting,
                error = %e,
                "Credit failed after debit committed; debit is not reversed"
            );
            return Err(e);
        }

        // === AUDITING ===
        let entry = LedgerEntry {
            id: Uuid::new_v4().to_string(),
            transaction_id: transaction_id.clone(),
            from_account_id: from.clone(),
            to_account_id: to.clone(),
            amount,
            currency: request.currency.clone(),
            status: EntryStatus::Success,
            timestamp: self.clock.now(),
        };

        let appended = ctx
            .run(self.audit.append(&entry))
            .await
            .map_err(|e| TransferError::interrupted(TransferStage::Auditing, e))
            .and_then(|r| r.map_err(|e| TransferError::from_audit(&transaction_id, e)));

        if let Err(e) = appended {
            error!(
                transaction_id = %transaction_id,
                stage = %TransferStage::Auditing,
                error = %e,
                "Transfer settled but not audited"
            );
            return Err(e);
        }

        info!(
            transaction_id = %transaction_id,
            from = %from,
            to = %to,
            amount = amount.minor(),
            stage = %TransferStage::Done,
            "Transfer completed"
        );
        Ok(TransferReceipt::settled(transaction_id, AuditState::Recorded))
    }

    async fn settle_outbox(
        &self,
        ctx: &CallContext,
        outbox: &dyn TransferOutbox,
        request: &TransferRequest,
        transaction_id: TransactionId,
    ) -> Result<TransferReceipt, TransferError> {
        let intent = OutboxIntent {
            intent_id: Uuid::new_v4(),
            transaction_id: transaction_id.clone(),
            from_account_id: request.from_account_id.clone(),
            to_account_id: request.to_account_id.clone(),
            amount: request.amount,
            currency: request.currency.clone(),
            created_at: self.clock.now(),
            attempts: 0,
            claimed_until: Some(lease_deadline(Utc::now(), self.outbox_lease)),
        };

        // === DEBITING + CREDITING, one atomic unit ===
        let committed = ctx
            .run(outbox.commit_transfer(&intent))
            .await
            .map_err(|e| TransferError::interrupted(TransferStage::Debiting, e))?;
        match committed {
            Ok(()) => {}
            Err(LedgerError::AlreadyCommitted(_)) => {
                // Lost the race to a concurrent delivery of the same transfer
                info!(transaction_id = %transaction_id, "Transfer already settled, skipping");
                return Ok(TransferReceipt::settled(
                    transaction_id,
                    AuditState::AlreadyRecorded,
                ));
            }
            Err(e) => {
                warn!(transaction_id = %transaction_id, error = %e, "Atomic settlement rejected");
                return Err(match e {
                    // Nothing was applied, so a missing account is a plain rejection
                    LedgerError::NotFound(id) => TransferError::AccountNotFound(id),
                    other => TransferError::from_ledger(TransferStage::Debiting, other),
                });
            }
        }

        // === AUDITING, best effort; the projector retries ===
        // Bounded well inside the lease so the projector never overlaps it
        let append_ctx = ctx.capped(self.outbox_lease / 2);
        let audit = match append_ctx.run(self.audit.append(&intent.to_entry())).await {
            Ok(Ok(())) => {
                if let Err(e) = outbox.resolve(intent.intent_id).await {
                    // Projector will find the entry and resolve it
                    warn!(intent_id = %intent.intent_id, error = %e, "Failed to resolve outbox intent");
                }
                AuditState::Recorded
            }
            Ok(Err(e)) => {
                warn!(
                    transaction_id = %transaction_id,
                    intent_id = %intent.intent_id,
                    error = %e,
                    "Audit append failed, left to projector"
                );
                if let Err(e) = outbox.record_failure(intent.intent_id, &e.to_string()).await {
                    warn!(intent_id = %intent.intent_id, error = %e, "Failed to record outbox failure");
                }
                AuditState::Pending
            }
            Err(interrupted) => {
                // The claim is kept; the projector takes over once it expires
                debug!(transaction_id = %transaction_id, reason = %interrupted, "Audit append interrupted, left to projector");
                AuditState::Pending
            }
        };

        info!(
            transaction_id = %transaction_id,
            from = %request.from_account_id,
            to = %request.to_account_id,
            amount = request.amount.minor(),
            audit = ?audit,
            stage = %TransferStage::Done,
            "Transfer completed"
        );
        Ok(TransferReceipt::settled(transaction_id, audit))
    }

    /// A SUCCESS entry in the audit log, or an outbox intent, for this id
    async fn already_settled(
        &self,
        ctx: &CallContext,
        transaction_id: &TransactionId,
    ) -> Result<bool, TransferError> {
        let entries = ctx
            .run(self.audit.find_by_transaction(transaction_id))
            .await
            .map_err(|e| TransferError::interrupted(TransferStage::Validating, e))?
            .map_err(|e| TransferError::Persistence {
                stage: TransferStage::Validating,
                reason: e.to_string(),
            })?;

        if entries.iter().any(|e| e.status == EntryStatus::Success) {
            return Ok(true);
        }

        match &self.outbox {
            Some(outbox) => ctx
                .run(outbox.has_intent(transaction_id))
                .await
                .map_err(|e| TransferError::interrupted(TransferStage::Validating, e))?
                .map_err(|e| TransferError::from_ledger(TransferStage::Validating, e)),
            None => Ok(false),
        }
    }

    /// Transfers touching `account`, newest first.
    ///
    /// An account with no entries is reported as
    /// [`TransferError::NoHistory`], whether or not the account exists.
    pub async fn get_history(
        &self,
        ctx: &CallContext,
        account: &AccountId,
    ) -> Result<Vec<TransferRequest>, TransferError> {
        if account.is_blank() {
            return Err(TransferError::Validation("account id is required".into()));
        }

        let entries = ctx
            .run(self.audit.query(account))
            .await
            .map_err(|e| TransferError::interrupted(TransferStage::Validating, e))?
            .map_err(|e| TransferError::HistoryUnavailable(e.to_string()))?;

        if entries.is_empty() {
            return Err(TransferError::NoHistory(account.clone()));
        }

        Ok(entries.into_iter().map(TransferRequest::from).collect())
    }
}

/// Input checks; no store is touched
fn validate(request: &TransferRequest) -> Result<(), TransferError> {
    if let Some(id) = &request.id
        && id.is_blank()
    {
        return Err(TransferError::Validation("transaction id must not be blank".into()));
    }
    if request.from_account_id.is_blank() {
        return Err(TransferError::Validation("fromAccountId is required".into()));
    }
    if request.to_account_id.is_blank() {
        return Err(TransferError::Validation("toAccountId is required".into()));
    }
    if request.from_account_id == request.to_account_id {
        return Err(TransferError::Validation(
            "source and destination accounts must differ".into(),
        ));
    }
    if !request.amount.is_positive() {
        return Err(TransferError::Validation("amount must be greater than zero".into()));
    }
    if request.currency.trim().is_empty() {
        return Err(TransferError::Validation("currency is required".into()));
    }
    if request.status != TransferStatus::Pending {
        return Err(TransferError::Validation(format!(
            "new transfers must be PENDING, got {}",
            request.status
        )));
    }
    Ok(())
}
