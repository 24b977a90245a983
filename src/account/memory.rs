//! In-process account ledger
//!
//! Backs `--memory` mode and the black-box tests. Each account lives in its
//! own `DashMap` shard entry, so single-row updates are atomic without a
//! global lock.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

use super::error::LedgerError;
use super::models::Account;
use super::outbox::{OutboxIntent, TransferOutbox, lease_deadline};
use super::repository::AccountLedger;
use crate::core_types::{AccountId, Amount, TransactionId};

#[derive(Debug, Clone)]
struct OutboxSlot {
    intent: OutboxIntent,
    resolved: bool,
    last_error: Option<String>,
}

#[derive(Default)]
pub struct InMemoryAccountLedger {
    accounts: DashMap<AccountId, Account>,
    outbox: DashMap<Uuid, OutboxSlot>,
    /// transaction id -> intent id, one intent per transaction
    committed: DashMap<TransactionId, Uuid>,
}

impl InMemoryAccountLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger pre-populated with `accounts`; later duplicates are ignored
    pub fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        let ledger = Self::new();
        for account in accounts {
            ledger.accounts.entry(account.id.clone()).or_insert(account);
        }
        ledger
    }

    /// Sum of every balance, `None` on overflow
    pub fn total_balance(&self) -> Option<Amount> {
        self.accounts
            .iter()
            .try_fold(Amount::ZERO, |acc, a| acc.checked_add(a.balance))
    }

    /// Unresolved intents, oldest first, without claiming them
    pub fn pending_intents(&self) -> Vec<OutboxIntent> {
        let mut pending: Vec<OutboxIntent> = self
            .outbox
            .iter()
            .filter(|slot| !slot.resolved)
            .map(|slot| slot.intent.clone())
            .collect();
        pending.sort_by_key(|i| i.created_at);
        pending
    }

    /// Last projection error recorded for an intent
    pub fn last_outbox_error(&self, intent_id: Uuid) -> Option<String> {
        self.outbox
            .get(&intent_id)
            .and_then(|slot| slot.last_error.clone())
    }

    fn apply_delta(&self, id: &AccountId, delta: Amount) -> Result<(), LedgerError> {
        let mut account = self
            .accounts
            .get_mut(id)
            .ok_or_else(|| LedgerError::NotFound(id.clone()))?;
        account.balance = account
            .balance
            .checked_add(delta)
            .ok_or_else(|| LedgerError::Persistence(format!("balance overflow on {id}")))?;
        Ok(())
    }

    fn apply_conditional_debit(&self, id: &AccountId, amount: Amount) -> Result<(), LedgerError> {
        let mut account = self
            .accounts
            .get_mut(id)
            .ok_or_else(|| LedgerError::NotFound(id.clone()))?;
        if !account.can_cover(amount) {
            return Err(LedgerError::InsufficientFunds {
                account: id.clone(),
                available: account.balance,
                requested: amount,
            });
        }
        account.balance = account
            .balance
            .checked_sub(amount)
            .ok_or_else(|| LedgerError::Persistence(format!("balance underflow on {id}")))?;
        Ok(())
    }
}

#[async_trait]
impl AccountLedger for InMemoryAccountLedger {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, id: &AccountId) -> Result<Account, LedgerError> {
        self.accounts
            .get(id)
            .map(|a| a.clone())
            .ok_or_else(|| LedgerError::NotFound(id.clone()))
    }

    async fn adjust_balance(&self, id: &AccountId, delta: Amount) -> Result<(), LedgerError> {
        self.apply_delta(id, delta)
    }

    async fn debit_if_sufficient(
        &self,
        id: &AccountId,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        self.apply_conditional_debit(id, amount)
    }

    async fn open(&self, account: &Account) -> Result<(), LedgerError> {
        match self.accounts.entry(account.id.clone()) {
            Entry::Occupied(_) => Err(LedgerError::AlreadyExists(account.id.clone())),
            Entry::Vacant(slot) => {
                slot.insert(account.clone());
                Ok(())
            }
        }
    }

    async fn health_check(&self) -> Result<(), LedgerError> {
        Ok(())
    }
}

#[async_trait]
impl TransferOutbox for InMemoryAccountLedger {
    async fn commit_transfer(&self, intent: &OutboxIntent) -> Result<(), LedgerError> {
        // The vacant entry stays locked until the unit is applied, so a
        // concurrent commit for the same transaction id waits and then fails.
        let slot = match self.committed.entry(intent.transaction_id.clone()) {
            Entry::Occupied(_) => {
                return Err(LedgerError::AlreadyCommitted(intent.transaction_id.clone()));
            }
            Entry::Vacant(slot) => slot,
        };

        if !self.accounts.contains_key(&intent.to_account_id) {
            return Err(LedgerError::NotFound(intent.to_account_id.clone()));
        }

        self.apply_conditional_debit(&intent.from_account_id, intent.amount)?;

        if let Err(e) = self.apply_delta(&intent.to_account_id, intent.amount) {
            // Undo the debit so the unit stays all-or-nothing
            self.apply_delta(&intent.from_account_id, intent.amount)?;
            return Err(e);
        }

        self.outbox.insert(
            intent.intent_id,
            OutboxSlot {
                intent: intent.clone(),
                resolved: false,
                last_error: None,
            },
        );
        slot.insert(intent.intent_id);
        Ok(())
    }

    async fn has_intent(&self, transaction_id: &TransactionId) -> Result<bool, LedgerError> {
        Ok(self.committed.contains_key(transaction_id))
    }

    async fn claim_pending(
        &self,
        limit: usize,
        lease: Duration,
    ) -> Result<Vec<OutboxIntent>, LedgerError> {
        let now = Utc::now();
        let mut candidates: Vec<_> = self
            .outbox
            .iter()
            .filter(|slot| !slot.resolved && slot.intent.is_claimable(now))
            .map(|slot| (slot.intent.created_at, slot.intent.intent_id))
            .collect();
        candidates.sort();

        let until = lease_deadline(now, lease);
        let mut claimed = Vec::new();
        for (_, intent_id) in candidates {
            if claimed.len() >= limit {
                break;
            }
            // Re-check under the entry lock; another claimer may have won
            if let Some(mut slot) = self.outbox.get_mut(&intent_id)
                && !slot.resolved
                && slot.intent.is_claimable(now)
            {
                slot.intent.claimed_until = Some(until);
                claimed.push(slot.intent.clone());
            }
        }
        Ok(claimed)
    }

    async fn resolve(&self, intent_id: Uuid) -> Result<(), LedgerError> {
        if let Some(mut slot) = self.outbox.get_mut(&intent_id) {
            slot.resolved = true;
        }
        Ok(())
    }

    async fn record_failure(&self, intent_id: Uuid, error: &str) -> Result<(), LedgerError> {
        if let Some(mut slot) = self.outbox.get_mut(&intent_id) {
            slot.intent.attempts += 1;
            slot.intent.claimed_until = None;
            slot.last_error = Some(error.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    fn seeded() -> InMemoryAccountLedger {
        InMemoryAccountLedger::with_accounts([
            Account::new("alice", "Alice", Amount::from_minor(10_000), "USD"),
            Account::new("bob", "Bob", Amount::from_minor(5_000), "USD"),
        ])
    }

    fn intent(from: &str, to: &str, amount: i64) -> OutboxIntent {
        OutboxIntent {
            intent_id: Uuid::new_v4(),
            transaction_id: TransactionId::generate(),
            from_account_id: from.into(),
            to_account_id: to.into(),
            amount: Amount::from_minor(amount),
            currency: "USD".to_string(),
            created_at: Utc::now(),
            attempts: 0,
            claimed_until: None,
        }
    }

    const LEASE: Duration = Duration::from_secs(30);

    #[tokio::test]
    async fn test_get_and_adjust() {
        let ledger = seeded();
        let alice = AccountId::from("alice");

        ledger
            .adjust_balance(&alice, Amount::from_minor(-2_000))
            .await
            .unwrap();
        assert_eq!(ledger.get(&alice).await.unwrap().balance, Amount::from_minor(8_000));

        let ghost = AccountId::from("ghost");
        assert_eq!(ledger.get(&ghost).await, Err(LedgerError::NotFound(ghost.clone())));
        assert_eq!(
            ledger.adjust_balance(&ghost, Amount::from_minor(1)).await,
            Err(LedgerError::NotFound(ghost))
        );
    }

    #[tokio::test]
    async fn test_adjust_allows_negative_balance() {
        let ledger = seeded();
        let bob = AccountId::from("bob");
        ledger
            .adjust_balance(&bob, Amount::from_minor(-6_000))
            .await
            .unwrap();
        assert_eq!(ledger.get(&bob).await.unwrap().balance, Amount::from_minor(-1_000));
    }

    #[tokio::test]
    async fn test_conditional_debit() {
        let ledger = seeded();
        let bob = AccountId::from("bob");

        let err = ledger
            .debit_if_sufficient(&bob, Amount::from_minor(5_001))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientFunds {
                account: bob.clone(),
                available: Amount::from_minor(5_000),
                requested: Amount::from_minor(5_001),
            }
        );

        ledger
            .debit_if_sufficient(&bob, Amount::from_minor(5_000))
            .await
            .unwrap();
        assert_eq!(ledger.get(&bob).await.unwrap().balance, Amount::ZERO);
    }

    #[tokio::test]
    async fn test_open_rejects_duplicates() {
        let ledger = seeded();
        let dup = Account::new("alice", "Alice again", Amount::ZERO, "USD");
        assert_eq!(
            ledger.open(&dup).await,
            Err(LedgerError::AlreadyExists(AccountId::from("alice")))
        );
        assert_eq!(
            ledger.get(&AccountId::from("alice")).await.unwrap().owner_name,
            "Alice"
        );
    }

    #[tokio::test]
    async fn test_concurrent_debits_never_overdraw() {
        let ledger = std::sync::Arc::new(seeded());
        let bob = AccountId::from("bob");

        let mut handles = Vec::new();
        for _ in 0..20 {
            let ledger = ledger.clone();
            let bob = bob.clone();
            handles.push(tokio::spawn(async move {
                ledger.debit_if_sufficient(&bob, Amount::from_minor(1_000)).await
            }));
        }

        let mut ok = 0;
        for h in handles {
            if h.await.unwrap().is_ok() {
                ok += 1;
            }
        }
        assert_eq!(ok, 5);
        assert_eq!(ledger.get(&bob).await.unwrap().balance, Amount::ZERO);
    }

    #[tokio::test]
    async fn test_commit_transfer_and_resolve() {
        let ledger = seeded();
        let i = intent("alice", "bob", 2_000);

        ledger.commit_transfer(&i).await.unwrap();
        assert!(ledger.has_intent(&i.transaction_id).await.unwrap());
        assert_eq!(
            ledger.get(&"alice".into()).await.unwrap().balance,
            Amount::from_minor(8_000)
        );
        assert_eq!(
            ledger.get(&"bob".into()).await.unwrap().balance,
            Amount::from_minor(7_000)
        );

        let claimed = ledger.claim_pending(10, LEASE).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].intent_id, i.intent_id);
        assert!(claimed[0].claimed_until.is_some());
        // Held by the first claim
        assert!(ledger.claim_pending(10, LEASE).await.unwrap().is_empty());

        // A recorded failure releases the claim
        ledger.record_failure(i.intent_id, "audit down").await.unwrap();
        let pending = ledger.claim_pending(10, LEASE).await.unwrap();
        assert_eq!(pending[0].attempts, 1);
        assert_eq!(ledger.last_outbox_error(i.intent_id).as_deref(), Some("audit down"));

        ledger.resolve(i.intent_id).await.unwrap();
        ledger.record_failure(i.intent_id, "late").await.unwrap();
        assert!(ledger.claim_pending(10, LEASE).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_claim_respects_committed_lease() {
        let ledger = seeded();
        let mut held = intent("alice", "bob", 100);
        held.claimed_until = Some(Utc::now() + chrono::Duration::seconds(30));
        let mut expired = intent("alice", "bob", 200);
        expired.claimed_until = Some(Utc::now() - chrono::Duration::seconds(1));
        ledger.commit_transfer(&held).await.unwrap();
        ledger.commit_transfer(&expired).await.unwrap();

        let claimed = ledger.claim_pending(10, LEASE).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].intent_id, expired.intent_id);
    }

    #[tokio::test]
    async fn test_concurrent_claims_never_share_an_intent() {
        let ledger = std::sync::Arc::new(seeded());
        for _ in 0..10 {
            ledger.commit_transfer(&intent("alice", "bob", 10)).await.unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..4 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.claim_pending(10, LEASE).await.unwrap()
            }));
        }

        let mut seen = std::collections::HashSet::new();
        for h in handles {
            for i in h.await.unwrap() {
                assert!(seen.insert(i.intent_id), "intent claimed twice");
            }
        }
        assert_eq!(seen.len(), 10);
    }

    #[tokio::test]
    async fn test_second_commit_for_same_transaction_is_refused() {
        let ledger = seeded();
        let first = intent("alice", "bob", 1_000);
        let mut second = intent("alice", "bob", 1_000);
        second.transaction_id = first.transaction_id.clone();

        ledger.commit_transfer(&first).await.unwrap();
        assert_eq!(
            ledger.commit_transfer(&second).await,
            Err(LedgerError::AlreadyCommitted(first.transaction_id.clone()))
        );
        assert_eq!(
            ledger.get(&"alice".into()).await.unwrap().balance,
            Amount::from_minor(9_000)
        );
        assert_eq!(ledger.claim_pending(10, LEASE).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_commits_for_same_transaction_apply_once() {
        let ledger = std::sync::Arc::new(seeded());
        let tx = TransactionId::generate();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = ledger.clone();
            let mut i = intent("alice", "bob", 1_000);
            i.transaction_id = tx.clone();
            handles.push(tokio::spawn(async move { ledger.commit_transfer(&i).await }));
        }

        let mut ok = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(()) => ok += 1,
                Err(e) => assert_eq!(e, LedgerError::AlreadyCommitted(tx.clone())),
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(
            ledger.get(&"alice".into()).await.unwrap().balance,
            Amount::from_minor(9_000)
        );
    }

    #[tokio::test]
    async fn test_commit_transfer_missing_destination_applies_nothing() {
        let ledger = seeded();
        let before = ledger.total_balance();

        let err = ledger
            .commit_transfer(&intent("alice", "ghost", 2_000))
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::NotFound(AccountId::from("ghost")));
        assert_eq!(ledger.total_balance(), before);
        assert_eq!(
            ledger.get(&"alice".into()).await.unwrap().balance,
            Amount::from_minor(10_000)
        );
        assert!(ledger.claim_pending(10, LEASE).await.unwrap().is_empty());
        assert!(!ledger.has_intent(&TransactionId::from("unused")).await.unwrap());
    }

    #[tokio::test]
    async fn test_commit_transfer_insufficient_funds_applies_nothing() {
        let ledger = seeded();
        let err = ledger
            .commit_transfer(&intent("bob", "alice", 9_000))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert_eq!(ledger.total_balance(), Some(Amount::from_minor(15_000)));
    }
}
