//! End-to-end transfer scenarios over the public API, in-memory backends.

use std::sync::Arc;

use transfer_ledger::account::{Account, AccountLedger, InMemoryAccountLedger};
use transfer_ledger::audit::{AuditLog, EntryStatus, InMemoryAuditLog};
use transfer_ledger::context::{CallContext, CancellationToken};
use transfer_ledger::core_types::{AccountId, Amount};
use transfer_ledger::transfer::{
    AuditState, ErrorKind, SettlementMode, TransferEngine, TransferError, TransferRequest,
    TransferStatus,
};

struct Bank {
    ledger: Arc<InMemoryAccountLedger>,
    audit: Arc<InMemoryAuditLog>,
    engine: TransferEngine,
}

impl Bank {
    fn open(mode: SettlementMode, accounts: &[(&str, i64)]) -> Self {
        let ledger = Arc::new(InMemoryAccountLedger::with_accounts(
            accounts
                .iter()
                .map(|(id, balance)| Account::new(*id, *id, Amount::from_minor(*balance), "USD")),
        ));
        let audit = Arc::new(InMemoryAuditLog::new());
        let engine = match mode {
            SettlementMode::Sequential => TransferEngine::new(ledger.clone(), audit.clone()),
            SettlementMode::Outbox => {
                TransferEngine::with_outbox(ledger.clone(), audit.clone(), ledger.clone())
            }
        };
        Self {
            ledger,
            audit,
            engine,
        }
    }

    async fn balance(&self, id: &str) -> i64 {
        self.ledger.get(&AccountId::from(id)).await.unwrap().balance.minor()
    }

    async fn transfer(&self, from: &str, to: &str, amount: i64) -> Result<(), TransferError> {
        self.engine
            .process_transfer(
                &CallContext::background(),
                TransferRequest::new(from, to, Amount::from_minor(amount), "USD"),
            )
            .await
            .map(|_| ())
    }
}

const MODES: [SettlementMode; 2] = [SettlementMode::Sequential, SettlementMode::Outbox];

#[tokio::test]
async fn test_scenario_a_successful_transfer() {
    for mode in MODES {
        let bank = Bank::open(mode, &[("alice", 10_000), ("bob", 5_000)]);

        let receipt = bank
            .engine
            .process_transfer(
                &CallContext::background(),
                TransferRequest::new("alice", "bob", Amount::from_minor(2_000), "USD"),
            )
            .await
            .unwrap();

        assert_eq!(receipt.status, TransferStatus::Success);
        assert_eq!(receipt.audit, AuditState::Recorded);
        assert_eq!(bank.balance("alice").await, 8_000);
        assert_eq!(bank.balance("bob").await, 7_000);

        let entries = bank.audit.snapshot().await;
        assert_eq!(entries.len(), 1, "{mode:?}");
        assert_eq!(entries[0].amount, Amount::from_minor(2_000));
        assert_eq!(entries[0].status, EntryStatus::Success);
        assert_eq!(entries[0].transaction_id, receipt.transaction_id);
        assert_eq!(entries[0].from_account_id, AccountId::from("alice"));
        assert_eq!(entries[0].to_account_id, AccountId::from("bob"));
    }
}

#[tokio::test]
async fn test_scenario_b_insufficient_funds() {
    for mode in MODES {
        let bank = Bank::open(mode, &[("alice", 100), ("bob", 0)]);

        let err = bank.transfer("alice", "bob", 200).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientFunds, "{mode:?}");
        assert_eq!(err.http_status(), 422);
        assert_eq!(bank.balance("alice").await, 100);
        assert_eq!(bank.balance("bob").await, 0);
        assert!(bank.audit.is_empty().await);
    }
}

#[tokio::test]
async fn test_scenario_c_unknown_source() {
    for mode in MODES {
        let bank = Bank::open(mode, &[("alice", 10_000)]);

        let err = bank.transfer("ghost", "alice", 10).await.unwrap_err();
        assert_eq!(err, TransferError::AccountNotFound(AccountId::from("ghost")));
        assert_eq!(err.http_status(), 404);
        assert_eq!(bank.balance("alice").await, 10_000);
        assert!(bank.audit.is_empty().await);
    }
}

#[tokio::test]
async fn test_scenario_d_empty_history_is_not_found() {
    let bank = Bank::open(SettlementMode::Sequential, &[("alice", 10_000)]);

    let err = bank
        .engine
        .get_history(&CallContext::background(), &AccountId::from("alice"))
        .await
        .unwrap_err();
    assert_eq!(err, TransferError::NoHistory(AccountId::from("alice")));
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_rejections_mutate_nothing() {
    let bank = Bank::open(SettlementMode::Sequential, &[("alice", 1_000), ("bob", 1_000)]);
    let before = bank.ledger.total_balance();

    let rejected = [
        TransferRequest::new("alice", "bob", Amount::ZERO, "USD"),
        TransferRequest::new("alice", "bob", Amount::from_minor(-5), "USD"),
        TransferRequest::new("alice", "alice", Amount::from_minor(5), "USD"),
        TransferRequest::new("", "bob", Amount::from_minor(5), "USD"),
        TransferRequest::new("alice", "bob", Amount::from_minor(5), ""),
        TransferRequest::new("alice", "bob", Amount::from_minor(5_000), "USD"),
    ];

    for request in rejected {
        let result = bank
            .engine
            .process_transfer(&CallContext::background(), request.clone())
            .await;
        assert!(result.is_err(), "{request:?} should be rejected");
    }

    assert_eq!(bank.ledger.total_balance(), before);
    assert_eq!(bank.balance("alice").await, 1_000);
    assert!(bank.audit.is_empty().await);
}

#[tokio::test]
async fn test_money_is_conserved_across_many_transfers() {
    for mode in MODES {
        let bank = Bank::open(mode, &[("a", 5_000), ("b", 5_000), ("c", 5_000)]);
        let before = bank.ledger.total_balance();

        let plan = [
            ("a", "b", 1_200),
            ("b", "c", 3_000),
            ("c", "a", 700),
            ("a", "c", 9_999), // rejected
            ("b", "a", 50),
        ];
        let mut settled = 0;
        for (from, to, amount) in plan {
            if bank.transfer(from, to, amount).await.is_ok() {
                settled += 1;
            }
        }

        assert_eq!(settled, 4);
        assert_eq!(bank.ledger.total_balance(), before);
        assert_eq!(bank.audit.len().await, settled);
    }
}

#[tokio::test]
async fn test_history_is_newest_first_and_covers_both_sides() {
    let bank = Bank::open(
        SettlementMode::Sequential,
        &[("alice", 10_000), ("bob", 10_000), ("carol", 10_000)],
    );

    bank.transfer("alice", "bob", 100).await.unwrap();
    bank.transfer("carol", "alice", 200).await.unwrap();
    bank.transfer("bob", "carol", 300).await.unwrap();
    bank.transfer("alice", "carol", 400).await.unwrap();

    let history = bank
        .engine
        .get_history(&CallContext::background(), &AccountId::from("alice"))
        .await
        .unwrap();

    let amounts: Vec<i64> = history.iter().map(|t| t.amount.minor()).collect();
    assert_eq!(amounts, vec![400, 200, 100]);
    assert!(history.iter().all(|t| t.status == TransferStatus::Success));
    assert!(history.iter().all(|t| t.id.is_some() && t.created_at.is_some()));

    let times: Vec<_> = history.iter().filter_map(|t| t.created_at).collect();
    assert!(times.windows(2).all(|w| w[0] > w[1]));
}

#[tokio::test]
async fn test_pre_assigned_id_settles_once() {
    for mode in MODES {
        let bank = Bank::open(mode, &[("alice", 10_000), ("bob", 0)]);
        let request =
            TransferRequest::new("alice", "bob", Amount::from_minor(1_000), "USD").with_id("tx-42");

        let first = bank
            .engine
            .process_transfer(&CallContext::background(), request.clone())
            .await
            .unwrap();
        let second = bank
            .engine
            .process_transfer(&CallContext::background(), request)
            .await
            .unwrap();

        assert_eq!(first.audit, AuditState::Recorded);
        assert_eq!(second.audit, AuditState::AlreadyRecorded);
        assert_eq!(first.transaction_id, second.transaction_id);
        assert_eq!(bank.balance("alice").await, 9_000);
        assert_eq!(bank.balance("bob").await, 1_000);
        assert_eq!(bank.audit.len().await, 1);
    }
}

#[tokio::test]
async fn test_cancelled_context_touches_nothing() {
    let bank = Bank::open(SettlementMode::Sequential, &[("alice", 10_000), ("bob", 0)]);
    let token = CancellationToken::new();
    token.cancel();

    let err = bank
        .engine
        .process_transfer(
            &CallContext::with_token(token),
            TransferRequest::new("alice", "bob", Amount::from_minor(10), "USD"),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert!(!err.may_have_mutated());
    assert_eq!(bank.balance("alice").await, 10_000);
    assert!(bank.audit.query(&AccountId::from("alice")).await.unwrap().is_empty());
}
