//! Queue-driven ingestion over the public API, in-memory backends.

use std::sync::Arc;
use std::time::Duration;

use transfer_ledger::account::{Account, AccountLedger, InMemoryAccountLedger};
use transfer_ledger::audit::InMemoryAuditLog;
use transfer_ledger::channel::{
    AckMode, ChannelError, IngestionChannel, MemoryQueue, SubscriptionConfig,
};
use transfer_ledger::context::{CallContext, CancellationToken};
use transfer_ledger::core_types::{AccountId, Amount};
use transfer_ledger::transfer::{TransferEngine, TransferRequest};

fn setup() -> (
    Arc<InMemoryAccountLedger>,
    Arc<InMemoryAuditLog>,
    Arc<TransferEngine>,
) {
    let ledger = Arc::new(InMemoryAccountLedger::with_accounts([
        Account::new("alice", "Alice", Amount::from_minor(10_000), "USD"),
        Account::new("bob", "Bob", Amount::from_minor(5_000), "USD"),
    ]));
    let audit = Arc::new(InMemoryAuditLog::new());
    let engine = Arc::new(TransferEngine::new(ledger.clone(), audit.clone()));
    (ledger, audit, engine)
}

fn config(ack_mode: AckMode) -> SubscriptionConfig {
    SubscriptionConfig {
        ack_mode,
        poll_interval: Duration::from_millis(5),
    }
}

async fn wait_until<F: Fn() -> bool>(cond: F) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

async fn balance(ledger: &InMemoryAccountLedger, id: &str) -> i64 {
    ledger.get(&AccountId::from(id)).await.unwrap().balance.minor()
}

#[tokio::test]
async fn test_scenario_e_malformed_message_is_skipped() {
    for ack_mode in [AckMode::OnReceipt, AckMode::AfterProcessing { max_attempts: 3 }] {
        let (ledger, audit, engine) = setup();
        let queue = Arc::new(MemoryQueue::new());
        let channel = IngestionChannel::new(queue.clone());
        let publisher = channel.publisher();
        let ctx = CallContext::background();

        publisher
            .publish_raw(&ctx, b"{not json".to_vec())
            .await
            .unwrap();
        publisher
            .publish_raw(&ctx, br#"{"fromAccountId":"alice"}"#.to_vec())
            .await
            .unwrap();
        publisher
            .publish(
                &ctx,
                TransferRequest::new("alice", "bob", Amount::from_minor(2_000), "USD"),
            )
            .await
            .unwrap();

        let sub = channel.subscribe(engine, config(ack_mode));
        wait_until(|| sub.stats().processed == 1).await;
        sub.shutdown();
        let stats = sub.join().await;

        assert_eq!(stats.malformed, 2, "{ack_mode:?}");
        assert_eq!(stats.failed, 0);
        assert_eq!(balance(&ledger, "alice").await, 8_000);
        assert_eq!(balance(&ledger, "bob").await, 7_000);
        assert_eq!(audit.len().await, 1);
        assert!(queue.dead_letters().is_empty());
        assert_eq!(queue.ready_len(), 0);
    }
}

#[tokio::test]
async fn test_legacy_wire_format_is_accepted() {
    let (ledger, _audit, engine) = setup();
    let queue = Arc::new(MemoryQueue::new());
    let channel = IngestionChannel::new(queue.clone());

    let legacy = br#"{"id":"","from_account_id":"alice","to_account_id":"bob","amount":150,"currency":"USD"}"#;
    channel
        .publisher()
        .publish_raw(&CallContext::background(), legacy.to_vec())
        .await
        .unwrap();

    let sub = channel.subscribe(engine, config(AckMode::OnReceipt));
    wait_until(|| sub.stats().processed == 1).await;
    sub.shutdown();
    sub.join().await;

    assert_eq!(balance(&ledger, "alice").await, 9_850);
    assert_eq!(balance(&ledger, "bob").await, 5_150);
}

#[tokio::test]
async fn test_multiple_subscriptions_share_the_queue() {
    let (ledger, audit, engine) = setup();
    let queue = Arc::new(MemoryQueue::new());
    let channel = IngestionChannel::new(queue.clone());
    let publisher = channel.publisher();

    for _ in 0..20 {
        publisher
            .publish(
                &CallContext::background(),
                TransferRequest::new("alice", "bob", Amount::from_minor(100), "USD"),
            )
            .await
            .unwrap();
    }

    let subs: Vec<_> = (0..3)
        .map(|_| channel.subscribe(engine.clone(), config(AckMode::OnReceipt)))
        .collect();
    wait_until(|| subs.iter().map(|s| s.stats().processed).sum::<u64>() == 20).await;

    channel.close();
    let mut processed = 0;
    for sub in subs {
        processed += sub.join().await.processed;
    }

    assert_eq!(processed, 20);
    assert_eq!(balance(&ledger, "alice").await, 8_000);
    assert_eq!(balance(&ledger, "bob").await, 7_000);
    assert_eq!(audit.len().await, 20);
}

#[tokio::test]
async fn test_publish_fails_fast_when_closed_or_cancelled() {
    let channel = IngestionChannel::new(Arc::new(MemoryQueue::new()));
    let publisher = channel.publisher();
    let request = TransferRequest::new("alice", "bob", Amount::from_minor(1), "USD");

    let token = CancellationToken::new();
    token.cancel();
    let err = publisher
        .publish(&CallContext::with_token(token), request.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, ChannelError::Cancelled(_)));

    channel.close();
    let err = publisher
        .publish(&CallContext::background(), request)
        .await
        .unwrap_err();
    assert_eq!(err, ChannelError::Closed);
}
