//! Consumer subscriptions
//!
//! Each subscription is one worker task that pulls messages one at a time,
//! in receipt order, and hands them to the transfer engine.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::error::ChannelError;
use super::message::TransferMessage;
use super::publisher::Publisher;
use super::queue::{AckMode, Delivery, QueueBackend};
use crate::context::CallContext;
use crate::transfer::{ErrorKind, TransferEngine, TransferError};

/// Per-subscription settings
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionConfig {
    pub ack_mode: AckMode,
    /// Idle wait between polls of an empty queue
    pub poll_interval: Duration,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            ack_mode: AckMode::OnReceipt,
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Counters for one subscription
#[derive(Debug, Default)]
pub struct ConsumerStats {
    processed: AtomicU64,
    failed: AtomicU64,
    malformed: AtomicU64,
    requeued: AtomicU64,
    dead_lettered: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConsumerStatsSnapshot {
    pub processed: u64,
    pub failed: u64,
    pub malformed: u64,
    pub requeued: u64,
    pub dead_lettered: u64,
}

impl ConsumerStats {
    pub fn snapshot(&self) -> ConsumerStatsSnapshot {
        ConsumerStatsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            requeued: self.requeued.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
        }
    }
}

/// Durable queue of transfer requests plus its consumers
#[derive(Clone)]
pub struct IngestionChannel {
    backend: Arc<dyn QueueBackend>,
}

impl IngestionChannel {
    pub fn new(backend: Arc<dyn QueueBackend>) -> Self {
        Self { backend }
    }

    pub fn publisher(&self) -> Publisher {
        Publisher::new(self.backend.clone())
    }

    pub fn backend(&self) -> &Arc<dyn QueueBackend> {
        &self.backend
    }

    pub fn close(&self) {
        self.backend.close();
    }

    pub fn is_closed(&self) -> bool {
        self.backend.is_closed()
    }

    /// Spawn one consumer worker
    pub fn subscribe(&self, engine: Arc<TransferEngine>, config: SubscriptionConfig) -> Subscription {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = Arc::new(ConsumerStats::default());
        let worker = Worker {
            backend: self.backend.clone(),
            engine,
            config,
            stats: stats.clone(),
        };
        let handle = tokio::spawn(worker.run(shutdown_rx));

        Subscription {
            shutdown: shutdown_tx,
            handle,
            stats,
        }
    }
}

/// Handle on a running consumer worker
pub struct Subscription {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
    stats: Arc<ConsumerStats>,
}

impl Subscription {
    /// Ask the worker to stop after the message it is processing, if any
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Wait for the worker to exit
    pub async fn join(self) -> ConsumerStatsSnapshot {
        if let Err(e) = self.handle.await {
            error!(error = %e, "Consumer worker panicked");
        }
        self.stats.snapshot()
    }

    pub fn stats(&self) -> ConsumerStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

struct Worker {
    backend: Arc<dyn QueueBackend>,
    engine: Arc<TransferEngine>,
    config: SubscriptionConfig,
    stats: Arc<ConsumerStats>,
}

impl Worker {
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            backend = self.backend.name(),
            ack_mode = ?self.config.ack_mode,
            "Consumer started, waiting for messages"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.backend.receive(self.config.ack_mode).await {
                Ok(Some(delivery)) => {
                    // Not raced against shutdown: a dequeued message is always finished
                    if self.handle(delivery).await != Settle::Requeue {
                        continue;
                    }
                    // Requeued: back off for one poll interval before retrying
                }
                Ok(None) => {}
                Err(ChannelError::Closed) => {
                    info!("Channel closed, consumer exiting");
                    break;
                }
                Err(e) => error!(error = %e, "Failed to receive from queue"),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Consumer stopped");
    }

    async fn handle(&self, delivery: Delivery) -> Settle {
        let message = match TransferMessage::decode(&delivery.body) {
            Ok(message) => message,
            Err(e) => {
                warn!(tag = delivery.tag, error = %e, "Invalid transfer message, dropped");
                self.stats.malformed.fetch_add(1, Ordering::Relaxed);
                self.settle(&delivery, Settle::Ack).await;
                return Settle::Ack;
            }
        };

        let request = message.into_request();
        debug!(
            tag = delivery.tag,
            attempt = delivery.attempts,
            transaction_id = ?request.id,
            "Processing queued transfer"
        );

        match self
            .engine
            .process_transfer(&CallContext::background(), request)
            .await
        {
            Ok(receipt) => {
                info!(
                    transaction_id = %receipt.transaction_id,
                    audit = ?receipt.audit,
                    "Queued transfer processed"
                );
                self.stats.processed.fetch_add(1, Ordering::Relaxed);
                self.settle(&delivery, Settle::Ack).await;
                Settle::Ack
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                let decision = self.on_failure(&delivery, &e);
                match decision {
                    Settle::Ack => {
                        error!(tag = delivery.tag, error = %e, "Failed to process transfer, message dropped");
                    }
                    Settle::Requeue => {
                        warn!(tag = delivery.tag, attempt = delivery.attempts, error = %e, "Failed to process transfer, requeued");
                        self.stats.requeued.fetch_add(1, Ordering::Relaxed);
                    }
                    Settle::DeadLetter => {
                        error!(tag = delivery.tag, attempt = delivery.attempts, error = %e, "Failed to process transfer, dead-lettered");
                        self.stats.dead_lettered.fetch_add(1, Ordering::Relaxed);
                    }
                }
                self.settle(&delivery, decision).await;
                decision
            }
        }
    }

    /// What to do with a message whose transfer failed
    fn on_failure(&self, delivery: &Delivery, err: &TransferError) -> Settle {
        let AckMode::AfterProcessing { max_attempts } = self.config.ack_mode else {
            return Settle::Ack;
        };

        // Rejections will fail the same way again; a partial settlement would
        // be applied twice.
        let permanent = matches!(
            err.kind(),
            ErrorKind::Validation | ErrorKind::NotFound | ErrorKind::InsufficientFunds
        );
        if permanent || err.may_have_mutated() || delivery.attempts >= max_attempts {
            Settle::DeadLetter
        } else {
            Settle::Requeue
        }
    }

    async fn settle(&self, delivery: &Delivery, how: Settle) {
        if self.config.ack_mode.acks_on_receipt() {
            return;
        }
        let result = match how {
            Settle::Ack => self.backend.ack(delivery.tag).await,
            Settle::Requeue => self.backend.nack(delivery.tag, true).await,
            Settle::DeadLetter => self.backend.nack(delivery.tag, false).await,
        };
        if let Err(e) = result {
            error!(tag = delivery.tag, error = %e, "Failed to settle message");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settle {
    Ack,
    Requeue,
    DeadLetter,
}
