//! Queue backend contract

use async_trait::async_trait;

use super::error::ChannelError;

/// When a consumer acknowledges a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckMode {
    /// Removed from the queue at dequeue, before processing (at-most-once).
    /// Failed transfers are logged and dropped.
    #[default]
    OnReceipt,

    /// Acked only after processing settles; failures are requeued and
    /// dead-lettered once `max_attempts` deliveries have failed.
    AfterProcessing { max_attempts: u32 },
}

impl AckMode {
    pub fn acks_on_receipt(&self) -> bool {
        matches!(self, AckMode::OnReceipt)
    }
}

/// A dequeued message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Backend handle for `ack` / `nack`
    pub tag: i64,
    pub body: Vec<u8>,
    /// Deliveries so far, this one included
    pub attempts: u32,
}

/// Durable FIFO of raw message bodies
#[async_trait]
pub trait QueueBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn enqueue(&self, body: Vec<u8>) -> Result<(), ChannelError>;

    /// Next ready message, `None` if the queue is empty.
    ///
    /// With [`AckMode::OnReceipt`] the message is gone from the queue when
    /// this returns; otherwise it stays invisible until acked or nacked.
    async fn receive(&self, mode: AckMode) -> Result<Option<Delivery>, ChannelError>;

    /// Remove a message received with [`AckMode::AfterProcessing`]
    async fn ack(&self, tag: i64) -> Result<(), ChannelError>;

    /// Make the message visible again, or move it to the dead letters
    async fn nack(&self, tag: i64, requeue: bool) -> Result<(), ChannelError>;

    /// Refuse further publishes and receives. Stored messages are kept.
    fn close(&self);

    fn is_closed(&self) -> bool;
}
