//! Ingestion Channel
//!
//! Durable queue of JSON transfer requests. Producers publish through
//! [`Publisher`]; each [`Subscription`] runs one worker that feeds the
//! transfer engine.
//!
//! By default a message is acknowledged as soon as it is dequeued, so a
//! failed transfer is only visible in the logs. [`AckMode::AfterProcessing`]
//! acks after the transfer settles and dead-letters messages that keep
//! failing.

pub mod consumer;
pub mod error;
pub mod memory;
pub mod message;
pub mod pg;
pub mod publisher;
pub mod queue;

pub use consumer::{
    ConsumerStats, ConsumerStatsSnapshot, IngestionChannel, Subscription, SubscriptionConfig,
};
pub use error::ChannelError;
pub use memory::MemoryQueue;
pub use message::TransferMessage;
pub use pg::PgQueue;
pub use publisher::Publisher;
pub use queue::{AckMode, Delivery, QueueBackend};
