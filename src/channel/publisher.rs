use std::sync::Arc;

use tracing::{debug, warn};

use super::error::ChannelError;
use super::message::TransferMessage;
use super::queue::QueueBackend;
use crate::context::CallContext;
use crate::core_types::TransactionId;
use crate::transfer::TransferRequest;

/// Producer side of the ingestion channel
#[derive(Clone)]
pub struct Publisher {
    backend: Arc<dyn QueueBackend>,
}

impl Publisher {
    pub fn new(backend: Arc<dyn QueueBackend>) -> Self {
        Self { backend }
    }

    /// Serialize `request` and enqueue it durably.
    ///
    /// A transaction id is assigned when the request has none, so a
    /// redelivered message is recognised by the engine. Fails fast, before
    /// touching the queue, if the channel is closed or `ctx` is done.
    pub async fn publish(
        &self,
        ctx: &CallContext,
        mut request: TransferRequest,
    ) -> Result<TransactionId, ChannelError> {
        if self.backend.is_closed() {
            return Err(ChannelError::Closed);
        }
        ctx.check()?;

        let transaction_id = request.id.get_or_insert_with(TransactionId::generate).clone();
        let body = TransferMessage::from(&request).encode()?;

        ctx.run(self.backend.enqueue(body)).await?.map_err(|e| {
            warn!(transaction_id = %transaction_id, error = %e, "Failed to publish transfer");
            e
        })?;

        debug!(
            transaction_id = %transaction_id,
            from = %request.from_account_id,
            to = %request.to_account_id,
            amount = request.amount.minor(),
            "Transfer published"
        );
        Ok(transaction_id)
    }

    /// Enqueue a raw body as-is
    pub async fn publish_raw(&self, ctx: &CallContext, body: Vec<u8>) -> Result<(), ChannelError> {
        if self.backend.is_closed() {
            return Err(ChannelError::Closed);
        }
        ctx.check()?;
        ctx.run(self.backend.enqueue(body)).await?
    }
}
