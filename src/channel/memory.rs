//! In-process queue backend

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use super::error::ChannelError;
use super::queue::{AckMode, Delivery, QueueBackend};

#[derive(Debug, Clone)]
struct Stored {
    tag: i64,
    body: Vec<u8>,
    attempts: u32,
}

#[derive(Debug, Default)]
struct State {
    next_tag: i64,
    ready: VecDeque<Stored>,
    in_flight: HashMap<i64, Stored>,
    dead: Vec<Stored>,
}

/// Queue kept in process memory; survives channel close, not process exit
#[derive(Debug, Default)]
pub struct MemoryQueue {
    state: Mutex<State>,
    closed: AtomicBool,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>, ChannelError> {
        self.state
            .lock()
            .map_err(|_| ChannelError::Transport("queue state poisoned".into()))
    }

    /// Messages waiting for a consumer
    pub fn ready_len(&self) -> usize {
        self.lock().map(|s| s.ready.len()).unwrap_or(0)
    }

    /// Messages received but not yet acked or nacked
    pub fn in_flight_len(&self) -> usize {
        self.lock().map(|s| s.in_flight.len()).unwrap_or(0)
    }

    pub fn dead_letters(&self) -> Vec<Vec<u8>> {
        self.lock()
            .map(|s| s.dead.iter().map(|m| m.body.clone()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl QueueBackend for MemoryQueue {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn enqueue(&self, body: Vec<u8>) -> Result<(), ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }
        let mut state = self.lock()?;
        state.next_tag += 1;
        let tag = state.next_tag;
        state.ready.push_back(Stored {
            tag,
            body,
            attempts: 0,
        });
        Ok(())
    }

    async fn receive(&self, mode: AckMode) -> Result<Option<Delivery>, ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }
        let mut state = self.lock()?;
        let Some(mut msg) = state.ready.pop_front() else {
            return Ok(None);
        };
        msg.attempts += 1;

        let delivery = Delivery {
            tag: msg.tag,
            body: msg.body.clone(),
            attempts: msg.attempts,
        };
        if !mode.acks_on_receipt() {
            state.in_flight.insert(msg.tag, msg);
        }
        Ok(Some(delivery))
    }

    async fn ack(&self, tag: i64) -> Result<(), ChannelError> {
        self.lock()?.in_flight.remove(&tag);
        Ok(())
    }

    async fn nack(&self, tag: i64, requeue: bool) -> Result<(), ChannelError> {
        let mut state = self.lock()?;
        if let Some(msg) = state.in_flight.remove(&tag) {
            if requeue {
                // Back to the head: redelivered before anything enqueued after it
                state.ready.push_front(msg);
            } else {
                state.dead.push(msg);
            }
        }
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
