use thiserror::Error;

use crate::context::Interrupted;

/// Publish / consume failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Channel is closed")]
    Closed,

    #[error("Publish interrupted: {0}")]
    Cancelled(Interrupted),

    #[error("Malformed transfer message: {0}")]
    Serialization(String),

    #[error("Queue transport failure: {0}")]
    Transport(String),
}

impl ChannelError {
    pub fn code(&self) -> &'static str {
        match self {
            ChannelError::Closed => "CHANNEL_CLOSED",
            ChannelError::Cancelled(_) => "CANCELLED",
            ChannelError::Serialization(_) => "MALFORMED_MESSAGE",
            ChannelError::Transport(_) => "CHANNEL_ERROR",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            ChannelError::Closed | ChannelError::Transport(_) => 503,
            ChannelError::Cancelled(_) => 408,
            ChannelError::Serialization(_) => 400,
        }
    }
}

impl From<sqlx::Error> for ChannelError {
    fn from(e: sqlx::Error) -> Self {
        ChannelError::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for ChannelError {
    fn from(e: serde_json::Error) -> Self {
        ChannelError::Serialization(e.to_string())
    }
}

impl From<Interrupted> for ChannelError {
    fn from(e: Interrupted) -> Self {
        ChannelError::Cancelled(e)
    }
}
