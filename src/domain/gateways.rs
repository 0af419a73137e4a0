use async_trait::async_trait;
use std::time::Duration;

use super::{
    entities::Message,
    errors::{ClientError, ReadError},
};

/// Sequential reader over a single partition
#[async_trait]
pub trait MessageReader: Send {
    /// Read the next message, waiting at most `timeout` (and never past any
    /// deadline already set on the reader).
    async fn read_next(&mut self, max_bytes: usize, timeout: Duration) -> Result<Message, ReadError>;
}

/// Writer that appends messages to a topic
#[async_trait]
pub trait MessageWriter: Send {
    async fn write_messages(&mut self, messages: Vec<Message>) -> Result<(), ClientError>;
}
