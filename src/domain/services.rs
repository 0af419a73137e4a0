use log::{debug, error, info};
use std::time::Duration;

use super::{entities::*, errors::*, gateways::*};

/// Largest fetch response requested per read
pub const DEFAULT_MAX_BYTES: usize = 10_000;
/// Upper bound on a single read, layered under the connection deadline
pub const DEFAULT_PER_READ_TIMEOUT: Duration = Duration::from_secs(10);
/// Upper bound on a single tombstone write
pub const DEFAULT_TOMBSTONE_TIMEOUT: Duration = Duration::from_secs(2);

/// Why the purge loop stopped without a fatal error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The broker closed the stream
    EndOfStream,
    /// A temporary condition (usually the read deadline) signalled that no
    /// more data is currently available
    Exhausted(String),
}

impl StopReason {
    pub fn detail(&self) -> &str {
        match self {
            StopReason::EndOfStream => "EOF",
            StopReason::Exhausted(detail) => detail,
        }
    }
}

/// Summary of a loop that stopped cleanly
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeReport {
    pub processed: usize,
    pub stop: StopReason,
}

/// Drains a partition and deletes every message it reads by writing a
/// tombstone for its key.
///
/// Reading and deleting are strictly sequential. The loop stops at the first
/// end-of-stream, temporary read error, fatal read error, or failed
/// tombstone write; nothing is retried.
pub struct PurgeService {
    max_bytes: usize,
    per_read_timeout: Duration,
    tombstone_timeout: Duration,
}

impl PurgeService {
    pub fn new(max_bytes: usize, per_read_timeout: Duration, tombstone_timeout: Duration) -> Self {
        Self {
            max_bytes,
            per_read_timeout,
            tombstone_timeout,
        }
    }

    pub async fn run(
        &self,
        reader: &mut dyn MessageReader,
        writer: &mut dyn MessageWriter,
    ) -> std::result::Result<PurgeReport, PurgeError> {
        let mut message_count = 0usize;

        let outcome = loop {
            let message = match reader.read_next(self.max_bytes, self.per_read_timeout).await {
                Ok(message) => message,
                Err(ReadError::EndOfStream) => {
                    info!("Reached end of topic after {} messages", message_count);
                    break Ok(StopReason::EndOfStream);
                }
                Err(ReadError::Temporary(e)) => {
                    debug!("Read stopped by temporary error: {}", e);
                    info!("No more messages available. Total processed: {}", message_count);
                    break Ok(StopReason::Exhausted(e.to_string()));
                }
                Err(ReadError::Other(e)) => {
                    error!("Error reading message: {}", e);
                    break Err(PurgeError::Read {
                        processed: message_count,
                        source: e,
                    });
                }
            };

            message_count += 1;
            println!("Message {}: {}", message_count, message.value_text());

            if let Err(e) = delete_message(writer, &message, self.tombstone_timeout).await {
                error!("Failed to delete message: {}", e);
                break Err(PurgeError::Tombstone {
                    processed: message_count,
                    source: e,
                });
            }
        };

        info!("Processing complete. Total messages: {}", message_count);

        outcome.map(|stop| PurgeReport {
            processed: message_count,
            stop,
        })
    }
}

impl Default for PurgeService {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_BYTES,
            DEFAULT_PER_READ_TIMEOUT,
            DEFAULT_TOMBSTONE_TIMEOUT,
        )
    }
}

/// Write a tombstone for `original`, giving up after `timeout`
pub async fn delete_message(
    writer: &mut dyn MessageWriter,
    original: &Message,
    timeout: Duration,
) -> std::result::Result<(), DeleteError> {
    let tombstone = Message::tombstone_for(original);
    debug!(
        "Writing tombstone for key {:?} on partition {}",
        tombstone.key.as_deref().map(String::from_utf8_lossy),
        tombstone.partition
    );

    match tokio::time::timeout(timeout, writer.write_messages(vec![tombstone])).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(DeleteError::Write(e)),
        Err(_) => Err(DeleteError::TimedOut(timeout)),
    }
}
