use async_trait::async_trait;
use log::{debug, info};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

use crate::{
    domain::{
        entities::Message,
        errors::{ClientError, ReadError},
        gateways::MessageReader,
        value_objects::{Offset, PartitionId, TopicName},
    },
    infrastructure::{
        connection::{dial_partition_leader, BrokerConnection, RequiredAcks},
        records::decode_records,
    },
};

/// Produce timeout sent to the broker when no write deadline is set
const DEFAULT_PRODUCE_TIMEOUT: Duration = Duration::from_secs(10);

/// An empty fetch is held by the broker for the whole wait, so its reply
/// lands just after the read deadline. Give it this long before cutting the
/// connection.
const FETCH_RESPONSE_GRACE: Duration = Duration::from_millis(500);

/// A connection to the leader of one topic partition, with a read position
/// and optional absolute read/write deadlines.
///
/// Reading is bounded by the partition's end offset as seen on the first
/// read. Anything appended later, including what this process writes back,
/// is never returned.
pub struct PartitionConnection {
    conn: BrokerConnection,
    topic: TopicName,
    partition: PartitionId,
    offset: Offset,
    end_offset: Option<Offset>,
    pending: VecDeque<Message>,
    read_deadline: Option<Instant>,
    write_deadline: Option<Instant>,
}

impl PartitionConnection {
    /// Connect to the leader of `topic`/`partition`, discovered through the
    /// broker at `address`. Reading starts at the earliest available offset.
    pub async fn dial_leader(
        address: &str,
        topic: &TopicName,
        partition: PartitionId,
    ) -> Result<Self, ClientError> {
        let conn = dial_partition_leader(address, topic.as_str(), partition.value()).await?;
        info!(
            "Connected to leader of {}:{} at {}",
            topic,
            partition,
            conn.address()
        );
        Ok(Self::new(conn, topic.clone(), partition))
    }

    pub fn new(conn: BrokerConnection, topic: TopicName, partition: PartitionId) -> Self {
        Self {
            conn,
            topic,
            partition,
            offset: Offset::EARLIEST,
            end_offset: None,
            pending: VecDeque::new(),
            read_deadline: None,
            write_deadline: None,
        }
    }

    /// Every read fails with a timeout once `deadline` has passed
    pub fn set_read_deadline(&mut self, deadline: Instant) {
        self.read_deadline = Some(deadline);
    }

    pub fn set_write_deadline(&mut self, deadline: Instant) {
        self.write_deadline = Some(deadline);
    }

    /// Offset of the next message `read_message` returns
    pub fn offset(&self) -> Offset {
        self.offset
    }

    /// End of the readable range, known once the first read has started
    pub fn end_offset(&self) -> Option<Offset> {
        self.end_offset
    }

    /// Read the next message, waiting no longer than `timeout` and never past
    /// the read deadline.
    ///
    /// Fails with `EndOfPartition` once every message below the end offset
    /// has been returned.
    pub async fn read_message(
        &mut self,
        max_bytes: usize,
        timeout: Duration,
    ) -> Result<Message, ClientError> {
        let call_deadline = Instant::now() + timeout;
        let deadline = match self.read_deadline {
            Some(read_deadline) => read_deadline.min(call_deadline),
            None => call_deadline,
        };

        loop {
            if let Some(message) = self.pending.pop_front() {
                if let Some(offset) = message.offset {
                    self.offset = offset.next();
                }
                return Ok(message);
            }

            if let Some(end) = self.end_offset {
                if !self.offset.is_logical() && self.offset >= end {
                    return Err(ClientError::EndOfPartition(end));
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ClientError::Timeout);
            }

            if self.end_offset.is_none() {
                let end = self
                    .conn
                    .list_offset(
                        self.topic.as_str(),
                        self.partition.value(),
                        Offset::LATEST,
                        Some(deadline),
                    )
                    .await?;
                debug!("Reading {}:{} up to offset {}", self.topic, self.partition, end);
                self.end_offset = Some(end);
                continue;
            }

            if self.offset.is_logical() {
                self.offset = self
                    .conn
                    .list_offset(
                        self.topic.as_str(),
                        self.partition.value(),
                        self.offset,
                        Some(deadline),
                    )
                    .await?;
                continue;
            }

            let response = self
                .conn
                .fetch(
                    self.topic.as_str(),
                    self.partition.value(),
                    self.offset,
                    max_bytes,
                    deadline - now,
                    Some(deadline + FETCH_RESPONSE_GRACE),
                )
                .await?;

            let records = response.records.unwrap_or_default();
            let mut decoded = decode_records(&records, self.partition.value(), self.offset.value())?;
            debug!(
                "Fetched {} messages from {}:{} at offset {} (high watermark {})",
                decoded.messages.len(),
                self.topic,
                self.partition,
                self.offset,
                response.high_watermark
            );

            // compacted gaps can put the first record past the end
            if let Some(end) = self.end_offset {
                decoded
                    .messages
                    .retain(|m| m.offset.map_or(true, |offset| offset < end));
            }
            if decoded.messages.is_empty() {
                match decoded.next_offset {
                    // only control batches or records below our position
                    Some(next) if next > self.offset.value() => self.offset = Offset::new(next),
                    None if !records.is_empty() => {
                        return Err(ClientError::protocol(format!(
                            "Message at offset {} does not fit in {} bytes",
                            self.offset, max_bytes
                        )));
                    }
                    _ => {}
                }
            }
            self.pending.extend(decoded.messages);
        }
    }

    /// Write `messages` to this connection's partition as one batch,
    /// acknowledged by all in-sync replicas.
    pub async fn write_messages(&mut self, messages: &[Message]) -> Result<Option<Offset>, ClientError> {
        let produce_timeout = self
            .write_deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
            .unwrap_or(DEFAULT_PRODUCE_TIMEOUT);

        self.conn
            .produce(
                self.topic.as_str(),
                self.partition.value(),
                messages,
                RequiredAcks::All,
                produce_timeout,
                self.write_deadline,
            )
            .await
    }

    pub async fn close(self) -> Result<(), ClientError> {
        self.conn.close().await
    }
}

#[async_trait]
impl MessageReader for PartitionConnection {
    async fn read_next(&mut self, max_bytes: usize, timeout: Duration) -> Result<Message, ReadError> {
        self.read_message(max_bytes, timeout)
            .await
            .map_err(ClientError::classify)
    }
}
