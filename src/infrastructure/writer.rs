use async_trait::async_trait;
use log::{debug, warn};
use std::collections::{hash_map::Entry, BTreeMap, HashMap};
use std::time::Duration;

use crate::{
    domain::{
        entities::Message,
        errors::ClientError,
        gateways::MessageWriter,
        value_objects::TopicName,
    },
    infrastructure::connection::{dial_partition_leader, BrokerConnection, RequiredAcks},
};

/// Produce timeout the broker applies while waiting for replica acks
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Writes messages to a topic through each partition's leader.
///
/// There is no balancer: every message must already carry the partition it
/// is meant for. Leader connections are dialed on first use and kept until a
/// write through them fails or is cancelled part way.
pub struct TopicWriter {
    address: String,
    topic: TopicName,
    required_acks: RequiredAcks,
    write_timeout: Duration,
    connections: HashMap<i32, BrokerConnection>,
}

impl TopicWriter {
    pub fn new(address: impl Into<String>, topic: TopicName) -> Self {
        Self {
            address: address.into(),
            topic,
            required_acks: RequiredAcks::All,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            connections: HashMap::new(),
        }
    }

    pub fn with_required_acks(mut self, required_acks: RequiredAcks) -> Self {
        self.required_acks = required_acks;
        self
    }

    pub fn topic(&self) -> &TopicName {
        &self.topic
    }

    /// Write `messages`, one produce request per partition.
    ///
    /// Nothing is sent if any message lacks a partition.
    pub async fn write(&mut self, messages: Vec<Message>) -> Result<(), ClientError> {
        if messages.iter().any(|m| !m.has_partition()) {
            return Err(ClientError::MissingPartition);
        }

        let mut by_partition: BTreeMap<i32, Vec<Message>> = BTreeMap::new();
        for message in messages {
            by_partition.entry(message.partition).or_default().push(message);
        }

        let topic = self.topic.clone();
        for (partition, batch) in by_partition {
            if self.connections.get(&partition).is_some_and(|c| c.is_broken()) {
                debug!("Redialing leader of {}:{}", topic, partition);
                self.connections.remove(&partition);
            }

            let conn = match self.connections.entry(partition) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    let conn = dial_partition_leader(&self.address, topic.as_str(), partition).await?;
                    entry.insert(conn)
                }
            };

            let result = conn
                .produce(
                    topic.as_str(),
                    partition,
                    &batch,
                    self.required_acks,
                    self.write_timeout,
                    None,
                )
                .await;

            if let Err(e) = result {
                debug!("Dropping connection for {}:{} after error: {}", topic, partition, e);
                self.connections.remove(&partition);
                return Err(e);
            }
        }

        Ok(())
    }

    /// Close every leader connection
    pub async fn close(&mut self) -> Result<(), ClientError> {
        let mut first_error = None;
        for (partition, conn) in self.connections.drain() {
            if let Err(e) = conn.close().await {
                warn!("Error closing writer connection for partition {}: {}", partition, e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[async_trait]
impl MessageWriter for TopicWriter {
    async fn write_messages(&mut self, messages: Vec<Message>) -> Result<(), ClientError> {
        self.write(messages).await
    }
}
