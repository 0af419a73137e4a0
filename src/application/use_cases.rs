use anyhow::Context;
use chrono::{DateTime, Utc};
use log::{info, warn};
use tokio::time::Instant;

use super::config::{ProducerConfig, PurgeConfig};
use crate::{
    domain::{
        entities::Message,
        errors::DomainError,
        events::{to_json_bytes, OrderEvent, UserEvent},
        services::{PurgeReport, PurgeService},
        value_objects::{PartitionId, TopicName},
    },
    infrastructure::{connection::RequiredAcks, partition::PartitionConnection, writer::TopicWriter},
};

/// The fixed batch the producer writes: a plain message and two JSON events
pub fn example_messages(now: DateTime<Utc>) -> Result<Vec<Message>, DomainError> {
    let simple = Message::from_value("Example 1: Hello, this is a test message from gononet!");

    let user_event = UserEvent::new("Example 2", "micro-managing").at(now);
    let user = Message::from_value(to_json_bytes(&user_event)?)
        .with_key("user_event")
        .with_header("event_type", "user_activity")
        .with_header("version", "2.9");

    let order_event = OrderEvent {
        order_id: "Example 3".to_string(),
        customer_id: "your_customer_id".to_string(),
        amount: 69.69,
        status: "Active".to_string(),
    };
    let order = Message::from_value(to_json_bytes(&order_event)?)
        .with_key("order_event")
        .with_header("event_type", "order_processing")
        .with_header("priority", "high");

    Ok(vec![simple, user, order])
}

/// Use case for writing the example batch to a partition
pub struct ProduceExamplesUseCase {
    config: ProducerConfig,
}

impl ProduceExamplesUseCase {
    pub fn new(config: ProducerConfig) -> Self {
        Self { config }
    }

    /// Write the batch in one request; returns how many messages were written
    pub async fn execute(&self) -> anyhow::Result<usize> {
        let topic = TopicName::new(self.config.topic.as_str())?;
        let partition = PartitionId::new(self.config.partition);
        let messages = example_messages(Utc::now())?;

        let mut conn = PartitionConnection::dial_leader(&self.config.address, &topic, partition)
            .await
            .context("failed to dial producer")?;
        conn.set_write_deadline(Instant::now() + self.config.write_deadline);

        let written = conn.write_messages(&messages).await;
        let closed = conn.close().await;

        let base_offset = written.context("failed to write messages")?;
        closed.context("failed to close writer")?;

        match base_offset {
            Some(offset) => info!(
                "Successfully wrote {} messages to Kafka starting at offset {}",
                messages.len(),
                offset
            ),
            None => info!("Successfully wrote {} messages to Kafka", messages.len()),
        }
        Ok(messages.len())
    }
}

/// Use case for draining a partition and tombstoning everything in it
pub struct PurgePartitionUseCase {
    config: PurgeConfig,
}

impl PurgePartitionUseCase {
    pub fn new(config: PurgeConfig) -> Self {
        Self { config }
    }

    /// Run the purge loop once.
    ///
    /// Both connections are closed on every exit path; close failures are
    /// only logged.
    pub async fn execute(&self) -> anyhow::Result<PurgeReport> {
        let topic = TopicName::new(self.config.topic.as_str())?;
        let partition = PartitionId::new(self.config.partition);

        let mut conn = PartitionConnection::dial_leader(&self.config.address, &topic, partition)
            .await
            .context("failed to dial consumer")?;
        conn.set_read_deadline(Instant::now() + self.config.read_deadline);

        let mut writer =
            TopicWriter::new(self.config.address.clone(), topic).with_required_acks(RequiredAcks::All);

        let service = PurgeService::new(
            self.config.max_bytes,
            self.config.per_read_timeout,
            self.config.tombstone_timeout,
        );
        let result = service.run(&mut conn, &mut writer).await;

        if let Err(e) = conn.close().await {
            warn!("Error closing consumer connection: {}", e);
        }
        if let Err(e) = writer.close().await {
            warn!("Error closing writer: {}", e);
        }

        Ok(result?)
    }
}
