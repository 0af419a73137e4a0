//! # Kafka-Purge
//!
//! A small Kafka client that writes a fixed batch of example messages to one
//! partition, and a purge loop that reads a partition from the beginning and
//! answers every message with a tombstone carrying the same key.
//!
//! ## Architecture
//!
//! The codebase follows Domain-Driven Design principles with clear separation between:
//! - **Domain Layer**: Messages, error classification and the purge loop
//! - **Application Layer**: Configuration and the producer / purge use cases
//! - **Infrastructure Layer**: The Kafka wire protocol over TCP
//!
//! ## Usage
//!
//! ```no_run
//! use kafka_purge::application::{PurgeConfig, PurgePartitionUseCase};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PurgeConfig {
//!         topic: "my-topic".to_string(),
//!         ..PurgeConfig::default()
//!     };
//!
//!     let report = PurgePartitionUseCase::new(config).execute().await?;
//!     println!("Tombstoned {} messages", report.processed);
//!     Ok(())
//! }
//! ```

pub mod application;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use application::{ProduceExamplesUseCase, ProducerConfig, PurgeConfig, PurgePartitionUseCase};
pub use domain::entities::{Header, Message};
pub use domain::errors::{ClientError, PurgeError, ReadError};
pub use domain::services::{PurgeReport, PurgeService, StopReason};
pub use domain::value_objects::{Offset, PartitionId, TopicName};
pub use infrastructure::{PartitionConnection, TopicWriter};
