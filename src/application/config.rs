use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::services::{DEFAULT_MAX_BYTES, DEFAULT_PER_READ_TIMEOUT, DEFAULT_TOMBSTONE_TIMEOUT};

pub const DEFAULT_ADDRESS: &str = "localhost:9092";
pub const DEFAULT_TOPIC: &str = "test-topic";
pub const DEFAULT_PARTITION: i32 = 0;
pub const DEFAULT_READ_DEADLINE: Duration = Duration::from_secs(10);
pub const DEFAULT_WRITE_DEADLINE: Duration = Duration::from_secs(10);

/// Settings for draining a partition with tombstones
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurgeConfig {
    /// Bootstrap broker, `host:port`
    pub address: String,
    pub topic: String,
    pub partition: i32,
    /// Absolute cutoff for all reads, measured from when the loop starts
    pub read_deadline: Duration,
    pub per_read_timeout: Duration,
    pub tombstone_timeout: Duration,
    pub max_bytes: usize,
}

impl Default for PurgeConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            partition: DEFAULT_PARTITION,
            read_deadline: DEFAULT_READ_DEADLINE,
            per_read_timeout: DEFAULT_PER_READ_TIMEOUT,
            tombstone_timeout: DEFAULT_TOMBSTONE_TIMEOUT,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

/// Settings for writing the example batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProducerConfig {
    pub address: String,
    pub topic: String,
    pub partition: i32,
    pub write_deadline: Duration,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            partition: DEFAULT_PARTITION,
            write_deadline: DEFAULT_WRITE_DEADLINE,
        }
    }
}
