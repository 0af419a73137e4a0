use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::value_objects::*;

/// Partition value for a message that has not been assigned one
pub const UNASSIGNED_PARTITION: i32 = -1;

/// A single key/value header attached to a message.
///
/// Header order is preserved and duplicate keys are allowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub key: String,
    pub value: Vec<u8>,
}

impl Header {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A record as written to or read from a partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub key: Option<Vec<u8>>,
    /// `None` marks a tombstone
    pub value: Option<Vec<u8>>,
    pub partition: i32,
    pub offset: Option<Offset>,
    pub headers: Vec<Header>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Message {
    /// Create a new message with no partition assigned
    pub fn new(key: Option<Vec<u8>>, value: Option<Vec<u8>>) -> Self {
        Self {
            key,
            value,
            partition: UNASSIGNED_PARTITION,
            offset: None,
            headers: Vec::new(),
            timestamp: None,
        }
    }

    /// A message carrying only a value
    pub fn from_value(value: impl Into<Vec<u8>>) -> Self {
        Self::new(None, Some(value.into()))
    }

    /// A null-value record that logically deletes `original`'s key
    pub fn tombstone_for(original: &Message) -> Self {
        Self {
            key: original.key.clone(),
            value: None,
            partition: original.partition,
            offset: None,
            headers: Vec::new(),
            timestamp: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.headers.push(Header::new(key, value));
        self
    }

    pub fn with_partition(mut self, partition: PartitionId) -> Self {
        self.partition = partition.value();
        self
    }

    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    pub fn has_partition(&self) -> bool {
        self.partition >= 0
    }

    /// The value rendered for display, lossy for non-UTF-8 payloads
    pub fn value_text(&self) -> String {
        self.value
            .as_deref()
            .map(|v| String::from_utf8_lossy(v).into_owned())
            .unwrap_or_default()
    }
}
