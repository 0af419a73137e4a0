use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::DomainError;

/// Longest topic name a broker accepts
pub const MAX_TOPIC_NAME_LEN: usize = 249;

/// Represents a topic name with validation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicName(String);

impl TopicName {
    pub fn new(name: impl Into<String>) -> Result<Self, DomainError> {
        let name = name.into();
        if name.is_empty() {
            return Err(DomainError::InvalidTopicName(
                "Topic name cannot be empty".to_string(),
            ));
        }
        if name.len() > MAX_TOPIC_NAME_LEN {
            return Err(DomainError::InvalidTopicName(format!(
                "Topic name too long (max {} characters)",
                MAX_TOPIC_NAME_LEN
            )));
        }
        if name == "." || name == ".." {
            return Err(DomainError::InvalidTopicName(format!(
                "Topic name cannot be '{}'",
                name
            )));
        }
        if let Some(c) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
        {
            return Err(DomainError::InvalidTopicName(format!(
                "Topic name contains illegal character {:?}",
                c
            )));
        }
        Ok(TopicName(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TopicName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TopicName {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TopicName::new(s)
    }
}

/// Represents a message offset within a partition.
///
/// Negative values are the broker's logical offsets (earliest / latest) and
/// are resolved to a real position before any fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Offset(pub i64);

impl Offset {
    pub const EARLIEST: Offset = Offset(-2);
    pub const LATEST: Offset = Offset(-1);

    pub fn new(value: i64) -> Self {
        Offset(value)
    }

    pub fn next(&self) -> Self {
        Offset(self.0 + 1)
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_logical(&self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Offset::EARLIEST => write!(f, "earliest"),
            Offset::LATEST => write!(f, "latest"),
            Offset(v) => write!(f, "{}", v),
        }
    }
}

/// Identifier for a partition within a topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionId(pub i32);

impl PartitionId {
    pub fn new(id: i32) -> Self {
        PartitionId(id)
    }

    pub fn value(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
