use std::fmt;

/// An error code returned by the broker in a response body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KafkaErrorCode(pub i16);

// (code, name, retriable)
const KNOWN_CODES: &[(i16, &str, bool)] = &[
    (-1, "UNKNOWN_SERVER_ERROR", false),
    (0, "NONE", false),
    (1, "OFFSET_OUT_OF_RANGE", false),
    (2, "CORRUPT_MESSAGE", true),
    (3, "UNKNOWN_TOPIC_OR_PARTITION", true),
    (4, "INVALID_FETCH_SIZE", false),
    (5, "LEADER_NOT_AVAILABLE", true),
    (6, "NOT_LEADER_OR_FOLLOWER", true),
    (7, "REQUEST_TIMED_OUT", true),
    (8, "BROKER_NOT_AVAILABLE", false),
    (9, "REPLICA_NOT_AVAILABLE", true),
    (10, "MESSAGE_TOO_LARGE", false),
    (12, "OFFSET_METADATA_TOO_LARGE", false),
    (13, "NETWORK_EXCEPTION", true),
    (17, "INVALID_TOPIC_EXCEPTION", false),
    (18, "RECORD_LIST_TOO_LARGE", false),
    (19, "NOT_ENOUGH_REPLICAS", true),
    (20, "NOT_ENOUGH_REPLICAS_AFTER_APPEND", true),
    (21, "INVALID_REQUIRED_ACKS", false),
    (29, "TOPIC_AUTHORIZATION_FAILED", false),
    (35, "UNSUPPORTED_VERSION", false),
    (42, "INVALID_REQUEST", false),
    (43, "UNSUPPORTED_FOR_MESSAGE_FORMAT", false),
    (56, "KAFKA_STORAGE_ERROR", true),
    (74, "FENCED_LEADER_EPOCH", true),
    (75, "UNKNOWN_LEADER_EPOCH", true),
    (76, "UNSUPPORTED_COMPRESSION_TYPE", false),
    (87, "INVALID_RECORD", false),
];

impl KafkaErrorCode {
    pub const NONE: KafkaErrorCode = KafkaErrorCode(0);
    pub const OFFSET_OUT_OF_RANGE: KafkaErrorCode = KafkaErrorCode(1);
    pub const UNKNOWN_TOPIC_OR_PARTITION: KafkaErrorCode = KafkaErrorCode(3);
    pub const LEADER_NOT_AVAILABLE: KafkaErrorCode = KafkaErrorCode(5);
    pub const NOT_LEADER_OR_FOLLOWER: KafkaErrorCode = KafkaErrorCode(6);
    pub const REQUEST_TIMED_OUT: KafkaErrorCode = KafkaErrorCode(7);
    pub const MESSAGE_TOO_LARGE: KafkaErrorCode = KafkaErrorCode(10);
    pub const INVALID_REQUIRED_ACKS: KafkaErrorCode = KafkaErrorCode(21);

    pub fn is_error(&self) -> bool {
        self.0 != 0
    }

    pub fn name(&self) -> &'static str {
        KNOWN_CODES
            .iter()
            .find(|(code, _, _)| *code == self.0)
            .map(|(_, name, _)| *name)
            .unwrap_or("UNKNOWN")
    }

    /// Whether the broker flags this condition as transient.
    ///
    /// Unknown codes are never temporary.
    pub fn is_temporary(&self) -> bool {
        KNOWN_CODES
            .iter()
            .find(|(code, _, _)| *code == self.0)
            .map(|(_, _, retriable)| *retriable)
            .unwrap_or(false)
    }
}

impl fmt::Display for KafkaErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriable_codes_are_temporary() {
        assert!(KafkaErrorCode::REQUEST_TIMED_OUT.is_temporary());
        assert!(KafkaErrorCode::NOT_LEADER_OR_FOLLOWER.is_temporary());
        assert!(KafkaErrorCode::LEADER_NOT_AVAILABLE.is_temporary());

        assert!(!KafkaErrorCode::OFFSET_OUT_OF_RANGE.is_temporary());
        assert!(!KafkaErrorCode::MESSAGE_TOO_LARGE.is_temporary());
        assert!(!KafkaErrorCode(-1).is_temporary());
        assert!(!KafkaErrorCode(9999).is_temporary());
    }

    #[test]
    fn test_display() {
        assert_eq!(KafkaErrorCode(7).to_string(), "REQUEST_TIMED_OUT (7)");
        assert_eq!(KafkaErrorCode(9999).to_string(), "UNKNOWN (9999)");
        assert!(!KafkaErrorCode::NONE.is_error());
    }
}
