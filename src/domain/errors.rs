use std::io;
use std::time::Duration;
use thiserror::Error;

use super::error_codes::KafkaErrorCode;
use super::value_objects::Offset;

pub type Result<T> = std::result::Result<T, DomainError>;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Invalid topic name: {0}")]
    InvalidTopicName(String),

    #[error("Failed to encode event: {0}")]
    EventEncoding(#[from] serde_json::Error),
}

/// Errors raised by the broker wire client
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Broker returned {0}")]
    Broker(KafkaErrorCode),

    #[error("Request timed out")]
    Timeout,

    #[error("Connection is unusable after an interrupted request")]
    ConnectionBroken,

    #[error("Message has no partition assigned and the writer has no balancer")]
    MissingPartition,

    #[error("Broker {0} not present in cluster metadata")]
    UnknownBroker(i32),

    #[error("Reached end offset {0} of the partition")]
    EndOfPartition(Offset),
}

impl ClientError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        ClientError::Protocol(msg.into())
    }

    /// Map a failed read onto the consumer's stop policy.
    pub fn classify(self) -> ReadError {
        let temporary = match &self {
            ClientError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return ReadError::EndOfStream;
            }
            ClientError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
            ),
            ClientError::Timeout | ClientError::EndOfPartition(_) => true,
            ClientError::Broker(code) => code.is_temporary(),
            _ => false,
        };

        if temporary {
            ReadError::Temporary(self)
        } else {
            ReadError::Other(self)
        }
    }
}

impl From<ClientError> for ReadError {
    fn from(err: ClientError) -> Self {
        err.classify()
    }
}

/// Outcome of a read that produced no message
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("EOF")]
    EndOfStream,

    #[error("{0}")]
    Temporary(ClientError),

    #[error("{0}")]
    Other(ClientError),
}

/// A tombstone write that failed or did not finish in time
#[derive(Debug, Error)]
pub enum DeleteError {
    #[error("error writing tombstone message: {0}")]
    Write(#[source] ClientError),

    #[error("error writing tombstone message: timed out after {0:?}")]
    TimedOut(Duration),
}

/// Fatal ways for the purge loop to stop
#[derive(Debug, Error)]
pub enum PurgeError {
    #[error("Error reading message after {processed} messages: {source}")]
    Read {
        processed: usize,
        #[source]
        source: ClientError,
    },

    #[error("Failed to delete message {processed}: {source}")]
    Tombstone {
        processed: usize,
        #[source]
        source: DeleteError,
    },
}

impl PurgeError {
    /// Messages successfully read before the loop aborted
    pub fn processed(&self) -> usize {
        match self {
            PurgeError::Read { processed, .. } | PurgeError::Tombstone { processed, .. } => {
                *processed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_end_of_stream() {
        let err = ClientError::Io(io::Error::new(io::ErrorKind::UnexpectedEof, "closed"));
        assert!(matches!(err.classify(), ReadError::EndOfStream));
    }

    #[test]
    fn test_classify_temporary() {
        assert!(matches!(
            ClientError::Timeout.classify(),
            ReadError::Temporary(ClientError::Timeout)
        ));
        assert!(matches!(
            ClientError::Broker(KafkaErrorCode::REQUEST_TIMED_OUT).classify(),
            ReadError::Temporary(_)
        ));
        let err = ClientError::Io(io::Error::new(io::ErrorKind::TimedOut, "slow"));
        assert!(matches!(err.classify(), ReadError::Temporary(_)));
    }

    #[test]
    fn test_caught_up_reader_stops_as_temporary() {
        let err = ClientError::EndOfPartition(Offset::new(3));
        assert_eq!(err.to_string(), "Reached end offset 3 of the partition");
        assert!(matches!(
            err.classify(),
            ReadError::Temporary(ClientError::EndOfPartition(Offset(3)))
        ));
    }

    #[test]
    fn test_classify_other() {
        let reset = ClientError::Io(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert!(matches!(reset.classify(), ReadError::Other(_)));
        assert!(matches!(
            ClientError::Broker(KafkaErrorCode::OFFSET_OUT_OF_RANGE).classify(),
            ReadError::Other(_)
        ));
        assert!(matches!(
            ClientError::protocol("bad frame").classify(),
            ReadError::Other(_)
        ));
    }

    #[test]
    fn test_delete_error_is_wrapped() {
        let err = DeleteError::Write(ClientError::Broker(KafkaErrorCode::MESSAGE_TOO_LARGE));
        assert_eq!(
            err.to_string(),
            "error writing tombstone message: Broker returned MESSAGE_TOO_LARGE (10)"
        );
    }
}
