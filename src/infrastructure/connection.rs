use bytes::BytesMut;
use chrono::Utc;
use log::{debug, warn};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout_at, Instant};

use crate::{
    domain::{
        entities::Message,
        error_codes::KafkaErrorCode,
        errors::ClientError,
        value_objects::Offset,
    },
    infrastructure::{
        protocol::{
            encode_i32, ApiKey, BrokerMetadata, FetchRequest, FetchResponse, KafkaDecodable,
            KafkaEncodable, ListOffsetsRequest, ListOffsetsResponse, MetadataRequest,
            MetadataResponse, ProduceRequest, ProduceResponse, RequestHeader, ResponseHeader,
        },
        records::encode_record_batch,
    },
};

pub const DEFAULT_CLIENT_ID: &str = "kafka-purge";

/// Responses larger than this are treated as a corrupt frame
const MAX_RESPONSE_SIZE: usize = 100 * 1024 * 1024;

/// Broker acknowledgement required before a produce request succeeds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredAcks {
    /// Fire and forget, the broker sends no response
    None = 0,
    /// Every in-sync replica has written the batch
    All = -1,
}

/// A single TCP connection to one broker.
///
/// Requests are strictly sequential: each one is written and its response
/// read before the next request goes out.
pub struct BrokerConnection {
    stream: TcpStream,
    address: String,
    client_id: String,
    correlation_id: i32,
    broken: bool,
}

impl BrokerConnection {
    pub async fn dial(address: &str) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(address).await?;
        stream.set_nodelay(true)?;
        debug!("Connected to broker at {}", address);

        Ok(Self {
            stream,
            address: address.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            correlation_id: 0,
            broken: false,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// True once a request was interrupted mid-flight; the stream position is
    /// unknown after that and the connection must be replaced.
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Find the broker currently leading `topic`/`partition`
    pub async fn lookup_leader(
        &mut self,
        topic: &str,
        partition: i32,
    ) -> Result<BrokerMetadata, ClientError> {
        let request = MetadataRequest {
            topics: Some(vec![topic.to_string()]),
        };
        let metadata: MetadataResponse = self.round_trip(ApiKey::Metadata, &request, None).await?;

        let topic_metadata = metadata
            .topics
            .iter()
            .find(|t| t.name == topic)
            .ok_or(ClientError::Broker(KafkaErrorCode::UNKNOWN_TOPIC_OR_PARTITION))?;
        check(topic_metadata.error_code)?;

        let partition_metadata = topic_metadata
            .partitions
            .iter()
            .find(|p| p.partition == partition)
            .ok_or(ClientError::Broker(KafkaErrorCode::UNKNOWN_TOPIC_OR_PARTITION))?;
        check(partition_metadata.error_code)?;
        if partition_metadata.leader < 0 {
            return Err(ClientError::Broker(KafkaErrorCode::LEADER_NOT_AVAILABLE));
        }

        metadata
            .brokers
            .into_iter()
            .find(|b| b.node_id == partition_metadata.leader)
            .ok_or(ClientError::UnknownBroker(partition_metadata.leader))
    }

    /// Resolve a logical offset (earliest / latest) to a position
    pub async fn list_offset(
        &mut self,
        topic: &str,
        partition: i32,
        offset: Offset,
        deadline: Option<Instant>,
    ) -> Result<Offset, ClientError> {
        let request = ListOffsetsRequest {
            replica_id: -1,
            topic: topic.to_string(),
            partition,
            timestamp: offset.value(),
        };
        let response: ListOffsetsResponse =
            self.round_trip(ApiKey::ListOffsets, &request, deadline).await?;
        check(response.error_code)?;

        debug!(
            "Resolved {} offset of {}:{} to {}",
            offset, topic, partition, response.offset
        );
        Ok(Offset::new(response.offset))
    }

    /// Append `messages` to a partition as one record batch.
    ///
    /// Returns the offset the broker assigned to the first message, or `None`
    /// when no acknowledgement was requested.
    pub async fn produce(
        &mut self,
        topic: &str,
        partition: i32,
        messages: &[Message],
        acks: RequiredAcks,
        timeout: Duration,
        deadline: Option<Instant>,
    ) -> Result<Option<Offset>, ClientError> {
        let request = ProduceRequest {
            transactional_id: None,
            acks: acks as i16,
            timeout_ms: duration_ms(timeout),
            topic: topic.to_string(),
            partition,
            records: encode_record_batch(messages, 0, Utc::now())?,
        };

        if acks == RequiredAcks::None {
            self.send(ApiKey::Produce, &request, deadline).await?;
            return Ok(None);
        }

        let response: ProduceResponse = self.round_trip(ApiKey::Produce, &request, deadline).await?;
        check(response.error_code)?;

        debug!(
            "Produced {} messages to {}:{} at base offset {}",
            messages.len(),
            topic,
            partition,
            response.base_offset
        );
        Ok(Some(Offset::new(response.base_offset)))
    }

    /// Fetch records starting at `offset`, letting the broker hold the
    /// request for up to `max_wait` while no data is available.
    pub async fn fetch(
        &mut self,
        topic: &str,
        partition: i32,
        offset: Offset,
        max_bytes: usize,
        max_wait: Duration,
        deadline: Option<Instant>,
    ) -> Result<FetchResponse, ClientError> {
        let max_bytes = i32::try_from(max_bytes).unwrap_or(i32::MAX);
        let request = FetchRequest {
            replica_id: -1,
            max_wait_ms: duration_ms(max_wait),
            min_bytes: 1,
            max_bytes,
            isolation_level: 0,
            topic: topic.to_string(),
            partition,
            fetch_offset: offset.value(),
            partition_max_bytes: max_bytes,
        };

        let response: FetchResponse = self.round_trip(ApiKey::Fetch, &request, deadline).await?;
        check(response.error_code)?;
        Ok(response)
    }

    pub async fn close(mut self) -> Result<(), ClientError> {
        debug!("Closing connection to {}", self.address);
        self.stream.shutdown().await?;
        Ok(())
    }

    async fn round_trip<Req, Resp>(
        &mut self,
        api_key: ApiKey,
        request: &Req,
        deadline: Option<Instant>,
    ) -> Result<Resp, ClientError>
    where
        Req: KafkaEncodable,
        Resp: KafkaDecodable,
    {
        let (frame, correlation_id) = self.frame(api_key, request)?;

        // stays set if this future is dropped mid-request
        self.broken = true;
        let result = match deadline {
            Some(deadline) => timeout_at(deadline, self.exchange(frame, correlation_id))
                .await
                .unwrap_or(Err(ClientError::Timeout)),
            None => self.exchange(frame, correlation_id).await,
        };
        let mut payload = self.track(result)?;

        Resp::decode(&mut payload).map_err(|e| {
            ClientError::protocol(format!("Malformed {:?} response: {}", api_key, e))
        })
    }

    async fn send<Req: KafkaEncodable>(
        &mut self,
        api_key: ApiKey,
        request: &Req,
        deadline: Option<Instant>,
    ) -> Result<(), ClientError> {
        let (frame, _) = self.frame(api_key, request)?;

        self.broken = true;
        let result = match deadline {
            Some(deadline) => timeout_at(deadline, self.write_frame(frame))
                .await
                .unwrap_or(Err(ClientError::Timeout)),
            None => self.write_frame(frame).await,
        };
        self.track(result)
    }

    fn frame<Req: KafkaEncodable>(
        &mut self,
        api_key: ApiKey,
        request: &Req,
    ) -> Result<(BytesMut, i32), ClientError> {
        if self.broken {
            return Err(ClientError::ConnectionBroken);
        }

        self.correlation_id = self.correlation_id.wrapping_add(1);
        let header = RequestHeader {
            api_key,
            api_version: api_key.version(),
            correlation_id: self.correlation_id,
            client_id: Some(self.client_id.clone()),
        };

        let mut body = BytesMut::new();
        header.encode(&mut body)?;
        request.encode(&mut body)?;

        // Prepend message size
        let mut frame = BytesMut::with_capacity(4 + body.len());
        encode_i32(&mut frame, body.len() as i32);
        frame.extend_from_slice(&body);

        Ok((frame, self.correlation_id))
    }

    /// Keep the connection marked broken only when a request failed at the
    /// transport level
    fn track<T>(&mut self, result: Result<T, ClientError>) -> Result<T, ClientError> {
        match &result {
            Err(e @ (ClientError::Io(_) | ClientError::Timeout)) => {
                warn!("Request to {} failed, dropping connection: {}", self.address, e);
            }
            _ => self.broken = false,
        }
        result
    }

    async fn write_frame(&mut self, frame: BytesMut) -> Result<(), ClientError> {
        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn exchange(&mut self, frame: BytesMut, correlation_id: i32) -> Result<BytesMut, ClientError> {
        self.write_frame(frame).await?;

        let mut size_buf = [0u8; 4];
        self.stream.read_exact(&mut size_buf).await?;
        let size = i32::from_be_bytes(size_buf);
        if size < 4 || size as usize > MAX_RESPONSE_SIZE {
            return Err(ClientError::protocol(format!("Invalid response size: {}", size)));
        }

        let mut payload = vec![0u8; size as usize];
        self.stream.read_exact(&mut payload).await?;

        let mut buf = BytesMut::from(&payload[..]);
        let header = ResponseHeader::decode(&mut buf)?;
        if header.correlation_id != correlation_id {
            return Err(ClientError::protocol(format!(
                "Correlation id mismatch: sent {}, received {}",
                correlation_id, header.correlation_id
            )));
        }

        Ok(buf)
    }
}

/// Ask the broker at `address` who leads `topic`/`partition` and connect to it
pub async fn dial_partition_leader(
    address: &str,
    topic: &str,
    partition: i32,
) -> Result<BrokerConnection, ClientError> {
    let mut bootstrap = BrokerConnection::dial(address).await?;
    let leader = bootstrap.lookup_leader(topic, partition).await;
    if let Err(e) = bootstrap.close().await {
        debug!("Error closing bootstrap connection: {}", e);
    }
    let leader = leader?;

    debug!(
        "Partition {}:{} is led by broker {} at {}",
        topic,
        partition,
        leader.node_id,
        leader.address()
    );
    BrokerConnection::dial(&leader.address()).await
}

fn check(error_code: i16) -> Result<(), ClientError> {
    let code = KafkaErrorCode(error_code);
    if code.is_error() {
        return Err(ClientError::Broker(code));
    }
    Ok(())
}

fn duration_ms(duration: Duration) -> i32 {
    i32::try_from(duration.as_millis()).unwrap_or(i32::MAX)
}
