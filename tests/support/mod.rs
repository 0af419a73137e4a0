//! In-process broker speaking the subset of the Kafka protocol the client uses

#![allow(dead_code)]

use bytes::BytesMut;
use chrono::Utc;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use kafka_purge::domain::entities::Message;
use kafka_purge::domain::error_codes::KafkaErrorCode;
use kafka_purge::domain::value_objects::Offset;
use kafka_purge::infrastructure::protocol::{
    encode_i32, ApiKey, BrokerMetadata, FetchRequest, FetchResponse, KafkaDecodable,
    KafkaEncodable, ListOffsetsRequest, ListOffsetsResponse, MetadataRequest, MetadataResponse,
    PartitionMetadata, ProduceRequest, ProduceResponse, RequestHeader, ResponseHeader,
    TopicMetadata,
};
use kafka_purge::infrastructure::records::{decode_records, encode_record_batch};

/// Longest an empty fetch is held before answering
const MAX_FETCH_HOLD: Duration = Duration::from_millis(100);

const NO_HANG_UP: i64 = i64::MAX;

#[derive(Default)]
struct BrokerState {
    port: u16,
    partitions: DashMap<String, i32>,
    logs: DashMap<(String, i32), Vec<Message>>,
    hang_up_at: AtomicI64,
    produce_delay_ms: AtomicU64,
}

/// A single-node broker bound to an ephemeral localhost port
pub struct MockBroker {
    addr: SocketAddr,
    state: Arc<BrokerState>,
}

impl MockBroker {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(BrokerState {
            port: addr.port(),
            hang_up_at: AtomicI64::new(NO_HANG_UP),
            ..BrokerState::default()
        });

        let accept_state = state.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = accept_state.clone();
                tokio::spawn(async move {
                    let _ = handle(stream, state).await;
                });
            }
        });

        Self { addr, state }
    }

    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    pub fn create_topic(&self, topic: &str, partitions: i32) {
        self.state.partitions.insert(topic.to_string(), partitions);
        for partition in 0..partitions {
            self.state.logs.insert((topic.to_string(), partition), Vec::new());
        }
    }

    /// Close any connection that fetches at or beyond `offset`
    pub fn hang_up_at(&self, offset: i64) {
        self.state.hang_up_at.store(offset, Ordering::SeqCst);
    }

    /// Hold every produce reply for `delay` after the records are appended
    pub fn delay_produce_replies(&self, delay: Duration) {
        self.state
            .produce_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Everything appended to a partition, in offset order
    pub fn log(&self, topic: &str, partition: i32) -> Vec<Message> {
        self.state
            .logs
            .get(&(topic.to_string(), partition))
            .map(|log| log.value().clone())
            .unwrap_or_default()
    }
}

async fn handle(mut stream: TcpStream, state: Arc<BrokerState>) -> anyhow::Result<()> {
    loop {
        let mut size_buf = [0u8; 4];
        if stream.read_exact(&mut size_buf).await.is_err() {
            return Ok(());
        }
        let size = i32::from_be_bytes(size_buf) as usize;
        let mut payload = vec![0u8; size];
        stream.read_exact(&mut payload).await?;

        let mut buf = BytesMut::from(&payload[..]);
        let header = RequestHeader::decode(&mut buf)?;
        let mut body = BytesMut::new();
        ResponseHeader {
            correlation_id: header.correlation_id,
        }
        .encode(&mut body)?;

        match header.api_key {
            ApiKey::Metadata => {
                let request = MetadataRequest::decode(&mut buf)?;
                metadata(&state, request).encode(&mut body)?;
            }
            ApiKey::ListOffsets => {
                let request = ListOffsetsRequest::decode(&mut buf)?;
                list_offsets(&state, request).encode(&mut body)?;
            }
            ApiKey::Produce => {
                let request = ProduceRequest::decode(&mut buf)?;
                let acks = request.acks;
                let response = produce(&state, request)?;
                let delay = state.produce_delay_ms.load(Ordering::SeqCst);
                if delay > 0 {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                if acks == 0 {
                    continue;
                }
                response.encode(&mut body)?;
            }
            ApiKey::Fetch => {
                let request = FetchRequest::decode(&mut buf)?;
                if request.fetch_offset >= state.hang_up_at.load(Ordering::SeqCst) {
                    return Ok(());
                }
                fetch(&state, request).await?.encode(&mut body)?;
            }
        }

        let mut frame = BytesMut::new();
        encode_i32(&mut frame, body.len() as i32);
        frame.extend_from_slice(&body);
        stream.write_all(&frame).await?;
        stream.flush().await?;
    }
}

fn metadata(state: &BrokerState, request: MetadataRequest) -> MetadataResponse {
    let names: Vec<String> = match request.topics {
        Some(topics) => topics,
        None => state.partitions.iter().map(|e| e.key().clone()).collect(),
    };

    let topics = names
        .into_iter()
        .map(|name| match state.partitions.get(&name) {
            Some(count) => TopicMetadata {
                error_code: 0,
                name: name.clone(),
                is_internal: false,
                partitions: (0..*count)
                    .map(|partition| PartitionMetadata {
                        error_code: 0,
                        partition,
                        leader: 0,
                        replicas: vec![0],
                        isr: vec![0],
                    })
                    .collect(),
            },
            None => TopicMetadata {
                error_code: KafkaErrorCode::UNKNOWN_TOPIC_OR_PARTITION.0,
                name,
                is_internal: false,
                partitions: Vec::new(),
            },
        })
        .collect();

    MetadataResponse {
        brokers: vec![BrokerMetadata {
            node_id: 0,
            host: "127.0.0.1".to_string(),
            port: state.port as i32,
            rack: None,
        }],
        controller_id: 0,
        topics,
    }
}

fn list_offsets(state: &BrokerState, request: ListOffsetsRequest) -> ListOffsetsResponse {
    let key = (request.topic.clone(), request.partition);
    let (error_code, offset) = match state.logs.get(&key) {
        Some(log) if request.timestamp == Offset::LATEST.value() => (0, log.len() as i64),
        Some(_) => (0, 0),
        None => (KafkaErrorCode::UNKNOWN_TOPIC_OR_PARTITION.0, -1),
    };

    ListOffsetsResponse {
        topic: request.topic,
        partition: request.partition,
        error_code,
        timestamp: -1,
        offset,
    }
}

fn produce(state: &BrokerState, request: ProduceRequest) -> anyhow::Result<ProduceResponse> {
    let key = (request.topic.clone(), request.partition);
    let mut response = ProduceResponse {
        topic: request.topic.clone(),
        partition: request.partition,
        error_code: 0,
        base_offset: -1,
        log_append_time: -1,
        throttle_time_ms: 0,
    };

    let Some(mut log) = state.logs.get_mut(&key) else {
        response.error_code = KafkaErrorCode::UNKNOWN_TOPIC_OR_PARTITION.0;
        return Ok(response);
    };

    let decoded = decode_records(&request.records, request.partition, 0)?;
    let base_offset = log.len() as i64;
    for (i, mut message) in decoded.messages.into_iter().enumerate() {
        message.offset = Some(Offset::new(base_offset + i as i64));
        log.push(message);
    }

    response.base_offset = base_offset;
    Ok(response)
}

async fn fetch(state: &BrokerState, request: FetchRequest) -> anyhow::Result<FetchResponse> {
    let key = (request.topic.clone(), request.partition);
    let mut response = FetchResponse {
        throttle_time_ms: 0,
        topic: request.topic.clone(),
        partition: request.partition,
        error_code: 0,
        high_watermark: -1,
        last_stable_offset: -1,
        records: None,
    };

    let available: Option<Vec<Message>> = state.logs.get(&key).map(|log| {
        log.iter()
            .skip(request.fetch_offset.max(0) as usize)
            .cloned()
            .collect()
    });
    let Some(available) = available else {
        response.error_code = KafkaErrorCode::UNKNOWN_TOPIC_OR_PARTITION.0;
        return Ok(response);
    };

    let high_watermark = request.fetch_offset + available.len() as i64;
    response.high_watermark = high_watermark;
    response.last_stable_offset = high_watermark;

    if available.is_empty() {
        let wait = Duration::from_millis(request.max_wait_ms.max(0) as u64).min(MAX_FETCH_HOLD);
        tokio::time::sleep(wait).await;
        response.records = Some(Default::default());
    } else {
        response.records = Some(encode_record_batch(&available, request.fetch_offset, Utc::now())?);
    }
    Ok(response)
}
