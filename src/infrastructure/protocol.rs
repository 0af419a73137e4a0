use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;

/// Kafka API keys for the request types this client speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKey {
    Produce = 0,
    Fetch = 1,
    ListOffsets = 2,
    Metadata = 3,
}

impl ApiKey {
    /// Request version sent for each API
    pub fn version(&self) -> i16 {
        match self {
            ApiKey::Produce => 3,
            ApiKey::Fetch => 4,
            ApiKey::ListOffsets => 1,
            ApiKey::Metadata => 1,
        }
    }
}

impl TryFrom<i16> for ApiKey {
    type Error = &'static str;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ApiKey::Produce),
            1 => Ok(ApiKey::Fetch),
            2 => Ok(ApiKey::ListOffsets),
            3 => Ok(ApiKey::Metadata),
            _ => Err("Unknown API key"),
        }
    }
}

/// Kafka request header (v1)
#[derive(Debug, Clone)]
pub struct RequestHeader {
    pub api_key: ApiKey,
    pub api_version: i16,
    pub correlation_id: i32,
    pub client_id: Option<String>,
}

/// Kafka response header (v0)
#[derive(Debug, Clone)]
pub struct ResponseHeader {
    pub correlation_id: i32,
}

/// Trait for encoding Kafka protocol messages
pub trait KafkaEncodable {
    fn encode(&self, buf: &mut BytesMut) -> io::Result<()>;
}

/// Trait for decoding Kafka protocol messages
pub trait KafkaDecodable: Sized {
    fn decode(buf: &mut BytesMut) -> io::Result<Self>;
}

fn not_enough_bytes() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, "Not enough bytes")
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

// Helper functions for encoding/decoding primitive types

pub fn encode_i8(buf: &mut BytesMut, value: i8) {
    buf.put_i8(value);
}

pub fn decode_i8(buf: &mut BytesMut) -> io::Result<i8> {
    if buf.remaining() < 1 {
        return Err(not_enough_bytes());
    }
    Ok(buf.get_i8())
}

pub fn encode_i16(buf: &mut BytesMut, value: i16) {
    buf.put_i16(value);
}

pub fn decode_i16(buf: &mut BytesMut) -> io::Result<i16> {
    if buf.remaining() < 2 {
        return Err(not_enough_bytes());
    }
    Ok(buf.get_i16())
}

pub fn encode_i32(buf: &mut BytesMut, value: i32) {
    buf.put_i32(value);
}

pub fn decode_i32(buf: &mut BytesMut) -> io::Result<i32> {
    if buf.remaining() < 4 {
        return Err(not_enough_bytes());
    }
    Ok(buf.get_i32())
}

pub fn encode_i64(buf: &mut BytesMut, value: i64) {
    buf.put_i64(value);
}

pub fn decode_i64(buf: &mut BytesMut) -> io::Result<i64> {
    if buf.remaining() < 8 {
        return Err(not_enough_bytes());
    }
    Ok(buf.get_i64())
}

pub fn encode_string(buf: &mut BytesMut, value: Option<&str>) -> io::Result<()> {
    match value {
        Some(s) => {
            let bytes = s.as_bytes();
            let len = i16::try_from(bytes.len()).map_err(|_| invalid("String too long"))?;
            encode_i16(buf, len);
            buf.put_slice(bytes);
        }
        None => {
            encode_i16(buf, -1);
        }
    }
    Ok(())
}

pub fn decode_string(buf: &mut BytesMut) -> io::Result<Option<String>> {
    let len = decode_i16(buf)?;
    if len == -1 {
        return Ok(None);
    }
    if len < 0 {
        return Err(invalid("Invalid string length"));
    }
    if buf.remaining() < len as usize {
        return Err(not_enough_bytes());
    }

    let bytes = buf.split_to(len as usize);
    let s = String::from_utf8(bytes.to_vec()).map_err(|_| invalid("Invalid UTF-8"))?;
    Ok(Some(s))
}

/// Decode a string the protocol declares non-nullable
pub fn decode_required_string(buf: &mut BytesMut, field: &str) -> io::Result<String> {
    decode_string(buf)?.ok_or_else(|| invalid(&format!("{} cannot be null", field)))
}

pub fn encode_bytes(buf: &mut BytesMut, value: Option<&[u8]>) -> io::Result<()> {
    match value {
        Some(bytes) => {
            let len = i32::try_from(bytes.len()).map_err(|_| invalid("Bytes too long"))?;
            encode_i32(buf, len);
            buf.put_slice(bytes);
        }
        None => {
            encode_i32(buf, -1);
        }
    }
    Ok(())
}

pub fn decode_bytes(buf: &mut BytesMut) -> io::Result<Option<Bytes>> {
    let len = decode_i32(buf)?;
    if len == -1 {
        return Ok(None);
    }
    if len < 0 {
        return Err(invalid("Invalid bytes length"));
    }
    if buf.remaining() < len as usize {
        return Err(not_enough_bytes());
    }

    Ok(Some(buf.split_to(len as usize).freeze()))
}

/// Read an array length; `None` for a null array
pub fn decode_array_len(buf: &mut BytesMut) -> io::Result<Option<usize>> {
    let len = decode_i32(buf)?;
    match len {
        -1 => Ok(None),
        n if n < 0 => Err(invalid("Invalid array length")),
        n => Ok(Some(n as usize)),
    }
}

pub fn decode_i32_array(buf: &mut BytesMut) -> io::Result<Vec<i32>> {
    let len = decode_array_len(buf)?.unwrap_or(0);
    (0..len).map(|_| decode_i32(buf)).collect()
}

pub fn encode_i32_array(buf: &mut BytesMut, values: &[i32]) {
    encode_i32(buf, values.len() as i32);
    for value in values {
        encode_i32(buf, *value);
    }
}

// Zig-zag variable length integers used inside record batches

pub fn encode_varint(buf: &mut BytesMut, value: i32) {
    encode_unsigned_varint(buf, ((value << 1) ^ (value >> 31)) as u32 as u64);
}

pub fn encode_varlong(buf: &mut BytesMut, value: i64) {
    encode_unsigned_varint(buf, ((value << 1) ^ (value >> 63)) as u64);
}

fn encode_unsigned_varint(buf: &mut BytesMut, mut value: u64) {
    while value >= 0x80 {
        buf.put_u8((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

fn decode_unsigned_varint<B: Buf>(buf: &mut B, max_bytes: usize) -> io::Result<u64> {
    let mut value = 0u64;
    for i in 0..max_bytes {
        if !buf.has_remaining() {
            return Err(not_enough_bytes());
        }
        let byte = buf.get_u8();
        value |= ((byte & 0x7f) as u64) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(invalid("Varint is too long"))
}

pub fn decode_varint<B: Buf>(buf: &mut B) -> io::Result<i32> {
    let raw = decode_unsigned_varint(buf, 5)? as u32;
    Ok(((raw >> 1) as i32) ^ -((raw & 1) as i32))
}

pub fn decode_varlong<B: Buf>(buf: &mut B) -> io::Result<i64> {
    let raw = decode_unsigned_varint(buf, 10)?;
    Ok(((raw >> 1) as i64) ^ -((raw & 1) as i64))
}

/// Number of bytes `encode_varint` writes for `value`
pub fn varint_len(value: i32) -> usize {
    let mut raw = ((value << 1) ^ (value >> 31)) as u32;
    let mut len = 1;
    while raw >= 0x80 {
        raw >>= 7;
        len += 1;
    }
    len
}

impl KafkaEncodable for RequestHeader {
    fn encode(&self, buf: &mut BytesMut) -> io::Result<()> {
        encode_i16(buf, self.api_key as i16);
        encode_i16(buf, self.api_version);
        encode_i32(buf, self.correlation_id);
        encode_string(buf, self.client_id.as_deref())?;
        Ok(())
    }
}

impl KafkaDecodable for RequestHeader {
    fn decode(buf: &mut BytesMut) -> io::Result<Self> {
        let api_key_raw = decode_i16(buf)?;
        let api_key = ApiKey::try_from(api_key_raw).map_err(invalid)?;
        let api_version = decode_i16(buf)?;
        let correlation_id = decode_i32(buf)?;
        let client_id = decode_string(buf)?;

        Ok(RequestHeader {
            api_key,
            api_version,
            correlation_id,
            client_id,
        })
    }
}

impl KafkaEncodable for ResponseHeader {
    fn encode(&self, buf: &mut BytesMut) -> io::Result<()> {
        encode_i32(buf, self.correlation_id);
        Ok(())
    }
}

impl KafkaDecodable for ResponseHeader {
    fn decode(buf: &mut BytesMut) -> io::Result<Self> {
        let correlation_id = decode_i32(buf)?;
        Ok(ResponseHeader { correlation_id })
    }
}

/// Metadata request (v1)
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataRequest {
    /// `None` asks for every topic
    pub topics: Option<Vec<String>>,
}

impl KafkaEncodable for MetadataRequest {
    fn encode(&self, buf: &mut BytesMut) -> io::Result<()> {
        match &self.topics {
            Some(topics) => {
                encode_i32(buf, topics.len() as i32);
                for topic in topics {
                    encode_string(buf, Some(topic.as_str()))?;
                }
            }
            None => encode_i32(buf, -1),
        }
        Ok(())
    }
}

impl KafkaDecodable for MetadataRequest {
    fn decode(buf: &mut BytesMut) -> io::Result<Self> {
        let topics = match decode_array_len(buf)? {
            Some(len) => Some(
                (0..len)
                    .map(|_| decode_required_string(buf, "Topic"))
                    .collect::<io::Result<Vec<_>>>()?,
            ),
            None => None,
        };
        Ok(MetadataRequest { topics })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BrokerMetadata {
    pub node_id: i32,
    pub host: String,
    pub port: i32,
    pub rack: Option<String>,
}

impl BrokerMetadata {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartitionMetadata {
    pub error_code: i16,
    pub partition: i32,
    pub leader: i32,
    pub replicas: Vec<i32>,
    pub isr: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopicMetadata {
    pub error_code: i16,
    pub name: String,
    pub is_internal: bool,
    pub partitions: Vec<PartitionMetadata>,
}

/// Metadata response (v1)
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataResponse {
    pub brokers: Vec<BrokerMetadata>,
    pub controller_id: i32,
    pub topics: Vec<TopicMetadata>,
}

impl KafkaEncodable for MetadataResponse {
    fn encode(&self, buf: &mut BytesMut) -> io::Result<()> {
        encode_i32(buf, self.brokers.len() as i32);
        for broker in &self.brokers {
            encode_i32(buf, broker.node_id);
            encode_string(buf, Some(broker.host.as_str()))?;
            encode_i32(buf, broker.port);
            encode_string(buf, broker.rack.as_deref())?;
        }

        encode_i32(buf, self.controller_id);

        encode_i32(buf, self.topics.len() as i32);
        for topic in &self.topics {
            encode_i16(buf, topic.error_code);
            encode_string(buf, Some(topic.name.as_str()))?;
            encode_i8(buf, topic.is_internal as i8);

            encode_i32(buf, topic.partitions.len() as i32);
            for partition in &topic.partitions {
                encode_i16(buf, partition.error_code);
                encode_i32(buf, partition.partition);
                encode_i32(buf, partition.leader);
                encode_i32_array(buf, &partition.replicas);
                encode_i32_array(buf, &partition.isr);
            }
        }
        Ok(())
    }
}

impl KafkaDecodable for MetadataResponse {
    fn decode(buf: &mut BytesMut) -> io::Result<Self> {
        let broker_count = decode_array_len(buf)?.unwrap_or(0);
        let mut brokers = Vec::with_capacity(broker_count);
        for _ in 0..broker_count {
            brokers.push(BrokerMetadata {
                node_id: decode_i32(buf)?,
                host: decode_required_string(buf, "Broker host")?,
                port: decode_i32(buf)?,
                rack: decode_string(buf)?,
            });
        }

        let controller_id = decode_i32(buf)?;

        let topic_count = decode_array_len(buf)?.unwrap_or(0);
        let mut topics = Vec::with_capacity(topic_count);
        for _ in 0..topic_count {
            let error_code = decode_i16(buf)?;
            let name = decode_required_string(buf, "Topic")?;
            let is_internal = decode_i8(buf)? != 0;

            let partition_count = decode_array_len(buf)?.unwrap_or(0);
            let mut partitions = Vec::with_capacity(partition_count);
            for _ in 0..partition_count {
                partitions.push(PartitionMetadata {
                    error_code: decode_i16(buf)?,
                    partition: decode_i32(buf)?,
                    leader: decode_i32(buf)?,
                    replicas: decode_i32_array(buf)?,
                    isr: decode_i32_array(buf)?,
                });
            }

            topics.push(TopicMetadata {
                error_code,
                name,
                is_internal,
                partitions,
            });
        }

        Ok(MetadataResponse {
            brokers,
            controller_id,
            topics,
        })
    }
}

/// Reads the exactly-one-element arrays this client sends and expects back
fn expect_single(buf: &mut BytesMut, what: &str) -> io::Result<()> {
    match decode_array_len(buf)? {
        Some(1) => Ok(()),
        _ => Err(invalid(&format!("Expected exactly one {}", what))),
    }
}

/// ListOffsets request (v1), single topic and partition
#[derive(Debug, Clone, PartialEq)]
pub struct ListOffsetsRequest {
    pub replica_id: i32,
    pub topic: String,
    pub partition: i32,
    /// -2 for the earliest offset, -1 for the latest
    pub timestamp: i64,
}

impl KafkaEncodable for ListOffsetsRequest {
    fn encode(&self, buf: &mut BytesMut) -> io::Result<()> {
        encode_i32(buf, self.replica_id);
        encode_i32(buf, 1);
        encode_string(buf, Some(self.topic.as_str()))?;
        encode_i32(buf, 1);
        encode_i32(buf, self.partition);
        encode_i64(buf, self.timestamp);
        Ok(())
    }
}

impl KafkaDecodable for ListOffsetsRequest {
    fn decode(buf: &mut BytesMut) -> io::Result<Self> {
        let replica_id = decode_i32(buf)?;
        expect_single(buf, "topic")?;
        let topic = decode_required_string(buf, "Topic")?;
        expect_single(buf, "partition")?;
        let partition = decode_i32(buf)?;
        let timestamp = decode_i64(buf)?;

        Ok(ListOffsetsRequest {
            replica_id,
            topic,
            partition,
            timestamp,
        })
    }
}

/// ListOffsets response (v1), single topic and partition
#[derive(Debug, Clone, PartialEq)]
pub struct ListOffsetsResponse {
    pub topic: String,
    pub partition: i32,
    pub error_code: i16,
    pub timestamp: i64,
    pub offset: i64,
}

impl KafkaEncodable for ListOffsetsResponse {
    fn encode(&self, buf: &mut BytesMut) -> io::Result<()> {
        encode_i32(buf, 1);
        encode_string(buf, Some(self.topic.as_str()))?;
        encode_i32(buf, 1);
        encode_i32(buf, self.partition);
        encode_i16(buf, self.error_code);
        encode_i64(buf, self.timestamp);
        encode_i64(buf, self.offset);
        Ok(())
    }
}

impl KafkaDecodable for ListOffsetsResponse {
    fn decode(buf: &mut BytesMut) -> io::Result<Self> {
        expect_single(buf, "topic")?;
        let topic = decode_required_string(buf, "Topic")?;
        expect_single(buf, "partition")?;

        Ok(ListOffsetsResponse {
            topic,
            partition: decode_i32(buf)?,
            error_code: decode_i16(buf)?,
            timestamp: decode_i64(buf)?,
            offset: decode_i64(buf)?,
        })
    }
}

/// Produce request (v3), single topic and partition
#[derive(Debug, Clone, PartialEq)]
pub struct ProduceRequest {
    pub transactional_id: Option<String>,
    pub acks: i16,
    pub timeout_ms: i32,
    pub topic: String,
    pub partition: i32,
    /// Encoded record batch
    pub records: Bytes,
}

impl KafkaEncodable for ProduceRequest {
    fn encode(&self, buf: &mut BytesMut) -> io::Result<()> {
        encode_string(buf, self.transactional_id.as_deref())?;
        encode_i16(buf, self.acks);
        encode_i32(buf, self.timeout_ms);
        encode_i32(buf, 1);
        encode_string(buf, Some(self.topic.as_str()))?;
        encode_i32(buf, 1);
        encode_i32(buf, self.partition);
        encode_bytes(buf, Some(self.records.as_ref()))?;
        Ok(())
    }
}

impl KafkaDecodable for ProduceRequest {
    fn decode(buf: &mut BytesMut) -> io::Result<Self> {
        let transactional_id = decode_string(buf)?;
        let acks = decode_i16(buf)?;
        let timeout_ms = decode_i32(buf)?;
        expect_single(buf, "topic")?;
        let topic = decode_required_string(buf, "Topic")?;
        expect_single(buf, "partition")?;
        let partition = decode_i32(buf)?;
        let records = decode_bytes(buf)?.unwrap_or_default();

        Ok(ProduceRequest {
            transactional_id,
            acks,
            timeout_ms,
            topic,
            partition,
            records,
        })
    }
}

/// Produce response (v3), single topic and partition
#[derive(Debug, Clone, PartialEq)]
pub struct ProduceResponse {
    pub topic: String,
    pub partition: i32,
    pub error_code: i16,
    pub base_offset: i64,
    pub log_append_time: i64,
    pub throttle_time_ms: i32,
}

impl KafkaEncodable for ProduceResponse {
    fn encode(&self, buf: &mut BytesMut) -> io::Result<()> {
        encode_i32(buf, 1);
        encode_string(buf, Some(self.topic.as_str()))?;
        encode_i32(buf, 1);
        encode_i32(buf, self.partition);
        encode_i16(buf, self.error_code);
        encode_i64(buf, self.base_offset);
        encode_i64(buf, self.log_append_time);
        encode_i32(buf, self.throttle_time_ms);
        Ok(())
    }
}

impl KafkaDecodable for ProduceResponse {
    fn decode(buf: &mut BytesMut) -> io::Result<Self> {
        expect_single(buf, "topic")?;
        let topic = decode_required_string(buf, "Topic")?;
        expect_single(buf, "partition")?;

        Ok(ProduceResponse {
            topic,
            partition: decode_i32(buf)?,
            error_code: decode_i16(buf)?,
            base_offset: decode_i64(buf)?,
            log_append_time: decode_i64(buf)?,
            throttle_time_ms: decode_i32(buf)?,
        })
    }
}

/// Fetch request (v4), single topic and partition
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub replica_id: i32,
    pub max_wait_ms: i32,
    pub min_bytes: i32,
    pub max_bytes: i32,
    pub isolation_level: i8,
    pub topic: String,
    pub partition: i32,
    pub fetch_offset: i64,
    pub partition_max_bytes: i32,
}

impl KafkaEncodable for FetchRequest {
    fn encode(&self, buf: &mut BytesMut) -> io::Result<()> {
        encode_i32(buf, self.replica_id);
        encode_i32(buf, self.max_wait_ms);
        encode_i32(buf, self.min_bytes);
        encode_i32(buf, self.max_bytes);
        encode_i8(buf, self.isolation_level);
        encode_i32(buf, 1);
        encode_string(buf, Some(self.topic.as_str()))?;
        encode_i32(buf, 1);
        encode_i32(buf, self.partition);
        encode_i64(buf, self.fetch_offset);
        encode_i32(buf, self.partition_max_bytes);
        Ok(())
    }
}

impl KafkaDecodable for FetchRequest {
    fn decode(buf: &mut BytesMut) -> io::Result<Self> {
        let replica_id = decode_i32(buf)?;
        let max_wait_ms = decode_i32(buf)?;
        let min_bytes = decode_i32(buf)?;
        let max_bytes = decode_i32(buf)?;
        let isolation_level = decode_i8(buf)?;
        expect_single(buf, "topic")?;
        let topic = decode_required_string(buf, "Topic")?;
        expect_single(buf, "partition")?;

        Ok(FetchRequest {
            replica_id,
            max_wait_ms,
            min_bytes,
            max_bytes,
            isolation_level,
            topic,
            partition: decode_i32(buf)?,
            fetch_offset: decode_i64(buf)?,
            partition_max_bytes: decode_i32(buf)?,
        })
    }
}

/// Fetch response (v4), single topic and partition
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    pub throttle_time_ms: i32,
    pub topic: String,
    pub partition: i32,
    pub error_code: i16,
    pub high_watermark: i64,
    pub last_stable_offset: i64,
    /// Raw record batches, possibly ending in a truncated batch
    pub records: Option<Bytes>,
}

impl KafkaEncodable for FetchResponse {
    fn encode(&self, buf: &mut BytesMut) -> io::Result<()> {
        encode_i32(buf, self.throttle_time_ms);
        encode_i32(buf, 1);
        encode_string(buf, Some(self.topic.as_str()))?;
        encode_i32(buf, 1);
        encode_i32(buf, self.partition);
        encode_i16(buf, self.error_code);
        encode_i64(buf, self.high_watermark);
        encode_i64(buf, self.last_stable_offset);
        // No aborted transactions
        encode_i32(buf, -1);
        encode_bytes(buf, self.records.as_deref())?;
        Ok(())
    }
}

impl KafkaDecodable for FetchResponse {
    fn decode(buf: &mut BytesMut) -> io::Result<Self> {
        let throttle_time_ms = decode_i32(buf)?;
        expect_single(buf, "topic")?;
        let topic = decode_required_string(buf, "Topic")?;
        expect_single(buf, "partition")?;
        let partition = decode_i32(buf)?;
        let error_code = decode_i16(buf)?;
        let high_watermark = decode_i64(buf)?;
        let last_stable_offset = decode_i64(buf)?;

        // Aborted transactions: (producer_id, first_offset) pairs, unused here
        let aborted = decode_array_len(buf)?.unwrap_or(0);
        for _ in 0..aborted {
            decode_i64(buf)?;
            decode_i64(buf)?;
        }

        let records = decode_bytes(buf)?;

        Ok(FetchResponse {
            throttle_time_ms,
            topic,
            partition,
            error_code,
            high_watermark,
            last_stable_offset,
            records,
        })
    }
}
