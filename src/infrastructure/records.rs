//! Record batch codec.
//!
//! Writes always use the v2 record batch format (magic 2, CRC-32C), which is
//! the first format able to carry headers. Reads also accept the legacy
//! message set formats (magic 0 and 1, CRC-32) that older brokers and old log
//! segments still return.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{DateTime, TimeZone, Utc};
use crc32fast::Hasher as Crc32Hasher;
use std::io;

use super::protocol::*;
use crate::domain::{
    entities::{Header, Message},
    errors::ClientError,
    value_objects::Offset,
};

pub const MAGIC_V0: i8 = 0;
pub const MAGIC_V1: i8 = 1;
pub const MAGIC_V2: i8 = 2;

/// offset (8) + size (4) in front of every batch or legacy message
const LOG_OVERHEAD: usize = 12;
/// Position of the magic byte, identical across all formats
const MAGIC_POSITION: usize = 16;
/// CRC-32C coverage of a v2 batch starts at the attributes field
const V2_CRC_START: usize = 21;

const COMPRESSION_MASK: i16 = 0x07;
const TIMESTAMP_TYPE_LOG_APPEND: i16 = 0x08;
const CONTROL_BATCH: i16 = 0x20;

const NO_PRODUCER_ID: i64 = -1;
const NO_PRODUCER_EPOCH: i16 = -1;
const NO_SEQUENCE: i32 = -1;
const NO_PARTITION_LEADER_EPOCH: i32 = -1;

/// Messages decoded from a fetch response
#[derive(Debug, Default)]
pub struct DecodedRecords {
    pub messages: Vec<Message>,
    /// Offset following the last complete batch, including skipped ones
    pub next_offset: Option<i64>,
}

/// Encode `messages` as a single v2 record batch starting at `base_offset`.
///
/// Messages without a timestamp are stamped with `now`.
pub fn encode_record_batch(
    messages: &[Message],
    base_offset: i64,
    now: DateTime<Utc>,
) -> Result<Bytes, ClientError> {
    if messages.is_empty() {
        return Err(ClientError::protocol("Cannot encode an empty record batch"));
    }

    let timestamps: Vec<i64> = messages
        .iter()
        .map(|m| m.timestamp.unwrap_or(now).timestamp_millis())
        .collect();
    let first_timestamp = timestamps[0];
    let max_timestamp = timestamps.iter().copied().max().unwrap_or(first_timestamp);

    let mut records = BytesMut::new();
    for (i, (message, timestamp)) in messages.iter().zip(&timestamps).enumerate() {
        let record = encode_record(message, timestamp - first_timestamp, i as i32)?;
        encode_varint(&mut records, record.len() as i32);
        records.extend_from_slice(&record);
    }

    let mut body = BytesMut::new();
    encode_i16(&mut body, 0); // attributes: no compression, create time
    encode_i32(&mut body, messages.len() as i32 - 1);
    encode_i64(&mut body, first_timestamp);
    encode_i64(&mut body, max_timestamp);
    encode_i64(&mut body, NO_PRODUCER_ID);
    encode_i16(&mut body, NO_PRODUCER_EPOCH);
    encode_i32(&mut body, NO_SEQUENCE);
    encode_i32(&mut body, messages.len() as i32);
    body.extend_from_slice(&records);

    let crc = crc32c::crc32c(&body);

    let mut batch = BytesMut::with_capacity(V2_CRC_START + body.len());
    encode_i64(&mut batch, base_offset);
    // batch length counts everything after itself
    encode_i32(&mut batch, (4 + 1 + 4 + body.len()) as i32);
    encode_i32(&mut batch, NO_PARTITION_LEADER_EPOCH);
    encode_i8(&mut batch, MAGIC_V2);
    batch.put_u32(crc);
    batch.extend_from_slice(&body);

    Ok(batch.freeze())
}

fn encode_record(message: &Message, timestamp_delta: i64, offset_delta: i32) -> io::Result<BytesMut> {
    let mut record = BytesMut::new();
    encode_i8(&mut record, 0);
    encode_varlong(&mut record, timestamp_delta);
    encode_varint(&mut record, offset_delta);
    encode_varint_bytes(&mut record, message.key.as_deref())?;
    encode_varint_bytes(&mut record, message.value.as_deref())?;

    encode_varint(&mut record, message.headers.len() as i32);
    for header in &message.headers {
        encode_varint_bytes(&mut record, Some(header.key.as_bytes()))?;
        encode_varint_bytes(&mut record, Some(&header.value[..]))?;
    }
    Ok(record)
}

fn encode_varint_bytes(buf: &mut BytesMut, value: Option<&[u8]>) -> io::Result<()> {
    match value {
        Some(bytes) => {
            let len = i32::try_from(bytes.len()).map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidInput, "Record field too long")
            })?;
            encode_varint(buf, len);
            buf.put_slice(bytes);
        }
        None => encode_varint(buf, -1),
    }
    Ok(())
}

/// Decode every complete batch or legacy message in `data`.
///
/// Records below `min_offset` are dropped; brokers return whole batches, so a
/// fetch can start in the middle of one. A trailing partial batch, left by the
/// broker's size limit, is ignored.
pub fn decode_records(data: &[u8], partition: i32, min_offset: i64) -> Result<DecodedRecords, ClientError> {
    let mut buf = BytesMut::from(data);
    let mut decoded = DecodedRecords::default();

    while buf.remaining() >= LOG_OVERHEAD {
        let size = i32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);
        if size < 0 {
            return Err(ClientError::protocol(format!("Invalid batch size {}", size)));
        }
        if buf.remaining() < LOG_OVERHEAD + size as usize {
            break;
        }
        if LOG_OVERHEAD + (size as usize) <= MAGIC_POSITION {
            return Err(ClientError::protocol("Batch too short to carry a magic byte"));
        }

        let mut entry = buf.split_to(LOG_OVERHEAD + size as usize);
        let next = match entry[MAGIC_POSITION] as i8 {
            MAGIC_V0 | MAGIC_V1 => decode_legacy_message(&mut entry, partition, min_offset, &mut decoded.messages)?,
            MAGIC_V2 => decode_batch(&mut entry, partition, min_offset, &mut decoded.messages)?,
            magic => {
                return Err(ClientError::protocol(format!("Unsupported magic byte {}", magic)));
            }
        };
        decoded.next_offset = Some(decoded.next_offset.map_or(next, |n| n.max(next)));
    }

    Ok(decoded)
}

fn decode_batch(
    entry: &mut BytesMut,
    partition: i32,
    min_offset: i64,
    out: &mut Vec<Message>,
) -> Result<i64, ClientError> {
    if entry.len() < V2_CRC_START {
        return Err(ClientError::protocol("Record batch header is truncated"));
    }
    let expected_crc = u32::from_be_bytes([entry[17], entry[18], entry[19], entry[20]]);
    let actual_crc = crc32c::crc32c(&entry[V2_CRC_START..]);
    if expected_crc != actual_crc {
        return Err(ClientError::protocol(format!(
            "Record batch CRC mismatch: expected {:08x}, computed {:08x}",
            expected_crc, actual_crc
        )));
    }

    let base_offset = decode_i64(entry)?;
    let _batch_length = decode_i32(entry)?;
    let _leader_epoch = decode_i32(entry)?;
    let _magic = decode_i8(entry)?;
    let _crc = decode_i32(entry)?;
    let attributes = decode_i16(entry)?;
    let last_offset_delta = decode_i32(entry)?;
    let first_timestamp = decode_i64(entry)?;
    let max_timestamp = decode_i64(entry)?;
    let _producer_id = decode_i64(entry)?;
    let _producer_epoch = decode_i16(entry)?;
    let _base_sequence = decode_i32(entry)?;
    let count = decode_i32(entry)?;

    let next_offset = base_offset
        .checked_add(last_offset_delta as i64 + 1)
        .ok_or_else(|| overflow("Batch offset"))?;

    if attributes & CONTROL_BATCH != 0 {
        return Ok(next_offset);
    }
    if attributes & COMPRESSION_MASK != 0 {
        return Err(ClientError::protocol(format!(
            "Compressed record batches are not supported (codec {})",
            attributes & COMPRESSION_MASK
        )));
    }
    let log_append_time = attributes & TIMESTAMP_TYPE_LOG_APPEND != 0;

    for _ in 0..count {
        let len = decode_varint(entry)?;
        let mut record = take(entry, len)?;

        let _attributes = decode_i8(&mut record)?;
        let timestamp_delta = decode_varlong(&mut record)?;
        let offset_delta = decode_varint(&mut record)?;
        let key = decode_varint_bytes(&mut record)?;
        let value = decode_varint_bytes(&mut record)?;

        let header_count = decode_varint(&mut record)?;
        let mut headers = Vec::with_capacity((header_count.max(0) as usize).min(record.remaining()));
        for _ in 0..header_count {
            let key = decode_varint_bytes(&mut record)?
                .ok_or_else(|| ClientError::protocol("Header key cannot be null"))?;
            let key = String::from_utf8(key)
                .map_err(|_| ClientError::protocol("Header key is not valid UTF-8"))?;
            let value = decode_varint_bytes(&mut record)?.unwrap_or_default();
            headers.push(Header { key, value });
        }

        let offset = base_offset
            .checked_add(offset_delta as i64)
            .ok_or_else(|| overflow("Record offset"))?;
        if offset < min_offset {
            continue;
        }

        let timestamp = if log_append_time {
            max_timestamp
        } else {
            first_timestamp
                .checked_add(timestamp_delta)
                .ok_or_else(|| overflow("Record timestamp"))?
        };

        out.push(Message {
            key,
            value,
            partition,
            offset: Some(Offset::new(offset)),
            headers,
            timestamp: timestamp_from_millis(timestamp),
        });
    }

    Ok(next_offset)
}

fn decode_legacy_message(
    entry: &mut BytesMut,
    partition: i32,
    min_offset: i64,
    out: &mut Vec<Message>,
) -> Result<i64, ClientError> {
    let offset = decode_i64(entry)?;
    let _size = decode_i32(entry)?;
    let expected_crc = decode_i32(entry)? as u32;

    let mut hasher = Crc32Hasher::new();
    hasher.update(&entry[..]);
    let actual_crc = hasher.finalize();
    if expected_crc != actual_crc {
        return Err(ClientError::protocol(format!(
            "Message CRC mismatch: expected {:08x}, computed {:08x}",
            expected_crc, actual_crc
        )));
    }

    let magic = decode_i8(entry)?;
    let attributes = decode_i8(entry)?;
    if attributes as i16 & COMPRESSION_MASK != 0 {
        return Err(ClientError::protocol(
            "Compressed message sets are not supported",
        ));
    }
    let timestamp = if magic == MAGIC_V1 {
        Some(decode_i64(entry)?)
    } else {
        None
    };
    let key = decode_bytes(entry)?.map(|b| b.to_vec());
    let value = decode_bytes(entry)?.map(|b| b.to_vec());

    if offset >= min_offset {
        out.push(Message {
            key,
            value,
            partition,
            offset: Some(Offset::new(offset)),
            headers: Vec::new(),
            timestamp: timestamp.filter(|t| *t >= 0).and_then(timestamp_from_millis),
        });
    }

    offset.checked_add(1).ok_or_else(|| overflow("Message offset"))
}

fn take(buf: &mut BytesMut, len: i32) -> Result<BytesMut, ClientError> {
    if len < 0 || buf.remaining() < len as usize {
        return Err(ClientError::protocol(format!(
            "Record length {} exceeds remaining {} bytes",
            len,
            buf.remaining()
        )));
    }
    Ok(buf.split_to(len as usize))
}

fn decode_varint_bytes(buf: &mut BytesMut) -> Result<Option<Vec<u8>>, ClientError> {
    let len = decode_varint(buf)?;
    if len == -1 {
        return Ok(None);
    }
    Ok(Some(take(buf, len)?.to_vec()))
}

fn overflow(field: &str) -> ClientError {
    ClientError::protocol(format!("{} overflows a 64-bit integer", field))
}

fn timestamp_from_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::PartitionId;

    fn sample_messages() -> Vec<Message> {
        vec![
            Message::from_value("Example 1"),
            Message::from_value(r#"{"user_id":"Example 2"}"#)
                .with_key("user_event")
                .with_header("event_type", "user_activity")
                .with_header("version", "2.9"),
            Message::tombstone_for(&Message::from_value("gone").with_key("order_event")),
        ]
    }

    fn legacy_message(offset: i64, key: Option<&[u8]>, value: &[u8], timestamp: i64) -> BytesMut {
        let mut body = BytesMut::new();
        encode_i8(&mut body, MAGIC_V1);
        encode_i8(&mut body, 0);
        encode_i64(&mut body, timestamp);
        encode_bytes(&mut body, key).unwrap();
        encode_bytes(&mut body, Some(value)).unwrap();

        let mut hasher = Crc32Hasher::new();
        hasher.update(&body);

        let mut entry = BytesMut::new();
        encode_i64(&mut entry, offset);
        encode_i32(&mut entry, 4 + body.len() as i32);
        entry.put_u32(hasher.finalize());
        entry.extend_from_slice(&body);
        entry
    }

    #[test]
    fn test_batch_preserves_keys_values_and_headers() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let batch = encode_record_batch(&sample_messages(), 40, now).unwrap();

        let decoded = decode_records(&batch, 0, 0).unwrap();

        assert_eq!(decoded.next_offset, Some(43));
        let messages = decoded.messages;
        assert_eq!(messages.len(), 3);

        assert_eq!(messages[0].key, None);
        assert_eq!(messages[0].value_text(), "Example 1");
        assert_eq!(messages[0].offset, Some(Offset::new(40)));
        assert_eq!(messages[0].timestamp, Some(now));

        assert_eq!(messages[1].key, Some(b"user_event".to_vec()));
        assert_eq!(
            messages[1].headers,
            vec![
                Header::new("event_type", "user_activity"),
                Header::new("version", "2.9"),
            ]
        );

        assert_eq!(messages[2].key, Some(b"order_event".to_vec()));
        assert!(messages[2].is_tombstone());
        assert_eq!(messages[2].offset, Some(Offset::new(42)));
    }

    #[test]
    fn test_corrupted_batch_is_rejected() {
        let batch = encode_record_batch(&sample_messages(), 0, Utc::now()).unwrap();
        let mut corrupted = batch.to_vec();
        let last = corrupted.len() - 1;
        corrupted[last] ^= 0xff;

        let err = decode_records(&corrupted, 0, 0).unwrap_err();
        assert!(err.to_string().contains("CRC mismatch"));
    }

    #[test]
    fn test_trailing_partial_batch_is_ignored() {
        let first = encode_record_batch(&sample_messages()[..1], 0, Utc::now()).unwrap();
        let second = encode_record_batch(&sample_messages(), 1, Utc::now()).unwrap();

        let mut data = first.to_vec();
        data.extend_from_slice(&second[..30]);

        let decoded = decode_records(&data, 0, 0).unwrap();
        assert_eq!(decoded.messages.len(), 1);
        assert_eq!(decoded.next_offset, Some(1));
    }

    #[test]
    fn test_records_before_fetch_offset_are_skipped() {
        let batch = encode_record_batch(&sample_messages(), 10, Utc::now()).unwrap();

        let decoded = decode_records(&batch, 0, 11).unwrap();

        let offsets: Vec<_> = decoded.messages.iter().map(|m| m.offset).collect();
        assert_eq!(offsets, vec![Some(Offset::new(11)), Some(Offset::new(12))]);
    }

    #[test]
    fn test_partition_is_stamped_on_decoded_messages() {
        let message = Message::from_value("x").with_partition(PartitionId(0));
        let batch = encode_record_batch(&[message], 0, Utc::now()).unwrap();

        let decoded = decode_records(&batch, 5, 0).unwrap();
        assert_eq!(decoded.messages[0].partition, 5);
    }

    #[test]
    fn test_control_batch_is_skipped_but_advances_offset() {
        let batch = encode_record_batch(&sample_messages(), 7, Utc::now()).unwrap();
        let mut data = batch.to_vec();
        // set the control flag and fix up the CRC
        data[V2_CRC_START + 1] |= CONTROL_BATCH as u8;
        let crc = crc32c::crc32c(&data[V2_CRC_START..]);
        data[17..21].copy_from_slice(&crc.to_be_bytes());

        let decoded = decode_records(&data, 0, 0).unwrap();
        assert!(decoded.messages.is_empty());
        assert_eq!(decoded.next_offset, Some(10));
    }

    #[test]
    fn test_compressed_batch_is_rejected() {
        let batch = encode_record_batch(&sample_messages(), 0, Utc::now()).unwrap();
        let mut data = batch.to_vec();
        data[V2_CRC_START + 1] |= 0x01; // gzip
        let crc = crc32c::crc32c(&data[V2_CRC_START..]);
        data[17..21].copy_from_slice(&crc.to_be_bytes());

        let err = decode_records(&data, 0, 0).unwrap_err();
        assert!(err.to_string().contains("not supported"));
    }

    #[test]
    fn test_legacy_message_set() {
        let mut data = legacy_message(3, Some(b"k"), b"old format", 1_600_000_000_000);
        data.extend_from_slice(&legacy_message(4, None, b"second", -1));

        let decoded = decode_records(&data, 0, 0).unwrap();

        assert_eq!(decoded.next_offset, Some(5));
        assert_eq!(decoded.messages.len(), 2);
        assert_eq!(decoded.messages[0].key, Some(b"k".to_vec()));
        assert_eq!(decoded.messages[0].value_text(), "old format");
        assert_eq!(
            decoded.messages[0].timestamp,
            Utc.timestamp_millis_opt(1_600_000_000_000).single()
        );
        assert_eq!(decoded.messages[1].timestamp, None);
    }

    #[test]
    fn test_empty_batch_cannot_be_encoded() {
        assert!(encode_record_batch(&[], 0, Utc::now()).is_err());
    }

    /// A single-record v2 batch at offset 0 with a valid CRC
    fn seal_batch(first_timestamp: i64, record: &[u8]) -> Vec<u8> {
        let mut body = BytesMut::new();
        encode_i16(&mut body, 0);
        encode_i32(&mut body, 0);
        encode_i64(&mut body, first_timestamp);
        encode_i64(&mut body, first_timestamp);
        encode_i64(&mut body, NO_PRODUCER_ID);
        encode_i16(&mut body, NO_PRODUCER_EPOCH);
        encode_i32(&mut body, NO_SEQUENCE);
        encode_i32(&mut body, 1);
        encode_varint(&mut body, record.len() as i32);
        body.extend_from_slice(record);

        let mut batch = BytesMut::new();
        encode_i64(&mut batch, 0);
        encode_i32(&mut batch, (4 + 1 + 4 + body.len()) as i32);
        encode_i32(&mut batch, NO_PARTITION_LEADER_EPOCH);
        encode_i8(&mut batch, MAGIC_V2);
        batch.put_u32(crc32c::crc32c(&body));
        batch.extend_from_slice(&body);
        batch.to_vec()
    }

    /// A record with null key and value and a claimed header count
    fn bare_record(timestamp_delta: i64, header_count: i32) -> Vec<u8> {
        let mut record = BytesMut::new();
        encode_i8(&mut record, 0);
        encode_varlong(&mut record, timestamp_delta);
        encode_varint(&mut record, 0);
        encode_varint(&mut record, -1);
        encode_varint(&mut record, -1);
        encode_varint(&mut record, header_count);
        record.to_vec()
    }

    #[test]
    fn test_hand_built_batch_decodes() {
        let decoded = decode_records(&seal_batch(1_000, &bare_record(5, 0)), 0, 0).unwrap();

        assert_eq!(decoded.messages.len(), 1);
        assert!(decoded.messages[0].is_tombstone());
        assert_eq!(
            decoded.messages[0].timestamp,
            Utc.timestamp_millis_opt(1_005).single()
        );
    }

    #[test]
    fn test_huge_header_count_is_an_error() {
        let data = seal_batch(1_000, &bare_record(0, i32::MAX));

        assert!(decode_records(&data, 0, 0).is_err());
    }

    #[test]
    fn test_timestamp_overflow_is_an_error() {
        let data = seal_batch(i64::MAX, &bare_record(1, 0));

        let err = decode_records(&data, 0, 0).unwrap_err();
        assert!(err.to_string().contains("overflows"));
    }

    #[test]
    fn test_offset_overflow_is_an_error() {
        let batch = encode_record_batch(&sample_messages(), 0, Utc::now()).unwrap();
        let mut data = batch.to_vec();
        // the base offset is outside the CRC
        data[..8].copy_from_slice(&i64::MAX.to_be_bytes());

        let err = decode_records(&data, 0, 0).unwrap_err();
        assert!(err.to_string().contains("overflows"));

        let legacy = legacy_message(i64::MAX, None, b"v", -1);
        assert!(decode_records(&legacy, 0, 0).is_err());
    }
}
