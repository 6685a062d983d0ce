//! Record batch encoding and decoding
//!
//! The record set inside a fetch response is a sequence of batches. Each
//! batch carries a fixed header followed by varint-delta-compressed
//! records:
//!
//! ```text
//! base_offset: i64            | not covered by crc
//! batch_length: i32           |
//! partition_leader_epoch: i32 + covered by batch_length
//! magic: i8 (= 2)             |
//! crc: u32 (crc32c)           |
//! attributes: i16             + covered by crc
//! last_offset_delta: i32      |
//! first_timestamp: i64        |
//! max_timestamp: i64          |
//! producer_id: i64            |
//! producer_epoch: i16         |
//! base_sequence: i32          |
//! record_count: i32           |
//! records...                  |
//! ```
//!
//! Records store offsets and timestamps as zigzag varint deltas from the
//! batch base. Decoding resolves them back to absolute values.
//!
//! A broker cuts the record set at the fetch byte bound, so the final
//! batch may arrive truncated. [`decode_batches`] drops such a tail
//! silently; the records in it are re-fetched at the next offset.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use tributary_core::varint::encode_varint;
use tributary_core::Record;

use crate::codec::parse_signed_varint;
use crate::error::{WireError, WireResult};

/// Byte position of the batch_length field
const LENGTH_OFFSET: usize = 8;
/// Byte position of the crc field
const CRC_OFFSET: usize = 17;
/// First byte covered by the crc (attributes onward)
const CRC_REGION_START: usize = 21;
/// Full batch header size, up to and including record_count
const BATCH_HEADER_LEN: usize = 61;

/// Encode records into a single batch
///
/// Offsets must be contiguous ascending starting at `records[0].offset`,
/// which becomes the batch base offset. An empty slice encodes to no
/// bytes at all.
pub fn encode_batch(records: &[Record]) -> Vec<u8> {
    let Some(first) = records.first() else {
        return Vec::new();
    };
    let base_offset = first.offset;
    let first_timestamp = first.timestamp as i64;
    let max_timestamp = records
        .iter()
        .map(|r| r.timestamp as i64)
        .max()
        .unwrap_or(first_timestamp);

    let mut batch = BytesMut::new();
    batch.put_i64(base_offset as i64);
    batch.put_i32(0); // batch_length, backpatched below
    batch.put_i32(0); // partition_leader_epoch
    batch.put_u8(2); // magic
    batch.put_u32(0); // crc, backpatched below
    batch.put_i16(0); // attributes: uncompressed, create-time
    batch.put_i32(records.len() as i32 - 1); // last_offset_delta
    batch.put_i64(first_timestamp);
    batch.put_i64(max_timestamp);
    batch.put_i64(-1); // producer_id
    batch.put_i16(-1); // producer_epoch
    batch.put_i32(-1); // base_sequence
    batch.put_i32(records.len() as i32);

    for record in records {
        encode_record(&mut batch, record, base_offset, first_timestamp);
    }

    let batch_length = (batch.len() - LENGTH_OFFSET - 4) as i32;
    batch[LENGTH_OFFSET..LENGTH_OFFSET + 4].copy_from_slice(&batch_length.to_be_bytes());

    let crc = crc32c::crc32c(&batch[CRC_REGION_START..]);
    batch[CRC_OFFSET..CRC_OFFSET + 4].copy_from_slice(&crc.to_be_bytes());

    batch.to_vec()
}

fn encode_record(batch: &mut BytesMut, record: &Record, base_offset: u64, first_timestamp: i64) {
    let mut body = BytesMut::new();
    body.put_i8(0); // record attributes
    encode_varint(&mut body, record.timestamp as i64 - first_timestamp);
    encode_varint(&mut body, (record.offset - base_offset) as i64);
    match &record.key {
        Some(key) => {
            encode_varint(&mut body, key.len() as i64);
            body.extend_from_slice(key);
        }
        None => encode_varint(&mut body, -1),
    }
    encode_varint(&mut body, record.value.len() as i64);
    body.extend_from_slice(&record.value);
    encode_varint(&mut body, 0); // header count

    encode_varint(batch, body.len() as i64);
    batch.extend_from_slice(&body);
}

/// Decode a record set into absolute-offset records
///
/// The input may hold any number of concatenated batches. A truncated
/// final batch is dropped without error; corrupt bytes inside a complete
/// batch fail the whole set.
pub fn decode_batches(data: &[u8]) -> WireResult<Vec<Record>> {
    let mut records = Vec::new();
    let mut pos = 0usize;

    while data.len() - pos >= 12 {
        let base_offset = (&data[pos..pos + 8]).get_i64();
        let batch_length = (&data[pos + 8..pos + 12]).get_i32();
        if batch_length < (BATCH_HEADER_LEN - 12) as i32 {
            return Err(WireError::Protocol(format!(
                "Record batch length {} below header size",
                batch_length
            )));
        }

        let body_len = batch_length as usize;
        if data.len() - pos - 12 < body_len {
            // truncated tail cut at the fetch byte bound
            break;
        }

        decode_batch(base_offset, &data[pos + 12..pos + 12 + body_len], &mut records)?;
        pos += 12 + body_len;
    }

    Ok(records)
}

fn decode_batch(base_offset: i64, body: &[u8], out: &mut Vec<Record>) -> WireResult<()> {
    // body is at least BATCH_HEADER_LEN - 12 bytes, checked by the caller
    let mut buf = BytesMut::from(body);

    let _partition_leader_epoch = buf.get_i32();
    let magic = buf.get_u8();
    if magic != 2 {
        return Err(WireError::Protocol(format!(
            "Unsupported record batch magic {}",
            magic
        )));
    }

    let crc = buf.get_u32();
    let computed = crc32c::crc32c(&buf[..]);
    if crc != computed {
        return Err(WireError::Protocol(format!(
            "Record batch crc mismatch: stored {:#010x}, computed {:#010x}",
            crc, computed
        )));
    }

    let attributes = buf.get_i16();
    if attributes & 0x07 != 0 {
        return Err(WireError::Protocol(format!(
            "Compressed record batch not supported (attributes {:#06x})",
            attributes
        )));
    }

    let _last_offset_delta = buf.get_i32();
    let first_timestamp = buf.get_i64();
    let _max_timestamp = buf.get_i64();
    let _producer_id = buf.get_i64();
    let _producer_epoch = buf.get_i16();
    let _base_sequence = buf.get_i32();
    let record_count = buf.get_i32();

    // Each record takes at least one byte, which bounds hostile counts
    if record_count < 0 || record_count as usize > buf.len() {
        return Err(WireError::Protocol(format!(
            "Record count {} does not fit in {} record bytes",
            record_count,
            buf.len()
        )));
    }

    for _ in 0..record_count {
        out.push(decode_record(base_offset, first_timestamp, &mut buf)?);
    }

    Ok(())
}

fn decode_record(
    base_offset: i64,
    first_timestamp: i64,
    buf: &mut BytesMut,
) -> WireResult<Record> {
    let length = parse_signed_varint(buf)?;
    if length < 0 || length as usize > buf.len() {
        return Err(WireError::Protocol(format!(
            "Record length {} exceeds remaining {} batch bytes",
            length,
            buf.len()
        )));
    }
    let mut record = buf.split_to(length as usize);

    if record.is_empty() {
        return Err(WireError::Protocol("Empty record body".to_string()));
    }
    let _attributes = record.get_i8();
    let timestamp_delta = parse_signed_varint(&mut record)?;
    let offset_delta = parse_signed_varint(&mut record)?;

    let key = match parse_signed_varint(&mut record)? {
        len if len < 0 => None,
        len => {
            if len as usize > record.len() {
                return Err(WireError::Protocol(format!(
                    "Record key length {} exceeds record body",
                    len
                )));
            }
            Some(record.split_to(len as usize).freeze())
        }
    };

    let value = match parse_signed_varint(&mut record)? {
        // null values are not produced here; tolerate them as empty
        len if len < 0 => Bytes::new(),
        len => {
            if len as usize > record.len() {
                return Err(WireError::Protocol(format!(
                    "Record value length {} exceeds record body",
                    len
                )));
            }
            record.split_to(len as usize).freeze()
        }
    };

    let header_count = parse_signed_varint(&mut record)?;
    if header_count < 0 {
        return Err(WireError::Protocol(format!(
            "Negative record header count {}",
            header_count
        )));
    }
    for _ in 0..header_count {
        skip_header(&mut record)?;
    }

    let offset = match base_offset.checked_add(offset_delta) {
        Some(offset) if offset >= 0 => offset,
        _ => {
            return Err(WireError::Protocol(format!(
                "Record offset delta {} out of range for base {}",
                offset_delta, base_offset
            )))
        }
    };
    let timestamp = first_timestamp.saturating_add(timestamp_delta).max(0) as u64;

    Ok(Record {
        offset: offset as u64,
        timestamp,
        key,
        value,
    })
}

fn skip_header(record: &mut BytesMut) -> WireResult<()> {
    let key_len = parse_signed_varint(record)?;
    if key_len < 0 || key_len as usize > record.len() {
        return Err(WireError::Protocol(
            "Record header key out of bounds".to_string(),
        ));
    }
    record.advance(key_len as usize);

    let value_len = parse_signed_varint(record)?;
    if value_len > 0 {
        if value_len as usize > record.len() {
            return Err(WireError::Protocol(
                "Record header value out of bounds".to_string(),
            ));
        }
        record.advance(value_len as usize);
    }
    Ok(())
}
