//! Parser behavior on malformed and adversarial input
//!
//! Every byte shape here is reachable from any peer that can open a
//! socket, so parsers must fail with a protocol error rather than
//! panic or over-allocate.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use tributary_core::Record;
use tributary_wire::messages::{
    FetchPartition, FetchRequest, FetchResponse, ListOffsetsResponse, MetadataResponse,
    OffsetsPartition,
};
use tributary_wire::{
    decode_batches, encode_batch, FrameCodec, RequestHeader, ResponseHeader, WireError,
};

fn assert_protocol_error<T: std::fmt::Debug>(result: Result<T, WireError>) {
    match result {
        Err(WireError::Protocol(_)) => {}
        other => panic!("expected protocol error, got {:?}", other),
    }
}

// ===== framing =====

#[test]
fn test_request_survives_framed_transport() {
    let request = FetchRequest {
        topic: "events".to_string(),
        partition: 3,
        fetch_offset: 42,
        max_bytes: 1 << 20,
        max_wait_ms: 500,
        min_bytes: 1,
    };

    let mut frame = BytesMut::new();
    RequestHeader {
        api_key: 1,
        api_version: 0,
        correlation_id: 7,
        client_id: Some("edge-case-tests".to_string()),
    }
    .encode(&mut frame);
    request.encode(&mut frame);

    let mut codec = FrameCodec::new();
    let mut wire = BytesMut::new();
    codec.encode(frame, &mut wire).unwrap();

    // deliver one byte at a time; the decoder must wait for the frame
    let mut codec = FrameCodec::new();
    let mut receiving = BytesMut::new();
    let mut decoded = None;
    for i in 0..wire.len() {
        receiving.put_u8(wire[i]);
        if let Some(frame) = codec.decode(&mut receiving).unwrap() {
            assert_eq!(i, wire.len() - 1);
            decoded = Some(frame);
        }
    }

    let mut frame = decoded.expect("frame never completed");
    let header = RequestHeader::parse(&mut frame).unwrap();
    assert_eq!(header.correlation_id, 7);
    assert_eq!(header.client_id.as_deref(), Some("edge-case-tests"));
    assert_eq!(FetchRequest::parse(&mut frame).unwrap(), request);
}

#[test]
fn test_oversized_frame_rejected_before_buffering() {
    let mut codec = FrameCodec::with_max_frame_size(64);
    let mut buf = BytesMut::new();
    buf.put_i32(65);
    assert_protocol_error(codec.decode(&mut buf));
}

// ===== truncated message bodies =====

#[test]
fn test_truncated_bodies_fail_cleanly() {
    // a full valid response body, then every proper prefix of it
    let full = {
        let mut buf = BytesMut::new();
        FetchResponse {
            topic: "events".to_string(),
            partition: FetchPartition {
                partition: 0,
                error_code: 0,
                high_watermark: 10,
                records: Some(encode_batch(&[Record::new(
                    4,
                    1_700_000_000_000,
                    None,
                    b"payload".to_vec().into(),
                )])),
            },
        }
        .encode(&mut buf);
        buf
    };

    for len in 0..full.len() {
        let mut truncated = BytesMut::from(&full[..len]);
        assert!(
            FetchResponse::parse(&mut truncated).is_err(),
            "prefix of {} bytes parsed",
            len
        );
    }

    let mut whole = full.clone();
    assert!(FetchResponse::parse(&mut whole).is_ok());
}

#[test]
fn test_response_header_requires_four_bytes() {
    let mut buf = BytesMut::from(&[0u8, 0, 0][..]);
    assert_protocol_error(ResponseHeader::parse(&mut buf));
}

// ===== hostile element counts =====

#[test]
fn test_huge_claimed_array_count_does_not_allocate() {
    // metadata response claiming i32::MAX brokers with no broker data
    let mut buf = BytesMut::new();
    buf.put_i32(i32::MAX);
    assert_protocol_error(MetadataResponse::parse(&mut buf));
}

#[test]
fn test_multi_partition_response_rejected() {
    let partition = OffsetsPartition {
        partition: 0,
        error_code: 0,
        timestamp: -1,
        offset: 12,
    };

    // hand-build a list-offsets response with two partition entries
    let mut buf = BytesMut::new();
    buf.put_i32(1);
    tributary_wire::codec::encode_string(&mut buf, "events");
    buf.put_i32(2);
    for p in [&partition, &partition] {
        buf.put_i32(p.partition);
        buf.put_i16(p.error_code);
        buf.put_i64(p.timestamp);
        buf.put_i64(p.offset);
    }

    assert_protocol_error(ListOffsetsResponse::parse(&mut buf));
}

#[test]
fn test_zero_topic_response_rejected() {
    let mut buf = BytesMut::new();
    buf.put_i32(0);
    assert_protocol_error(ListOffsetsResponse::parse(&mut buf));
}

// ===== record batches =====

#[test]
fn test_null_records_field_parses_as_none() {
    let mut buf = BytesMut::new();
    FetchResponse {
        topic: "events".to_string(),
        partition: FetchPartition {
            partition: 0,
            error_code: 6,
            high_watermark: -1,
            records: None,
        },
    }
    .encode(&mut buf);

    let parsed = FetchResponse::parse(&mut buf).unwrap();
    assert_eq!(parsed.partition.records, None);
}

#[test]
fn test_batch_roundtrip_at_high_offsets() {
    let base = 1u64 << 40;
    let records: Vec<Record> = (0..3)
        .map(|i| {
            Record::new(
                base + i,
                1_700_000_000_000 + i,
                Some(b"k".to_vec().into()),
                vec![0u8; 0].into(),
            )
        })
        .collect();

    let decoded = decode_batches(&encode_batch(&records)).unwrap();
    assert_eq!(decoded, records);
}

#[test]
fn test_single_byte_corruption_never_panics() {
    let records = vec![
        Record::new(100, 1_700_000_000_000, Some(b"key".to_vec().into()), b"value".to_vec().into()),
        Record::new(101, 1_700_000_000_001, None, b"second".to_vec().into()),
    ];
    let encoded = encode_batch(&records);

    for i in 0..encoded.len() {
        let mut corrupted = encoded.clone();
        corrupted[i] = corrupted[i].wrapping_add(1);
        // any outcome is fine as long as it returns
        let _ = decode_batches(&corrupted);
    }
}

#[test]
fn test_garbage_buffers_never_panic() {
    // xorshift so the sweep is reproducible without a rand dependency
    let mut state = 0x2545_f491_4f6c_dd1du64;
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        state
    };

    for round in 0..256 {
        let len = (round * 7) % 200;
        let buf: Vec<u8> = (0..len).map(|_| next() as u8).collect();
        let _ = decode_batches(&buf);

        let mut frame = BytesMut::from(&buf[..]);
        let _ = RequestHeader::parse(&mut frame);

        let mut body = BytesMut::from(&buf[..]);
        let _ = FetchResponse::parse(&mut body);
    }
}
