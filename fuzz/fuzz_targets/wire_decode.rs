#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use tokio_util::codec::Decoder;
use tributary_wire::codec::{
    parse_nullable_bytes, parse_nullable_string, parse_signed_varint, parse_string,
    parse_unsigned_varint,
};
use tributary_wire::messages::{FetchResponse, ListOffsetsResponse, MetadataResponse};
use tributary_wire::{FrameCodec, RequestHeader, ResponseHeader};

fuzz_target!(|data: &[u8]| {
    // Fuzz the frame codec with arbitrary bytes.
    // Tests handling of:
    // - Negative and oversized length prefixes
    // - Truncated frames
    // - Zero-length frames
    let mut codec = FrameCodec::new();
    let mut buf = BytesMut::from(data);

    loop {
        match codec.decode(&mut buf) {
            Ok(Some(frame)) => {
                // Successfully decoded a frame — try parsing it as a request
                let mut frame_copy = frame.clone();
                let _ = RequestHeader::parse(&mut frame_copy);

                let mut frame_copy = frame;
                let _ = ResponseHeader::parse(&mut frame_copy);
            }
            Ok(None) => break, // Need more data
            Err(_) => break,   // Invalid data
        }
    }

    // Also fuzz the individual protocol parsing functions
    let mut buf2 = BytesMut::from(data);
    let _ = parse_nullable_string(&mut buf2);

    let mut buf3 = BytesMut::from(data);
    let _ = parse_string(&mut buf3);

    let mut buf4 = BytesMut::from(data);
    let _ = parse_nullable_bytes(&mut buf4);

    let mut buf5 = BytesMut::from(data);
    let _ = parse_unsigned_varint(&mut buf5);

    let mut buf6 = BytesMut::from(data);
    let _ = parse_signed_varint(&mut buf6);

    // And the full response message parsers
    let mut buf7 = BytesMut::from(data);
    let _ = FetchResponse::parse(&mut buf7);

    let mut buf8 = BytesMut::from(data);
    let _ = ListOffsetsResponse::parse(&mut buf8);

    let mut buf9 = BytesMut::from(data);
    let _ = MetadataResponse::parse(&mut buf9);
});
