//! Frame codec and wire primitives
//!
//! Every message on the wire is a length-prefixed frame:
//!
//! ```text
//! +------------------+------------------+
//! | Length (4 bytes) | Payload          |
//! +------------------+------------------+
//! ```
//!
//! `FrameCodec` handles the framing; the free functions below read and
//! write the primitive types that make up frame payloads. All parse
//! functions check lengths before consuming and fail with
//! [`WireError::Protocol`] instead of panicking, so they are safe to run
//! against bytes from an untrusted peer.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{WireError, WireResult};

/// Maximum frame size (100MB)
const MAX_FRAME_SIZE: usize = 100 * 1024 * 1024;

/// Length-prefixed frame codec
pub struct FrameCodec {
    /// Maximum allowed frame size
    max_frame_size: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }
}

impl Decoder for FrameCodec {
    type Item = BytesMut;
    type Error = WireError;

    fn decode(&mut self, src: &mut BytesMut) -> WireResult<Option<Self::Item>> {
        // Need at least 4 bytes for the length prefix
        if src.len() < 4 {
            return Ok(None);
        }

        // Read length without consuming
        let length = (&src[..4]).get_i32();
        if length < 0 {
            return Err(WireError::Protocol(format!(
                "Negative frame length {}",
                length
            )));
        }

        let length = length as usize;
        if length > self.max_frame_size {
            return Err(WireError::Protocol(format!(
                "Frame size {} exceeds maximum {}",
                length, self.max_frame_size
            )));
        }

        // Check if we have the full frame
        let total_length = 4 + length;
        if src.len() < total_length {
            src.reserve(total_length - src.len());
            return Ok(None);
        }

        src.advance(4);
        let payload = src.split_to(length);

        Ok(Some(payload))
    }
}

impl Encoder<BytesMut> for FrameCodec {
    type Error = WireError;

    fn encode(&mut self, item: BytesMut, dst: &mut BytesMut) -> WireResult<()> {
        let length = item.len();

        if length > self.max_frame_size {
            return Err(WireError::Protocol(format!(
                "Frame size {} exceeds maximum {}",
                length, self.max_frame_size
            )));
        }

        dst.reserve(4 + length);
        dst.put_i32(length as i32);
        dst.extend_from_slice(&item);

        Ok(())
    }
}

/// Request header, first fields of every request frame
#[derive(Debug, Clone)]
pub struct RequestHeader {
    pub api_key: i16,
    pub api_version: i16,
    pub correlation_id: i32,
    pub client_id: Option<String>,
}

impl RequestHeader {
    pub fn parse(buf: &mut BytesMut) -> WireResult<Self> {
        if buf.len() < 8 {
            return Err(WireError::Protocol("Request header too short".to_string()));
        }

        let api_key = buf.get_i16();
        let api_version = buf.get_i16();
        let correlation_id = buf.get_i32();
        let client_id = parse_nullable_string(buf)?;

        Ok(RequestHeader {
            api_key,
            api_version,
            correlation_id,
            client_id,
        })
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_i16(self.api_key);
        buf.put_i16(self.api_version);
        buf.put_i32(self.correlation_id);
        encode_nullable_string(buf, self.client_id.as_deref());
    }
}

/// Response header, first field of every response frame
#[derive(Debug, Clone)]
pub struct ResponseHeader {
    pub correlation_id: i32,
}

impl ResponseHeader {
    pub fn new(correlation_id: i32) -> Self {
        Self { correlation_id }
    }

    pub fn parse(buf: &mut BytesMut) -> WireResult<Self> {
        if buf.len() < 4 {
            return Err(WireError::Protocol("Response header too short".to_string()));
        }
        Ok(Self {
            correlation_id: buf.get_i32(),
        })
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_i32(self.correlation_id);
    }
}

/// Parse a nullable string (int16 length + bytes, -1 for null)
pub fn parse_nullable_string(buf: &mut BytesMut) -> WireResult<Option<String>> {
    if buf.len() < 2 {
        return Err(WireError::Protocol(
            "Buffer too short for string".to_string(),
        ));
    }

    let length = buf.get_i16();

    if length < 0 {
        return Ok(None);
    }

    let length = length as usize;
    if buf.len() < length {
        return Err(WireError::Protocol(format!(
            "Buffer too short for string of length {}",
            length
        )));
    }

    let bytes = buf.split_to(length);
    let s = String::from_utf8(bytes.to_vec())
        .map_err(|e| WireError::Protocol(format!("Invalid UTF-8 in string: {}", e)))?;

    Ok(Some(s))
}

/// Parse a string (int16 length + bytes)
pub fn parse_string(buf: &mut BytesMut) -> WireResult<String> {
    parse_nullable_string(buf)?
        .ok_or_else(|| WireError::Protocol("Expected non-null string".to_string()))
}

/// Parse nullable bytes (int32 length + bytes, -1 for null)
pub fn parse_nullable_bytes(buf: &mut BytesMut) -> WireResult<Option<Vec<u8>>> {
    if buf.len() < 4 {
        return Err(WireError::Protocol(
            "Buffer too short for bytes".to_string(),
        ));
    }

    let length = buf.get_i32();

    if length < 0 {
        return Ok(None);
    }

    let length = length as usize;
    if buf.len() < length {
        return Err(WireError::Protocol(format!(
            "Buffer too short for bytes of length {}",
            length
        )));
    }

    let bytes = buf.split_to(length).to_vec();
    Ok(Some(bytes))
}

/// Parse an array (int32 count + elements); a negative count is an empty array
pub fn parse_array<T, F>(buf: &mut BytesMut, parse_element: F) -> WireResult<Vec<T>>
where
    F: Fn(&mut BytesMut) -> WireResult<T>,
{
    if buf.len() < 4 {
        return Err(WireError::Protocol(
            "Buffer too short for array".to_string(),
        ));
    }

    let count = buf.get_i32();

    if count < 0 {
        return Ok(vec![]);
    }

    let count = count as usize;
    let mut elements = Vec::new();

    for _ in 0..count {
        elements.push(parse_element(buf)?);
    }

    Ok(elements)
}

/// Parse an unsigned varint
pub fn parse_unsigned_varint(buf: &mut BytesMut) -> WireResult<u64> {
    let mut result: u64 = 0;
    let mut shift = 0;

    loop {
        if buf.is_empty() {
            return Err(WireError::Protocol(
                "Buffer too short for varint".to_string(),
            ));
        }

        let byte = buf.get_u8();
        result |= ((byte & 0x7F) as u64) << shift;

        if byte & 0x80 == 0 {
            break;
        }

        shift += 7;
        if shift >= 64 {
            return Err(WireError::Protocol("Varint too long".to_string()));
        }
    }

    Ok(result)
}

/// Parse a signed varint (zigzag encoded)
pub fn parse_signed_varint(buf: &mut BytesMut) -> WireResult<i64> {
    let unsigned = parse_unsigned_varint(buf)?;
    Ok(((unsigned >> 1) as i64) ^ (-((unsigned & 1) as i64)))
}

/// Encode a nullable string
pub fn encode_nullable_string(buf: &mut BytesMut, s: Option<&str>) {
    match s {
        Some(s) => {
            buf.put_i16(s.len() as i16);
            buf.extend_from_slice(s.as_bytes());
        }
        None => {
            buf.put_i16(-1);
        }
    }
}

/// Encode a string
pub fn encode_string(buf: &mut BytesMut, s: &str) {
    buf.put_i16(s.len() as i16);
    buf.extend_from_slice(s.as_bytes());
}

/// Encode nullable bytes
pub fn encode_nullable_bytes(buf: &mut BytesMut, bytes: Option<&[u8]>) {
    match bytes {
        Some(b) => {
            buf.put_i32(b.len() as i32);
            buf.extend_from_slice(b);
        }
        None => {
            buf.put_i32(-1);
        }
    }
}
