//! Tributary wire protocol
//!
//! Binary client protocol for talking to tributary brokers, modeled on
//! the classic Kafka framing: every message is a 4-byte big-endian
//! length followed by the payload, requests carry a header of api key,
//! api version, correlation id, and nullable client id, and responses
//! echo the correlation id back.
//!
//! Supported APIs (version 0 only):
//!
//! | API         | Key | Purpose                                   |
//! |-------------|-----|-------------------------------------------|
//! | Fetch       | 1   | Read record batches from one partition    |
//! | ListOffsets | 2   | Resolve earliest/latest/time-based offset |
//! | Metadata    | 3   | Discover brokers and partition leaders    |
//!
//! Record payloads use the v2 batch format: a 61-byte header with a
//! CRC-32C over everything past the crc field, followed by
//! varint-delta-encoded records. [`batch`] encodes and decodes these,
//! tolerating the truncated final batch brokers may send at the tail of
//! a fetch response.
//!
//! [`BrokerConnection`] is the client side: a framed TCP stream with
//! correlation-id bookkeeping and per-request timeouts. [`testing`]
//! provides a scripted in-process cluster that speaks the same wire
//! format, used by integration tests.

pub mod batch;
pub mod codec;
pub mod connection;
pub mod error;
pub mod messages;
pub mod testing;
pub mod types;

pub use batch::{decode_batches, encode_batch};
pub use codec::{FrameCodec, RequestHeader, ResponseHeader};
pub use connection::BrokerConnection;
pub use error::{ErrorCode, WireError, WireResult};
pub use types::{
    ApiKey, BrokerEndpoint, BrokerNode, EARLIEST_TIMESTAMP, LATEST_TIMESTAMP, PROTOCOL_VERSION,
};
