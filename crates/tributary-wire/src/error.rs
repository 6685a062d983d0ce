//! Wire protocol error handling
//!
//! `WireError` covers everything that can go wrong between this client and
//! a broker; `ErrorCode` is the broker-assigned status carried inside
//! responses. They are distinct on purpose: a response with a non-zero
//! `ErrorCode` is a *successful* wire exchange.

use std::time::Duration;

use thiserror::Error;

/// Result type for wire operations
pub type WireResult<T> = Result<T, WireError>;

/// Errors raised by the wire layer itself
#[derive(Debug, Error)]
pub enum WireError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Correlation id mismatch: expected {expected}, got {actual}")]
    CorrelationMismatch { expected: i32, actual: i32 },
}

/// Broker error codes carried in response bodies
///
/// The numbering follows the classic Kafka protocol table so that standard
/// tooling can read our responses. Only the codes a fetch client can
/// actually receive are listed; anything else arrives as a raw i16 and is
/// treated as fatal by the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub enum ErrorCode {
    None = 0,
    UnknownServerError = -1,
    OffsetOutOfRange = 1,
    CorruptMessage = 2,
    UnknownTopicOrPartition = 3,
    InvalidFetchSize = 4,
    LeaderNotAvailable = 5,
    NotLeaderOrFollower = 6,
    RequestTimedOut = 7,
    BrokerNotAvailable = 8,
    ReplicaNotAvailable = 9,
    MessageTooLarge = 10,
    NetworkException = 13,
    UnsupportedVersion = 35,
    InvalidRequest = 42,
    StorageError = 56,
    OffsetNotAvailable = 78,
}

impl ErrorCode {
    pub fn from_i16(code: i16) -> Option<Self> {
        match code {
            0 => Some(ErrorCode::None),
            -1 => Some(ErrorCode::UnknownServerError),
            1 => Some(ErrorCode::OffsetOutOfRange),
            2 => Some(ErrorCode::CorruptMessage),
            3 => Some(ErrorCode::UnknownTopicOrPartition),
            4 => Some(ErrorCode::InvalidFetchSize),
            5 => Some(ErrorCode::LeaderNotAvailable),
            6 => Some(ErrorCode::NotLeaderOrFollower),
            7 => Some(ErrorCode::RequestTimedOut),
            8 => Some(ErrorCode::BrokerNotAvailable),
            9 => Some(ErrorCode::ReplicaNotAvailable),
            10 => Some(ErrorCode::MessageTooLarge),
            13 => Some(ErrorCode::NetworkException),
            35 => Some(ErrorCode::UnsupportedVersion),
            42 => Some(ErrorCode::InvalidRequest),
            56 => Some(ErrorCode::StorageError),
            78 => Some(ErrorCode::OffsetNotAvailable),
            _ => None,
        }
    }

    pub fn as_i16(self) -> i16 {
        self as i16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_roundtrip() {
        let codes = [
            ErrorCode::None,
            ErrorCode::UnknownServerError,
            ErrorCode::OffsetOutOfRange,
            ErrorCode::CorruptMessage,
            ErrorCode::UnknownTopicOrPartition,
            ErrorCode::InvalidFetchSize,
            ErrorCode::LeaderNotAvailable,
            ErrorCode::NotLeaderOrFollower,
            ErrorCode::RequestTimedOut,
            ErrorCode::BrokerNotAvailable,
            ErrorCode::ReplicaNotAvailable,
            ErrorCode::MessageTooLarge,
            ErrorCode::NetworkException,
            ErrorCode::UnsupportedVersion,
            ErrorCode::InvalidRequest,
            ErrorCode::StorageError,
            ErrorCode::OffsetNotAvailable,
        ];
        for code in codes {
            assert_eq!(ErrorCode::from_i16(code.as_i16()), Some(code));
        }
    }

    #[test]
    fn test_error_code_unknown_values() {
        for raw in [11, 12, 14, 100, i16::MIN, i16::MAX] {
            assert_eq!(ErrorCode::from_i16(raw), None, "code {} should be unknown", raw);
        }
    }

    #[test]
    fn test_error_code_discriminants() {
        assert_eq!(ErrorCode::None.as_i16(), 0);
        assert_eq!(ErrorCode::UnknownServerError.as_i16(), -1);
        assert_eq!(ErrorCode::OffsetOutOfRange.as_i16(), 1);
        assert_eq!(ErrorCode::UnknownTopicOrPartition.as_i16(), 3);
        assert_eq!(ErrorCode::NotLeaderOrFollower.as_i16(), 6);
        assert_eq!(ErrorCode::StorageError.as_i16(), 56);
    }

    #[test]
    fn test_wire_error_display() {
        let err = WireError::Protocol("bad frame".to_string());
        assert_eq!(format!("{}", err), "Protocol error: bad frame");

        let err = WireError::CorrelationMismatch {
            expected: 7,
            actual: 9,
        };
        assert!(format!("{}", err).contains("expected 7"));
    }
}
