//! Consumer error taxonomy
//!
//! Errors here are terminal for a fetch loop: transient broker codes
//! are absorbed by the loop itself (offset snaps, leader moves) and
//! never surface as `ConsumerError`. What remains is configuration
//! mistakes, transport failures, exhausted metadata retries, and
//! broker codes with no recovery action.

use thiserror::Error;

use tributary_wire::{ErrorCode, WireError};

pub type Result<T> = std::result::Result<T, ConsumerError>;

#[derive(Debug, Error)]
pub enum ConsumerError {
    /// Offset or leader queries exhausted their retry bound.
    ///
    /// ## Causes
    ///
    /// - No bootstrap broker reachable
    /// - Metadata reports no leader for the partition
    /// - List-offsets kept answering with an error code
    #[error("metadata unavailable for {topic}-{partition} after {attempts} attempts: {reason}")]
    MetadataUnavailable {
        topic: String,
        partition: u32,
        attempts: usize,
        reason: String,
    },

    /// The broker answered with a code the loop has no recovery for
    #[error("broker error code {code} ({})", code_name(.code))]
    Broker { code: i16 },

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error("mark store: {0}")]
    MarkStore(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

fn code_name(code: &i16) -> String {
    match ErrorCode::from_i16(*code) {
        Some(known) => format!("{:?}", known),
        None => "unknown".to_string(),
    }
}

/// How a fetch loop ended.
///
/// Returned by [`PartitionFetcher::run`](crate::fetch::PartitionFetcher::run)
/// instead of a `Result`: a finished loop is not an error, and even a
/// fatal one has already logged and pushed its end-of-partition marker
/// by the time the caller sees this.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Every offset in the window was examined
    Completed,
    /// Stopped early for an expected reason: cancellation, an empty
    /// fetch at the log end, or a receiver that went away
    BenignStop,
    /// Stopped on an unrecoverable error, recorded here
    Fatal(ConsumerError),
}

impl FetchOutcome {
    pub fn is_fatal(&self) -> bool {
        matches!(self, FetchOutcome::Fatal(_))
    }
}
