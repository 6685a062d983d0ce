//! Record Data Structure
//!
//! This module defines the core `Record` type - the unit of data fetched from
//! a broker partition.
//!
//! ## Structure
//! Each record contains:
//! - **offset**: Unique, monotonically increasing ID within a partition
//! - **timestamp**: When the record was produced (milliseconds since epoch)
//! - **key**: Optional identifier for partitioning/grouping (e.g., user_id)
//! - **value**: The actual payload/data (arbitrary bytes)
//!
//! ## Design Decisions
//! - Uses `bytes::Bytes` for zero-copy operations (no allocations when slicing)
//! - Implements `Serialize`/`Deserialize` so records can be checkpointed or
//!   mirrored into external stores
//! - Key is optional because not all producers set keys
//! - Offset is u64 to support very large streams
//!
//! ## Example
//! ```ignore
//! let record = Record::new(
//!     100,                              // offset
//!     1234567890000,                    // timestamp
//!     Some(Bytes::from("user123")),     // key
//!     Bytes::from(r#"{"action": "click"}"#),  // value (JSON)
//! );
//! ```

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A single record fetched from a partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Offset of this record in the partition
    pub offset: u64,

    /// Timestamp in milliseconds since epoch
    pub timestamp: u64,

    /// Optional key
    pub key: Option<Bytes>,

    /// Value (payload)
    pub value: Bytes,
}

impl Record {
    pub fn new(offset: u64, timestamp: u64, key: Option<Bytes>, value: Bytes) -> Self {
        Self {
            offset,
            timestamp,
            key,
            value,
        }
    }

    /// Offset of the record that follows this one in the partition.
    pub fn next_offset(&self) -> u64 {
        self.offset + 1
    }
}
