//! Message Envelope
//!
//! A `MessageEnvelope` wraps a fetched [`Record`] with the provenance a
//! downstream decoder needs: which broker it came from, which topic and
//! partition it belongs to, and the derived source identifier used to key
//! checkpoints for that partition.
//!
//! Envelopes are created by the partition fetch loop and handed off through a
//! bounded queue; the decoder on the other side owns them from that point on.

use serde::{Deserialize, Serialize};

use crate::record::Record;

/// Derived identifier for a (topic, partition) pair.
///
/// This is the key under which offset marks for the partition are persisted,
/// so the format must stay stable across releases.
pub fn partition_key(topic: &str, partition_id: u32) -> String {
    format!("{}-{}", topic, partition_id)
}

/// A fetched record plus the provenance of where it was fetched from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// The record itself
    pub record: Record,

    /// Host of the broker the record was fetched from
    pub source_host: String,

    /// Topic the record belongs to
    pub topic: String,

    /// Partition the record belongs to
    pub partition_id: u32,

    /// Derived source identifier, `"{topic}-{partition_id}"`
    pub source_id: String,
}

impl MessageEnvelope {
    pub fn new(
        record: Record,
        source_host: impl Into<String>,
        topic: impl Into<String>,
        partition_id: u32,
    ) -> Self {
        let topic = topic.into();
        let source_id = partition_key(&topic, partition_id);
        Self {
            record,
            source_host: source_host.into(),
            topic,
            partition_id,
            source_id,
        }
    }

    /// Offset of the wrapped record.
    pub fn offset(&self) -> u64 {
        self.record.offset
    }
}
