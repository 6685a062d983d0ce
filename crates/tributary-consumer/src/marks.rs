//! Committed-offset marks and the shared offset table

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;

/// Read side of the committed-offset store.
///
/// A fetch loop consults this once at startup to resume a partition
/// where a previous run left off. Writes happen elsewhere: the
/// downstream commit path records marks as records are actually
/// consumed, so a crashed loop never advances a mark past delivery.
#[async_trait]
pub trait MarkStore: Send + Sync {
    /// Last committed next-offset marker for a partition, if any
    async fn last_committed(&self, partition_key: &str) -> Result<Option<u64>>;
}

/// In-memory MarkStore for tests and demos.
#[derive(Default)]
pub struct MemoryMarkStore {
    marks: RwLock<HashMap<String, u64>>,
}

impl MemoryMarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_marks(marks: impl IntoIterator<Item = (String, u64)>) -> Self {
        Self {
            marks: RwLock::new(marks.into_iter().collect()),
        }
    }

    pub async fn set(&self, partition_key: &str, offset: u64) {
        self.marks
            .write()
            .await
            .insert(partition_key.to_string(), offset);
    }
}

#[async_trait]
impl MarkStore for MemoryMarkStore {
    async fn last_committed(&self, partition_key: &str) -> Result<Option<u64>> {
        Ok(self.marks.read().await.get(partition_key).copied())
    }
}

/// Shared per-partition offset table.
///
/// Fetch loops write here in exactly one case: the start offset resolved
/// past the log end, so the loop clamps and records the corrected offset
/// before exiting without fetching anything. Every other write to a key
/// comes from the downstream commit path. The keys are partition keys
/// and each loop touches only its own, so the two writers never race on
/// one key; the table synchronizes internally and no caller holds its
/// lock across an await.
#[derive(Clone, Default)]
pub struct OffsetTable {
    offsets: Arc<RwLock<HashMap<String, u64>>>,
}

impl OffsetTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, partition_key: &str, offset: u64) {
        self.offsets
            .write()
            .await
            .insert(partition_key.to_string(), offset);
    }

    pub async fn get(&self, partition_key: &str) -> Option<u64> {
        self.offsets.read().await.get(partition_key).copied()
    }

    /// Point-in-time copy, for inspection and tests
    pub async fn snapshot(&self) -> HashMap<String, u64> {
        self.offsets.read().await.clone()
    }
}
