//! Offset resolution with bounded retry
//!
//! Start and end offsets come from list-offsets queries against the
//! partition leader. Brokers answer these with transient errors during
//! elections and log maintenance, so each query retries a configured
//! number of times with exponential backoff before declaring metadata
//! unavailable, which is fatal to the enclosing loop.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use tributary_wire::{BrokerConnection, EARLIEST_TIMESTAMP, LATEST_TIMESTAMP};

use crate::error::{ConsumerError, Result};

/// Retry policy for offset queries.
///
/// Backoff grows as `initial_backoff * multiplier^attempt`, capped at
/// `max_backoff`. The first attempt is immediate.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts
    pub max_retries: usize,

    /// Initial backoff duration
    pub initial_backoff: Duration,

    /// Maximum backoff duration
    pub max_backoff: Duration,

    /// Backoff multiplier for exponential growth
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Backoff duration before retry number `attempt` (0-indexed).
    pub fn backoff(&self, attempt: usize) -> Duration {
        let backoff_ms =
            self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis(backoff_ms as u64).min(self.max_backoff)
    }
}

/// Resolves a partition's earliest, latest, or time-based offset.
pub struct OffsetResolver {
    topic: String,
    partition_id: u32,
    retry: RetryPolicy,
}

impl OffsetResolver {
    pub fn new(topic: impl Into<String>, partition_id: u32, retry: RetryPolicy) -> Self {
        Self {
            topic: topic.into(),
            partition_id,
            retry,
        }
    }

    /// Offset one past the last retained record.
    pub async fn latest(&self, conn: &mut BrokerConnection) -> Result<u64> {
        let offset = self.query(conn, LATEST_TIMESTAMP).await?;
        Ok(offset.max(0) as u64)
    }

    /// First retained offset.
    pub async fn earliest(&self, conn: &mut BrokerConnection) -> Result<u64> {
        let offset = self.query(conn, EARLIEST_TIMESTAMP).await?;
        Ok(offset.max(0) as u64)
    }

    /// Offset of the last record at or before `timestamp_ms`, or `None`
    /// when every retained record is newer.
    pub async fn nearest_before(
        &self,
        conn: &mut BrokerConnection,
        timestamp_ms: i64,
    ) -> Result<Option<u64>> {
        let offset = self.query(conn, timestamp_ms).await?;
        Ok((offset >= 0).then_some(offset as u64))
    }

    async fn query(&self, conn: &mut BrokerConnection, timestamp: i64) -> Result<i64> {
        let mut last_reason = "no attempts made".to_string();

        for attempt in 0..self.retry.max_retries {
            if attempt > 0 {
                sleep(self.retry.backoff(attempt - 1)).await;
            }

            match conn
                .list_offsets(&self.topic, self.partition_id, timestamp)
                .await
            {
                Ok(partition) if partition.error_code == 0 => {
                    debug!(
                        topic = %self.topic,
                        partition = self.partition_id,
                        timestamp,
                        offset = partition.offset,
                        "resolved offset"
                    );
                    return Ok(partition.offset);
                }
                Ok(partition) => {
                    warn!(
                        topic = %self.topic,
                        partition = self.partition_id,
                        attempt,
                        code = partition.error_code,
                        "offset query answered with error code"
                    );
                    last_reason = format!("broker error code {}", partition.error_code);
                }
                Err(e) => {
                    warn!(
                        topic = %self.topic,
                        partition = self.partition_id,
                        attempt,
                        error = %e,
                        "offset query failed"
                    );
                    last_reason = e.to_string();
                }
            }
        }

        Err(ConsumerError::MetadataUnavailable {
            topic: self.topic.clone(),
            partition: self.partition_id,
            attempts: self.retry.max_retries,
            reason: last_reason,
        })
    }
}
