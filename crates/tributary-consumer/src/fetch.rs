//! The partition fetch loop
//!
//! One [`PartitionFetcher`] owns one partition for one invocation: it
//! resolves where to start and where to stop, then streams records from
//! the partition leader into a bounded hand-off queue as
//! [`MessageEnvelope`]s, ending with one end-of-partition marker.
//!
//! ```text
//! Resolving ──→ Fetching ←──→ Recovering (snap offset / new leader)
//!     │             │
//!     └─────────────┴──→ Draining (marker pushed) ──→ Terminated
//! ```
//!
//! The loop never returns `Err`. Transient broker conditions are
//! absorbed in place: an out-of-range offset snaps to the live range, a
//! moved leader triggers a reconnect at the same offset. Everything
//! else ends the invocation with an outcome tag, after the marker went
//! out, so downstream decoders always observe a definite end of stream
//! and never block on a failed loop.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use tributary_core::{partition_key, MessageEnvelope};
use tributary_wire::{decode_batches, BrokerConnection, BrokerEndpoint};

use crate::classify::{classify, FetchAction};
use crate::config::ConsumerConfig;
use crate::error::{ConsumerError, FetchOutcome, Result};
use crate::leader::LeaderLocator;
use crate::marks::{MarkStore, OffsetTable};
use crate::queue::{HandoffSender, PushError};
use crate::resolver::OffsetResolver;

/// Fetches one partition's live range and hands the records off.
///
/// Spawned as its own task by the owning pool; instances share nothing
/// but the cancellation token, the mark store, and the offset table.
pub struct PartitionFetcher {
    topic: String,
    partition_id: u32,
    source_id: String,
    endpoint: BrokerEndpoint,
    config: Arc<ConsumerConfig>,
    resolver: OffsetResolver,
    locator: LeaderLocator,
    marks: Arc<dyn MarkStore>,
    offsets: OffsetTable,
    sender: HandoffSender,
    cancel: CancellationToken,
}

impl PartitionFetcher {
    /// Create a fetcher for one partition.
    ///
    /// `endpoint` is the partition leader as known to the owner; the
    /// loop relocates on its own if leadership has moved since.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        topic: impl Into<String>,
        partition_id: u32,
        endpoint: BrokerEndpoint,
        config: Arc<ConsumerConfig>,
        marks: Arc<dyn MarkStore>,
        offsets: OffsetTable,
        sender: HandoffSender,
        cancel: CancellationToken,
    ) -> Self {
        let topic = topic.into();
        let source_id = partition_key(&topic, partition_id);
        let resolver = OffsetResolver::new(topic.clone(), partition_id, config.retry.clone());
        let locator = LeaderLocator::new(
            config.bootstrap.clone(),
            config.client_id.clone(),
            config.request_timeout,
        );
        Self {
            topic,
            partition_id,
            source_id,
            endpoint,
            config,
            resolver,
            locator,
            marks,
            offsets,
            sender,
            cancel,
        }
    }

    /// Drive the loop to completion.
    ///
    /// Failures are logged and reflected in the returned outcome, never
    /// returned as `Err`; the end-of-partition marker is pushed on every
    /// path out, including cancellation and fatal errors.
    pub async fn run(self) -> FetchOutcome {
        let outcome = self.consume().await;

        self.sender.send_end().await;

        match &outcome {
            FetchOutcome::Completed => {
                info!(
                    topic = %self.topic,
                    partition = self.partition_id,
                    "partition consumed"
                );
            }
            FetchOutcome::BenignStop => {
                info!(
                    topic = %self.topic,
                    partition = self.partition_id,
                    "partition stopped early"
                );
            }
            FetchOutcome::Fatal(cause) => {
                error!(
                    topic = %self.topic,
                    partition = self.partition_id,
                    error = %cause,
                    "partition failed"
                );
            }
        }

        outcome
    }

    async fn consume(&self) -> FetchOutcome {
        if self.cancel.is_cancelled() {
            debug!(
                topic = %self.topic,
                partition = self.partition_id,
                "cancelled before start"
            );
            return FetchOutcome::BenignStop;
        }

        let mut conn = match self.connect(self.endpoint.clone()).await {
            Ok(conn) => conn,
            Err(e) => return FetchOutcome::Fatal(e),
        };

        let end_offset = match self.resolver.latest(&mut conn).await {
            Ok(offset) => offset,
            Err(e) => return FetchOutcome::Fatal(e),
        };
        let start_offset = match self.resolve_start(&mut conn, end_offset).await {
            Ok(offset) => offset,
            Err(e) => return FetchOutcome::Fatal(e),
        };

        info!(
            topic = %self.topic,
            partition = self.partition_id,
            start_offset,
            end_offset,
            "consuming partition"
        );

        if start_offset >= end_offset {
            return FetchOutcome::Completed;
        }

        self.fetch_records(conn, start_offset, end_offset).await
    }

    /// Where to start: persisted mark, then start-time hint, then the
    /// earliest retained offset.
    ///
    /// A start past `end_offset` means the log was truncated or reset
    /// since the mark was written. The loop clamps to `end_offset` and
    /// writes the corrected offset to the offset table itself: no
    /// records will flow, so the downstream commit path would never
    /// observe the correction.
    async fn resolve_start(&self, conn: &mut BrokerConnection, end_offset: u64) -> Result<u64> {
        let resolved = match self.marks.last_committed(&self.source_id).await? {
            Some(mark) => {
                debug!(
                    topic = %self.topic,
                    partition = self.partition_id,
                    mark,
                    "resuming from persisted mark"
                );
                mark
            }
            None => match self.config.start_time {
                Some(ts) => match self.resolver.nearest_before(conn, ts).await? {
                    Some(offset) => offset,
                    None => self.resolver.earliest(conn).await?,
                },
                None => self.resolver.earliest(conn).await?,
            },
        };

        if resolved > end_offset {
            warn!(
                topic = %self.topic,
                partition = self.partition_id,
                resolved,
                end_offset,
                "start offset past log end, clamping"
            );
            self.offsets.put(&self.source_id, end_offset).await;
            return Ok(end_offset);
        }
        Ok(resolved)
    }

    async fn fetch_records(
        &self,
        mut conn: BrokerConnection,
        start_offset: u64,
        end_offset: u64,
    ) -> FetchOutcome {
        let mut offset = start_offset;

        while !self.cancel.is_cancelled() && offset < end_offset {
            let partition = match conn
                .fetch(
                    &self.topic,
                    self.partition_id,
                    offset,
                    self.config.fetch_max_bytes,
                )
                .await
            {
                Ok(partition) => partition,
                Err(e) => return FetchOutcome::Fatal(e.into()),
            };

            let payload = partition.records.unwrap_or_default();

            match classify(partition.error_code, payload.is_empty()) {
                FetchAction::Proceed => {
                    debug!(
                        topic = %self.topic,
                        partition = self.partition_id,
                        offset,
                        bytes = payload.len(),
                        "fetched batch"
                    );

                    let records = match decode_batches(&payload) {
                        Ok(records) => records,
                        Err(e) => return FetchOutcome::Fatal(e.into()),
                    };
                    if records.is_empty() {
                        // only a truncated partial batch fit the byte
                        // bound; refetching would return it again
                        warn!(
                            topic = %self.topic,
                            partition = self.partition_id,
                            offset,
                            "fetched payload held no complete batch, stopping"
                        );
                        return FetchOutcome::BenignStop;
                    }

                    for record in records {
                        if record.offset >= end_offset {
                            return FetchOutcome::Completed;
                        }
                        if record.offset < start_offset || record.offset < offset {
                            debug!(
                                topic = %self.topic,
                                partition = self.partition_id,
                                offset = record.offset,
                                "skipping record below the delivery window"
                            );
                            offset = offset.max(record.next_offset());
                            continue;
                        }

                        let next = record.next_offset();
                        let envelope = MessageEnvelope::new(
                            record,
                            conn.endpoint().host.clone(),
                            self.topic.clone(),
                            self.partition_id,
                        );
                        match self.sender.send(envelope, &self.cancel).await {
                            Ok(()) => {}
                            Err(PushError::Cancelled) => return FetchOutcome::BenignStop,
                            Err(PushError::Closed) => {
                                warn!(
                                    topic = %self.topic,
                                    partition = self.partition_id,
                                    "hand-off queue closed, stopping"
                                );
                                return FetchOutcome::BenignStop;
                            }
                        }
                        offset = offset.max(next);
                    }
                }
                FetchAction::SnapOffset => {
                    let earliest = match self.resolver.earliest(&mut conn).await {
                        Ok(offset) => offset,
                        Err(e) => return FetchOutcome::Fatal(e),
                    };
                    if offset < earliest {
                        warn!(
                            topic = %self.topic,
                            partition = self.partition_id,
                            old = offset,
                            new = earliest,
                            "forwarding stale offset to earliest"
                        );
                        offset = earliest;
                    } else {
                        let latest = match self.resolver.latest(&mut conn).await {
                            Ok(offset) => offset,
                            Err(e) => return FetchOutcome::Fatal(e),
                        };
                        warn!(
                            topic = %self.topic,
                            partition = self.partition_id,
                            old = offset,
                            new = latest,
                            "rewinding future offset to latest"
                        );
                        offset = latest;
                    }
                }
                FetchAction::NewLeader => {
                    let leader = match self.locator.locate(&self.topic, self.partition_id).await {
                        Ok(endpoint) => endpoint,
                        Err(e) => return FetchOutcome::Fatal(e),
                    };
                    info!(
                        topic = %self.topic,
                        partition = self.partition_id,
                        old = %conn.endpoint().addr(),
                        new = %leader.addr(),
                        "partition leader moved, reconnecting"
                    );
                    conn = match self.connect(leader).await {
                        Ok(conn) => conn,
                        Err(e) => return FetchOutcome::Fatal(e),
                    };
                }
                FetchAction::Stop => {
                    warn!(
                        topic = %self.topic,
                        partition = self.partition_id,
                        offset,
                        "empty fetch response, stopping"
                    );
                    return FetchOutcome::BenignStop;
                }
                FetchAction::Fatal(code) => {
                    return FetchOutcome::Fatal(ConsumerError::Broker { code });
                }
            }
        }

        if offset < end_offset {
            FetchOutcome::BenignStop
        } else {
            FetchOutcome::Completed
        }
    }

    async fn connect(&self, endpoint: BrokerEndpoint) -> Result<BrokerConnection> {
        let conn = BrokerConnection::connect(
            endpoint,
            self.config.client_id.clone(),
            self.config.request_timeout,
        )
        .await?;
        Ok(conn)
    }
}
