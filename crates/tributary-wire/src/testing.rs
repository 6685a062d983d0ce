//! In-process scripted broker cluster
//!
//! Backs integration tests and demos: real TCP, real frames, scripted
//! data. Each node is a listener bound to a loopback port; all nodes
//! share one cluster state, so leadership can be handed between nodes
//! while a client is mid-stream.
//!
//! Fault scripts are per-partition queues of error codes. Each fetch or
//! list-offsets request pops one entry and answers with that code before
//! normal handling resumes, which is enough to script offset snaps,
//! leader migrations, and fatal codes.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tracing::{debug, warn};

use tributary_core::Record;

use crate::batch::encode_batch;
use crate::codec::{FrameCodec, RequestHeader, ResponseHeader};
use crate::error::{ErrorCode, WireResult};
use crate::messages::{
    FetchPartition, FetchRequest, FetchResponse, ListOffsetsRequest, ListOffsetsResponse,
    MetadataRequest, MetadataResponse, OffsetsPartition, PartitionMetadata, TopicMetadata,
};
use crate::types::{ApiKey, BrokerEndpoint, BrokerNode, EARLIEST_TIMESTAMP, LATEST_TIMESTAMP};

/// One request observed by the cluster, oldest first
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestLogEntry {
    Fetch {
        node_id: i32,
        topic: String,
        partition: u32,
        offset: i64,
    },
    ListOffsets {
        node_id: i32,
        topic: String,
        partition: u32,
        timestamp: i64,
    },
    Metadata {
        node_id: i32,
    },
}

struct PartitionState {
    /// Retained records, contiguous ascending offsets
    records: Vec<Record>,
    leader: i32,
    fetch_faults: VecDeque<i16>,
    offsets_faults: VecDeque<i16>,
    /// Records per encoded batch; fetches serve whole batches starting
    /// with the one containing the requested offset
    batch_records: usize,
}

impl PartitionState {
    fn earliest(&self) -> u64 {
        self.records.first().map(|r| r.offset).unwrap_or(0)
    }

    fn latest(&self) -> u64 {
        self.records.last().map(|r| r.next_offset()).unwrap_or(0)
    }
}

struct ClusterState {
    brokers: Mutex<Vec<BrokerNode>>,
    partitions: Mutex<HashMap<(String, u32), PartitionState>>,
    requests: Mutex<Vec<RequestLogEntry>>,
}

impl ClusterState {
    fn lock_brokers(&self) -> MutexGuard<'_, Vec<BrokerNode>> {
        self.brokers.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_partitions(&self) -> MutexGuard<'_, HashMap<(String, u32), PartitionState>> {
        self.partitions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_requests(&self) -> MutexGuard<'_, Vec<RequestLogEntry>> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn log(&self, entry: RequestLogEntry) {
        self.lock_requests().push(entry);
    }
}

/// Scripted broker cluster
#[derive(Clone)]
pub struct StubCluster {
    state: Arc<ClusterState>,
}

impl Default for StubCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl StubCluster {
    pub fn new() -> Self {
        Self {
            state: Arc::new(ClusterState {
                brokers: Mutex::new(Vec::new()),
                partitions: Mutex::new(HashMap::new()),
                requests: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Bind a new node on a loopback port and start serving
    ///
    /// Node ids are assigned sequentially from 0. The node's accept task
    /// runs until the runtime shuts down.
    pub async fn start_node(&self) -> WireResult<BrokerEndpoint> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let node_id = {
            let mut brokers = self.state.lock_brokers();
            let node_id = brokers.len() as i32;
            brokers.push(BrokerNode {
                node_id,
                host: "127.0.0.1".to_string(),
                port: addr.port() as i32,
            });
            node_id
        };

        let state = self.state.clone();
        tokio::spawn(accept_loop(listener, node_id, state));

        Ok(BrokerEndpoint::new("127.0.0.1", addr.port()))
    }

    /// Endpoint of an already started node
    pub fn node_endpoint(&self, node_id: i32) -> Option<BrokerEndpoint> {
        self.state
            .lock_brokers()
            .iter()
            .find(|b| b.node_id == node_id)
            .map(|b| BrokerEndpoint::new(b.host.clone(), b.port as u16))
    }

    /// Install a partition led by `leader`
    ///
    /// `records` must have contiguous ascending offsets; the first offset
    /// doubles as the partition's earliest retained offset.
    pub fn add_partition(&self, topic: &str, partition: u32, leader: i32, records: Vec<Record>) {
        self.state.lock_partitions().insert(
            (topic.to_string(), partition),
            PartitionState {
                records,
                leader,
                fetch_faults: VecDeque::new(),
                offsets_faults: VecDeque::new(),
                batch_records: 1,
            },
        );
    }

    /// Hand leadership of a partition to another node
    pub fn set_leader(&self, topic: &str, partition: u32, leader: i32) {
        if let Some(p) = self
            .state
            .lock_partitions()
            .get_mut(&(topic.to_string(), partition))
        {
            p.leader = leader;
        }
    }

    /// Group `n` records into each encoded batch (default 1)
    pub fn set_batch_records(&self, topic: &str, partition: u32, n: usize) {
        if let Some(p) = self
            .state
            .lock_partitions()
            .get_mut(&(topic.to_string(), partition))
        {
            p.batch_records = n.max(1);
        }
    }

    /// Answer the next fetch for this partition with `code`
    pub fn push_fetch_fault(&self, topic: &str, partition: u32, code: ErrorCode) {
        if let Some(p) = self
            .state
            .lock_partitions()
            .get_mut(&(topic.to_string(), partition))
        {
            p.fetch_faults.push_back(code.as_i16());
        }
    }

    /// Answer the next list-offsets for this partition with `code`
    pub fn push_offsets_fault(&self, topic: &str, partition: u32, code: ErrorCode) {
        if let Some(p) = self
            .state
            .lock_partitions()
            .get_mut(&(topic.to_string(), partition))
        {
            p.offsets_faults.push_back(code.as_i16());
        }
    }

    /// Snapshot of every request served so far
    pub fn requests(&self) -> Vec<RequestLogEntry> {
        self.state.lock_requests().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.state
            .lock_requests()
            .iter()
            .filter(|r| matches!(r, RequestLogEntry::Fetch { .. }))
            .count()
    }

    pub fn offsets_count(&self) -> usize {
        self.state
            .lock_requests()
            .iter()
            .filter(|r| matches!(r, RequestLogEntry::ListOffsets { .. }))
            .count()
    }
}

/// Contiguous records from `start`, with deterministic timestamps
/// (`1_000_000 + offset * 1_000`) so time-based lookups can be scripted
pub fn seed_records(start: u64, count: usize) -> Vec<Record> {
    (0..count as u64)
        .map(|i| {
            let offset = start + i;
            Record {
                offset,
                timestamp: 1_000_000 + offset * 1_000,
                key: Some(Bytes::from(format!("key-{}", offset))),
                value: Bytes::from(format!("value-{}", offset)),
            }
        })
        .collect()
}

async fn accept_loop(listener: TcpListener, node_id: i32, state: Arc<ClusterState>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = state.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve_connection(stream, node_id, state).await {
                        warn!("stub broker connection error from {}: {}", addr, e);
                    }
                });
            }
            Err(e) => {
                warn!("stub broker accept failed: {}", e);
                break;
            }
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    node_id: i32,
    state: Arc<ClusterState>,
) -> WireResult<()> {
    let mut framed = Framed::new(stream, FrameCodec::new());

    while let Some(result) = framed.next().await {
        let mut frame = result?;
        let header = RequestHeader::parse(&mut frame)?;

        debug!(
            node_id,
            api_key = header.api_key,
            correlation_id = header.correlation_id,
            "stub broker request"
        );

        let response_body = match ApiKey::from_i16(header.api_key) {
            Some(ApiKey::Fetch) => handle_fetch(&state, node_id, &mut frame)?,
            Some(ApiKey::ListOffsets) => handle_list_offsets(&state, node_id, &mut frame)?,
            Some(ApiKey::Metadata) => handle_metadata(&state, node_id, &mut frame)?,
            None => {
                return Err(crate::error::WireError::Protocol(format!(
                    "Unsupported api key {}",
                    header.api_key
                )))
            }
        };

        let mut response = BytesMut::new();
        ResponseHeader::new(header.correlation_id).encode(&mut response);
        response.extend_from_slice(&response_body);
        framed.send(response).await?;
    }

    Ok(())
}

fn handle_fetch(state: &ClusterState, node_id: i32, body: &mut BytesMut) -> WireResult<BytesMut> {
    let request = FetchRequest::parse(body)?;
    let topic = request.topic.clone();
    let partition_id = request.partition as u32;

    state.log(RequestLogEntry::Fetch {
        node_id,
        topic: topic.clone(),
        partition: partition_id,
        offset: request.fetch_offset,
    });

    let mut partitions = state.lock_partitions();
    let partition = match partitions.get_mut(&(topic.clone(), partition_id)) {
        None => error_fetch_partition(request.partition, ErrorCode::UnknownTopicOrPartition, -1),
        Some(p) => {
            let high_watermark = p.latest() as i64;
            if let Some(code) = p.fetch_faults.pop_front() {
                FetchPartition {
                    partition: request.partition,
                    error_code: code,
                    high_watermark,
                    records: None,
                }
            } else if p.leader != node_id {
                error_fetch_partition(
                    request.partition,
                    ErrorCode::NotLeaderOrFollower,
                    high_watermark,
                )
            } else {
                serve_fetch(p, request.partition, request.fetch_offset, request.max_bytes)
            }
        }
    };
    drop(partitions);

    let response = FetchResponse { topic, partition };
    let mut out = BytesMut::new();
    response.encode(&mut out);
    Ok(out)
}

fn error_fetch_partition(partition: i32, code: ErrorCode, high_watermark: i64) -> FetchPartition {
    FetchPartition {
        partition,
        error_code: code.as_i16(),
        high_watermark,
        records: None,
    }
}

fn serve_fetch(
    p: &PartitionState,
    partition: i32,
    fetch_offset: i64,
    max_bytes: i32,
) -> FetchPartition {
    let earliest = p.earliest();
    let latest = p.latest();
    let high_watermark = latest as i64;

    if fetch_offset < 0 {
        return error_fetch_partition(partition, ErrorCode::OffsetOutOfRange, high_watermark);
    }
    let offset = fetch_offset as u64;
    if offset < earliest || offset > latest {
        return error_fetch_partition(partition, ErrorCode::OffsetOutOfRange, high_watermark);
    }
    if offset == latest {
        return FetchPartition {
            partition,
            error_code: ErrorCode::None.as_i16(),
            high_watermark,
            records: Some(Vec::new()),
        };
    }

    let budget = max_bytes.max(0) as usize;
    let align = p.batch_records;
    // whole batches only, starting with the batch containing `offset`
    let mut index = ((offset - earliest) as usize / align) * align;
    let mut payload = Vec::new();

    while index < p.records.len() {
        let end = (index + align).min(p.records.len());
        let encoded = encode_batch(&p.records[index..end]);
        if payload.len() + encoded.len() > budget {
            break;
        }
        payload.extend_from_slice(&encoded);
        index = end;
    }

    FetchPartition {
        partition,
        error_code: ErrorCode::None.as_i16(),
        high_watermark,
        records: Some(payload),
    }
}

fn handle_list_offsets(
    state: &ClusterState,
    node_id: i32,
    body: &mut BytesMut,
) -> WireResult<BytesMut> {
    let request = ListOffsetsRequest::parse(body)?;
    let topic = request.topic.clone();
    let partition_id = request.partition as u32;

    state.log(RequestLogEntry::ListOffsets {
        node_id,
        topic: topic.clone(),
        partition: partition_id,
        timestamp: request.timestamp,
    });

    let mut partitions = state.lock_partitions();
    let partition = match partitions.get_mut(&(topic.clone(), partition_id)) {
        None => OffsetsPartition {
            partition: request.partition,
            error_code: ErrorCode::UnknownTopicOrPartition.as_i16(),
            timestamp: -1,
            offset: -1,
        },
        Some(p) => {
            if let Some(code) = p.offsets_faults.pop_front() {
                OffsetsPartition {
                    partition: request.partition,
                    error_code: code,
                    timestamp: -1,
                    offset: -1,
                }
            } else if p.leader != node_id {
                OffsetsPartition {
                    partition: request.partition,
                    error_code: ErrorCode::NotLeaderOrFollower.as_i16(),
                    timestamp: -1,
                    offset: -1,
                }
            } else {
                resolve_offset(p, request.partition, request.timestamp)
            }
        }
    };
    drop(partitions);

    let response = ListOffsetsResponse { topic, partition };
    let mut out = BytesMut::new();
    response.encode(&mut out);
    Ok(out)
}

fn resolve_offset(p: &PartitionState, partition: i32, timestamp: i64) -> OffsetsPartition {
    let ok = ErrorCode::None.as_i16();
    match timestamp {
        LATEST_TIMESTAMP => OffsetsPartition {
            partition,
            error_code: ok,
            timestamp: -1,
            offset: p.latest() as i64,
        },
        EARLIEST_TIMESTAMP => OffsetsPartition {
            partition,
            error_code: ok,
            timestamp: -1,
            offset: p.earliest() as i64,
        },
        ts => match p
            .records
            .iter()
            .rev()
            .find(|r| (r.timestamp as i64) <= ts)
        {
            Some(r) => OffsetsPartition {
                partition,
                error_code: ok,
                timestamp: r.timestamp as i64,
                offset: r.offset as i64,
            },
            None => OffsetsPartition {
                partition,
                error_code: ok,
                timestamp: -1,
                offset: -1,
            },
        },
    }
}

fn handle_metadata(
    state: &ClusterState,
    node_id: i32,
    body: &mut BytesMut,
) -> WireResult<BytesMut> {
    let request = MetadataRequest::parse(body)?;
    state.log(RequestLogEntry::Metadata { node_id });

    let brokers = state.lock_brokers().clone();
    let partitions = state.lock_partitions();

    let names: Vec<String> = if request.topics.is_empty() {
        let mut names: Vec<String> = partitions.keys().map(|(t, _)| t.clone()).collect();
        names.sort();
        names.dedup();
        names
    } else {
        request.topics
    };

    let topics = names
        .into_iter()
        .map(|name| {
            let mut entries: Vec<PartitionMetadata> = partitions
                .iter()
                .filter(|((t, _), _)| *t == name)
                .map(|((_, partition), p)| PartitionMetadata {
                    error_code: ErrorCode::None.as_i16(),
                    partition: *partition as i32,
                    leader: p.leader,
                })
                .collect();
            entries.sort_by_key(|e| e.partition);

            if entries.is_empty() {
                TopicMetadata {
                    error_code: ErrorCode::UnknownTopicOrPartition.as_i16(),
                    name,
                    partitions: vec![],
                }
            } else {
                TopicMetadata {
                    error_code: ErrorCode::None.as_i16(),
                    name,
                    partitions: entries,
                }
            }
        })
        .collect();
    drop(partitions);

    let response = MetadataResponse { brokers, topics };
    let mut out = BytesMut::new();
    response.encode(&mut out);
    Ok(out)
}
