//! Request and response bodies
//!
//! Each message here has both an `encode` and a `parse` side: the client
//! encodes requests and parses responses, while an in-process broker (the
//! testing stub) parses requests and encodes responses.
//!
//! The protocol allows one topic and one partition per request. Readers
//! run one connection per partition, so multi-entry arrays are rejected
//! at parse time rather than silently picking an element.

use bytes::{Buf, BufMut, BytesMut};

use crate::codec::{
    encode_nullable_bytes, encode_string, parse_array, parse_nullable_bytes, parse_string,
};
use crate::error::{WireError, WireResult};
use crate::types::{BrokerEndpoint, BrokerNode};

fn single<T>(mut items: Vec<T>, what: &str) -> WireResult<T> {
    if items.len() != 1 {
        return Err(WireError::Protocol(format!(
            "Expected exactly one {}, got {}",
            what,
            items.len()
        )));
    }
    Ok(items.swap_remove(0))
}

/// Fetch request: read records from one partition starting at an offset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub topic: String,
    pub partition: i32,
    pub fetch_offset: i64,
    pub max_bytes: i32,
    pub max_wait_ms: i32,
    pub min_bytes: i32,
}

impl FetchRequest {
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_i32(-1); // replica_id, always -1 from clients
        buf.put_i32(self.max_wait_ms);
        buf.put_i32(self.min_bytes);
        buf.put_i32(1); // topic count
        encode_string(buf, &self.topic);
        buf.put_i32(1); // partition count
        buf.put_i32(self.partition);
        buf.put_i64(self.fetch_offset);
        buf.put_i32(self.max_bytes);
    }

    pub fn parse(buf: &mut BytesMut) -> WireResult<Self> {
        if buf.len() < 12 {
            return Err(WireError::Protocol("Fetch request too short".to_string()));
        }
        let _replica_id = buf.get_i32();
        let max_wait_ms = buf.get_i32();
        let min_bytes = buf.get_i32();

        let topics = parse_array(buf, |b| {
            let topic = parse_string(b)?;
            let partitions = parse_array(b, |b| {
                if b.len() < 16 {
                    return Err(WireError::Protocol(
                        "Fetch request partition too short".to_string(),
                    ));
                }
                Ok((b.get_i32(), b.get_i64(), b.get_i32()))
            })?;
            Ok((topic, partitions))
        })?;

        let (topic, partitions) = single(topics, "fetch request topic")?;
        let (partition, fetch_offset, max_bytes) = single(partitions, "fetch request partition")?;

        Ok(Self {
            topic,
            partition,
            fetch_offset,
            max_bytes,
            max_wait_ms,
            min_bytes,
        })
    }
}

/// Per-partition payload of a fetch response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPartition {
    pub partition: i32,
    pub error_code: i16,
    pub high_watermark: i64,
    /// Raw record set; decode with [`crate::batch::decode_batches`]
    pub records: Option<Vec<u8>>,
}

/// Fetch response for a single topic partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub topic: String,
    pub partition: FetchPartition,
}

impl FetchResponse {
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_i32(1); // topic count
        encode_string(buf, &self.topic);
        buf.put_i32(1); // partition count
        buf.put_i32(self.partition.partition);
        buf.put_i16(self.partition.error_code);
        buf.put_i64(self.partition.high_watermark);
        encode_nullable_bytes(buf, self.partition.records.as_deref());
    }

    pub fn parse(buf: &mut BytesMut) -> WireResult<Self> {
        let topics = parse_array(buf, |b| {
            let topic = parse_string(b)?;
            let partitions = parse_array(b, |b| {
                if b.len() < 14 {
                    return Err(WireError::Protocol(
                        "Fetch response partition too short".to_string(),
                    ));
                }
                let partition = b.get_i32();
                let error_code = b.get_i16();
                let high_watermark = b.get_i64();
                let records = parse_nullable_bytes(b)?;
                Ok(FetchPartition {
                    partition,
                    error_code,
                    high_watermark,
                    records,
                })
            })?;
            Ok((topic, partitions))
        })?;

        let (topic, partitions) = single(topics, "fetch response topic")?;
        let partition = single(partitions, "fetch response partition")?;

        Ok(Self { topic, partition })
    }
}

/// ListOffsets request: locate an offset by timestamp
///
/// `timestamp` is a moment in ms, or one of the sentinels
/// [`crate::types::LATEST_TIMESTAMP`] / [`crate::types::EARLIEST_TIMESTAMP`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListOffsetsRequest {
    pub topic: String,
    pub partition: i32,
    pub timestamp: i64,
}

impl ListOffsetsRequest {
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_i32(-1); // replica_id
        buf.put_i32(1); // topic count
        encode_string(buf, &self.topic);
        buf.put_i32(1); // partition count
        buf.put_i32(self.partition);
        buf.put_i64(self.timestamp);
    }

    pub fn parse(buf: &mut BytesMut) -> WireResult<Self> {
        if buf.len() < 4 {
            return Err(WireError::Protocol(
                "ListOffsets request too short".to_string(),
            ));
        }
        let _replica_id = buf.get_i32();

        let topics = parse_array(buf, |b| {
            let topic = parse_string(b)?;
            let partitions = parse_array(b, |b| {
                if b.len() < 12 {
                    return Err(WireError::Protocol(
                        "ListOffsets request partition too short".to_string(),
                    ));
                }
                Ok((b.get_i32(), b.get_i64()))
            })?;
            Ok((topic, partitions))
        })?;

        let (topic, partitions) = single(topics, "list-offsets request topic")?;
        let (partition, timestamp) = single(partitions, "list-offsets request partition")?;

        Ok(Self {
            topic,
            partition,
            timestamp,
        })
    }
}

/// Per-partition payload of a ListOffsets response
///
/// `offset` is -1 when no offset satisfies the query (timestamp earlier
/// than every retained record).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetsPartition {
    pub partition: i32,
    pub error_code: i16,
    pub timestamp: i64,
    pub offset: i64,
}

/// ListOffsets response for a single topic partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListOffsetsResponse {
    pub topic: String,
    pub partition: OffsetsPartition,
}

impl ListOffsetsResponse {
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_i32(1); // topic count
        encode_string(buf, &self.topic);
        buf.put_i32(1); // partition count
        buf.put_i32(self.partition.partition);
        buf.put_i16(self.partition.error_code);
        buf.put_i64(self.partition.timestamp);
        buf.put_i64(self.partition.offset);
    }

    pub fn parse(buf: &mut BytesMut) -> WireResult<Self> {
        let topics = parse_array(buf, |b| {
            let topic = parse_string(b)?;
            let partitions = parse_array(b, |b| {
                if b.len() < 22 {
                    return Err(WireError::Protocol(
                        "ListOffsets response partition too short".to_string(),
                    ));
                }
                Ok(OffsetsPartition {
                    partition: b.get_i32(),
                    error_code: b.get_i16(),
                    timestamp: b.get_i64(),
                    offset: b.get_i64(),
                })
            })?;
            Ok((topic, partitions))
        })?;

        let (topic, partitions) = single(topics, "list-offsets response topic")?;
        let partition = single(partitions, "list-offsets response partition")?;

        Ok(Self { topic, partition })
    }
}

/// Metadata request; an empty topic list asks for every known topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataRequest {
    pub topics: Vec<String>,
}

impl MetadataRequest {
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_i32(self.topics.len() as i32);
        for topic in &self.topics {
            encode_string(buf, topic);
        }
    }

    pub fn parse(buf: &mut BytesMut) -> WireResult<Self> {
        let topics = parse_array(buf, parse_string)?;
        Ok(Self { topics })
    }
}

/// Partition entry of a metadata response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionMetadata {
    pub error_code: i16,
    pub partition: i32,
    /// Node id of the current leader, -1 when none is elected
    pub leader: i32,
}

/// Topic entry of a metadata response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicMetadata {
    pub error_code: i16,
    pub name: String,
    pub partitions: Vec<PartitionMetadata>,
}

/// Metadata response: the broker roster plus per-partition leadership
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataResponse {
    pub brokers: Vec<BrokerNode>,
    pub topics: Vec<TopicMetadata>,
}

impl MetadataResponse {
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_i32(self.brokers.len() as i32);
        for broker in &self.brokers {
            buf.put_i32(broker.node_id);
            encode_string(buf, &broker.host);
            buf.put_i32(broker.port);
        }

        buf.put_i32(self.topics.len() as i32);
        for topic in &self.topics {
            buf.put_i16(topic.error_code);
            encode_string(buf, &topic.name);
            buf.put_i32(topic.partitions.len() as i32);
            for partition in &topic.partitions {
                buf.put_i16(partition.error_code);
                buf.put_i32(partition.partition);
                buf.put_i32(partition.leader);
            }
        }
    }

    pub fn parse(buf: &mut BytesMut) -> WireResult<Self> {
        let brokers = parse_array(buf, |b| {
            if b.len() < 4 {
                return Err(WireError::Protocol(
                    "Metadata response broker too short".to_string(),
                ));
            }
            let node_id = b.get_i32();
            let host = parse_string(b)?;
            if b.len() < 4 {
                return Err(WireError::Protocol(
                    "Metadata response broker too short".to_string(),
                ));
            }
            let port = b.get_i32();
            Ok(BrokerNode {
                node_id,
                host,
                port,
            })
        })?;

        let topics = parse_array(buf, |b| {
            if b.len() < 2 {
                return Err(WireError::Protocol(
                    "Metadata response topic too short".to_string(),
                ));
            }
            let error_code = b.get_i16();
            let name = parse_string(b)?;
            let partitions = parse_array(b, |b| {
                if b.len() < 10 {
                    return Err(WireError::Protocol(
                        "Metadata response partition too short".to_string(),
                    ));
                }
                Ok(PartitionMetadata {
                    error_code: b.get_i16(),
                    partition: b.get_i32(),
                    leader: b.get_i32(),
                })
            })?;
            Ok(TopicMetadata {
                error_code,
                name,
                partitions,
            })
        })?;

        Ok(Self { brokers, topics })
    }

    /// Resolve the leader endpoint for a partition, if one is known
    pub fn leader_endpoint(&self, topic: &str, partition: u32) -> Option<BrokerEndpoint> {
        let topic_meta = self
            .topics
            .iter()
            .find(|t| t.error_code == 0 && t.name == topic)?;
        let partition_meta = topic_meta
            .partitions
            .iter()
            .find(|p| p.error_code == 0 && p.partition == partition as i32)?;
        if partition_meta.leader < 0 {
            return None;
        }
        let node = self
            .brokers
            .iter()
            .find(|b| b.node_id == partition_meta.leader)?;
        Some(BrokerEndpoint::new(node.host.clone(), node.port as u16))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---------------------------------------------------------------
    // Fetch
    // ---------------------------------------------------------------

    #[test]
    fn test_fetch_request_roundtrip() {
        let request = FetchRequest {
            topic: "orders".to_string(),
            partition: 3,
            fetch_offset: 12_345,
            max_bytes: 1 << 20,
            max_wait_ms: 500,
            min_bytes: 1,
        };

        let mut buf = BytesMut::new();
        request.encode(&mut buf);

        let parsed = FetchRequest::parse(&mut buf).unwrap();
        assert_eq!(parsed, request);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_fetch_response_roundtrip() {
        let response = FetchResponse {
            topic: "orders".to_string(),
            partition: FetchPartition {
                partition: 0,
                error_code: 0,
                high_watermark: 9_999,
                records: Some(vec![1, 2, 3, 4]),
            },
        };

        let mut buf = BytesMut::new();
        response.encode(&mut buf);
        assert_eq!(FetchResponse::parse(&mut buf).unwrap(), response);
    }

    #[test]
    fn test_fetch_response_null_records() {
        let response = FetchResponse {
            topic: "t".to_string(),
            partition: FetchPartition {
                partition: 0,
                error_code: 1,
                high_watermark: -1,
                records: None,
            },
        };

        let mut buf = BytesMut::new();
        response.encode(&mut buf);
        let parsed = FetchResponse::parse(&mut buf).unwrap();
        assert_eq!(parsed.partition.records, None);
        assert_eq!(parsed.partition.error_code, 1);
    }

    #[test]
    fn test_multi_topic_fetch_response_rejected() {
        let mut buf = BytesMut::new();
        buf.put_i32(2); // two topics
        for name in ["a", "b"] {
            encode_string(&mut buf, name);
            buf.put_i32(1);
            buf.put_i32(0);
            buf.put_i16(0);
            buf.put_i64(0);
            encode_nullable_bytes(&mut buf, None);
        }

        let err = FetchResponse::parse(&mut buf).unwrap_err();
        assert!(format!("{}", err).contains("exactly one"));
    }

    #[test]
    fn test_zero_partition_fetch_request_rejected() {
        let mut buf = BytesMut::new();
        buf.put_i32(-1);
        buf.put_i32(500);
        buf.put_i32(1);
        buf.put_i32(1);
        encode_string(&mut buf, "orders");
        buf.put_i32(0); // no partitions

        assert!(FetchRequest::parse(&mut buf).is_err());
    }

    // ---------------------------------------------------------------
    // ListOffsets
    // ---------------------------------------------------------------

    #[test]
    fn test_list_offsets_roundtrip() {
        let request = ListOffsetsRequest {
            topic: "orders".to_string(),
            partition: 1,
            timestamp: -2,
        };
        let mut buf = BytesMut::new();
        request.encode(&mut buf);
        assert_eq!(ListOffsetsRequest::parse(&mut buf).unwrap(), request);

        let response = ListOffsetsResponse {
            topic: "orders".to_string(),
            partition: OffsetsPartition {
                partition: 1,
                error_code: 0,
                timestamp: -1,
                offset: 4_200,
            },
        };
        let mut buf = BytesMut::new();
        response.encode(&mut buf);
        assert_eq!(ListOffsetsResponse::parse(&mut buf).unwrap(), response);
    }

    #[test]
    fn test_list_offsets_response_truncated() {
        let response = ListOffsetsResponse {
            topic: "t".to_string(),
            partition: OffsetsPartition {
                partition: 0,
                error_code: 0,
                timestamp: 0,
                offset: 0,
            },
        };
        let mut buf = BytesMut::new();
        response.encode(&mut buf);
        buf.truncate(buf.len() - 4);

        assert!(ListOffsetsResponse::parse(&mut buf).is_err());
    }

    // ---------------------------------------------------------------
    // Metadata
    // ---------------------------------------------------------------

    fn sample_metadata() -> MetadataResponse {
        MetadataResponse {
            brokers: vec![
                BrokerNode {
                    node_id: 0,
                    host: "broker-0".to_string(),
                    port: 9092,
                },
                BrokerNode {
                    node_id: 1,
                    host: "broker-1".to_string(),
                    port: 9093,
                },
            ],
            topics: vec![TopicMetadata {
                error_code: 0,
                name: "orders".to_string(),
                partitions: vec![
                    PartitionMetadata {
                        error_code: 0,
                        partition: 0,
                        leader: 1,
                    },
                    PartitionMetadata {
                        error_code: 0,
                        partition: 1,
                        leader: -1,
                    },
                ],
            }],
        }
    }

    #[test]
    fn test_metadata_roundtrip() {
        let request = MetadataRequest {
            topics: vec!["orders".to_string()],
        };
        let mut buf = BytesMut::new();
        request.encode(&mut buf);
        assert_eq!(MetadataRequest::parse(&mut buf).unwrap(), request);

        let response = sample_metadata();
        let mut buf = BytesMut::new();
        response.encode(&mut buf);
        assert_eq!(MetadataResponse::parse(&mut buf).unwrap(), response);
    }

    #[test]
    fn test_metadata_request_empty_topic_list() {
        let request = MetadataRequest { topics: vec![] };
        let mut buf = BytesMut::new();
        request.encode(&mut buf);
        assert!(MetadataRequest::parse(&mut buf).unwrap().topics.is_empty());
    }

    #[test]
    fn test_leader_endpoint_lookup() {
        let response = sample_metadata();
        let endpoint = response.leader_endpoint("orders", 0).unwrap();
        assert_eq!(endpoint, BrokerEndpoint::new("broker-1", 9093));
    }

    #[test]
    fn test_leader_endpoint_no_leader() {
        let response = sample_metadata();
        assert_eq!(response.leader_endpoint("orders", 1), None);
    }

    #[test]
    fn test_leader_endpoint_unknown_topic() {
        let response = sample_metadata();
        assert_eq!(response.leader_endpoint("missing", 0), None);
    }

    #[test]
    fn test_leader_endpoint_errored_topic() {
        let mut response = sample_metadata();
        response.topics[0].error_code = 3;
        assert_eq!(response.leader_endpoint("orders", 0), None);
    }
}
