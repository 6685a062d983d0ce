//! Broker connection
//!
//! One TCP connection to one broker, carrying one request at a time.
//! Readers hold a connection per partition and never pipeline, so the
//! correlation id only guards against a broker replying out of order.

use std::time::Duration;

use bytes::BytesMut;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::debug;

use crate::codec::{FrameCodec, RequestHeader, ResponseHeader};
use crate::error::{WireError, WireResult};
use crate::messages::{
    FetchPartition, FetchRequest, FetchResponse, ListOffsetsRequest, ListOffsetsResponse,
    MetadataRequest, MetadataResponse, OffsetsPartition,
};
use crate::types::{ApiKey, BrokerEndpoint, PROTOCOL_VERSION};

/// How long a broker may hold a fetch before answering, even empty
const FETCH_MAX_WAIT_MS: i32 = 500;

/// Answer a fetch as soon as a single byte is available
const FETCH_MIN_BYTES: i32 = 1;

/// A client connection to a single broker
pub struct BrokerConnection {
    framed: Framed<TcpStream, FrameCodec>,
    endpoint: BrokerEndpoint,
    client_id: String,
    request_timeout: Duration,
    next_correlation_id: i32,
}

impl BrokerConnection {
    /// Connect to a broker, bounded by `request_timeout`
    pub async fn connect(
        endpoint: BrokerEndpoint,
        client_id: impl Into<String>,
        request_timeout: Duration,
    ) -> WireResult<Self> {
        let stream = tokio::time::timeout(request_timeout, TcpStream::connect(endpoint.addr()))
            .await
            .map_err(|_| WireError::Timeout(request_timeout))??;

        debug!(addr = %endpoint.addr(), "connected to broker");

        Ok(Self {
            framed: Framed::new(stream, FrameCodec::new()),
            endpoint,
            client_id: client_id.into(),
            request_timeout,
            next_correlation_id: 0,
        })
    }

    /// The endpoint this connection was dialed against
    pub fn endpoint(&self) -> &BrokerEndpoint {
        &self.endpoint
    }

    /// Fetch records from `fetch_offset`, bounded by `max_bytes`
    pub async fn fetch(
        &mut self,
        topic: &str,
        partition: u32,
        fetch_offset: u64,
        max_bytes: u32,
    ) -> WireResult<FetchPartition> {
        let request = FetchRequest {
            topic: topic.to_string(),
            partition: partition as i32,
            fetch_offset: fetch_offset as i64,
            max_bytes: max_bytes as i32,
            max_wait_ms: FETCH_MAX_WAIT_MS,
            min_bytes: FETCH_MIN_BYTES,
        };
        let mut body = BytesMut::new();
        request.encode(&mut body);

        let mut frame = self.round_trip(ApiKey::Fetch, body).await?;
        let response = FetchResponse::parse(&mut frame)?;
        Ok(response.partition)
    }

    /// Look up the offset for a timestamp (or one of the sentinels)
    pub async fn list_offsets(
        &mut self,
        topic: &str,
        partition: u32,
        timestamp: i64,
    ) -> WireResult<OffsetsPartition> {
        let request = ListOffsetsRequest {
            topic: topic.to_string(),
            partition: partition as i32,
            timestamp,
        };
        let mut body = BytesMut::new();
        request.encode(&mut body);

        let mut frame = self.round_trip(ApiKey::ListOffsets, body).await?;
        let response = ListOffsetsResponse::parse(&mut frame)?;
        Ok(response.partition)
    }

    /// Fetch cluster metadata for the named topics (empty = all)
    pub async fn metadata(&mut self, topics: &[String]) -> WireResult<MetadataResponse> {
        let request = MetadataRequest {
            topics: topics.to_vec(),
        };
        let mut body = BytesMut::new();
        request.encode(&mut body);

        let mut frame = self.round_trip(ApiKey::Metadata, body).await?;
        MetadataResponse::parse(&mut frame)
    }

    async fn round_trip(&mut self, api_key: ApiKey, body: BytesMut) -> WireResult<BytesMut> {
        self.next_correlation_id = self.next_correlation_id.wrapping_add(1);
        let correlation_id = self.next_correlation_id;

        let header = RequestHeader {
            api_key: api_key.as_i16(),
            api_version: PROTOCOL_VERSION,
            correlation_id,
            client_id: Some(self.client_id.clone()),
        };
        let mut request = BytesMut::new();
        header.encode(&mut request);
        request.extend_from_slice(&body);

        tokio::time::timeout(self.request_timeout, self.framed.send(request))
            .await
            .map_err(|_| WireError::Timeout(self.request_timeout))??;

        let mut frame = tokio::time::timeout(self.request_timeout, self.framed.next())
            .await
            .map_err(|_| WireError::Timeout(self.request_timeout))?
            .ok_or(WireError::ConnectionClosed)??;

        let response_header = ResponseHeader::parse(&mut frame)?;
        if response_header.correlation_id != correlation_id {
            return Err(WireError::CorrelationMismatch {
                expected: correlation_id,
                actual: response_header.correlation_id,
            });
        }

        Ok(frame)
    }
}
