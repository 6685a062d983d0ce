//! Consumer configuration

use std::time::Duration;

use tributary_wire::BrokerEndpoint;

use crate::error::{ConsumerError, Result};
use crate::resolver::RetryPolicy;

/// Settings shared by every fetch loop a process starts.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Brokers tried in order for metadata queries
    pub bootstrap: Vec<BrokerEndpoint>,
    /// Client id sent in every request header
    pub client_id: String,
    /// Upper bound on the record payload of a single fetch response
    pub fetch_max_bytes: u32,
    /// Connect timeout, also applied per request
    pub request_timeout: Duration,
    /// Backoff schedule for offset and leader queries
    pub retry: RetryPolicy,
    /// Envelopes buffered between the fetch loop and its consumer
    pub queue_capacity: usize,
    /// When set, partitions without a persisted mark start at the last
    /// record at or before this time (ms since epoch)
    pub start_time: Option<i64>,
}

impl ConsumerConfig {
    /// Create a new ConsumerConfigBuilder.
    pub fn builder() -> ConsumerConfigBuilder {
        ConsumerConfigBuilder::new()
    }
}

/// Builder for constructing a ConsumerConfig.
pub struct ConsumerConfigBuilder {
    bootstrap: Vec<BrokerEndpoint>,
    client_id: String,
    fetch_max_bytes: u32,
    request_timeout: Duration,
    retry: RetryPolicy,
    queue_capacity: usize,
    start_time: Option<i64>,
}

impl ConsumerConfigBuilder {
    /// Create a new ConsumerConfigBuilder with default settings.
    pub fn new() -> Self {
        Self {
            bootstrap: Vec::new(),
            client_id: "tributary-consumer".to_string(),
            fetch_max_bytes: 1_048_576, // 1MB default
            request_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            queue_capacity: 1024,
            start_time: None,
        }
    }

    /// Add a bootstrap broker.
    ///
    /// Metadata queries try bootstrap brokers in the order they were
    /// added, stopping at the first that answers.
    pub fn bootstrap(mut self, endpoint: BrokerEndpoint) -> Self {
        self.bootstrap.push(endpoint);
        self
    }

    /// Set the client id sent in request headers.
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// Set the maximum record payload of a single fetch response.
    pub fn fetch_max_bytes(mut self, bytes: u32) -> Self {
        self.fetch_max_bytes = bytes;
        self
    }

    /// Set the connect and per-request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the retry policy for offset and leader queries.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the number of envelopes buffered before the fetch loop blocks.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the starting time hint for partitions without a persisted mark.
    pub fn start_time(mut self, ms_since_epoch: i64) -> Self {
        self.start_time = Some(ms_since_epoch);
        self
    }

    /// Build the ConsumerConfig.
    ///
    /// # Errors
    ///
    /// Returns an error if no bootstrap broker was added, if
    /// `fetch_max_bytes` is zero or does not fit the wire protocol's
    /// signed 32-bit field, if `queue_capacity` is zero, or if
    /// `start_time` is negative.
    pub fn build(self) -> Result<ConsumerConfig> {
        if self.bootstrap.is_empty() {
            return Err(ConsumerError::Config(
                "at least one bootstrap broker required".into(),
            ));
        }
        if self.fetch_max_bytes == 0 {
            return Err(ConsumerError::Config("fetch_max_bytes must be positive".into()));
        }
        if self.fetch_max_bytes > i32::MAX as u32 {
            return Err(ConsumerError::Config(
                "fetch_max_bytes exceeds the wire protocol's signed 32-bit field".into(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(ConsumerError::Config("queue_capacity must be positive".into()));
        }
        if let Some(t) = self.start_time {
            if t < 0 {
                return Err(ConsumerError::Config(
                    "start_time must be a non-negative timestamp".into(),
                ));
            }
        }

        Ok(ConsumerConfig {
            bootstrap: self.bootstrap,
            client_id: self.client_id,
            fetch_max_bytes: self.fetch_max_bytes,
            request_timeout: self.request_timeout,
            retry: self.retry,
            queue_capacity: self.queue_capacity,
            start_time: self.start_time,
        })
    }
}

impl Default for ConsumerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
