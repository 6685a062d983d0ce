//! Wire protocol types and constants

/// Protocol version sent in every request header. There is a single
/// version of this protocol; brokers reject anything else.
pub const PROTOCOL_VERSION: i16 = 0;

/// ListOffsets timestamp sentinel meaning "the next offset to be written"
pub const LATEST_TIMESTAMP: i64 = -1;

/// ListOffsets timestamp sentinel meaning "the oldest retained offset"
pub const EARLIEST_TIMESTAMP: i64 = -2;

/// Request API keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum ApiKey {
    Fetch = 1,
    ListOffsets = 2,
    Metadata = 3,
}

impl ApiKey {
    pub fn from_i16(key: i16) -> Option<Self> {
        match key {
            1 => Some(ApiKey::Fetch),
            2 => Some(ApiKey::ListOffsets),
            3 => Some(ApiKey::Metadata),
            _ => None,
        }
    }

    pub fn as_i16(self) -> i16 {
        self as i16
    }
}

/// Address of a single broker, as dialed by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
}

impl BrokerEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Dialable `host:port` form
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Broker node as reported by a Metadata response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerNode {
    pub node_id: i32,
    pub host: String,
    pub port: i32,
}
