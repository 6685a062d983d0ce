//! Tributary Consumer - the partition fetch loop
//!
//! This crate drives consumption of a single topic partition from a
//! tributary broker: it resolves the start and end of the live range,
//! fetches record batches from the partition leader, recovers from
//! offset resets and leader moves on its own, and hands records off to
//! a downstream decoder through a bounded queue that always ends with
//! one end-of-partition marker.
//!
//! # Example
//!
//! ```ignore
//! use tributary_consumer::{
//!     handoff, ConsumerConfig, Delivery, MemoryMarkStore, OffsetTable, PartitionFetcher,
//! };
//!
//! let config = Arc::new(
//!     ConsumerConfig::builder()
//!         .bootstrap(BrokerEndpoint::new("broker-1.internal", 9092))
//!         .build()?,
//! );
//! let (sender, mut receiver) = handoff(config.queue_capacity);
//! let cancel = CancellationToken::new();
//!
//! let fetcher = PartitionFetcher::new(
//!     "orders",
//!     0,
//!     leader_endpoint,
//!     config,
//!     Arc::new(MemoryMarkStore::new()),
//!     OffsetTable::new(),
//!     sender,
//!     cancel.clone(),
//! );
//! let outcome = tokio::spawn(fetcher.run());
//!
//! while let Some(Delivery::Envelope(envelope)) = receiver.recv().await {
//!     println!("{}@{}", envelope.source_id, envelope.offset());
//! }
//! ```

pub mod classify;
pub mod config;
pub mod error;
pub mod fetch;
pub mod leader;
pub mod marks;
pub mod queue;
pub mod resolver;

pub use classify::{classify, FetchAction};
pub use config::{ConsumerConfig, ConsumerConfigBuilder};
pub use error::{ConsumerError, FetchOutcome, Result};
pub use fetch::PartitionFetcher;
pub use leader::LeaderLocator;
pub use marks::{MarkStore, MemoryMarkStore, OffsetTable};
pub use queue::{handoff, Delivery, HandoffReceiver, HandoffSender, PushError};
pub use resolver::{OffsetResolver, RetryPolicy};
