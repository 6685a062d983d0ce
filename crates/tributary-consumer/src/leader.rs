//! Leader discovery via bootstrap metadata

use std::time::Duration;

use tracing::{debug, warn};

use tributary_wire::{BrokerConnection, BrokerEndpoint};

use crate::error::{ConsumerError, Result};

/// Finds the current leader of a partition by querying bootstrap
/// brokers in order, stopping at the first that reports one.
///
/// Consulted only after a fetch answers with a leader-moved code; the
/// initial endpoint is handed to the loop by its owner. One pass over
/// the bootstrap list, no internal retry: when no broker yields a
/// leader the invocation fails and the supervising layer decides
/// whether to restart the task.
pub struct LeaderLocator {
    bootstrap: Vec<BrokerEndpoint>,
    client_id: String,
    request_timeout: Duration,
}

impl LeaderLocator {
    pub fn new(
        bootstrap: Vec<BrokerEndpoint>,
        client_id: impl Into<String>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            bootstrap,
            client_id: client_id.into(),
            request_timeout,
        }
    }

    pub async fn locate(&self, topic: &str, partition_id: u32) -> Result<BrokerEndpoint> {
        let mut last_reason = "no bootstrap brokers configured".to_string();

        for endpoint in &self.bootstrap {
            let mut conn = match BrokerConnection::connect(
                endpoint.clone(),
                self.client_id.clone(),
                self.request_timeout,
            )
            .await
            {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(addr = %endpoint.addr(), error = %e, "bootstrap broker unreachable");
                    last_reason = e.to_string();
                    continue;
                }
            };

            match conn.metadata(&[topic.to_string()]).await {
                Ok(response) => match response.leader_endpoint(topic, partition_id) {
                    Some(leader) => {
                        debug!(
                            topic,
                            partition = partition_id,
                            leader = %leader.addr(),
                            "located partition leader"
                        );
                        return Ok(leader);
                    }
                    None => {
                        warn!(
                            addr = %endpoint.addr(),
                            topic,
                            partition = partition_id,
                            "metadata reports no leader"
                        );
                        last_reason = format!("no leader reported for {}-{}", topic, partition_id);
                    }
                },
                Err(e) => {
                    warn!(addr = %endpoint.addr(), error = %e, "metadata query failed");
                    last_reason = e.to_string();
                }
            }
        }

        Err(ConsumerError::MetadataUnavailable {
            topic: topic.to_string(),
            partition: partition_id,
            attempts: self.bootstrap.len(),
            reason: last_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tributary_wire::testing::{seed_records, StubCluster};

    /// Endpoint where nothing listens; bound then immediately released.
    async fn dead_endpoint() -> BrokerEndpoint {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        BrokerEndpoint::new("127.0.0.1", port)
    }

    #[tokio::test]
    async fn test_skips_unreachable_bootstrap_broker() {
        let cluster = StubCluster::new();
        cluster.start_node().await.unwrap();
        let live = cluster.start_node().await.unwrap();
        cluster.add_partition("events", 0, 1, seed_records(0, 1));

        let locator = LeaderLocator::new(
            vec![dead_endpoint().await, live],
            "locator-tests",
            Duration::from_secs(5),
        );

        let leader = locator.locate("events", 0).await.unwrap();
        assert_eq!(Some(leader), cluster.node_endpoint(1));
    }

    #[tokio::test]
    async fn test_unknown_partition_is_metadata_unavailable() {
        let cluster = StubCluster::new();
        let node = cluster.start_node().await.unwrap();

        let locator = LeaderLocator::new(vec![node], "locator-tests", Duration::from_secs(5));

        match locator.locate("missing", 0).await {
            Err(ConsumerError::MetadataUnavailable {
                topic,
                partition,
                attempts,
                ..
            }) => {
                assert_eq!(topic, "missing");
                assert_eq!(partition, 0);
                assert_eq!(attempts, 1);
            }
            other => panic!("expected metadata unavailable, got {:?}", other),
        }
    }
}
