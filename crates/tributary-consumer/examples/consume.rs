//! Consume one partition from a scripted in-process broker.
//!
//! ```text
//! cargo run -p tributary-consumer --example consume
//! ```

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use tracing_subscriber::EnvFilter;

use tributary_consumer::{
    handoff, ConsumerConfig, Delivery, MemoryMarkStore, OffsetTable, PartitionFetcher,
};
use tributary_wire::testing::{seed_records, StubCluster};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tributary_consumer=debug")),
        )
        .init();

    let cluster = StubCluster::new();
    let node = cluster.start_node().await?;
    cluster.add_partition("orders", 0, 0, seed_records(0, 25));
    cluster.set_batch_records("orders", 0, 5);

    let config = Arc::new(
        ConsumerConfig::builder()
            .bootstrap(node.clone())
            .client_id("consume-demo")
            .build()?,
    );

    let (sender, mut receiver) = handoff(config.queue_capacity);
    let fetcher = PartitionFetcher::new(
        "orders",
        0,
        node,
        config,
        Arc::new(MemoryMarkStore::new()),
        OffsetTable::new(),
        sender,
        CancellationToken::new(),
    );
    let loop_task = tokio::spawn(fetcher.run());

    while let Some(delivery) = receiver.recv().await {
        match delivery {
            Delivery::Envelope(envelope) => {
                println!(
                    "{} @ {} from {}: {}",
                    envelope.source_id,
                    envelope.offset(),
                    envelope.source_host,
                    String::from_utf8_lossy(&envelope.record.value),
                );
            }
            Delivery::EndOfPartition => {
                println!("-- end of partition --");
                break;
            }
        }
    }

    let outcome = loop_task.await?;
    println!("outcome: {:?}", outcome);
    Ok(())
}
