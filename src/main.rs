use tokio::time::{sleep, Duration};
use tracing::info;
use tracing_subscriber::EnvFilter;

use simple_cbcast::causal::{Message, PeerNode};
use simple_cbcast::common::ProtocolError;

/*
    A small local group as a demonstration: four peers on loopback
    ports, one broadcast that spreads by gossip, one private message
    delivered point to point. Every peer logs what it delivers, in an
    order consistent with causality.
*/

const GROUP_SIZE: usize = 4;

#[tokio::main]
async fn main() -> Result<(), ProtocolError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let group = PeerNode::spawn_group(GROUP_SIZE).await?;
    let (nodes, receivers): (Vec<_>, Vec<_>) = group.into_iter().unzip();

    for (id, mut deliveries) in receivers.into_iter().enumerate() {
        tokio::spawn(async move {
            while let Some(message) = deliveries.recv().await {
                match message {
                    Message::Broadcast {
                        origin_id, payload, ..
                    } => info!(peer = id, from = origin_id, %payload, "broadcast delivered"),
                    Message::Private {
                        origin_id,
                        lamport_stamp,
                        payload,
                        ..
                    } => info!(
                        peer = id,
                        from = origin_id,
                        lamport = lamport_stamp,
                        %payload,
                        "private delivered"
                    ),
                }
            }
        });
    }

    nodes[0].broadcast("Hello, this is a broadcast message.").await?;
    nodes[1]
        .send_private(2, "Hello, this is a private message.")
        .await?;

    // leave time for the gossip paths to converge
    sleep(Duration::from_secs(3)).await;

    for node in &nodes {
        node.shutdown();
    }
    Ok(())
}
