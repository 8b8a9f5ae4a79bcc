use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use super::message::{CausalId, Message};
use super::processor::{PeerCommand, PeerProcessor};
use crate::common::error::ProtocolError;
use crate::network::peers::{AddressBook, PeerId};
use crate::network::transport::UdpTransport;

pub const CHANNEL_CAPACITY: usize = 100;

/// Application-facing handle to one peer. The protocol state lives in
/// a spawned processor task; this handle only carries commands in and
/// the stop signal.
pub struct PeerNode {
    id: PeerId,
    cmd_tx: mpsc::Sender<PeerCommand>,
    shutdown_tx: watch::Sender<bool>,
}

impl PeerNode {
    /// Binds the peer's own entry in the address book and spawns it.
    pub async fn spawn(
        id: PeerId,
        book: AddressBook,
    ) -> Result<(Self, mpsc::Receiver<Message>), ProtocolError> {
        let addr = book
            .addr_of(id)
            .ok_or(ProtocolError::InvalidDestination(id))?;
        let socket = UdpSocket::bind(addr).await?;
        Self::spawn_on(id, book, socket)
    }

    /// Wires one peer around an already-bound socket: a transport task
    /// owning the endpoint and a processor task owning the state,
    /// joined by bounded channels.
    pub fn spawn_on(
        id: PeerId,
        book: AddressBook,
        socket: UdpSocket,
    ) -> Result<(Self, mpsc::Receiver<Message>), ProtocolError> {
        let (cmd_tx, cmd_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (delivery_tx, delivery_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let group_size = book.len();
        let mut transport =
            UdpTransport::new(socket, book, outbound_rx, inbound_tx, shutdown_rx.clone());
        let mut processor = PeerProcessor::new(
            id,
            group_size,
            cmd_rx,
            inbound_rx,
            outbound_tx,
            delivery_tx,
            shutdown_rx,
        );
        tokio::spawn(async move { transport.run().await });
        tokio::spawn(async move { processor.run().await });
        debug!(id, "peer spawned");

        Ok((
            PeerNode {
                id,
                cmd_tx,
                shutdown_tx,
            },
            delivery_rx,
        ))
    }

    /// Binds `group_size` loopback sockets on OS-assigned ports and
    /// spawns the whole group over one shared address book.
    pub async fn spawn_group(
        group_size: usize,
    ) -> Result<Vec<(Self, mpsc::Receiver<Message>)>, ProtocolError> {
        let mut sockets = Vec::with_capacity(group_size);
        let mut members = Vec::with_capacity(group_size);
        for _ in 0..group_size {
            let socket = UdpSocket::bind("127.0.0.1:0").await?;
            members.push(socket.local_addr()?);
            sockets.push(socket);
        }
        let book = AddressBook::new(members);

        let mut group = Vec::with_capacity(group_size);
        for (id, socket) in sockets.into_iter().enumerate() {
            group.push(Self::spawn_on(id, book.clone(), socket)?);
        }
        Ok(group)
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    /// Stamps, self-delivers and fans out a broadcast, returning its
    /// id. Only fails once the peer has shut down.
    pub async fn broadcast(
        &self,
        payload: impl Into<String>,
    ) -> Result<CausalId, ProtocolError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(PeerCommand::Broadcast {
                payload: payload.into(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| ProtocolError::TransportClosed)?;
        reply_rx.await.map_err(|_| ProtocolError::TransportClosed)
    }

    /// Sends a Lamport-stamped message straight to `dest`, no gossip.
    pub async fn send_private(
        &self,
        dest: PeerId,
        payload: impl Into<String>,
    ) -> Result<(), ProtocolError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(PeerCommand::SendPrivate {
                dest,
                payload: payload.into(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| ProtocolError::TransportClosed)?;
        reply_rx.await.map_err(|_| ProtocolError::TransportClosed)?
    }

    /// Cooperative stop. Both loops exit, the endpoint is released and
    /// anything still buffered is discarded.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_broadcast_crosses_real_udp() {
        let mut group = PeerNode::spawn_group(2).await.unwrap();
        let (node1, mut deliveries1) = group.pop().unwrap();
        let (node0, mut deliveries0) = group.pop().unwrap();

        node0.broadcast("hello group").await.unwrap();

        // self-delivery at the origin
        let local = timeout(Duration::from_secs(1), deliveries0.recv())
            .await
            .unwrap()
            .unwrap();
        // fan-out of size min(3, 1) reaches the only other peer
        let remote = timeout(Duration::from_secs(2), deliveries1.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(local, remote);
        match remote {
            Message::Broadcast {
                origin_id, payload, ..
            } => {
                assert_eq!(origin_id, 0);
                assert_eq!(payload, "hello group");
            }
            other => panic!("expected broadcast, got {:?}", other),
        }

        node0.shutdown();
        node1.shutdown();
    }

    #[tokio::test]
    async fn test_private_crosses_real_udp() {
        let mut group = PeerNode::spawn_group(3).await.unwrap();
        let (node2, mut deliveries2) = group.pop().unwrap();
        let (_node1, _deliveries1) = group.pop().unwrap();
        let (node0, _deliveries0) = group.pop().unwrap();

        node0.send_private(2, "just for you").await.unwrap();

        let delivered = timeout(Duration::from_secs(2), deliveries2.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            delivered,
            Message::Private {
                origin_id: 0,
                dest_id: 2,
                lamport_stamp: 1,
                payload: "just for you".into(),
            }
        );

        let err = node0.send_private(99, "nobody home").await.unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidDestination(99)));

        node0.shutdown();
        node2.shutdown();
    }
}
