use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace, warn};

use super::peers::{AddressBook, PeerId};
use crate::causal::message::Message;
use crate::common::error::ProtocolError;

pub const MAX_DATAGRAM_SIZE: usize = 4096;

/// A message on its way out, addressed by peer id. The transport task
/// resolves the address and encodes.
#[derive(Clone, Debug)]
pub struct OutboundEnvelope {
    pub dest: PeerId,
    pub message: Message,
}

/// Raw bytes off the wire. `from` is the source resolved against the
/// address book, when the sender is a group member.
#[derive(Debug)]
pub struct InboundDatagram {
    pub bytes: Vec<u8>,
    pub from: Option<PeerId>,
}

/// Owns one peer's UDP endpoint. Sends are fire-and-forget: failures
/// are logged and swallowed, delivery is never confirmed. Inbound
/// datagrams that would overflow the processor's queue are dropped,
/// same as any other datagram loss.
pub struct UdpTransport {
    pub socket: UdpSocket,
    pub book: AddressBook,
    pub outbound_rx: mpsc::Receiver<OutboundEnvelope>,
    pub inbound_tx: mpsc::Sender<InboundDatagram>,
    pub shutdown: watch::Receiver<bool>,
}

impl UdpTransport {
    pub fn new(
        socket: UdpSocket,
        book: AddressBook,
        outbound_rx: mpsc::Receiver<OutboundEnvelope>,
        inbound_tx: mpsc::Sender<InboundDatagram>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        UdpTransport {
            socket,
            book,
            outbound_rx,
            inbound_tx,
            shutdown,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ProtocolError> {
        Ok(self.socket.local_addr()?)
    }

    /// Runs until shutdown or until the processor side goes away. The
    /// endpoint is released when the task drops the socket.
    pub async fn run(&mut self) {
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        loop {
            tokio::select! {
                envelope = self.outbound_rx.recv() => match envelope {
                    Some(envelope) => self.send(envelope).await,
                    None => break,
                },
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, addr)) => {
                        let datagram = InboundDatagram {
                            bytes: buf[..len].to_vec(),
                            from: self.book.peer_of(&addr),
                        };
                        if self.inbound_tx.try_send(datagram).is_err() {
                            warn!(%addr, "inbound queue full, dropping datagram");
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "recv failed");
                    }
                },
                _ = self.shutdown.changed() => break,
            }
        }
        debug!("transport stopped");
    }

    async fn send(&self, envelope: OutboundEnvelope) {
        let Some(addr) = self.book.addr_of(envelope.dest) else {
            warn!(dest = envelope.dest, "no address for peer");
            return;
        };
        let bytes = match envelope.message.encode() {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(error = %err, "failed to encode outbound message");
                return;
            }
        };
        match self.socket.send_to(&bytes, addr).await {
            Ok(_) => trace!(dest = envelope.dest, %addr, "datagram sent"),
            Err(err) => warn!(dest = envelope.dest, error = %err, "send failed"),
        }
    }
}
