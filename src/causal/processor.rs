use rand::Rng;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep, Duration};
use tracing::{debug, trace, warn};

use super::buffer::{DeliveryBuffer, PendingBroadcast, PendingPrivate};
use super::clock::ClockSet;
use super::gossip::GossipPolicy;
use super::message::{CausalId, Message};
use crate::common::error::ProtocolError;
use crate::network::peers::PeerId;
use crate::network::transport::{InboundDatagram, OutboundEnvelope};

/// Jitter for the periodic re-forward of pending broadcasts, in
/// milliseconds.
pub const GOSSIP_DELAY_MS: std::ops::Range<u64> = 500..1500;

/// Application requests, answered over oneshot channels.
pub enum PeerCommand {
    Broadcast {
        payload: String,
        reply: oneshot::Sender<CausalId>,
    },
    SendPrivate {
        dest: PeerId,
        payload: String,
        reply: oneshot::Sender<Result<(), ProtocolError>>,
    },
}

/// One peer's protocol state and the single task allowed to mutate it.
/// Commands, inbound datagrams and gossip ticks are serialized through
/// one select loop; across peers nothing is shared but the wire.
pub struct PeerProcessor {
    pub id: PeerId,
    pub group_size: usize,
    pub clocks: ClockSet,
    pub buffer: DeliveryBuffer,
    pub gossip: GossipPolicy,
    pub cmd_rx: mpsc::Receiver<PeerCommand>,
    pub net_rx: mpsc::Receiver<InboundDatagram>,
    pub net_tx: mpsc::Sender<OutboundEnvelope>,
    pub delivery_tx: mpsc::Sender<Message>,
    pub shutdown: watch::Receiver<bool>,
}

impl PeerProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: PeerId,
        group_size: usize,
        cmd_rx: mpsc::Receiver<PeerCommand>,
        net_rx: mpsc::Receiver<InboundDatagram>,
        net_tx: mpsc::Sender<OutboundEnvelope>,
        delivery_tx: mpsc::Sender<Message>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        PeerProcessor {
            id,
            group_size,
            clocks: ClockSet::new(id, group_size),
            buffer: DeliveryBuffer::new(),
            gossip: GossipPolicy::new(id, group_size),
            cmd_rx,
            net_rx,
            net_tx,
            delivery_tx,
            shutdown,
        }
    }

    pub async fn run(&mut self) {
        debug!(id = self.id, "peer processor running");
        let mut gossip_tick = Box::pin(sleep(gossip_delay()));
        loop {
            tokio::select! {
                command = self.cmd_rx.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                datagram = self.net_rx.recv() => match datagram {
                    Some(datagram) => self.handle_inbound(datagram).await,
                    None => break,
                },
                _ = gossip_tick.as_mut() => {
                    self.reforward_pending();
                    gossip_tick.set(sleep(gossip_delay()));
                },
                _ = self.shutdown.changed() => break,
            }
        }
        debug!(id = self.id, "peer processor stopped");
    }

    pub async fn handle_command(&mut self, command: PeerCommand) {
        match command {
            PeerCommand::Broadcast { payload, reply } => {
                let causal_id = self.do_broadcast(payload).await;
                let _ = reply.send(causal_id);
            }
            PeerCommand::SendPrivate {
                dest,
                payload,
                reply,
            } => {
                let result = self.do_send_private(dest, payload);
                let _ = reply.send(result);
                self.drain_and_deliver(None).await;
            }
        }
    }

    /// Stamps a new broadcast, delivers it to this peer first, then
    /// hands it to the gossip policy for the initial fan-out.
    pub async fn do_broadcast(&mut self, payload: String) -> CausalId {
        self.clocks.increment_local();
        let stamp = self.clocks.vector().clone();
        let causal_id = CausalId(self.id, stamp.get(self.id));
        let message = Message::Broadcast {
            origin_id: self.id,
            vector_stamp: stamp,
            causal_id,
            payload,
        };

        self.deliver(message.clone()).await;
        let targets = self.gossip.on_originate(causal_id);
        self.send_to(&message, &targets);
        self.drain_and_deliver(None).await;
        causal_id
    }

    pub fn do_send_private(
        &mut self,
        dest: PeerId,
        payload: String,
    ) -> Result<(), ProtocolError> {
        if dest == self.id || dest >= self.group_size {
            return Err(ProtocolError::InvalidDestination(dest));
        }
        let lamport_stamp = self.clocks.increment_lamport();
        let message = Message::Private {
            origin_id: self.id,
            dest_id: dest,
            lamport_stamp,
            payload,
        };
        match self.net_tx.try_send(OutboundEnvelope { dest, message }) {
            Ok(()) => Ok(()),
            Err(TrySendError::Closed(_)) => Err(ProtocolError::TransportClosed),
            Err(TrySendError::Full(_)) => Err(ProtocolError::Transport(std::io::Error::new(
                std::io::ErrorKind::WouldBlock,
                "outbound queue full",
            ))),
        }
    }

    /// Decode, buffer, drain. Malformed or out-of-group datagrams are
    /// dropped here; the loop keeps listening.
    pub async fn handle_inbound(&mut self, datagram: InboundDatagram) {
        let message = match Message::decode(&datagram.bytes) {
            Ok(message) => message,
            Err(err) => {
                warn!(id = self.id, error = %err, "dropping malformed datagram");
                return;
            }
        };
        if !self.fits_group(&message) {
            warn!(id = self.id, origin = message.origin(), "dropping message that does not fit the group");
            return;
        }
        match message {
            Message::Broadcast {
                origin_id,
                vector_stamp,
                causal_id,
                payload,
            } => {
                if self.gossip.already_seen(causal_id)
                    || self.buffer.contains_broadcast(causal_id)
                {
                    trace!(id = self.id, ?causal_id, "duplicate broadcast ignored");
                    return;
                }
                self.buffer.insert_broadcast(PendingBroadcast {
                    origin: origin_id,
                    stamp: vector_stamp,
                    causal_id,
                    payload,
                });
                self.drain_and_deliver(datagram.from).await;
            }
            Message::Private {
                origin_id,
                dest_id,
                lamport_stamp,
                payload,
            } => {
                if dest_id != self.id {
                    debug!(id = self.id, dest = dest_id, "ignoring private message for another peer");
                    return;
                }
                self.clocks.merge_lamport(lamport_stamp);
                self.buffer.insert_private(
                    origin_id,
                    PendingPrivate {
                        origin: origin_id,
                        dest: dest_id,
                        lamport: lamport_stamp,
                        payload,
                    },
                );
                self.drain_and_deliver(datagram.from).await;
            }
        }
    }

    /// Hands every newly deliverable message to the application, then
    /// offers delivered broadcasts for further propagation.
    async fn drain_and_deliver(&mut self, received_from: Option<PeerId>) {
        let ready = self.buffer.drain_deliverable(self.clocks.vector_mut());
        for message in ready {
            let forward = match &message {
                Message::Broadcast { causal_id, .. } => Some(*causal_id),
                Message::Private { .. } => None,
            };
            self.deliver(message.clone()).await;
            if let Some(causal_id) = forward {
                let targets = self.gossip.on_forward_candidate(causal_id, received_from);
                self.send_to(&message, &targets);
            }
        }
    }

    /// Re-sends broadcasts still waiting on a predecessor, to a fresh
    /// random subset each tick.
    fn reforward_pending(&self) {
        for entry in self.buffer.pending_broadcasts() {
            let targets = self.gossip.reforward_targets(entry.origin);
            if targets.is_empty() {
                continue;
            }
            trace!(id = self.id, causal_id = ?entry.causal_id, "re-forwarding pending broadcast");
            self.send_to(&entry.to_message(), &targets);
        }
    }

    async fn deliver(&self, message: Message) {
        if self.delivery_tx.send(message).await.is_err() {
            warn!(id = self.id, "delivery channel closed, dropping message");
        }
    }

    fn send_to(&self, message: &Message, targets: &[PeerId]) {
        for &dest in targets {
            let envelope = OutboundEnvelope {
                dest,
                message: message.clone(),
            };
            if let Err(err) = self.net_tx.try_send(envelope) {
                warn!(id = self.id, error = %err, "failed to queue outbound message");
            }
        }
    }

    fn fits_group(&self, message: &Message) -> bool {
        match message {
            Message::Broadcast {
                origin_id,
                vector_stamp,
                causal_id,
                ..
            } => {
                *origin_id < self.group_size
                    && vector_stamp.len() == self.group_size
                    && causal_id.origin() == *origin_id
            }
            Message::Private {
                origin_id, dest_id, ..
            } => *origin_id < self.group_size && *dest_id < self.group_size,
        }
    }
}

fn gossip_delay() -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(GOSSIP_DELAY_MS))
}
