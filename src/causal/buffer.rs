use std::collections::HashMap;

use super::clock::VectorClock;
use super::message::{CausalId, Message};
use crate::network::peers::PeerId;

#[derive(Clone, Debug)]
pub struct PendingBroadcast {
    pub origin: PeerId,
    pub stamp: VectorClock,
    pub causal_id: CausalId,
    pub payload: String,
}

impl PendingBroadcast {
    /// Deliverable iff this is the immediate next event from its
    /// origin and every causal predecessor the origin had seen is
    /// already delivered locally.
    pub fn is_deliverable(&self, vc: &VectorClock) -> bool {
        if self.stamp.get(self.origin) != vc.get(self.origin) + 1 {
            return false;
        }
        (0..vc.len())
            .filter(|&j| j != self.origin)
            .all(|j| self.stamp.get(j) <= vc.get(j))
    }

    pub fn to_message(&self) -> Message {
        Message::Broadcast {
            origin_id: self.origin,
            vector_stamp: self.stamp.clone(),
            causal_id: self.causal_id,
            payload: self.payload.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct PendingPrivate {
    pub origin: PeerId,
    pub dest: PeerId,
    pub lamport: u64,
    pub payload: String,
}

/// Messages received but not yet handed to the application. Broadcasts
/// wait here until their causal prerequisites are satisfied; privates
/// pass straight through on the next drain, they only share the
/// interface.
#[derive(Debug, Default)]
pub struct DeliveryBuffer {
    broadcasts: Vec<PendingBroadcast>,
    privates: HashMap<PeerId, Vec<PendingPrivate>>,
}

impl DeliveryBuffer {
    pub fn new() -> Self {
        DeliveryBuffer {
            broadcasts: Vec::new(),
            privates: HashMap::new(),
        }
    }

    pub fn insert_broadcast(&mut self, entry: PendingBroadcast) {
        self.broadcasts.push(entry);
    }

    pub fn insert_private(&mut self, origin: PeerId, entry: PendingPrivate) {
        self.privates.entry(origin).or_default().push(entry);
    }

    pub fn contains_broadcast(&self, causal_id: CausalId) -> bool {
        self.broadcasts
            .iter()
            .any(|entry| entry.causal_id == causal_id)
    }

    /// Broadcasts still waiting on a predecessor. The gossip tick
    /// re-forwards these.
    pub fn pending_broadcasts(&self) -> &[PendingBroadcast] {
        &self.broadcasts
    }

    pub fn is_empty(&self) -> bool {
        self.broadcasts.is_empty() && self.privates.values().all(|queue| queue.is_empty())
    }

    /// Removes and returns every entry whose stamp is satisfied by
    /// `vc`, in causal order. Delivering a broadcast advances
    /// `vc[origin]`, which may unblock entries from other origins, so
    /// the scan repeats until a pass delivers nothing. Each pass
    /// collects first and removes second; ties inside a pass break on
    /// stamp, then ascending origin, to keep replays deterministic.
    pub fn drain_deliverable(&mut self, vc: &mut VectorClock) -> Vec<Message> {
        let mut delivered = Vec::new();

        loop {
            let (mut ready, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.broadcasts)
                .into_iter()
                .partition(|entry| entry.is_deliverable(vc));
            self.broadcasts = rest;
            if ready.is_empty() {
                break;
            }
            ready.sort_by(|a, b| {
                a.stamp
                    .as_slice()
                    .cmp(b.stamp.as_slice())
                    .then(a.origin.cmp(&b.origin))
            });
            for entry in ready {
                vc.increment(entry.origin);
                delivered.push(entry.to_message());
            }
        }

        let mut privates: Vec<PendingPrivate> = Vec::new();
        for queue in self.privates.values_mut() {
            privates.append(queue);
        }
        privates.sort_by(|a, b| a.lamport.cmp(&b.lamport).then(a.origin.cmp(&b.origin)));
        for entry in privates {
            delivered.push(Message::Private {
                origin_id: entry.origin,
                dest_id: entry.dest,
                lamport_stamp: entry.lamport,
                payload: entry.payload,
            });
        }

        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broadcast(origin: PeerId, stamp: Vec<u64>, payload: &str) -> PendingBroadcast {
        let stamp = VectorClock::from(stamp);
        let causal_id = CausalId(origin, stamp.get(origin));
        PendingBroadcast {
            origin,
            stamp,
            causal_id,
            payload: payload.into(),
        }
    }

    fn payloads(messages: &[Message]) -> Vec<String> {
        messages
            .iter()
            .map(|message| match message {
                Message::Broadcast { payload, .. } => payload.clone(),
                Message::Private { payload, .. } => payload.clone(),
            })
            .collect()
    }

    #[test]
    fn test_immediate_next_event_delivers() {
        let mut buffer = DeliveryBuffer::new();
        let mut vc = VectorClock::new(4);
        buffer.insert_broadcast(broadcast(0, vec![1, 0, 0, 0], "A"));

        let delivered = buffer.drain_deliverable(&mut vc);

        assert_eq!(payloads(&delivered), vec!["A"]);
        assert_eq!(vc.as_slice(), &[1, 0, 0, 0]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_gap_from_same_origin_buffers() {
        let mut buffer = DeliveryBuffer::new();
        let mut vc = VectorClock::new(4);
        // second event from origin 0; the first has not been delivered
        buffer.insert_broadcast(broadcast(0, vec![2, 0, 0, 0], "A2"));

        assert!(buffer.drain_deliverable(&mut vc).is_empty());
        assert_eq!(vc.as_slice(), &[0, 0, 0, 0]);
        assert_eq!(buffer.pending_broadcasts().len(), 1);
    }

    #[test]
    fn test_missing_predecessor_buffers_until_it_arrives() {
        let mut buffer = DeliveryBuffer::new();
        let mut vc = VectorClock::new(4);
        // B was sent by peer 1 after it saw A from peer 0
        buffer.insert_broadcast(broadcast(1, vec![1, 1, 0, 0], "B"));
        assert!(buffer.drain_deliverable(&mut vc).is_empty());

        buffer.insert_broadcast(broadcast(0, vec![1, 0, 0, 0], "A"));
        let delivered = buffer.drain_deliverable(&mut vc);

        assert_eq!(payloads(&delivered), vec!["A", "B"]);
        assert_eq!(vc.as_slice(), &[1, 1, 0, 0]);
    }

    #[test]
    fn test_chain_unblocks_in_one_drain() {
        let mut buffer = DeliveryBuffer::new();
        let mut vc = VectorClock::new(3);
        buffer.insert_broadcast(broadcast(2, vec![0, 2, 1], "third"));
        buffer.insert_broadcast(broadcast(1, vec![0, 2, 0], "second"));
        buffer.insert_broadcast(broadcast(1, vec![0, 1, 0], "first"));

        let delivered = buffer.drain_deliverable(&mut vc);

        assert_eq!(payloads(&delivered), vec!["first", "second", "third"]);
        assert_eq!(vc.as_slice(), &[0, 2, 1]);
    }

    #[test]
    fn test_concurrent_broadcasts_break_ties_deterministically() {
        let mut vc = VectorClock::new(3);
        let mut buffer = DeliveryBuffer::new();
        buffer.insert_broadcast(broadcast(2, vec![0, 0, 1], "from2"));
        buffer.insert_broadcast(broadcast(0, vec![1, 0, 0], "from0"));

        let delivered = buffer.drain_deliverable(&mut vc);

        // both are concurrent and ready; stamp order fixes the result
        assert_eq!(payloads(&delivered), vec!["from2", "from0"]);
    }

    #[test]
    fn test_private_passes_through() {
        let mut buffer = DeliveryBuffer::new();
        let mut vc = VectorClock::new(4);
        buffer.insert_private(
            2,
            PendingPrivate {
                origin: 2,
                dest: 0,
                lamport: 7,
                payload: "psst".into(),
            },
        );

        let delivered = buffer.drain_deliverable(&mut vc);

        assert_eq!(payloads(&delivered), vec!["psst"]);
        // private delivery never touches the vector clock
        assert_eq!(vc.as_slice(), &[0, 0, 0, 0]);
        assert!(buffer.is_empty());
    }
}
