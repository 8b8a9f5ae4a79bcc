use serde::{Deserialize, Serialize};

use crate::network::peers::PeerId;

/// One counter per group member. Slot `i` is the number of events
/// originated by peer `i` that the owner has incorporated.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock(Vec<u64>);

impl VectorClock {
    pub fn new(group_size: usize) -> Self {
        VectorClock(vec![0; group_size])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, id: PeerId) -> u64 {
        self.0[id]
    }

    pub fn increment(&mut self, id: PeerId) {
        self.0[id] += 1;
    }

    /// Component-wise max. Idempotent, so merging the same clock twice
    /// is a no-op after the first.
    pub fn merge(&mut self, received: &VectorClock) {
        for (mine, theirs) in self.0.iter_mut().zip(received.0.iter()) {
            *mine = (*mine).max(*theirs);
        }
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.0
    }
}

impl From<Vec<u64>> for VectorClock {
    fn from(slots: Vec<u64>) -> Self {
        VectorClock(slots)
    }
}

/// The clocks one peer owns: a vector clock for the broadcast stream
/// and a Lamport scalar for the private stream. Only the owning peer
/// increments its own vector slot directly; every other slot advances
/// through delivery.
#[derive(Clone, Debug)]
pub struct ClockSet {
    id: PeerId,
    lamport: u64,
    vector: VectorClock,
}

impl ClockSet {
    pub fn new(id: PeerId, group_size: usize) -> Self {
        ClockSet {
            id,
            lamport: 0,
            vector: VectorClock::new(group_size),
        }
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn lamport(&self) -> u64 {
        self.lamport
    }

    pub fn vector(&self) -> &VectorClock {
        &self.vector
    }

    pub fn vector_mut(&mut self) -> &mut VectorClock {
        &mut self.vector
    }

    /// Called exactly once per originated broadcast, before the stamp
    /// is attached to the outgoing message.
    pub fn increment_local(&mut self) {
        let id = self.id;
        self.vector.increment(id);
    }

    pub fn merge_vector(&mut self, received: &VectorClock) {
        self.vector.merge(received);
    }

    /// Send side of the Lamport rule: bump, then stamp.
    pub fn increment_lamport(&mut self) -> u64 {
        self.lamport += 1;
        self.lamport
    }

    /// Receive side of the Lamport rule: take the max, then bump.
    pub fn merge_lamport(&mut self, received: u64) -> u64 {
        self.lamport = self.lamport.max(received) + 1;
        self.lamport
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_local_touches_own_slot_only() {
        let mut clocks = ClockSet::new(1, 4);
        clocks.increment_local();
        clocks.increment_local();
        assert_eq!(clocks.vector().as_slice(), &[0, 2, 0, 0]);
    }

    #[test]
    fn test_vector_merge_is_idempotent() {
        let mut clocks = ClockSet::new(0, 4);
        clocks.increment_local();
        let received = VectorClock::from(vec![0, 3, 1, 0]);

        clocks.merge_vector(&received);
        let once = clocks.vector().clone();
        clocks.merge_vector(&received);

        assert_eq!(clocks.vector(), &once);
        assert_eq!(once.as_slice(), &[1, 3, 1, 0]);
    }

    #[test]
    fn test_lamport_strictly_increases() {
        let mut clocks = ClockSet::new(0, 2);
        let mut last = clocks.lamport();
        for received in [0, 5, 2, 5, 100] {
            let sent = clocks.increment_lamport();
            assert!(sent > last);
            let merged = clocks.merge_lamport(received);
            assert!(merged > sent);
            assert!(merged > received);
            last = merged;
        }
    }
}
