use std::collections::HashSet;

use rand::seq::SliceRandom;

use super::message::CausalId;
use crate::network::peers::PeerId;

pub const DEFAULT_FANOUT: usize = 3;

/// Decides which peers a broadcast is forwarded to, and remembers
/// which broadcasts this peer has already forwarded so re-gossip
/// cannot cycle. Loss is tolerated statistically by repeated
/// independent forwarding paths, there are no acks and no retries.
#[derive(Debug)]
pub struct GossipPolicy {
    id: PeerId,
    group_size: usize,
    fanout: usize,
    // TODO: age out ids once every peer has delivered them
    seen: HashSet<CausalId>,
}

impl GossipPolicy {
    pub fn new(id: PeerId, group_size: usize) -> Self {
        Self::with_fanout(id, group_size, DEFAULT_FANOUT)
    }

    pub fn with_fanout(id: PeerId, group_size: usize, fanout: usize) -> Self {
        GossipPolicy {
            id,
            group_size,
            fanout,
            seen: HashSet::new(),
        }
    }

    pub fn already_seen(&self, causal_id: CausalId) -> bool {
        self.seen.contains(&causal_id)
    }

    /// Initial fan-out for a broadcast this peer originated.
    pub fn on_originate(&mut self, causal_id: CausalId) -> Vec<PeerId> {
        self.seen.insert(causal_id);
        self.sample(None)
    }

    /// Fan-out for a broadcast received from another peer. Forwarding
    /// each id at most once is what keeps the epidemic from echoing
    /// forever; the immediate sender is skipped to cut redundant echo.
    pub fn on_forward_candidate(
        &mut self,
        causal_id: CausalId,
        received_from: Option<PeerId>,
    ) -> Vec<PeerId> {
        if !self.seen.insert(causal_id) {
            return Vec::new();
        }
        self.sample(received_from)
    }

    /// Targets for the periodic re-send of a still-buffered broadcast.
    /// Not gated on the seen set, the tick is a deliberate repeat.
    pub fn reforward_targets(&self, origin: PeerId) -> Vec<PeerId> {
        self.sample(Some(origin))
    }

    fn sample(&self, exclude: Option<PeerId>) -> Vec<PeerId> {
        let candidates: Vec<PeerId> = (0..self.group_size)
            .filter(|&peer| peer != self.id && Some(peer) != exclude)
            .collect();
        let count = self.fanout.min(candidates.len());
        candidates
            .choose_multiple(&mut rand::thread_rng(), count)
            .copied()
            .collect()
    }
}
