use std::net::SocketAddr;

/// Index of a group member, in `0..group_size`. Membership is static
/// and known to every peer at startup.
pub type PeerId = usize;

#[derive(Debug, Clone)]
pub struct AddressBook {
    pub members: Vec<SocketAddr>,
}

impl AddressBook {
    pub fn new(members: Vec<SocketAddr>) -> Self {
        AddressBook { members }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn is_member(&self, id: PeerId) -> bool {
        id < self.members.len()
    }

    pub fn addr_of(&self, id: PeerId) -> Option<SocketAddr> {
        self.members.get(id).copied()
    }

    /// Resolves a datagram source address back to its peer, if the
    /// sender is a group member.
    pub fn peer_of(&self, addr: &SocketAddr) -> Option<PeerId> {
        self.members.iter().position(|member| member == addr)
    }
}
