pub mod peers;
pub mod transport;

pub use peers::*;
pub use transport::*;

/*
    The wire is plain UDP: datagrams may be lost, duplicated by the
    gossip layer above, and arrive in any order. A send is at most
    once and never confirmed. Everything the protocol guarantees is
    built on top of that, by buffering against the vector clock and by
    re-forwarding along independent random paths; nothing here waits
    for another peer.
*/
