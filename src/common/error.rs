use thiserror::Error;

use crate::network::peers::PeerId;

#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A datagram that could not be decoded into a wire message. The
    /// listen loop drops these and keeps going.
    #[error("malformed message: {0}")]
    MalformedMessage(#[from] serde_json::Error),

    /// `send_private` was given a peer outside the group, or the
    /// sending peer itself.
    #[error("invalid destination peer {0}")]
    InvalidDestination(PeerId),

    /// Local send-side failure. There is no retry beyond the ambient
    /// gossip re-forwarding of already-sent broadcasts.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The transport endpoint has shut down. Expected during teardown.
    #[error("transport closed")]
    TransportClosed,
}
