//! Causal message delivery for a fixed group of peers over unreliable
//! datagram transport.

pub mod causal;
pub mod common;
pub mod network;

pub use causal::{CausalId, Message, PeerNode};
pub use common::ProtocolError;
pub use network::{AddressBook, PeerId};
