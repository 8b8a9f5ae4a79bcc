pub mod buffer;
pub mod clock;
pub mod gossip;
pub mod message;
pub mod node;
pub mod processor;

pub use buffer::*;
pub use clock::*;
pub use gossip::*;
pub use message::*;
pub use node::*;
pub use processor::*;
