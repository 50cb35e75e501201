//! Core functionality for the broker

pub mod channel;
pub mod connection;
pub mod envelope;
pub mod message;
pub mod registry;

// Re-export main components for convenience
pub use channel::ChannelValidator;
pub use connection::{Connection, EnqueueError, OutboundFrame};
pub use envelope::{Request, Response};
pub use message::Message;
pub use registry::Registry;
