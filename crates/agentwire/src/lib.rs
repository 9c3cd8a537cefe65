//! Binary request/reply/broadcast protocol between an in-process agent and
//! its controller.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP and Unix-domain-socket endpoints
//! - [`frame`]: length-prefixed framing, payload primitives, codec registry
//! - [`message`]: the stable request/reply/broadcast catalog
//! - [`channel`]: the channel engine, dispatcher, server and client

/// Re-export transport types.
pub mod transport {
    pub use agentwire_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use agentwire_frame::*;
}

/// Re-export the message catalog.
pub mod message {
    pub use agentwire_message::*;
}

/// Re-export channel types.
pub mod channel {
    pub use agentwire_channel::*;
}

pub use agentwire_channel::{connect, Channel, ChannelError, Dispatcher, Server};
pub use agentwire_message::catalog_registry;
pub use agentwire_transport::Endpoint;
