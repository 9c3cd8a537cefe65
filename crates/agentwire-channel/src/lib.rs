//! Channel engine for agentwire.
//!
//! A [`Channel`] owns one connection and runs its reader, writer and event
//! dispatcher as tokio tasks. On top of it:
//! - [`Channel::request`] and [`Channel::call`] correlate replies by frame id
//! - [`Dispatcher`] answers inbound requests through capability handlers
//! - [`ChannelSet`] and [`BroadcastSource`] fan broadcasts out to every peer
//! - [`Server`] and [`connect`] produce started channels over an [`Endpoint`]
//!
//! [`Endpoint`]: agentwire_transport::Endpoint

pub mod config;
pub mod connector;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod result;
pub mod server;
pub mod set;

pub use config::{ChannelConfig, DEFAULT_REPLY_TIMEOUT};
pub use connector::{connect, connect_with_config};
pub use dispatch::{Dispatcher, HandlerError};
pub use engine::{
    BroadcastListener, Channel, ChannelState, ResponseListener, TrafficListener, WriteListener,
};
pub use error::{ChannelError, Result};
pub use result::{ReplyResult, WriteResult};
pub use server::Server;
pub use set::{BroadcastSource, ChannelSet};
