//! Byte-stream transport for agentwire.
//!
//! Provides one stream type over the supported endpoint kinds:
//! - TCP (the default, `tcp://127.0.0.1:25252`)
//! - Unix domain sockets (Linux/macOS)
//!
//! This is the lowest layer of agentwire. A channel engine only needs a
//! value that is `AsyncRead + AsyncWrite`; [`IpcStream`] is the one handed out
//! by [`IpcListener::accept`] and [`connect`].

pub mod endpoint;
pub mod error;
pub mod listener;
pub mod stream;
pub mod tcp;

#[cfg(unix)]
pub mod uds;

pub use endpoint::{Endpoint, DEFAULT_PORT};
pub use error::{Result, TransportError};
pub use listener::{connect, IpcListener};
pub use stream::IpcStream;
pub use tcp::TcpSocket;

#[cfg(unix)]
pub use uds::UnixDomainSocket;
