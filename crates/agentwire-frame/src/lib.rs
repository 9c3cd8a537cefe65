//! Length-prefixed binary framing, payload primitives and the codec registry.
//!
//! Every message travels in one frame:
//! - A 4-byte big-endian frame id (`-1` marks a broadcast)
//! - A 2-byte big-endian type id, the key into a [`CodecRegistry`]
//! - A 4-byte big-endian payload length, always the exact payload size
//!
//! Payloads are written with [`DataOutput`] and read with [`DataInput`]
//! over a per-direction [`Arena`]. [`FrameReader`] and [`FrameWriter`] move
//! whole frames over any tokio stream; no partial reads reach user code.

pub mod arena;
pub mod codec;
pub mod data;
pub mod error;
pub mod message;
pub mod reader;
pub mod registry;
pub mod writer;

pub use arena::{Arena, DEFAULT_INITIAL_CAPACITY};
pub use codec::{
    decode_frame, encode_frame, encode_message, FrameConfig, RawFrame, BROADCAST_FRAME_ID,
    DEFAULT_MAX_PAYLOAD, HEADER_SIZE,
};
pub use data::{DataInput, DataOutput};
pub use error::{FrameError, Result};
pub use message::{
    AnyMessage, Broadcast, Failure, Message, MessageKind, Reply, Request, FAILURE_TYPE_ID,
};
pub use reader::FrameReader;
pub use registry::{CodecEntry, CodecRegistry};
pub use writer::FrameWriter;
