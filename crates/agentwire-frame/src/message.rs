//! Message taxonomy: every message is exactly one of request, reply or broadcast.
//!
//! A [`Request`] names the [`Reply`] it expects, so correlation is checked by
//! the type system at the call site. A [`Broadcast`] correlates to nothing and
//! always travels on [`BROADCAST_FRAME_ID`](crate::BROADCAST_FRAME_ID).

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::data::{DataInput, DataOutput};
use crate::error::Result;

/// Which category a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Request,
    Reply,
    Broadcast,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Request => "request",
            Self::Reply => "reply",
            Self::Broadcast => "broadcast",
        })
    }
}

/// An immutable value with a payload codec.
///
/// The wire identifies a message only by the type id it was registered
/// under; nothing inside the payload names its type.
pub trait Message: fmt::Debug + Send + Sync + 'static {
    /// Category of this message type.
    const KIND: MessageKind;

    /// Write the payload (header excluded).
    fn encode(&self, out: &mut DataOutput<'_>) -> Result<()>;

    /// Read the payload written by [`Message::encode`].
    fn decode(input: &mut DataInput<'_>) -> Result<Self>
    where
        Self: Sized;
}

/// A message that expects exactly one reply of type `Self::Reply`.
pub trait Request: Message {
    type Reply: Reply;
}

/// A message sent in answer to a request, on the request's frame id.
pub trait Reply: Message {}

/// An unsolicited push.
pub trait Broadcast: Message {}

/// Object-safe view of any [`Message`], used where messages of mixed types
/// flow through one queue or listener.
pub trait AnyMessage: fmt::Debug + Send + Sync + 'static {
    fn kind(&self) -> MessageKind;
    fn type_name(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<M: Message> AnyMessage for M {
    fn kind(&self) -> MessageKind {
        M::KIND
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<M>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl dyn AnyMessage {
    pub fn is<M: Message>(&self) -> bool {
        self.as_any().is::<M>()
    }

    pub fn downcast_ref<M: Message>(&self) -> Option<&M> {
        self.as_any().downcast_ref::<M>()
    }

    /// Recover the concrete type, or `None` if the message is something else.
    pub fn downcast_arc<M: Message>(self: Arc<Self>) -> Option<Arc<M>> {
        self.into_any_arc().downcast::<M>().ok()
    }
}

/// Type id of [`Failure`], reserved in every registry.
pub const FAILURE_TYPE_ID: i16 = 1;

/// In-band failure reply.
///
/// Sent on a request's frame id when its handler failed, so the requester
/// learns about the failure and the connection stays up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// Type id of the request that failed.
    pub request_type: i16,
    pub message: String,
}

impl Message for Failure {
    const KIND: MessageKind = MessageKind::Reply;

    fn encode(&self, out: &mut DataOutput<'_>) -> Result<()> {
        out.write_i16(self.request_type);
        out.write_str(&self.message)
    }

    fn decode(input: &mut DataInput<'_>) -> Result<Self> {
        Ok(Self {
            request_type: input.read_i16()?,
            message: input.read_str()?,
        })
    }
}

impl Reply for Failure {}
