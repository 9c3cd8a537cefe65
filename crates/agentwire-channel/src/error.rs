use std::time::Duration;

/// Errors that can occur in channel operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] agentwire_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] agentwire_frame::FrameError),

    /// The channel is closed, or closed before the operation completed.
    #[error("channel closed")]
    Closed,

    /// No reply arrived in time. The channel has been closed.
    #[error("no reply within {0:?}")]
    Timeout(Duration),

    /// Every non-broadcast frame id has been handed out.
    #[error("frame ids exhausted")]
    FrameIdsExhausted,

    /// Replies go out as Reply messages on a request's frame id, never on
    /// the broadcast frame id.
    #[error("cannot reply with {message_type} on frame id {frame_id}")]
    InvalidReply {
        frame_id: i32,
        message_type: &'static str,
    },

    /// A response listener is already waiting on this frame id.
    #[error("frame id {0} already has a response listener")]
    ListenerExists(i32),

    /// The peer answered with a failure reply.
    #[error("remote failure handling type {type_id}: {message}")]
    Remote { type_id: i16, message: String },

    /// The reply on the request's frame id is not the type the request expects.
    #[error("expected reply {expected}, got {actual}")]
    UnexpectedReply {
        expected: &'static str,
        actual: &'static str,
    },

    /// Workers can only be spawned from inside a tokio runtime.
    #[error("channel must be started inside a tokio runtime")]
    NoRuntime,
}

pub type Result<T> = std::result::Result<T, ChannelError>;
