/// Errors that can occur while framing, encoding or decoding messages.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended at a frame boundary or part way through a frame.
    #[error("connection closed")]
    ConnectionClosed,

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A length or count prefix was negative.
    #[error("negative length prefix ({0})")]
    NegativeLength(i32),

    /// A value needed more bytes than the payload had left.
    #[error("truncated payload (needed {needed} bytes, {remaining} remaining)")]
    Truncated { needed: usize, remaining: usize },

    /// A string field was not valid UTF-8.
    #[error("string field is not valid UTF-8")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// A codec stopped before consuming its whole payload.
    #[error("{0} unread bytes after decoding payload")]
    TrailingBytes(usize),

    /// A frame carried a type id nothing is registered for.
    #[error("unknown type id {0}")]
    UnknownTypeId(i16),

    /// A message type was written that has no registered codec.
    #[error("no codec registered for {0}")]
    UnknownType(&'static str),

    /// A type id was registered twice.
    #[error("type id {type_id} already registered for {existing}")]
    DuplicateTypeId {
        type_id: i16,
        existing: &'static str,
    },

    /// A message type was registered twice.
    #[error("{0} already registered")]
    DuplicateType(&'static str),

    /// A codec was handed a message of the wrong type.
    #[error("codec for {expected} received {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, FrameError>;
