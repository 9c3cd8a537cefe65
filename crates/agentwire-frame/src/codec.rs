use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::arena::{Arena, DEFAULT_INITIAL_CAPACITY};
use crate::data::DataOutput;
use crate::error::{FrameError, Result};
use crate::message::AnyMessage;
use crate::registry::CodecRegistry;

/// Frame header: frame id (4) + type id (2) + payload length (4) = 10 bytes.
pub const HEADER_SIZE: usize = 10;

/// Frame id reserved for broadcasts. Never allocated to a request.
pub const BROADCAST_FRAME_ID: i32 = -1;

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// A frame as it appears on the wire, payload still encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Correlation key; [`BROADCAST_FRAME_ID`] for pushes.
    pub frame_id: i32,
    /// Key into the [`CodecRegistry`].
    pub type_id: i16,
    /// The encoded payload.
    pub payload: Bytes,
}

impl RawFrame {
    pub fn new(frame_id: i32, type_id: i16, payload: impl Into<Bytes>) -> Self {
        Self {
            frame_id,
            type_id,
            payload: payload.into(),
        }
    }

    pub fn is_broadcast(&self) -> bool {
        self.frame_id == BROADCAST_FRAME_ID
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Decode the payload with the codec registered for `type_id`.
    pub fn decode(&self, registry: &CodecRegistry) -> Result<Arc<dyn AnyMessage>> {
        registry.lookup_by_id(self.type_id)?.decode(&self.payload)
    }
}

/// Encode a frame with an already-encoded payload.
///
/// Wire format (big-endian):
/// ```text
/// ┌──────────────┬────────────┬────────────────┬────────────────┐
/// │ Frame id     │ Type id    │ Payload length │ Payload        │
/// │ (4B, i32)    │ (2B, i16)  │ (4B, i32)      │ (length bytes) │
/// └──────────────┴────────────┴────────────────┴────────────────┘
/// ```
pub fn encode_frame(frame_id: i32, type_id: i16, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let len = i32::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLarge {
        size: payload.len(),
        max: i32::MAX as usize,
    })?;
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_i32(frame_id);
    dst.put_i16(type_id);
    dst.put_i32(len);
    dst.put_slice(payload);
    Ok(())
}

/// Serialize `message` as one complete frame appended to `arena`.
///
/// The header is written with a placeholder length, the payload is encoded
/// straight into the arena, then the length is patched in. Returns the
/// payload length.
pub fn encode_message(
    arena: &mut Arena,
    registry: &CodecRegistry,
    frame_id: i32,
    message: &dyn AnyMessage,
    max_payload: usize,
) -> Result<usize> {
    let entry = registry.lookup_for(message)?;
    let start = arena.len();

    let mut out = DataOutput::new(arena);
    out.write_i32(frame_id);
    out.write_i16(entry.type_id());
    let len_pos = out.reserve_i32();
    entry.encode(message, &mut out)?;

    let payload_len = out.position() - start - HEADER_SIZE;
    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }
    let len = i32::try_from(payload_len).map_err(|_| FrameError::PayloadTooLarge {
        size: payload_len,
        max: i32::MAX as usize,
    })?;
    out.patch_i32(len_pos, len);
    Ok(payload_len)
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<RawFrame>> {
    if src.len() < HEADER_SIZE {
        return Ok(None); // Need more data
    }

    let mut header = &src[..HEADER_SIZE];
    let frame_id = header.get_i32();
    let type_id = header.get_i16();
    let raw_len = header.get_i32();

    let payload_len = usize::try_from(raw_len).map_err(|_| FrameError::NegativeLength(raw_len))?;
    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    let total = HEADER_SIZE + payload_len;
    if src.len() < total {
        return Ok(None); // Need more data
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();

    Ok(Some(RawFrame {
        frame_id,
        type_id,
        payload,
    }))
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Starting capacity of each direction's arena. Default: 8 KiB.
    pub initial_capacity: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Failure, FAILURE_TYPE_ID};

    #[test]
    fn test_encode_decode_roundtrip() {
        let mut buf = BytesMut::new();
        let payload = b"hello, agent!";

        encode_frame(7, 100, payload, &mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE + payload.len());

        let frame = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();

        assert_eq!(frame.frame_id, 7);
        assert_eq!(frame.type_id, 100);
        assert_eq!(frame.payload.as_ref(), payload);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_header_layout_is_big_endian() {
        let mut buf = BytesMut::new();
        encode_frame(0x0102_0304, 0x0506, b"xy", &mut buf).unwrap();
        assert_eq!(
            buf.as_ref(),
            &[1, 2, 3, 4, 5, 6, 0, 0, 0, 2, b'x', b'y']
        );
    }

    #[test]
    fn test_decode_incomplete_header() {
        let mut buf = BytesMut::from(&[0x00, 0x00, 0x00][..]);
        let result = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap();
        assert!(result.is_none());
        assert_eq!(buf.len(), 3, "partial bytes stay buffered");
    }

    #[test]
    fn test_decode_incomplete_payload() {
        let mut buf = BytesMut::new();
        encode_frame(1, 100, b"hello", &mut buf).unwrap();
        buf.truncate(HEADER_SIZE + 2);

        let result = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_decode_negative_length() {
        let mut buf = BytesMut::new();
        buf.put_i32(1);
        buf.put_i16(100);
        buf.put_i32(-4);

        let result = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD);
        assert!(matches!(result, Err(FrameError::NegativeLength(-4))));
    }

    #[test]
    fn test_decode_payload_too_large() {
        let mut buf = BytesMut::new();
        buf.put_i32(1);
        buf.put_i16(100);
        buf.put_i32(32 * 1024 * 1024);

        let result = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD);
        assert!(matches!(result, Err(FrameError::PayloadTooLarge { .. })));
    }

    #[test]
    fn test_multiple_frames() {
        let mut buf = BytesMut::new();
        encode_frame(1, 100, b"first", &mut buf).unwrap();
        encode_frame(BROADCAST_FRAME_ID, 300, b"second", &mut buf).unwrap();

        let f1 = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        assert_eq!((f1.frame_id, f1.payload.as_ref()), (1, b"first".as_ref()));
        assert!(!f1.is_broadcast());

        let f2 = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        assert!(f2.is_broadcast());
        assert_eq!(f2.type_id, 300);

        assert!(buf.is_empty());
    }

    #[test]
    fn test_empty_payload() {
        let mut buf = BytesMut::new();
        encode_frame(0, 100, b"", &mut buf).unwrap();

        let frame = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        assert_eq!(frame.frame_id, 0);
        assert!(frame.payload.is_empty());
        assert_eq!(frame.wire_size(), HEADER_SIZE);
    }

    #[test]
    fn test_encode_message_patches_length() {
        let registry = CodecRegistry::new();
        let failure = Failure {
            request_type: 101,
            message: "boom".into(),
        };
        let mut arena = Arena::default();
        let len = encode_message(&mut arena, &registry, 3, &failure, DEFAULT_MAX_PAYLOAD).unwrap();

        // request_type (2) + string length (4) + "boom" (4)
        assert_eq!(len, 10);
        let mut buf = BytesMut::from(arena.as_slice());
        let frame = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        assert_eq!(frame.frame_id, 3);
        assert_eq!(frame.type_id, FAILURE_TYPE_ID);
        assert_eq!(frame.payload.len(), len);

        let decoded = frame.decode(&registry).unwrap();
        assert_eq!(decoded.downcast_ref::<Failure>(), Some(&failure));
    }

    #[test]
    fn test_encode_message_respects_max_payload() {
        let registry = CodecRegistry::new();
        let failure = Failure {
            request_type: 1,
            message: "x".repeat(64),
        };
        let mut arena = Arena::default();
        let err = encode_message(&mut arena, &registry, 0, &failure, 16).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { max: 16, .. }));
    }
}
