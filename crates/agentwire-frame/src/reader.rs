use std::io::ErrorKind;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, trace};

use crate::arena::Arena;
use crate::codec::{decode_frame, FrameConfig, RawFrame};
use crate::error::{FrameError, Result};
use crate::message::AnyMessage;
use crate::registry::CodecRegistry;

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete frames from any `AsyncRead` stream.
///
/// Handles partial reads internally: bytes accumulate in the reader's own
/// arena until a whole frame is present, so callers always get complete
/// frames. Dropping a pending `read_frame` future loses nothing that was
/// already buffered.
pub struct FrameReader<R> {
    inner: R,
    arena: Arena,
    config: FrameConfig,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: R) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: R, config: FrameConfig) -> Self {
        Self {
            inner,
            arena: Arena::with_capacity(config.initial_capacity),
            config,
        }
    }

    /// Read the next complete frame.
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached, whether
    /// at a frame boundary or in the middle of one.
    pub async fn read_frame(&mut self) -> Result<RawFrame> {
        loop {
            if let Some(frame) = decode_frame(self.arena.bytes_mut(), self.config.max_payload_size)? {
                trace!(
                    frame_id = frame.frame_id,
                    type_id = frame.type_id,
                    len = frame.payload.len(),
                    "read frame"
                );
                return Ok(frame);
            }

            self.arena.ensure_writable(READ_CHUNK_SIZE);
            let read = match self.inner.read_buf(self.arena.bytes_mut()).await {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                if !self.arena.is_empty() {
                    debug!(buffered = self.arena.len(), "stream ended mid-frame");
                }
                return Err(FrameError::ConnectionClosed);
            }
        }
    }

    /// Read the next frame and decode its payload.
    ///
    /// Returns the frame id alongside the decoded message.
    pub async fn read_message(
        &mut self,
        registry: &CodecRegistry,
    ) -> Result<(i32, Arc<dyn AnyMessage>)> {
        let frame = self.read_frame().await?;
        let message = frame.decode(registry)?;
        Ok((frame.frame_id, message))
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use bytes::{BufMut, BytesMut};
    use tokio::io::ReadBuf;

    use super::*;
    use crate::codec::{encode_frame, BROADCAST_FRAME_ID};
    use crate::message::{Failure, FAILURE_TYPE_ID};

    #[tokio::test]
    async fn read_single_frame() {
        let mut wire = BytesMut::new();
        encode_frame(1, 100, b"hello", &mut wire).unwrap();

        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()));
        let frame = reader.read_frame().await.unwrap();

        assert_eq!(frame.frame_id, 1);
        assert_eq!(frame.type_id, 100);
        assert_eq!(frame.payload.as_ref(), b"hello");
    }

    #[tokio::test]
    async fn read_multiple_frames() {
        let mut wire = BytesMut::new();
        encode_frame(0, 100, b"one", &mut wire).unwrap();
        encode_frame(1, 101, b"two", &mut wire).unwrap();
        encode_frame(BROADCAST_FRAME_ID, 300, b"three", &mut wire).unwrap();

        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()));

        let f1 = reader.read_frame().await.unwrap();
        let f2 = reader.read_frame().await.unwrap();
        let f3 = reader.read_frame().await.unwrap();

        assert_eq!((f1.frame_id, f1.payload.as_ref()), (0, b"one".as_ref()));
        assert_eq!((f2.frame_id, f2.payload.as_ref()), (1, b"two".as_ref()));
        assert!(f3.is_broadcast());
        assert_eq!(f3.payload.as_ref(), b"three");
    }

    #[tokio::test]
    async fn read_frame_with_large_payload() {
        let payload = vec![0xAB; 96 * 1024];
        let mut wire = BytesMut::new();
        encode_frame(9, 100, &payload, &mut wire).unwrap();

        let config = FrameConfig {
            initial_capacity: 64,
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config(Cursor::new(wire.to_vec()), config);
        let frame = reader.read_frame().await.unwrap();

        assert_eq!(frame.frame_id, 9);
        assert_eq!(frame.payload.as_ref(), payload.as_slice());
    }

    #[tokio::test]
    async fn partial_read_handling() {
        let mut wire = BytesMut::new();
        encode_frame(4, 100, b"slow", &mut wire).unwrap();

        let byte_reader = ByteByByteReader {
            bytes: wire.to_vec(),
            pos: 0,
        };
        let mut reader = FrameReader::new(byte_reader);

        let frame = reader.read_frame().await.unwrap();
        assert_eq!(frame.frame_id, 4);
        assert_eq!(frame.payload.as_ref(), b"slow");
    }

    #[tokio::test]
    async fn connection_closed_cleanly() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        let err = reader.read_frame().await.unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[tokio::test]
    async fn connection_closed_mid_frame() {
        let mut partial = BytesMut::new();
        partial.put_i32(2);
        partial.put_i16(100);
        partial.put_i32(16);
        partial.put_slice(b"only-part");

        let mut reader = FrameReader::new(Cursor::new(partial.to_vec()));
        let err = reader.read_frame().await.unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[tokio::test]
    async fn connection_closed_mid_header() {
        let mut reader = FrameReader::new(Cursor::new(vec![0, 0, 0, 1, 0]));
        let err = reader.read_frame().await.unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[tokio::test]
    async fn oversized_frame_in_stream() {
        let mut wire = BytesMut::new();
        wire.put_i32(0);
        wire.put_i16(100);
        wire.put_i32(1024);

        let cfg = FrameConfig {
            max_payload_size: 16,
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config(Cursor::new(wire.to_vec()), cfg);
        let err = reader.read_frame().await.unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
    }

    #[tokio::test]
    async fn read_message_decodes_with_registry() {
        let registry = CodecRegistry::new();
        let mut payload = Vec::new();
        payload.extend_from_slice(&101i16.to_be_bytes());
        payload.extend_from_slice(&2i32.to_be_bytes());
        payload.extend_from_slice(b"no");
        let mut wire = BytesMut::new();
        encode_frame(12, FAILURE_TYPE_ID, &payload, &mut wire).unwrap();

        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()));
        let (frame_id, message) = reader.read_message(&registry).await.unwrap();
        assert_eq!(frame_id, 12);
        assert_eq!(
            message.downcast_ref::<Failure>(),
            Some(&Failure {
                request_type: 101,
                message: "no".into()
            })
        );
    }

    #[tokio::test]
    async fn read_message_unknown_type_is_an_error() {
        let registry = CodecRegistry::new();
        let mut wire = BytesMut::new();
        encode_frame(0, 4242, b"", &mut wire).unwrap();

        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()));
        let err = reader.read_message(&registry).await.unwrap_err();
        assert!(matches!(err, FrameError::UnknownTypeId(4242)));
    }

    #[tokio::test]
    async fn roundtrip_over_duplex() {
        let (left, right) = tokio::io::duplex(64);
        let mut writer = crate::writer::FrameWriter::new(left);
        let mut reader = FrameReader::new(right);

        let sender = tokio::spawn(async move {
            for i in 0..64i32 {
                let payload = format!("msg-{i}");
                writer
                    .write_frame(&RawFrame::new(i, 100, payload.into_bytes()))
                    .await
                    .unwrap();
            }
        });

        for expected in 0..64i32 {
            let frame = reader.read_frame().await.unwrap();
            assert_eq!(frame.frame_id, expected);
            assert_eq!(frame.payload.as_ref(), format!("msg-{expected}").as_bytes());
        }
        sender.await.unwrap();
    }

    #[tokio::test]
    async fn accessors_and_into_inner() {
        let cursor = Cursor::new(Vec::<u8>::new());
        let mut reader = FrameReader::new(cursor);

        let _ = reader.get_ref();
        let _ = reader.get_mut();
        assert_eq!(reader.config().max_payload_size, crate::DEFAULT_MAX_PAYLOAD);
        let _inner = reader.into_inner();
    }

    #[tokio::test]
    async fn read_error_propagates_io_error() {
        let mut framed = FrameReader::new(FailingReader);
        let err = framed.read_frame().await.unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::ConnectionReset));
    }

    #[tokio::test]
    async fn interrupted_read_retries() {
        let mut wire = BytesMut::new();
        encode_frame(8, 100, b"ok", &mut wire).unwrap();

        let reader = InterruptedThenData {
            interrupted: false,
            bytes: wire.to_vec(),
            pos: 0,
        };
        let mut framed = FrameReader::new(reader);
        let frame = framed.read_frame().await.unwrap();

        assert_eq!(frame.frame_id, 8);
        assert_eq!(frame.payload.as_ref(), b"ok");
    }

    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl AsyncRead for ByteByByteReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            if self.pos < self.bytes.len() && buf.remaining() > 0 {
                let byte = self.bytes[self.pos];
                buf.put_slice(&[byte]);
                self.pos += 1;
            }
            Poll::Ready(Ok(()))
        }
    }

    struct FailingReader;

    impl AsyncRead for FailingReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            Poll::Ready(Err(std::io::Error::from(ErrorKind::ConnectionReset)))
        }
    }

    struct InterruptedThenData {
        interrupted: bool,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl AsyncRead for InterruptedThenData {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            if !self.interrupted {
                self.interrupted = true;
                return Poll::Ready(Err(std::io::Error::from(ErrorKind::Interrupted)));
            }
            let n = (self.bytes.len() - self.pos).min(buf.remaining());
            let start = self.pos;
            buf.put_slice(&self.bytes[start..start + n]);
            self.pos += n;
            Poll::Ready(Ok(()))
        }
    }
}
