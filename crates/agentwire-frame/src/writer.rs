use std::io::ErrorKind;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::arena::Arena;
use crate::codec::{encode_frame, encode_message, FrameConfig, RawFrame};
use crate::error::{FrameError, Result};
use crate::message::AnyMessage;
use crate::registry::CodecRegistry;

/// Writes complete frames to any `AsyncWrite` stream.
///
/// Each frame is assembled in the writer's own arena and then written out in
/// full before the next one starts.
pub struct FrameWriter<W> {
    inner: W,
    arena: Arena,
    config: FrameConfig,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: W) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: W, config: FrameConfig) -> Self {
        Self {
            inner,
            arena: Arena::with_capacity(config.initial_capacity),
            config,
        }
    }

    /// Encode `message` under `frame_id` and write it.
    ///
    /// Returns the payload length that went into the header.
    pub async fn write_message(
        &mut self,
        registry: &CodecRegistry,
        frame_id: i32,
        message: &dyn AnyMessage,
    ) -> Result<usize> {
        self.arena.clear();
        let len = encode_message(
            &mut self.arena,
            registry,
            frame_id,
            message,
            self.config.max_payload_size,
        )?;
        self.flush_arena().await?;
        trace!(frame_id, len, "wrote message");
        Ok(len)
    }

    /// Write a frame whose payload is already encoded.
    pub async fn write_frame(&mut self, frame: &RawFrame) -> Result<()> {
        if frame.payload.len() > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: frame.payload.len(),
                max: self.config.max_payload_size,
            });
        }

        self.arena.clear();
        self.arena.ensure_writable(frame.wire_size());
        encode_frame(
            frame.frame_id,
            frame.type_id,
            &frame.payload,
            self.arena.bytes_mut(),
        )?;
        self.flush_arena().await
    }

    async fn flush_arena(&mut self) -> Result<()> {
        let bytes = self.arena.as_slice();
        let mut offset = 0usize;
        while offset < bytes.len() {
            match self.inner.write(&bytes[offset..]).await {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush().await
    }

    /// Flush the underlying stream.
    pub async fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush().await {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Shut down the write half of the underlying stream.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await.map_err(FrameError::Io)
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}
