//! Typed primitives layered over an [`Arena`].
//!
//! All multi-byte values are big-endian. Strings and byte blobs are an `i32`
//! length followed by the bytes; collections are an `i32` count followed by
//! that many elements.

use crate::arena::Arena;
use crate::error::{FrameError, Result};

/// Writes payload primitives into an arena.
pub struct DataOutput<'a> {
    arena: &'a mut Arena,
}

impl<'a> DataOutput<'a> {
    pub fn new(arena: &'a mut Arena) -> Self {
        Self { arena }
    }

    /// Current write position in the underlying arena.
    pub fn position(&self) -> usize {
        self.arena.len()
    }

    pub fn write_u8(&mut self, value: u8) {
        self.arena.put_slice(&[value]);
    }

    pub fn write_i8(&mut self, value: i8) {
        self.arena.put_slice(&value.to_be_bytes());
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(u8::from(value));
    }

    pub fn write_i16(&mut self, value: i16) {
        self.arena.put_slice(&value.to_be_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.arena.put_slice(&value.to_be_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.arena.put_slice(&value.to_be_bytes());
    }

    pub fn write_f32(&mut self, value: f32) {
        self.arena.put_slice(&value.to_be_bytes());
    }

    pub fn write_f64(&mut self, value: f64) {
        self.arena.put_slice(&value.to_be_bytes());
    }

    /// Write an `i32` placeholder and return its position for [`Self::patch_i32`].
    pub fn reserve_i32(&mut self) -> usize {
        let pos = self.position();
        self.write_i32(0);
        pos
    }

    /// Overwrite a previously reserved `i32`.
    pub fn patch_i32(&mut self, pos: usize, value: i32) {
        self.arena.patch_i32(pos, value);
    }

    /// Length-prefixed UTF-8 string.
    pub fn write_str(&mut self, value: &str) -> Result<()> {
        self.write_bytes(value.as_bytes())
    }

    /// Length-prefixed byte blob.
    pub fn write_bytes(&mut self, value: &[u8]) -> Result<()> {
        let len = length_prefix(value.len())?;
        self.arena.ensure_writable(4 + value.len());
        self.write_i32(len);
        self.arena.put_slice(value);
        Ok(())
    }

    /// Count-prefixed collection, each element written by `write_item`.
    pub fn write_collection<I, F>(&mut self, items: I, mut write_item: F) -> Result<()>
    where
        I: IntoIterator,
        I::IntoIter: ExactSizeIterator,
        F: FnMut(&mut Self, I::Item) -> Result<()>,
    {
        let items = items.into_iter();
        self.write_i32(length_prefix(items.len())?);
        for item in items {
            write_item(self, item)?;
        }
        Ok(())
    }
}

fn length_prefix(len: usize) -> Result<i32> {
    i32::try_from(len).map_err(|_| FrameError::PayloadTooLarge {
        size: len,
        max: i32::MAX as usize,
    })
}

/// Reads payload primitives from one complete frame payload.
///
/// Every read checks the remaining length first; running off the end is a
/// [`FrameError::Truncated`], never a panic.
#[derive(Debug)]
pub struct DataInput<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> DataInput<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Fail unless every byte has been consumed.
    pub fn finish(&self) -> Result<()> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(FrameError::TrailingBytes(n)),
        }
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8]> {
        let remaining = self.remaining();
        if needed > remaining {
            return Err(FrameError::Truncated { needed, remaining });
        }
        let buf = self.buf;
        let slice = &buf[self.pos..self.pos + needed];
        self.pos += needed;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take_array::<1>()?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(i8::from_be_bytes(self.take_array()?))
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(i16::from_be_bytes(self.take_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.take_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_be_bytes(self.take_array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_be_bytes(self.take_array()?))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_be_bytes(self.take_array()?))
    }

    fn read_len(&mut self) -> Result<usize> {
        let len = self.read_i32()?;
        usize::try_from(len).map_err(|_| FrameError::NegativeLength(len))
    }

    pub fn read_str(&mut self) -> Result<String> {
        let len = self.read_len()?;
        let bytes = self.take(len)?;
        Ok(std::str::from_utf8(bytes)?.to_owned())
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_len()?;
        Ok(self.take(len)?.to_vec())
    }

    /// Count-prefixed collection, each element read by `read_item`.
    pub fn read_collection<T, F>(&mut self, mut read_item: F) -> Result<Vec<T>>
    where
        F: FnMut(&mut Self) -> Result<T>,
    {
        let count = self.read_len()?;
        // A corrupt count must not turn into a huge allocation up front.
        let mut items = Vec::with_capacity(count.min(self.remaining()));
        for _ in 0..count {
            items.push(read_item(self)?);
        }
        Ok(items)
    }
}
