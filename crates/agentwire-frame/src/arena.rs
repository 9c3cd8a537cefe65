use bytes::{BufMut, BytesMut};

/// Default starting capacity of an arena: 8 KiB.
pub const DEFAULT_INITIAL_CAPACITY: usize = 8 * 1024;

/// A growable byte buffer owned by exactly one worker.
///
/// One arena holds inbound bytes for a reader, another holds outbound bytes
/// for a writer. Growth always lands on the next power of two at or above the
/// required size, so a message of `n` bytes costs at most `O(log n)`
/// reallocations and previously written bytes are preserved.
#[derive(Debug)]
pub struct Arena {
    buf: BytesMut,
}

impl Arena {
    /// Create an arena with the given starting capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Make room for at least `additional` more bytes past the current end.
    pub fn ensure_writable(&mut self, additional: usize) {
        let required = self.buf.len().saturating_add(additional);
        if required <= self.buf.capacity() {
            return;
        }
        let target = required.checked_next_power_of_two().unwrap_or(required);
        self.buf.reserve(target - self.buf.len());
    }

    /// Number of bytes currently held.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Drop the contents, keeping the allocation.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Append raw bytes, growing as needed.
    pub fn put_slice(&mut self, src: &[u8]) {
        self.ensure_writable(src.len());
        self.buf.put_slice(src);
    }

    /// Overwrite four bytes at `pos` with a big-endian `i32`.
    ///
    /// # Panics
    ///
    /// Panics if `pos + 4` is past the end of the written bytes.
    pub fn patch_i32(&mut self, pos: usize, value: i32) {
        self.buf[pos..pos + 4].copy_from_slice(&value.to_be_bytes());
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_INITIAL_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn growth_lands_on_power_of_two() {
        let mut arena = Arena::with_capacity(16);
        arena.put_slice(&[1; 10]);
        arena.ensure_writable(100);
        assert!(arena.capacity() >= 128);
        assert_eq!(&arena.as_slice()[..10], &[1; 10]);
    }

    #[test]
    fn no_growth_when_room_remains() {
        let mut arena = Arena::with_capacity(64);
        let before = arena.capacity();
        arena.ensure_writable(32);
        assert_eq!(arena.capacity(), before);
    }

    #[test]
    fn large_writes_preserve_contents() {
        let mut arena = Arena::with_capacity(8);
        let mut expected = Vec::new();
        for i in 0..2000u32 {
            let chunk = i.to_be_bytes();
            arena.put_slice(&chunk);
            expected.extend_from_slice(&chunk);
        }
        assert_eq!(arena.as_slice(), expected.as_slice());
        assert!(arena.capacity() >= 8000);
    }

    #[test]
    fn patch_overwrites_in_place() {
        let mut arena = Arena::default();
        arena.put_slice(&[0; 8]);
        arena.patch_i32(2, 0x0102_0304);
        assert_eq!(arena.as_slice(), &[0, 0, 1, 2, 3, 4, 0, 0]);
    }

    #[test]
    fn clear_keeps_allocation() {
        let mut arena = Arena::with_capacity(32);
        arena.put_slice(&[7; 100]);
        let cap = arena.capacity();
        arena.clear();
        assert!(arena.is_empty());
        assert_eq!(arena.capacity(), cap);
    }
}
