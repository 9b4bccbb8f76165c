//! Circular byte buffer whose read and write windows are always contiguous.
//!
//! Two strategies back the same API:
//!
//! - **Mirrored** (Linux): one physical region mapped twice back to back, so
//!   a span that runs past the end of the first half continues into the
//!   second half, which is the same memory.
//! - **Software**: a `2 * capacity` heap region; each committed write is
//!   copied into the other half, giving the same contiguous-span view.
//!
//! Cursors are 64-bit byte counters. Only `cursor & (capacity - 1)` is used
//! as a physical offset, and once the read cursor completes a lap both
//! cursors are reduced by `capacity` together.

use std::slice;

use log::debug;

use crate::error::BufferError;

#[cfg(target_os = "linux")]
mod mirror;

enum Backing {
    #[cfg(target_os = "linux")]
    Mirrored(mirror::MirrorMap),
    Software(Box<[u8]>),
}

fn check_capacity(capacity: usize) -> Result<(), BufferError> {
    if capacity == 0 || !capacity.is_power_of_two() {
        return Err(BufferError::InvalidCapacity(capacity));
    }
    Ok(())
}

pub struct CircularByteBuffer {
    backing: Backing,
    capacity: usize,
    write_cursor: u64,
    read_cursor: u64,
}

impl CircularByteBuffer {
    /// Creates a buffer of `capacity` bytes (a non-zero power of two).
    ///
    /// The mirrored mapping is used when the platform supports it and the
    /// capacity is a page multiple; otherwise the software mirror is used.
    pub fn new(capacity: usize) -> Result<Self, BufferError> {
        check_capacity(capacity)?;

        #[cfg(target_os = "linux")]
        if capacity % mirror::page_size() == 0 {
            let map = mirror::MirrorMap::new(capacity).map_err(BufferError::Map)?;
            return Ok(Self::with_backing(Backing::Mirrored(map), capacity));
        }

        Self::software(capacity)
    }

    /// Creates a buffer of `1 << order` bytes.
    pub fn with_order(order: u32) -> Result<Self, BufferError> {
        let capacity = 1usize
            .checked_shl(order)
            .ok_or(BufferError::InvalidCapacity(0))?;
        Self::new(capacity)
    }

    /// Creates a heap-backed buffer regardless of platform support.
    pub fn software(capacity: usize) -> Result<Self, BufferError> {
        check_capacity(capacity)?;
        let heap = vec![0u8; capacity * 2].into_boxed_slice();
        Ok(Self::with_backing(Backing::Software(heap), capacity))
    }

    fn with_backing(backing: Backing, capacity: usize) -> Self {
        let buf = Self {
            backing,
            capacity,
            write_cursor: 0,
            read_cursor: 0,
        };
        debug!(
            "[RingBuffer] Created {} byte buffer (mirrored={})",
            capacity,
            buf.is_mirrored()
        );
        buf
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_mirrored(&self) -> bool {
        match self.backing {
            #[cfg(target_os = "linux")]
            Backing::Mirrored(_) => true,
            Backing::Software(_) => false,
        }
    }

    pub fn fill_bytes(&self) -> usize {
        (self.write_cursor - self.read_cursor) as usize
    }

    pub fn free_bytes(&self) -> usize {
        self.capacity - self.fill_bytes()
    }

    fn offset(&self, cursor: u64) -> usize {
        (cursor & (self.capacity as u64 - 1)) as usize
    }

    /// Contiguous window of `free_bytes()` bytes starting at the write cursor.
    pub fn writable_span(&mut self) -> &mut [u8] {
        let offset = self.offset(self.write_cursor);
        let len = self.free_bytes();
        match &mut self.backing {
            Backing::Software(heap) => &mut heap[offset..offset + len],
            #[cfg(target_os = "linux")]
            Backing::Mirrored(map) => {
                // offset < capacity and len <= capacity, inside the 2x window.
                unsafe { slice::from_raw_parts_mut(map.as_ptr().add(offset), len) }
            }
        }
    }

    /// Publishes `n` bytes written into the last [`writable_span`](Self::writable_span).
    ///
    /// # Panics
    ///
    /// If `n` exceeds `free_bytes()`.
    pub fn commit_write(&mut self, n: usize) {
        assert!(
            n <= self.free_bytes(),
            "commit_write({}) exceeds free space {}",
            n,
            self.free_bytes()
        );
        let offset = self.offset(self.write_cursor);
        let cap = self.capacity;
        if let Backing::Software(heap) = &mut self.backing {
            let end = offset + n;
            if end <= cap {
                heap.copy_within(offset..end, offset + cap);
            } else {
                heap.copy_within(offset..cap, offset + cap);
                heap.copy_within(cap..end, 0);
            }
        }
        self.write_cursor += n as u64;
    }

    /// Contiguous window of `fill_bytes()` bytes starting at the read cursor.
    pub fn readable_span(&self) -> &[u8] {
        let offset = self.offset(self.read_cursor);
        let len = self.fill_bytes();
        match &self.backing {
            Backing::Software(heap) => &heap[offset..offset + len],
            #[cfg(target_os = "linux")]
            Backing::Mirrored(map) => unsafe {
                slice::from_raw_parts(map.as_ptr().add(offset).cast_const(), len)
            },
        }
    }

    /// Releases `n` bytes from the front of the readable window.
    ///
    /// # Panics
    ///
    /// If `n` exceeds `fill_bytes()`.
    pub fn commit_read(&mut self, n: usize) {
        assert!(
            n <= self.fill_bytes(),
            "commit_read({}) exceeds fill {}",
            n,
            self.fill_bytes()
        );
        self.read_cursor += n as u64;
        let cap = self.capacity as u64;
        if self.read_cursor >= cap {
            self.read_cursor -= cap;
            self.write_cursor -= cap;
        }
    }

    /// Copies all of `data` in, or nothing if it does not fit.
    pub fn write_from(&mut self, data: &[u8]) -> bool {
        if data.len() > self.free_bytes() {
            return false;
        }
        self.writable_span()[..data.len()].copy_from_slice(data);
        self.commit_write(data.len());
        true
    }

    /// Fills all of `out`, or nothing if not enough data is buffered.
    pub fn read_into(&mut self, out: &mut [u8]) -> bool {
        if out.len() > self.fill_bytes() {
            return false;
        }
        out.copy_from_slice(&self.readable_span()[..out.len()]);
        self.commit_read(out.len());
        true
    }

    /// Drops all buffered data.
    pub fn clear(&mut self) {
        self.read_cursor = 0;
        self.write_cursor = 0;
    }
}

impl std::fmt::Debug for CircularByteBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircularByteBuffer")
            .field("capacity", &self.capacity)
            .field("mirrored", &self.is_mirrored())
            .field("fill", &self.fill_bytes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(start: u64, len: usize) -> Vec<u8> {
        (0..len as u64).map(|i| ((start + i) % 251) as u8).collect()
    }

    /// Interleaves writes and reads of awkward sizes and checks every byte
    /// comes back at its absolute position.
    fn exercise_straddling(buf: &mut CircularByteBuffer) {
        let cap = buf.capacity();
        let write_sizes = [cap / 3 + 1, 7, cap / 2 + 3, 1, cap - 5];
        let read_sizes = [cap / 4 + 2, 3, cap / 2, 11];

        let mut written: u64 = 0;
        let mut read: u64 = 0;
        for round in 0..40 {
            let w = write_sizes[round % write_sizes.len()].min(buf.free_bytes());
            let span = buf.writable_span();
            assert_eq!(span.len(), buf_free(cap, written, read));
            span[..w].copy_from_slice(&pattern(written, w));
            buf.commit_write(w);
            written += w as u64;
            assert_eq!(buf.fill_bytes() + buf.free_bytes(), cap);

            let r = read_sizes[round % read_sizes.len()].min(buf.fill_bytes());
            assert_eq!(&buf.readable_span()[..r], pattern(read, r).as_slice());
            buf.commit_read(r);
            read += r as u64;
            assert_eq!(buf.fill_bytes() + buf.free_bytes(), cap);
        }

        // Whatever is left still reads back in order.
        let rest = buf.fill_bytes();
        assert_eq!(buf.readable_span(), pattern(read, rest).as_slice());
        assert!(written > cap as u64 * 4);
    }

    fn buf_free(cap: usize, written: u64, read: u64) -> usize {
        cap - (written - read) as usize
    }

    #[test]
    fn test_software_spans_straddle_boundary() {
        let mut buf = CircularByteBuffer::software(256).unwrap();
        assert!(!buf.is_mirrored());
        exercise_straddling(&mut buf);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_mirrored_spans_straddle_boundary() {
        let mut buf = CircularByteBuffer::new(64 * 1024).unwrap();
        assert!(buf.is_mirrored());
        exercise_straddling(&mut buf);
    }

    #[test]
    fn test_small_capacity_falls_back_to_software() {
        let buf = CircularByteBuffer::new(256).unwrap();
        assert_eq!(buf.capacity(), 256);
        assert!(!buf.is_mirrored());
    }

    #[test]
    fn test_invalid_capacity() {
        assert!(matches!(
            CircularByteBuffer::new(0),
            Err(BufferError::InvalidCapacity(0))
        ));
        assert!(matches!(
            CircularByteBuffer::new(300),
            Err(BufferError::InvalidCapacity(300))
        ));
        assert!(CircularByteBuffer::with_order(200).is_err());
        assert!(matches!(
            CircularByteBuffer::software(48),
            Err(BufferError::InvalidCapacity(48))
        ));
        assert!(matches!(
            CircularByteBuffer::software(0),
            Err(BufferError::InvalidCapacity(0))
        ));
    }

    #[test]
    fn test_with_order() {
        let buf = CircularByteBuffer::with_order(8).unwrap();
        assert_eq!(buf.capacity(), 256);
    }

    #[test]
    fn test_second_write_needs_room() {
        let mut buf = CircularByteBuffer::new(256).unwrap();
        let chunk = [0x47u8; 200];
        assert!(buf.write_from(&chunk));
        assert_eq!(buf.free_bytes(), 56);
        // Does not fit and must not overwrite anything.
        assert!(!buf.write_from(&chunk));
        assert_eq!(buf.fill_bytes(), 200);

        let mut out = [0u8; 144];
        assert!(buf.read_into(&mut out));
        assert_eq!(buf.free_bytes(), 200);
        assert!(buf.write_from(&chunk));
        assert_eq!(buf.fill_bytes(), 256);
        assert_eq!(buf.free_bytes(), 0);
        assert!(buf.writable_span().is_empty());
    }

    #[test]
    fn test_cursor_lap_reduction() {
        let mut buf = CircularByteBuffer::software(16).unwrap();
        for _ in 0..100 {
            assert!(buf.write_from(&[1, 2, 3, 4, 5, 6, 7]));
            let mut out = [0u8; 7];
            assert!(buf.read_into(&mut out));
            assert_eq!(out, [1, 2, 3, 4, 5, 6, 7]);
        }
        assert!(buf.read_cursor < 16);
        assert!(buf.write_cursor < 32);
    }

    #[test]
    fn test_clear() {
        let mut buf = CircularByteBuffer::software(64).unwrap();
        assert!(buf.write_from(&[9; 40]));
        buf.clear();
        assert_eq!(buf.fill_bytes(), 0);
        assert_eq!(buf.free_bytes(), 64);
        assert!(buf.readable_span().is_empty());
    }

    #[test]
    #[should_panic(expected = "exceeds free space")]
    fn test_overcommit_write_panics() {
        let mut buf = CircularByteBuffer::software(32).unwrap();
        buf.commit_write(33);
    }

    #[test]
    #[should_panic(expected = "exceeds fill")]
    fn test_overcommit_read_panics() {
        let mut buf = CircularByteBuffer::software(32).unwrap();
        assert!(buf.write_from(&[0; 4]));
        buf.commit_read(5);
    }
}
