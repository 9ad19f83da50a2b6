//! Tile buffers passed across the engine boundary.
//!
//! A buffer is leased for exactly one render call: acquired, painted by the
//! engine, read back into an image, and released when the [`BufferLease`]
//! goes out of scope.

use crate::error::{OfficeError, Result};
use std::io::{self, Read};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::warn;

/// Fixed-size byte region with a read position.
#[derive(Debug)]
pub struct TileBuffer {
    data: Vec<u8>,
    position: usize,
}

impl TileBuffer {
    /// Wrap an already-sized byte vector.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data, position: 0 }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Writable view for the engine to paint into.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Reset the read position to the start.
    pub fn rewind(&mut self) {
        self.position = 0;
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Give the storage back, e.g. to an allocator.
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

impl Read for TileBuffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = &self.data[self.position..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.position += n;
        Ok(n)
    }
}

/// Source of tile buffers.
pub trait BufferAllocator: Send + Sync {
    /// Allocate a zeroed buffer of exactly `len` bytes.
    fn acquire(&self, len: usize) -> Result<TileBuffer>;

    /// Return a buffer obtained from [`BufferAllocator::acquire`].
    fn release(&self, buffer: TileBuffer);
}

/// Heap-backed allocator that reports allocation failure instead of aborting.
#[derive(Debug, Default)]
pub struct HeapAllocator {
    outstanding: AtomicUsize,
    total_acquired: AtomicUsize,
}

impl HeapAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers acquired and not yet released.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Buffers acquired since creation.
    pub fn total_acquired(&self) -> usize {
        self.total_acquired.load(Ordering::SeqCst)
    }
}

impl BufferAllocator for HeapAllocator {
    fn acquire(&self, len: usize) -> Result<TileBuffer> {
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| OfficeError::OutOfMemory { bytes: len })?;
        data.resize(len, 0);

        self.outstanding.fetch_add(1, Ordering::SeqCst);
        self.total_acquired.fetch_add(1, Ordering::SeqCst);
        Ok(TileBuffer::from_vec(data))
    }

    fn release(&self, buffer: TileBuffer) {
        let released = self
            .outstanding
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if released.is_err() {
            warn!("Released a tile buffer this allocator did not hand out");
        }
        drop(buffer.into_vec());
    }
}

/// Scoped buffer acquisition. The buffer is released on drop, including
/// when a later step fails or panics.
pub struct BufferLease<'a> {
    allocator: &'a dyn BufferAllocator,
    buffer: TileBuffer,
}

impl<'a> BufferLease<'a> {
    pub fn acquire(allocator: &'a dyn BufferAllocator, len: usize) -> Result<Self> {
        let buffer = allocator.acquire(len)?;
        Ok(Self { allocator, buffer })
    }
}

impl Deref for BufferLease<'_> {
    type Target = TileBuffer;

    fn deref(&self) -> &TileBuffer {
        &self.buffer
    }
}

impl DerefMut for BufferLease<'_> {
    fn deref_mut(&mut self) -> &mut TileBuffer {
        &mut self.buffer
    }
}

impl Drop for BufferLease<'_> {
    fn drop(&mut self) {
        let buffer = std::mem::replace(&mut self.buffer, TileBuffer::from_vec(Vec::new()));
        self.allocator.release(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_is_zeroed_and_sized() {
        let allocator = HeapAllocator::new();
        let buffer = allocator.acquire(64).unwrap();
        assert_eq!(buffer.len(), 64);
        assert!(buffer.as_slice().iter().all(|&b| b == 0));
        assert_eq!(allocator.outstanding(), 1);
        allocator.release(buffer);
        assert_eq!(allocator.outstanding(), 0);
    }

    #[test]
    fn test_huge_allocation_reports_out_of_memory() {
        let allocator = HeapAllocator::new();
        match allocator.acquire(usize::MAX) {
            Err(OfficeError::OutOfMemory { bytes }) => assert_eq!(bytes, usize::MAX),
            other => panic!("Expected OutOfMemory, got {:?}", other),
        }
        assert_eq!(allocator.outstanding(), 0);
    }

    #[test]
    fn test_lease_releases_on_drop() {
        let allocator = HeapAllocator::new();
        {
            let mut lease = BufferLease::acquire(&allocator, 16).unwrap();
            lease.as_mut_slice()[0] = 7;
            assert_eq!(allocator.outstanding(), 1);
        }
        assert_eq!(allocator.outstanding(), 0);
        assert_eq!(allocator.total_acquired(), 1);
    }

    #[test]
    fn test_lease_releases_on_panic() {
        let allocator = HeapAllocator::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _lease = BufferLease::acquire(&allocator, 16).unwrap();
            panic!("copy failed");
        }));
        assert!(result.is_err());
        assert_eq!(allocator.outstanding(), 0);
    }

    #[test]
    fn test_foreign_release_does_not_underflow() {
        let allocator = HeapAllocator::new();
        allocator.release(TileBuffer::from_vec(vec![0; 8]));
        assert_eq!(allocator.outstanding(), 0);

        let buffer = allocator.acquire(8).unwrap();
        allocator.release(buffer);
        allocator.release(TileBuffer::from_vec(vec![0; 8]));
        assert_eq!(allocator.outstanding(), 0);
    }

    #[test]
    fn test_into_vec_returns_storage() {
        let buffer = TileBuffer::from_vec(vec![1, 2, 3]);
        assert_eq!(buffer.into_vec(), vec![1, 2, 3]);
    }

    #[test]
    fn test_read_and_rewind() {
        let mut buffer = TileBuffer::from_vec(vec![1, 2, 3, 4]);
        let mut out = [0u8; 3];
        buffer.read_exact(&mut out).unwrap();
        assert_eq!(out, [1, 2, 3]);
        assert_eq!(buffer.position(), 3);

        let mut rest = [0u8; 2];
        assert!(buffer.read_exact(&mut rest).is_err());

        buffer.rewind();
        let mut all = [0u8; 4];
        buffer.read_exact(&mut all).unwrap();
        assert_eq!(all, [1, 2, 3, 4]);
    }
}
