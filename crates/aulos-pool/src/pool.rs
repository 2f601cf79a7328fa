use std::{
    fmt,
    ops::{Deref, DerefMut},
    sync::Arc,
};

use parking_lot::Mutex;

/// Trait for types that can be reused in a pool.
///
/// Implementors must provide logic to clear/reset the value
/// and optionally shrink capacity to a trim size.
pub trait Reuse {
    /// Prepare this value for reuse.
    ///
    /// Should clear the contents and optionally shrink capacity
    /// to the specified trim size to prevent unbounded growth.
    ///
    /// Returns `true` if the value still has capacity and can be reused,
    /// `false` if it should be dropped.
    fn reuse(&mut self, trim: usize) -> bool;
}

impl<T> Reuse for Vec<T> {
    fn reuse(&mut self, trim: usize) -> bool {
        self.clear();
        self.shrink_to(trim);
        self.capacity() > 0
    }
}

struct AllocatorInner {
    /// Buffers available for reuse.
    free: Vec<Vec<u8>>,
    /// Maximum number of buffers kept on the free list.
    max_free: usize,
    /// Trim capacity to this size when returning to the free list.
    trim_capacity: usize,
    /// Bytes currently lent out to live [`PooledBuf`] guards.
    allocated_bytes: u64,
}

/// Byte-buffer allocator with a bounded free list.
///
/// All sample backing storage is drawn from one shared `Allocator` so that the
/// total footprint of buffered media can be observed in one place:
/// [`Allocator::allocated_bytes`] reports the bytes currently held by live
/// [`PooledBuf`] guards (the free list is not counted).
///
/// [`Allocator::trim`] drops the free list, releasing recycled capacity back
/// to the global heap. Lent-out buffers are unaffected.
pub struct Allocator {
    inner: Mutex<AllocatorInner>,
}

impl Allocator {
    /// Create an allocator keeping at most `max_free` recycled buffers,
    /// each shrunk to `trim_capacity` bytes when returned.
    #[must_use]
    pub fn new(max_free: usize, trim_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(AllocatorInner {
                free: Vec::with_capacity(max_free.min(16)),
                max_free,
                trim_capacity,
                allocated_bytes: 0,
            }),
        }
    }

    /// Allocate a buffer holding a copy of `data`.
    ///
    /// The returned guard keeps `data.len()` bytes charged against this
    /// allocator until it is dropped.
    pub fn allocate(self: &Arc<Self>, data: &[u8]) -> PooledBuf {
        self.allocate_with(|buf| buf.extend_from_slice(data))
    }

    /// Allocate an empty buffer and apply an initialization function.
    ///
    /// The charge recorded against the allocator is the buffer length after
    /// `init` ran.
    pub fn allocate_with<F>(self: &Arc<Self>, init: F) -> PooledBuf
    where
        F: FnOnce(&mut Vec<u8>),
    {
        let mut value = {
            let mut inner = self.inner.lock();
            inner.free.pop().unwrap_or_default()
        };
        init(&mut value);

        let charged = value.len();
        self.inner.lock().allocated_bytes += charged as u64;

        PooledBuf {
            value: Some(value),
            charged,
            pool: Arc::clone(self),
        }
    }

    /// Bytes currently lent out to live guards.
    pub fn allocated_bytes(&self) -> u64 {
        self.inner.lock().allocated_bytes
    }

    /// Number of buffers currently available for reuse.
    pub fn free_buffers(&self) -> usize {
        self.inner.lock().free.len()
    }

    /// Drop every buffer on the free list.
    ///
    /// Lent-out buffers keep their storage; they are simply not recycled if
    /// the free list is full when they come back.
    pub fn trim(&self) {
        let mut inner = self.inner.lock();
        inner.free.clear();
        inner.free.shrink_to_fit();
    }

    fn release(&self, mut value: Vec<u8>, charged: usize) {
        let mut inner = self.inner.lock();
        inner.allocated_bytes = inner.allocated_bytes.saturating_sub(charged as u64);
        if inner.free.len() >= inner.max_free {
            return;
        }
        let trim = inner.trim_capacity;
        if value.reuse(trim) {
            inner.free.push(value);
        }
    }
}

impl fmt::Debug for Allocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Allocator")
            .field("allocated_bytes", &inner.allocated_bytes)
            .field("free_buffers", &inner.free.len())
            .finish()
    }
}

/// RAII guard for an allocated buffer.
///
/// Returns the buffer to the allocator's free list on drop and releases its
/// byte charge.
pub struct PooledBuf {
    value: Option<Vec<u8>>,
    charged: usize,
    pool: Arc<Allocator>,
}

impl PooledBuf {
    /// Length of the buffered data in bytes.
    pub fn len(&self) -> usize {
        self.as_vec().len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.as_vec().is_empty()
    }

    fn as_vec(&self) -> &Vec<u8> {
        self.value.as_ref().expect("PooledBuf value already taken")
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            self.pool.release(value, self.charged);
        }
    }
}

impl Deref for PooledBuf {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.as_vec()
    }
}

impl DerefMut for PooledBuf {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.value.as_mut().expect("PooledBuf value already taken")
    }
}

impl fmt::Debug for PooledBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(v) => write!(f, "PooledBuf({} bytes)", v.len()),
            None => write!(f, "PooledBuf(<taken>)"),
        }
    }
}
