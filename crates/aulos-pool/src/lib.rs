//! Pooled byte-buffer allocator for media sample storage.
//!
//! A single [`Allocator`] is shared by reference across every component that
//! buffers media samples. Buffers are handed out as RAII [`PooledBuf`] guards
//! and return to the free list on drop, so steady-state playback recycles a
//! small working set instead of churning the global heap.
//!
//! The allocator also tracks the number of bytes currently lent out, which is
//! the input signal for buffer-budget decisions upstream.

#![forbid(unsafe_code)]

mod pool;

pub use pool::{Allocator, PooledBuf, Reuse};
