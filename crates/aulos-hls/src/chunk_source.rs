//! Contract of the chunk source: the component that decides what to fetch.

use std::sync::Arc;

use aulos_loader::LoadError;

use crate::chunk::{Chunk, SegmentChunk};
use crate::error::HlsResult;
use crate::format::VariantFormat;

/// Result of asking the chunk source for the next fetch.
pub enum ChunkOp {
    /// Nothing more will ever be produced.
    EndOfStream,
    /// No chunk is available yet; ask again later.
    Pending,
    /// Fetch this chunk next.
    Load(Chunk),
}

/// Produces the chunks the sample source loads.
///
/// Owns playlist knowledge and bitrate-adaptation decisions. Consumed from
/// the driver thread only; implementations need no internal locking on
/// behalf of the sample source.
pub trait ChunkSource: Send {
    /// Prepare for use. Polled until it returns `true`.
    fn prepare(&mut self) -> HlsResult<bool>;

    /// Number of bitrate variants.
    fn track_count(&self) -> usize;

    /// Format of one variant.
    fn track_format(&self, index: usize) -> &VariantFormat;

    /// Bias future chunk selection towards the given variants.
    fn select_tracks(&mut self, tracks: &[usize]);

    /// Whether this is a live stream (playback positions re-anchor to zero).
    fn is_live(&self) -> bool;

    /// Duration of the content, in microseconds.
    fn duration_us(&self) -> i64;

    /// A seek is about to restart loading.
    fn seek(&mut self);

    /// All tracks were disabled; drop transient state.
    fn reset(&mut self);

    /// Surface a source-level error (e.g. a playlist failure) if one is
    /// pending. Called when no load is in flight.
    fn maybe_throw_error(&self) -> HlsResult<()>;

    /// Decide the next chunk to load.
    ///
    /// `previous_segment` is the most recently completed segment chunk, if
    /// any; `target_time_us` is the pending reset position or, absent one,
    /// the downstream playback position.
    fn chunk_operation(
        &mut self,
        previous_segment: Option<&Arc<SegmentChunk>>,
        target_time_us: i64,
    ) -> ChunkOp;

    /// A chunk finished loading.
    fn on_chunk_load_completed(&mut self, chunk: &Chunk);

    /// A chunk failed to load. Returns `true` when the error was absorbed
    /// (e.g. by blacklisting a variant) and the chunk should be dropped
    /// rather than retried.
    fn on_chunk_load_error(&mut self, chunk: &Chunk, error: &LoadError) -> bool;
}
