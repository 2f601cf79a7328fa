//! A pull-oriented HLS sample source.
//!
//! Feeds a multi-track playback pipeline with media samples drawn from a
//! time-ordered sequence of segment downloads. The source coordinates an
//! asynchronous chunk loader with a synchronous per-track consumer API,
//! synthesizes stable track groups out of the two HLS track spaces (bitrate
//! variants and in-segment elementary streams), keeps timeline semantics
//! continuous across segment boundaries, format changes, and seeks, and
//! applies a retry/backoff plus buffer-budget discipline so memory stays
//! bounded without stalling the renderer.
//!
//! Collaborators are consumed by contract: a [`ChunkSource`] decides what to
//! fetch, a [`Demuxer`](extractor::Demuxer) parses segment containers, a
//! [`DataSource`](chunk::DataSource) performs the blocking reads, and a
//! [`LoadControl`] budgets memory across sources.

#![forbid(unsafe_code)]

mod chunk;
mod chunk_source;
mod clock;
mod error;
mod events;
pub mod extractor;
mod format;
mod load_control;
mod options;
pub mod retry;
mod source;
mod tracks;

#[cfg(any(test, feature = "test-utils"))]
pub mod fixture;

pub use aulos_events::EventBus;

pub use chunk::{
    Chunk, ChunkData, ChunkInfo, ChunkKind, DataSource, DataSpec, SegmentChunk, Trigger,
};
pub use chunk_source::{ChunkOp, ChunkSource};
pub use clock::{Clock, MonotonicClock};
pub use error::{HlsResult, HlsSourceError};
pub use events::SourceEvent;
pub use extractor::{DemuxOutput, Demuxer, ExtractorWrapper, Sample};
pub use format::{mime, MediaFormat, TrackGroup, VariantFormat};
pub use load_control::{DefaultLoadControl, LoadControl, SourceId};
pub use options::{
    HlsSourceOptions, DEFAULT_BUFFER_SIZE_CONTRIBUTION, DEFAULT_MIN_LOADABLE_RETRY_COUNT,
};
pub use source::{HlsSampleSource, ReadData, TrackStream, END_OF_SOURCE_US};
