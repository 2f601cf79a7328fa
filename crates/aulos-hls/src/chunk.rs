//! The unit of fetched data: segment chunks and side-data chunks.
//!
//! A [`SegmentChunk`] carries media samples and is bound to an
//! [`ExtractorWrapper`]; its blocking load reads from a [`DataSource`] and
//! feeds the bytes straight through the wrapper's demuxer. Non-segment data
//! (keys, initialization blobs) is produced by chunk sources as [`ChunkData`]
//! implementations; the sample source only needs their metadata and byte
//! counts.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use aulos_loader::{LoadError, Loadable};
use parking_lot::Mutex;

use crate::extractor::ExtractorWrapper;
use crate::format::VariantFormat;

/// Why a chunk was selected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    /// First selection at startup.
    Initial,
    /// Explicit caller selection.
    Manual,
    /// Bandwidth adaptation.
    Adaptive,
    /// Selection forced by a seek.
    Seek,
}

/// What kind of data a chunk carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkKind {
    /// A media segment with a time range.
    Media,
    /// Container initialization data.
    Init,
    /// A decryption key.
    Key,
}

/// Descriptor of the bytes a chunk loads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataSpec {
    pub url: String,
    pub position: u64,
    /// Declared length, when known up front.
    pub length: Option<u64>,
}

/// Metadata common to every chunk.
#[derive(Clone, Debug)]
pub struct ChunkInfo {
    pub kind: ChunkKind,
    pub trigger: Trigger,
    pub format: VariantFormat,
    pub data_spec: DataSpec,
}

/// Blocking byte source a chunk loads from.
///
/// Implementations are external (HTTP, file, cache). `read` returning zero
/// bytes signals the end of the described data.
pub trait DataSource: Send {
    fn open(&mut self, spec: &DataSpec) -> Result<Option<u64>, LoadError>;
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, LoadError>;
    fn close(&mut self);
}

const READ_BUFFER_LEN: usize = 16 * 1024;

/// A media chunk bounded by `[start_time_us, end_time_us]`.
///
/// Shared between the driver thread (bookkeeping, identity checks) and the
/// loader thread (the blocking [`Loadable::load`]), so all mutable state is
/// interior. A retried load restarts from the beginning of the data spec.
pub struct SegmentChunk {
    info: ChunkInfo,
    start_time_us: i64,
    end_time_us: i64,
    extractor: Arc<ExtractorWrapper>,
    source: Mutex<Box<dyn DataSource>>,
    bytes_loaded: AtomicU64,
    canceled: AtomicBool,
}

impl SegmentChunk {
    pub fn new(
        info: ChunkInfo,
        start_time_us: i64,
        end_time_us: i64,
        extractor: Arc<ExtractorWrapper>,
        source: Box<dyn DataSource>,
    ) -> Self {
        Self {
            info,
            start_time_us,
            end_time_us,
            extractor,
            source: Mutex::new(source),
            bytes_loaded: AtomicU64::new(0),
            canceled: AtomicBool::new(false),
        }
    }

    pub fn info(&self) -> &ChunkInfo {
        &self.info
    }

    pub fn start_time_us(&self) -> i64 {
        self.start_time_us
    }

    pub fn end_time_us(&self) -> i64 {
        self.end_time_us
    }

    pub fn extractor(&self) -> &Arc<ExtractorWrapper> {
        &self.extractor
    }

    pub fn bytes_loaded(&self) -> u64 {
        self.bytes_loaded.load(Ordering::Relaxed)
    }
}

impl Loadable for SegmentChunk {
    fn load(&self) -> Result<(), LoadError> {
        let mut source = self.source.lock();
        self.bytes_loaded.store(0, Ordering::Relaxed);
        source.open(&self.info.data_spec)?;

        let mut buf = vec![0u8; READ_BUFFER_LEN];
        let result = loop {
            if self.is_load_canceled() {
                break Ok(());
            }
            match source.read(&mut buf) {
                Ok(0) => break Ok(()),
                Ok(read) => {
                    if let Err(e) = self.extractor.consume(&buf[..read]) {
                        break Err(e);
                    }
                    self.bytes_loaded.fetch_add(read as u64, Ordering::Relaxed);
                }
                Err(e) => break Err(e),
            }
        };
        source.close();
        result
    }

    fn cancel_load(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    fn is_load_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }
}

/// Contract for non-segment chunks (keys, init data).
///
/// Chunk sources implement this for side data they need fetched; the loaded
/// payload stays with the implementation and is consumed through
/// `ChunkSource::on_chunk_load_completed`.
pub trait ChunkData: Loadable {
    fn info(&self) -> &ChunkInfo;
    fn bytes_loaded(&self) -> u64;
}

/// Driver-side handle to a chunk. Identity is pointer identity.
#[derive(Clone)]
pub enum Chunk {
    Segment(Arc<SegmentChunk>),
    Data(Arc<dyn ChunkData>),
}

impl Chunk {
    pub fn info(&self) -> &ChunkInfo {
        match self {
            Chunk::Segment(chunk) => chunk.info(),
            Chunk::Data(chunk) => chunk.info(),
        }
    }

    pub fn bytes_loaded(&self) -> u64 {
        match self {
            Chunk::Segment(chunk) => chunk.bytes_loaded(),
            Chunk::Data(chunk) => chunk.bytes_loaded(),
        }
    }

    pub fn is_segment(&self) -> bool {
        matches!(self, Chunk::Segment(_))
    }

    pub fn segment(&self) -> Option<&Arc<SegmentChunk>> {
        match self {
            Chunk::Segment(chunk) => Some(chunk),
            Chunk::Data(_) => None,
        }
    }

    /// The loadable to hand to the loader.
    pub fn loadable(&self) -> Arc<dyn Loadable> {
        match self {
            Chunk::Segment(chunk) => Arc::clone(chunk) as Arc<dyn Loadable>,
            Chunk::Data(chunk) => Arc::clone(chunk) as Arc<dyn Loadable>,
        }
    }

    /// Whether `loadable` is this chunk.
    pub fn is_loadable(&self, loadable: &Arc<dyn Loadable>) -> bool {
        let this = match self {
            Chunk::Segment(chunk) => Arc::as_ptr(chunk) as *const (),
            Chunk::Data(chunk) => Arc::as_ptr(chunk) as *const (),
        };
        std::ptr::eq(this, Arc::as_ptr(loadable) as *const ())
    }
}
