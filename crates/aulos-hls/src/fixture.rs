//! Test fixtures: scripted collaborators for exercising the sample source
//! without a network or a real container parser.

use std::sync::{
    atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
    Arc,
};

use aulos_loader::{LoadError, Loadable};
use parking_lot::Mutex;

use crate::chunk::{
    Chunk, ChunkData, ChunkInfo, ChunkKind, DataSource, DataSpec, SegmentChunk, Trigger,
};
use crate::chunk_source::{ChunkOp, ChunkSource};
use crate::clock::Clock;
use crate::error::{HlsResult, HlsSourceError};
use crate::extractor::{DemuxOutput, Demuxer, ExtractorWrapper};
use crate::format::{MediaFormat, VariantFormat};

/// A settable clock for deterministic retry timing.
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            now_ms: AtomicU64::new(0),
        }
    }

    pub fn advance(&self, delta_ms: u64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }

    pub fn set(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn elapsed_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// One pre-scripted sample a [`ScriptedDemuxer`] will emit.
#[derive(Clone, Debug)]
pub struct ScriptedSample {
    pub track: usize,
    pub time_us: i64,
    pub key_frame: bool,
    pub payload: Vec<u8>,
}

/// A demuxer that ignores the fed bytes and replays a fixed script:
/// on first feed it declares its tracks and emits all samples.
pub struct ScriptedDemuxer {
    tracks: Vec<MediaFormat>,
    samples: Vec<ScriptedSample>,
    emitted: bool,
}

impl ScriptedDemuxer {
    #[must_use]
    pub fn new(tracks: Vec<MediaFormat>, samples: Vec<ScriptedSample>) -> Self {
        Self {
            tracks,
            samples,
            emitted: false,
        }
    }
}

impl Demuxer for ScriptedDemuxer {
    fn consume(&mut self, _data: &[u8], output: &mut dyn DemuxOutput) -> Result<(), LoadError> {
        if self.emitted {
            return Ok(());
        }
        for (track, format) in self.tracks.iter().enumerate() {
            output.declare_track(track, format.clone());
        }
        output.end_tracks(self.tracks.len());
        for sample in &self.samples {
            output.push_sample(sample.track, sample.time_us, sample.key_frame, &sample.payload);
        }
        self.emitted = true;
        Ok(())
    }
}

/// In-memory [`DataSource`] with an injectable failure budget.
///
/// While the shared `fail_reads` counter is positive, each `read` consumes
/// one unit and fails; afterwards reads serve the payload normally.
pub struct MemoryDataSource {
    data: Vec<u8>,
    position: usize,
    fail_reads: Arc<AtomicU32>,
}

impl MemoryDataSource {
    #[must_use]
    pub fn new(data: Vec<u8>, fail_reads: Arc<AtomicU32>) -> Self {
        Self {
            data,
            position: 0,
            fail_reads,
        }
    }
}

impl DataSource for MemoryDataSource {
    fn open(&mut self, _spec: &DataSpec) -> Result<Option<u64>, LoadError> {
        self.position = 0;
        Ok(Some(self.data.len() as u64))
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, LoadError> {
        if self.fail_reads.load(Ordering::SeqCst) > 0 {
            self.fail_reads.fetch_sub(1, Ordering::SeqCst);
            return Err(LoadError::Io("injected read failure".into()));
        }
        let remaining = self.data.len() - self.position;
        let count = remaining.min(buf.len());
        buf[..count].copy_from_slice(&self.data[self.position..self.position + count]);
        self.position += count;
        Ok(count)
    }

    fn close(&mut self) {}
}

/// Script for one media segment served by a [`FakeChunkSource`].
#[derive(Clone, Debug)]
pub struct SegmentScript {
    pub start_time_us: i64,
    pub end_time_us: i64,
    pub samples: Vec<ScriptedSample>,
    /// Size of the byte payload the data source serves.
    pub byte_size: usize,
    /// Serve this segment as a specific variant instead of the selection.
    pub variant_override: Option<usize>,
    /// Per-segment elementary tracks, overriding the source default.
    pub tracks_override: Option<Vec<MediaFormat>>,
}

impl SegmentScript {
    #[must_use]
    pub fn new(start_time_us: i64, end_time_us: i64) -> Self {
        Self {
            start_time_us,
            end_time_us,
            samples: Vec::new(),
            byte_size: 64,
            variant_override: None,
            tracks_override: None,
        }
    }

    #[must_use]
    pub fn with_samples(mut self, samples: Vec<ScriptedSample>) -> Self {
        self.samples = samples;
        self
    }

    #[must_use]
    pub fn with_variant(mut self, variant: usize) -> Self {
        self.variant_override = Some(variant);
        self
    }

    #[must_use]
    pub fn with_tracks(mut self, tracks: Vec<MediaFormat>) -> Self {
        self.tracks_override = Some(tracks);
        self
    }
}

/// A non-segment chunk (a decryption key) that loads instantly.
pub struct FakeKeyChunk {
    info: ChunkInfo,
    bytes_loaded: AtomicU64,
    canceled: AtomicBool,
}

impl FakeKeyChunk {
    #[must_use]
    pub fn new(info: ChunkInfo) -> Self {
        Self {
            info,
            bytes_loaded: AtomicU64::new(0),
            canceled: AtomicBool::new(false),
        }
    }
}

impl Loadable for FakeKeyChunk {
    fn load(&self) -> Result<(), LoadError> {
        self.bytes_loaded.store(16, Ordering::Relaxed);
        Ok(())
    }

    fn cancel_load(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    fn is_load_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }
}

impl ChunkData for FakeKeyChunk {
    fn info(&self) -> &ChunkInfo {
        &self.info
    }

    fn bytes_loaded(&self) -> u64 {
        self.bytes_loaded.load(Ordering::Relaxed)
    }
}

struct FakeState {
    tracks: Vec<MediaFormat>,
    segments: Vec<SegmentScript>,
    live: bool,
    prepared: bool,
    prepare_delay: u32,
    handled_errors: bool,
    pending_error: Option<String>,
    serve_key_first: bool,
    key_issued: bool,
    selected_tracks: Vec<usize>,
    seek_count: u32,
    reset_count: u32,
    completed_count: u32,
    error_count: u32,
    last_target_us: Option<i64>,
    issued: Vec<(Arc<SegmentChunk>, usize)>,
    fail_reads: Arc<AtomicU32>,
}

impl FakeState {
    fn segment_index_for_time(&self, time_us: i64) -> usize {
        if let Some(index) = self
            .segments
            .iter()
            .position(|s| time_us >= s.start_time_us && time_us < s.end_time_us)
        {
            return index;
        }
        if self
            .segments
            .last()
            .is_some_and(|s| time_us >= s.end_time_us)
        {
            self.segments.len()
        } else {
            0
        }
    }
}

/// A scripted chunk source serving a fixed VOD timeline.
///
/// Cloneable handle: tests keep a clone to adjust behavior (failure
/// injection, live flag) and inspect interactions after handing the source
/// to the sample source.
#[derive(Clone)]
pub struct FakeChunkSource {
    variants: Arc<Vec<VariantFormat>>,
    state: Arc<Mutex<FakeState>>,
}

impl FakeChunkSource {
    #[must_use]
    pub fn new(variants: Vec<VariantFormat>, segments: Vec<SegmentScript>) -> Self {
        let variant_count = variants.len();
        Self {
            variants: Arc::new(variants),
            state: Arc::new(Mutex::new(FakeState {
                tracks: vec![MediaFormat::new("audio/mp4a-latm")],
                segments,
                live: false,
                prepared: false,
                prepare_delay: 0,
                handled_errors: false,
                pending_error: None,
                serve_key_first: false,
                key_issued: false,
                selected_tracks: (0..variant_count).collect(),
                seek_count: 0,
                reset_count: 0,
                completed_count: 0,
                error_count: 0,
                last_target_us: None,
                issued: Vec::new(),
                fail_reads: Arc::new(AtomicU32::new(0)),
            })),
        }
    }

    /// Replace the default (single audio) elementary tracks.
    #[must_use]
    pub fn with_extractor_tracks(self, tracks: Vec<MediaFormat>) -> Self {
        self.state.lock().tracks = tracks;
        self
    }

    pub fn set_live(&self, live: bool) {
        self.state.lock().live = live;
    }

    pub fn set_handled_errors(&self, handled: bool) {
        self.state.lock().handled_errors = handled;
    }

    pub fn set_prepare_delay(&self, polls: u32) {
        self.state.lock().prepare_delay = polls;
    }

    pub fn set_pending_error(&self, error: Option<String>) {
        self.state.lock().pending_error = error;
    }

    /// Serve a key chunk before the first media segment.
    pub fn serve_key_chunk_first(&self) {
        self.state.lock().serve_key_first = true;
    }

    /// Make the next `count` data-source reads fail.
    pub fn set_fail_reads(&self, count: u32) {
        self.state.lock().fail_reads.store(count, Ordering::SeqCst);
    }

    pub fn selected_tracks(&self) -> Vec<usize> {
        self.state.lock().selected_tracks.clone()
    }

    pub fn seek_count(&self) -> u32 {
        self.state.lock().seek_count
    }

    pub fn reset_count(&self) -> u32 {
        self.state.lock().reset_count
    }

    pub fn completed_count(&self) -> u32 {
        self.state.lock().completed_count
    }

    pub fn error_count(&self) -> u32 {
        self.state.lock().error_count
    }

    pub fn last_target_us(&self) -> Option<i64> {
        self.state.lock().last_target_us
    }

    pub fn issued_chunks(&self) -> usize {
        self.state.lock().issued.len()
    }
}

impl ChunkSource for FakeChunkSource {
    fn prepare(&mut self) -> HlsResult<bool> {
        let mut state = self.state.lock();
        if state.prepare_delay > 0 {
            state.prepare_delay -= 1;
            return Ok(false);
        }
        state.prepared = true;
        Ok(true)
    }

    fn track_count(&self) -> usize {
        self.variants.len()
    }

    fn track_format(&self, index: usize) -> &VariantFormat {
        &self.variants[index]
    }

    fn select_tracks(&mut self, tracks: &[usize]) {
        self.state.lock().selected_tracks = tracks.to_vec();
    }

    fn is_live(&self) -> bool {
        self.state.lock().live
    }

    fn duration_us(&self) -> i64 {
        self.state
            .lock()
            .segments
            .last()
            .map_or(0, |s| s.end_time_us)
    }

    fn seek(&mut self) {
        self.state.lock().seek_count += 1;
    }

    fn reset(&mut self) {
        self.state.lock().reset_count += 1;
    }

    fn maybe_throw_error(&self) -> HlsResult<()> {
        match &self.state.lock().pending_error {
            Some(message) => Err(HlsSourceError::Source(message.clone())),
            None => Ok(()),
        }
    }

    fn chunk_operation(
        &mut self,
        previous_segment: Option<&Arc<SegmentChunk>>,
        target_time_us: i64,
    ) -> ChunkOp {
        let mut state = self.state.lock();
        state.last_target_us = Some(target_time_us);

        if state.serve_key_first && !state.key_issued {
            state.key_issued = true;
            let format = self
                .variants
                .first()
                .cloned()
                .unwrap_or_else(|| VariantFormat::new("v0", "application/x-mpegURL", 0));
            let key = Arc::new(FakeKeyChunk::new(ChunkInfo {
                kind: ChunkKind::Key,
                trigger: Trigger::Initial,
                format,
                data_spec: DataSpec {
                    url: "key.bin".into(),
                    position: 0,
                    length: Some(16),
                },
            }));
            return ChunkOp::Load(Chunk::Data(key));
        }

        let next_index = match previous_segment {
            Some(previous) => state
                .issued
                .iter()
                .find(|(chunk, _)| Arc::ptr_eq(chunk, previous))
                .map_or_else(|| state.segment_index_for_time(target_time_us), |(_, i)| i + 1),
            None => state.segment_index_for_time(target_time_us),
        };
        if next_index >= state.segments.len() {
            return ChunkOp::EndOfStream;
        }

        let script = state.segments[next_index].clone();
        let variant_index = script
            .variant_override
            .unwrap_or_else(|| state.selected_tracks.first().copied().unwrap_or(0));
        let format = self.variants[variant_index].clone();
        let tracks = script
            .tracks_override
            .clone()
            .unwrap_or_else(|| state.tracks.clone());

        let demuxer = ScriptedDemuxer::new(tracks, script.samples.clone());
        let extractor = Arc::new(ExtractorWrapper::new(
            Box::new(demuxer),
            format.clone(),
            Trigger::Initial,
            script.start_time_us,
        ));
        let source = MemoryDataSource::new(
            vec![0u8; script.byte_size],
            Arc::clone(&state.fail_reads),
        );
        let chunk = Arc::new(SegmentChunk::new(
            ChunkInfo {
                kind: ChunkKind::Media,
                trigger: Trigger::Initial,
                format,
                data_spec: DataSpec {
                    url: format!("segment-{next_index}.ts"),
                    position: 0,
                    length: Some(script.byte_size as u64),
                },
            },
            script.start_time_us,
            script.end_time_us,
            extractor,
            Box::new(source),
        ));
        state.issued.push((Arc::clone(&chunk), next_index));
        ChunkOp::Load(Chunk::Segment(chunk))
    }

    fn on_chunk_load_completed(&mut self, _chunk: &Chunk) {
        self.state.lock().completed_count += 1;
    }

    fn on_chunk_load_error(&mut self, _chunk: &Chunk, _error: &LoadError) -> bool {
        let mut state = self.state.lock();
        state.error_count += 1;
        state.handled_errors
    }
}
