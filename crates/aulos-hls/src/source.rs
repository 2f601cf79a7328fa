//! The HLS sample source: lifecycle state machine, per-group reader API, and
//! the loader driver that keeps segment downloads flowing.
//!
//! All public entry points run on one driver thread and are non-blocking; the
//! only blocking work lives inside the loader's worker. Loader outcomes are
//! posted onto a channel and folded back into the state machine at the top of
//! every public call, which gives the same ordering as inline callbacks
//! without an ownership cycle between loader and source.

use std::{collections::VecDeque, sync::Arc};

use aulos_events::EventBus;
use aulos_loader::{LoadError, LoadOutcome, Loadable, Loader};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::chunk::{Chunk, SegmentChunk};
use crate::chunk_source::{ChunkOp, ChunkSource};
use crate::clock::{Clock, MonotonicClock};
use crate::error::{HlsResult, HlsSourceError};
use crate::events::{EventSink, SourceEvent};
use crate::extractor::{ExtractorWrapper, Sample};
use crate::format::{MediaFormat, TrackGroup, VariantFormat};
use crate::load_control::{LoadControl, SourceId};
use crate::options::HlsSourceOptions;
use crate::retry::retry_delay_ms;
use crate::tracks::build_track_groups;

/// Returned by [`HlsSampleSource::buffered_position_us`] when nothing more
/// will ever arrive.
pub const END_OF_SOURCE_US: i64 = i64::MIN;

/// Outcome of one [`TrackStream::read_data`] call.
#[derive(Debug)]
pub enum ReadData {
    /// Nothing to deliver right now.
    Nothing,
    /// The track's media format changed; no sample was consumed.
    Format(MediaFormat),
    /// One media sample.
    Sample(Sample),
    /// The track is exhausted.
    EndOfStream,
}

/// A pull-oriented sample provider for one HLS stream.
///
/// Drives an asynchronous chunk loader behind a synchronous per-track
/// consumer API. Typical life cycle: poll [`prepare`](Self::prepare) until
/// ready, inspect track groups, [`enable`](Self::enable) the groups to play,
/// pull from the returned [`TrackStream`]s while calling
/// [`continue_buffering`](Self::continue_buffering), and
/// [`release`](Self::release) when done.
pub struct HlsSampleSource {
    inner: Arc<Mutex<SourceInner>>,
}

/// Per-group reader handle returned by [`HlsSampleSource::enable`].
#[derive(Clone)]
pub struct TrackStream {
    group: usize,
    inner: Arc<Mutex<SourceInner>>,
}

struct SourceInner {
    chunk_source: Box<dyn ChunkSource>,
    load_control: Arc<dyn LoadControl>,
    notifier: EventSink,
    clock: Arc<dyn Clock>,

    source_id: SourceId,
    min_loadable_retry_count: u32,
    buffer_size_contribution: usize,

    /// Time-ordered queue of per-segment extractors; the front is being
    /// drained, the back is being (or about to be) filled.
    extractors: VecDeque<Arc<ExtractorWrapper>>,

    prepared: bool,
    load_control_registered: bool,
    enabled_track_count: usize,

    /// Coarse variant-level format last announced downstream.
    downstream_format: Option<VariantFormat>,

    track_groups: Vec<TrackGroup>,
    primary_group_index: Option<usize>,
    primary_selected_tracks: Vec<usize>,
    group_enabled: Vec<bool>,
    pending_resets: Vec<bool>,
    downstream_media_formats: Vec<Option<MediaFormat>>,

    downstream_position_us: i64,
    last_seek_position_us: i64,
    pending_reset_position_us: Option<i64>,

    loading_finished: bool,
    current_loadable: Option<Chunk>,
    current_segment_loadable: Option<Arc<SegmentChunk>>,
    previous_segment_loadable: Option<Arc<SegmentChunk>>,

    loader: Option<Loader>,
    current_error: Option<LoadError>,
    current_error_count: u32,
    current_error_timestamp_ms: u64,
    current_load_start_ms: u64,
}

impl HlsSampleSource {
    pub fn new(
        chunk_source: Box<dyn ChunkSource>,
        load_control: Arc<dyn LoadControl>,
        bus: EventBus<SourceEvent>,
        options: HlsSourceOptions,
    ) -> Self {
        Self::with_clock(
            chunk_source,
            load_control,
            bus,
            options,
            Arc::new(MonotonicClock::new()),
        )
    }

    /// Like [`new`](Self::new) with an explicit clock, for deterministic
    /// retry timing in tests.
    pub fn with_clock(
        chunk_source: Box<dyn ChunkSource>,
        load_control: Arc<dyn LoadControl>,
        bus: EventBus<SourceEvent>,
        options: HlsSourceOptions,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let notifier = EventSink::new(bus, options.source_id);
        Self {
            inner: Arc::new(Mutex::new(SourceInner {
                chunk_source,
                load_control,
                notifier,
                clock,
                source_id: options.source_id,
                min_loadable_retry_count: options.min_loadable_retry_count,
                buffer_size_contribution: options.buffer_size_contribution,
                extractors: VecDeque::new(),
                prepared: false,
                load_control_registered: false,
                enabled_track_count: 0,
                downstream_format: None,
                track_groups: Vec::new(),
                primary_group_index: None,
                primary_selected_tracks: Vec::new(),
                group_enabled: Vec::new(),
                pending_resets: Vec::new(),
                downstream_media_formats: Vec::new(),
                downstream_position_us: 0,
                last_seek_position_us: 0,
                pending_reset_position_us: None,
                loading_finished: false,
                current_loadable: None,
                current_segment_loadable: None,
                previous_segment_loadable: None,
                loader: None,
                current_error: None,
                current_error_count: 0,
                current_error_timestamp_ms: 0,
                current_load_start_ms: 0,
            })),
        }
    }

    /// Poll towards readiness, kicking off preparation loads as needed.
    ///
    /// Returns `Ok(true)` once track groups are available. Surfaces a fatal
    /// load error once the retry budget is exhausted.
    pub fn prepare(&self, position_us: i64) -> HlsResult<bool> {
        let mut inner = self.inner.lock();
        inner.process_loader_events();
        inner.prepare(position_us)
    }

    pub fn is_prepared(&self) -> bool {
        self.inner.lock().prepared
    }

    pub fn duration_us(&self) -> i64 {
        self.inner.lock().chunk_source.duration_us()
    }

    pub fn track_group_count(&self) -> usize {
        let inner = self.inner.lock();
        assert!(inner.prepared, "source not prepared");
        inner.track_groups.len()
    }

    pub fn track_group(&self, group: usize) -> TrackGroup {
        let inner = self.inner.lock();
        assert!(inner.prepared, "source not prepared");
        inner.track_groups[group].clone()
    }

    /// Enable a track group and obtain its reader handle.
    ///
    /// For the primary (adaptive) group, `tracks` selects the variant subset
    /// the chunk source may adapt across; a changed selection restarts
    /// loading as a seek so every enabled group observes a discontinuity.
    pub fn enable(&self, group: usize, tracks: &[usize], position_us: i64) -> TrackStream {
        let mut inner = self.inner.lock();
        inner.process_loader_events();
        inner.enable(group, tracks, position_us);
        TrackStream {
            group,
            inner: Arc::clone(&self.inner),
        }
    }

    /// Report the playback position and give the source a chance to keep
    /// loading.
    pub fn continue_buffering(&self, playback_position_us: i64) {
        let mut inner = self.inner.lock();
        inner.process_loader_events();
        inner.continue_buffering(playback_position_us);
    }

    /// Seek every enabled group to `position_us`.
    pub fn seek_to_us(&self, position_us: i64) {
        let mut inner = self.inner.lock();
        inner.process_loader_events();
        assert!(inner.prepared, "source not prepared");
        if inner.enabled_track_count == 0 {
            return;
        }
        let position_us = if inner.chunk_source.is_live() {
            0
        } else {
            position_us
        };
        debug!(position_us, "sample_source: seek");
        inner.seek_to_internal(position_us);
    }

    /// How far ahead of the playback position buffered media extends.
    pub fn buffered_position_us(&self) -> i64 {
        let mut inner = self.inner.lock();
        inner.process_loader_events();
        inner.buffered_position_us()
    }

    /// Surface a pending fatal error, if the retry budget is exhausted.
    pub fn maybe_throw_error(&self) -> HlsResult<()> {
        let mut inner = self.inner.lock();
        inner.process_loader_events();
        inner.maybe_throw_error()
    }

    /// Tear down the loader and load-control registration.
    ///
    /// Idempotent; outcomes of any in-flight load are swallowed.
    pub fn release(&self) {
        let mut inner = self.inner.lock();
        inner.release();
    }
}

impl TrackStream {
    /// Whether a call to [`read_data`](Self::read_data) would make progress.
    pub fn is_ready(&self) -> bool {
        let mut inner = self.inner.lock();
        inner.process_loader_events();
        inner.is_ready(self.group)
    }

    pub fn maybe_throw_error(&self) -> HlsResult<()> {
        let mut inner = self.inner.lock();
        inner.process_loader_events();
        inner.maybe_throw_error()
    }

    /// Consume the pending reset marker, if one is set for this group.
    ///
    /// Returns the seek position the following samples are relative to.
    pub fn read_reset(&self) -> Option<i64> {
        let mut inner = self.inner.lock();
        inner.process_loader_events();
        inner.read_reset(self.group)
    }

    /// Pull the next format change or sample for this group.
    pub fn read_data(&self) -> ReadData {
        let mut inner = self.inner.lock();
        inner.process_loader_events();
        inner.read_data(self.group)
    }

    /// Disable this group. Panics if the group is not enabled.
    pub fn disable(&self) {
        let mut inner = self.inner.lock();
        inner.process_loader_events();
        inner.disable(self.group);
    }
}

impl SourceInner {
    // Lifecycle.

    fn prepare(&mut self, position_us: i64) -> HlsResult<bool> {
        if self.prepared {
            return Ok(true);
        }
        if !self.chunk_source.prepare()? {
            return Ok(false);
        }

        if !self.extractors.is_empty() {
            loop {
                // Not prepared yet, but a preparation load may already have
                // produced what we need.
                let front_prepared = self
                    .extractors
                    .front()
                    .is_some_and(|extractor| extractor.is_prepared());
                if front_prepared {
                    if let Some(front) = self.extractors.front() {
                        let build = build_track_groups(front, self.chunk_source.as_ref());
                        let group_count = build.groups.len();
                        self.track_groups = build.groups;
                        self.primary_group_index = build.primary_group_index;
                        self.primary_selected_tracks =
                            (0..self.chunk_source.track_count()).collect();
                        self.group_enabled = vec![false; group_count];
                        self.pending_resets = vec![false; group_count];
                        self.downstream_media_formats = vec![None; group_count];
                    }
                    self.prepared = true;
                    debug!(
                        groups = self.track_groups.len(),
                        primary = ?self.primary_group_index,
                        "sample_source: prepared"
                    );
                    self.maybe_start_loading(); // Update the load control.
                    return Ok(true);
                } else if self.extractors.len() > 1 {
                    // Older extractors hold nothing useful for the playback
                    // start we are preparing for.
                    if let Some(stale) = self.extractors.pop_front() {
                        stale.clear();
                    }
                } else {
                    break;
                }
            }
        }

        // Nothing loaded yet: make sure the machinery exists and aim the
        // first load at the requested start position.
        if self.loader.is_none() {
            self.loader = Some(Loader::new("aulos-hls"));
            self.load_control
                .register(self.source_id, self.buffer_size_contribution);
            self.load_control_registered = true;
        }
        let loading = self.loader.as_ref().is_some_and(Loader::is_loading);
        if !loading {
            // Load the chunk at position_us so the common case of enabling at
            // the same position continues seamlessly.
            self.pending_reset_position_us = Some(position_us);
            self.downstream_position_us = position_us;
        }
        self.maybe_start_loading();
        self.maybe_throw_error()?;
        Ok(false)
    }

    fn enable(&mut self, group: usize, tracks: &[usize], position_us: i64) {
        assert!(self.prepared, "source not prepared");
        self.set_group_enabled(group, true);
        self.downstream_media_formats[group] = None;
        self.pending_resets[group] = false;
        self.downstream_format = None;

        let was_registered = self.load_control_registered;
        if !self.load_control_registered {
            self.load_control
                .register(self.source_id, self.buffer_size_contribution);
            self.load_control_registered = true;
        }

        // Enabling a live stream always occurs at t=0.
        let position_us = if self.chunk_source.is_live() {
            0
        } else {
            position_us
        };

        debug!(group, ?tracks, position_us, "sample_source: enable");

        if Some(group) == self.primary_group_index
            && tracks != self.primary_selected_tracks.as_slice()
        {
            // The variant selection changed. Other groups may be enabled too,
            // so restart as a seek to hand every consumer a discontinuity.
            self.chunk_source.select_tracks(tracks);
            self.primary_selected_tracks = tracks.to_vec();
            self.seek_to_internal(position_us);
        } else if self.enabled_track_count == 1 {
            self.last_seek_position_us = position_us;
            if was_registered && self.downstream_position_us == position_us {
                // First group enabled right where preparation left off:
                // restarting would reload the same chunks, so don't.
                self.maybe_start_loading();
            } else {
                self.downstream_position_us = position_us;
                self.restart_from(Some(position_us));
            }
        }
    }

    fn disable(&mut self, group: usize) {
        assert!(self.prepared, "source not prepared");
        self.set_group_enabled(group, false);
        debug!(group, remaining = self.enabled_track_count, "sample_source: disable");
        if self.enabled_track_count == 0 {
            self.chunk_source.reset();
            self.downstream_position_us = 0;
            if self.load_control_registered {
                self.load_control.unregister(self.source_id);
                self.load_control_registered = false;
            }
            let loading = self.loader.as_ref().is_some_and(Loader::is_loading);
            if loading {
                if let Some(loader) = self.loader.as_mut() {
                    loader.cancel_loading();
                }
            } else {
                self.clear_state();
                self.load_control.trim_allocator();
            }
        }
    }

    fn continue_buffering(&mut self, playback_position_us: i64) {
        assert!(self.prepared, "source not prepared");
        if self.enabled_track_count == 0 {
            return;
        }
        self.downstream_position_us = playback_position_us;
        if !self.extractors.is_empty() {
            if let Some(extractor) = self.current_extractor() {
                self.discard_samples_for_disabled_tracks(&extractor, playback_position_us);
            }
        }
        self.maybe_start_loading();
    }

    fn release(&mut self) {
        if let Some(mut loader) = self.loader.take() {
            if self.load_control_registered {
                self.load_control.unregister(self.source_id);
                self.load_control_registered = false;
            }
            loader.release();
        }
        self.prepared = false;
    }

    // Reader API.

    fn is_ready(&mut self, group: usize) -> bool {
        assert!(self.group_enabled[group], "group not enabled");
        if self.loading_finished {
            return true;
        }
        if self.pending_reset_position_us.is_some() || self.extractors.is_empty() {
            return false;
        }
        for extractor in &self.extractors {
            if !extractor.is_prepared() {
                break;
            }
            if extractor.has_samples(group) {
                return true;
            }
        }
        false
    }

    fn read_reset(&mut self, group: usize) -> Option<i64> {
        if self.pending_resets[group] {
            self.pending_resets[group] = false;
            return Some(self.last_seek_position_us);
        }
        None
    }

    fn read_data(&mut self, group: usize) -> ReadData {
        assert!(self.prepared, "source not prepared");

        if self.pending_resets[group] || self.pending_reset_position_us.is_some() {
            return ReadData::Nothing;
        }

        let Some(mut extractor) = self.current_extractor() else {
            return ReadData::Nothing;
        };
        if !extractor.is_prepared() {
            return ReadData::Nothing;
        }

        if self.downstream_format.as_ref() != Some(extractor.format()) {
            // Announce the change in the downstream variant.
            self.notifier.notify_downstream_format_changed(
                extractor.format(),
                extractor.trigger(),
                extractor.start_time_us(),
            );
            self.downstream_format = Some(extractor.format().clone());
        }

        if self.extractors.len() > 1 {
            // With a successor queued, line up a seamless hand-off.
            extractor.configure_splice_to(&self.extractors[1]);
        }

        let mut extractor_index = 0;
        while self.extractors.len() > extractor_index + 1 && !extractor.has_samples(group) {
            // This extractor is drained for this particular track; read from
            // the next one without mutating the queue.
            extractor_index += 1;
            extractor = Arc::clone(&self.extractors[extractor_index]);
            if !extractor.is_prepared() {
                return ReadData::Nothing;
            }
        }

        if let Some(media_format) = extractor.media_format(group) {
            if self.downstream_media_formats[group].as_ref() != Some(&media_format) {
                self.downstream_media_formats[group] = Some(media_format.clone());
                return ReadData::Format(media_format);
            }
        }

        if let Some(mut sample) = extractor.read_sample(group) {
            sample.decode_only = sample.time_us < self.last_seek_position_us;
            trace!(
                group,
                time_us = sample.time_us,
                decode_only = sample.decode_only,
                "sample_source: sample"
            );
            return ReadData::Sample(sample);
        }

        if self.loading_finished {
            return ReadData::EndOfStream;
        }

        ReadData::Nothing
    }

    fn maybe_throw_error(&mut self) -> HlsResult<()> {
        if let Some(error) = &self.current_error {
            if self.current_error_count > self.min_loadable_retry_count {
                return Err(HlsSourceError::Load(error.clone()));
            }
        } else if self.current_loadable.is_none() {
            self.chunk_source.maybe_throw_error()?;
        }
        Ok(())
    }

    fn buffered_position_us(&mut self) -> i64 {
        assert!(self.prepared, "source not prepared");
        if self.enabled_track_count == 0 {
            return END_OF_SOURCE_US;
        }
        if let Some(pending) = self.pending_reset_position_us {
            return pending;
        }
        if self.loading_finished {
            return END_OF_SOURCE_US;
        }
        let mut largest = self
            .extractors
            .back()
            .and_then(|extractor| extractor.largest_parsed_timestamp_us());
        if self.extractors.len() > 1 {
            // When adapting across formats the freshly appended extractor may
            // not have parsed anything yet; the penultimate one can hold the
            // larger timestamp.
            let penultimate =
                self.extractors[self.extractors.len() - 2].largest_parsed_timestamp_us();
            largest = match (largest, penultimate) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (Some(a), None) => Some(a),
                (None, b) => b,
            };
        }
        largest.unwrap_or(self.downstream_position_us)
    }

    // Loader callbacks, delivered via the loader's outcome channel.

    fn process_loader_events(&mut self) {
        loop {
            let event = match self.loader.as_mut() {
                Some(loader) => loader.poll(),
                None => return,
            };
            let Some(event) = event else { return };
            match event.outcome {
                LoadOutcome::Completed => self.on_load_completed(&event.loadable),
                LoadOutcome::Canceled => self.on_load_canceled(&event.loadable),
                LoadOutcome::Error(error) => self.on_load_error(&event.loadable, error),
            }
        }
    }

    fn on_load_completed(&mut self, loadable: &Arc<dyn Loadable>) {
        let Some(current) = self.current_loadable.clone() else {
            return;
        };
        assert!(
            current.is_loadable(loadable),
            "completed loadable is not the current load"
        );
        let now = self.clock.elapsed_ms();
        let load_duration_ms = now.saturating_sub(self.current_load_start_ms);
        self.chunk_source.on_chunk_load_completed(&current);

        let info = current.info().clone();
        match current.segment() {
            Some(segment) => {
                self.previous_segment_loadable = Some(Arc::clone(segment));
                self.notifier.notify_load_completed(
                    current.bytes_loaded(),
                    info.kind,
                    info.trigger,
                    &info.format,
                    Some((segment.start_time_us(), segment.end_time_us())),
                    now,
                    load_duration_ms,
                );
            }
            None => {
                self.notifier.notify_load_completed(
                    current.bytes_loaded(),
                    info.kind,
                    info.trigger,
                    &info.format,
                    None,
                    now,
                    load_duration_ms,
                );
            }
        }
        trace!(
            bytes = current.bytes_loaded(),
            duration_ms = load_duration_ms,
            "sample_source: load completed"
        );
        self.clear_current_loadable();
        self.maybe_start_loading();
    }

    fn on_load_canceled(&mut self, _loadable: &Arc<dyn Loadable>) {
        let bytes_loaded = self
            .current_loadable
            .as_ref()
            .map_or(0, Chunk::bytes_loaded);
        self.notifier.notify_load_canceled(bytes_loaded);
        debug!(bytes = bytes_loaded, "sample_source: load canceled");
        if self.enabled_track_count > 0 {
            self.restart_from(self.pending_reset_position_us);
        } else {
            self.clear_state();
            self.load_control.trim_allocator();
        }
    }

    fn on_load_error(&mut self, _loadable: &Arc<dyn Loadable>, error: LoadError) {
        let handled = match &self.current_loadable {
            Some(current) => self.chunk_source.on_chunk_load_error(current, &error),
            None => false,
        };
        if handled {
            // The chunk source absorbed the failure (e.g. variant blacklist).
            // With no completed segment and no reset pending, replay from the
            // seek point so the next fetch starts somewhere meaningful.
            if self.previous_segment_loadable.is_none()
                && self.pending_reset_position_us.is_none()
            {
                self.pending_reset_position_us = Some(self.last_seek_position_us);
            }
            self.clear_current_loadable();
        } else {
            self.current_error = Some(error.clone());
            self.current_error_count += 1;
            self.current_error_timestamp_ms = self.clock.elapsed_ms();
        }
        debug!(
            %error,
            handled,
            consecutive = self.current_error_count,
            "sample_source: load error"
        );
        self.notifier.notify_load_error(&error);
        self.maybe_start_loading();
    }

    // Loading.

    fn maybe_start_loading(&mut self) {
        let now = self.clock.elapsed_ms();
        let next_load_position_us = self.next_load_position_us();
        let is_backed_off = self.current_error.is_some();
        let loading = self.loader.as_ref().is_some_and(Loader::is_loading);
        let loading_or_backed_off = loading || is_backed_off;

        let next_loader = self.load_control.update(
            self.source_id,
            self.downstream_position_us,
            next_load_position_us,
            loading_or_backed_off,
        );

        if is_backed_off {
            let elapsed_ms = now.saturating_sub(self.current_error_timestamp_ms);
            if elapsed_ms >= retry_delay_ms(self.current_error_count) {
                if let Some(chunk) = self.current_loadable.clone() {
                    debug!(
                        attempt = self.current_error_count + 1,
                        "sample_source: retrying load"
                    );
                    self.current_error = None;
                    if let Some(loader) = self.loader.as_mut() {
                        loader.start_loading(chunk.loadable());
                    }
                }
            }
            return;
        }

        if loading || !next_loader || (self.prepared && self.enabled_track_count == 0) {
            return;
        }

        let target_us = self
            .pending_reset_position_us
            .unwrap_or(self.downstream_position_us);
        let operation = self
            .chunk_source
            .chunk_operation(self.previous_segment_loadable.as_ref(), target_us);

        match operation {
            ChunkOp::EndOfStream => {
                debug!("sample_source: end of stream");
                self.loading_finished = true;
                self.load_control
                    .update(self.source_id, self.downstream_position_us, None, false);
            }
            ChunkOp::Pending => {}
            ChunkOp::Load(chunk) => {
                self.current_load_start_ms = now;
                match &chunk {
                    Chunk::Segment(segment) => {
                        self.pending_reset_position_us = None;
                        let extractor = segment.extractor();
                        let is_tail = self
                            .extractors
                            .back()
                            .is_some_and(|last| Arc::ptr_eq(last, extractor));
                        if !is_tail {
                            extractor.init(self.load_control.allocator());
                            self.extractors.push_back(Arc::clone(extractor));
                        }
                        let info = segment.info();
                        self.notifier.notify_load_started(
                            info.data_spec.length,
                            info.kind,
                            info.trigger,
                            &info.format,
                            Some((segment.start_time_us(), segment.end_time_us())),
                        );
                        self.current_segment_loadable = Some(Arc::clone(segment));
                    }
                    Chunk::Data(data) => {
                        let info = data.info();
                        self.notifier.notify_load_started(
                            info.data_spec.length,
                            info.kind,
                            info.trigger,
                            &info.format,
                            None,
                        );
                    }
                }
                trace!(url = %chunk.info().data_spec.url, "sample_source: load started");
                let loadable = chunk.loadable();
                self.current_loadable = Some(chunk);
                if let Some(loader) = self.loader.as_mut() {
                    loader.start_loading(loadable);
                }
            }
        }
    }

    /// Where the next load would start: the pending reset position if one is
    /// set, otherwise just past the newest segment. `None` when no more data
    /// is needed.
    fn next_load_position_us(&self) -> Option<i64> {
        if let Some(pending) = self.pending_reset_position_us {
            return Some(pending);
        }
        if self.loading_finished || (self.prepared && self.enabled_track_count == 0) {
            return None;
        }
        self.current_segment_loadable
            .as_ref()
            .or(self.previous_segment_loadable.as_ref())
            .map(|segment| segment.end_time_us())
    }

    // Internal state management.

    fn seek_to_internal(&mut self, position_us: i64) {
        self.last_seek_position_us = position_us;
        self.downstream_position_us = position_us;
        self.pending_resets.fill(true);
        self.chunk_source.seek();
        self.restart_from(Some(position_us));
    }

    fn restart_from(&mut self, position_us: Option<i64>) {
        self.pending_reset_position_us = position_us;
        self.loading_finished = false;
        let loading = self.loader.as_ref().is_some_and(Loader::is_loading);
        if loading {
            if let Some(loader) = self.loader.as_mut() {
                loader.cancel_loading();
            }
        } else {
            self.clear_state();
            self.maybe_start_loading();
        }
    }

    fn clear_state(&mut self) {
        for extractor in &self.extractors {
            extractor.clear();
        }
        self.extractors.clear();
        self.clear_current_loadable();
        self.previous_segment_loadable = None;
    }

    fn clear_current_loadable(&mut self) {
        self.current_segment_loadable = None;
        self.current_loadable = None;
        self.current_error = None;
        self.current_error_count = 0;
    }

    fn set_group_enabled(&mut self, group: usize, enabled: bool) {
        assert!(
            self.group_enabled[group] != enabled,
            "group already in requested enabled state"
        );
        self.group_enabled[group] = enabled;
        if enabled {
            self.enabled_track_count += 1;
        } else {
            self.enabled_track_count -= 1;
        }
    }

    /// The extractor samples should currently be read from.
    ///
    /// Discards fully drained extractors from the front of the queue; the
    /// last one is retained even when drained.
    fn current_extractor(&mut self) -> Option<Arc<ExtractorWrapper>> {
        loop {
            if self.extractors.len() <= 1 {
                break;
            }
            let drained = {
                let front = &self.extractors[0];
                !self.have_samples_for_enabled_tracks(front)
            };
            if !drained {
                break;
            }
            if let Some(front) = self.extractors.pop_front() {
                front.clear();
            }
        }
        self.extractors.front().cloned()
    }

    fn have_samples_for_enabled_tracks(&self, extractor: &ExtractorWrapper) -> bool {
        if !extractor.is_prepared() {
            return false;
        }
        self.group_enabled
            .iter()
            .enumerate()
            .any(|(group, enabled)| *enabled && extractor.has_samples(group))
    }

    fn discard_samples_for_disabled_tracks(&self, extractor: &ExtractorWrapper, time_us: i64) {
        if !extractor.is_prepared() {
            return;
        }
        for (group, enabled) in self.group_enabled.iter().enumerate() {
            if !enabled {
                extractor.discard_until(group, time_us);
            }
        }
    }
}
