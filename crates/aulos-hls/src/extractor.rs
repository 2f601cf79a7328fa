//! Extractor wrapper: per-segment demultiplexer state and sample queues.
//!
//! A segment chunk feeds downloaded bytes through a [`Demuxer`] on the loader
//! thread; the wrapper collects the demuxer's output into per-track sample
//! queues that the driver thread drains. All mutability is behind one lock so
//! the two threads never observe half-updated state.

use std::{collections::VecDeque, sync::Arc};

use aulos_loader::LoadError;
use aulos_pool::{Allocator, PooledBuf};
use parking_lot::Mutex;

use crate::chunk::Trigger;
use crate::format::{MediaFormat, VariantFormat};

/// One media sample as handed to the consumer.
#[derive(Debug)]
pub struct Sample {
    pub time_us: i64,
    pub key_frame: bool,
    /// Set when the sample precedes the seek target: decode it, don't render.
    pub decode_only: bool,
    pub data: PooledBuf,
}

/// Sink for demuxer output.
pub trait DemuxOutput {
    /// Declare the format of one elementary track.
    fn declare_track(&mut self, track: usize, format: MediaFormat);

    /// Signal that all tracks have been declared.
    fn end_tracks(&mut self, track_count: usize);

    /// Emit one sample for a track.
    fn push_sample(&mut self, track: usize, time_us: i64, key_frame: bool, data: &[u8]);
}

/// A demultiplexer for a single segment's container format.
///
/// Implementations are external; the wrapper only requires that fed bytes
/// eventually produce track declarations followed by samples in decode order.
pub trait Demuxer: Send {
    fn consume(&mut self, data: &[u8], output: &mut dyn DemuxOutput) -> Result<(), LoadError>;
}

struct QueuedSample {
    time_us: i64,
    key_frame: bool,
    data: PooledBuf,
}

/// FIFO of parsed samples for one track.
struct SampleQueue {
    samples: VecDeque<QueuedSample>,
}

impl SampleQueue {
    fn new() -> Self {
        Self {
            samples: VecDeque::new(),
        }
    }

    fn push(&mut self, time_us: i64, key_frame: bool, data: PooledBuf) {
        self.samples.push_back(QueuedSample {
            time_us,
            key_frame,
            data,
        });
    }

    fn has_samples(&self) -> bool {
        !self.samples.is_empty()
    }

    fn pop(&mut self) -> Option<Sample> {
        self.samples.pop_front().map(|s| Sample {
            time_us: s.time_us,
            key_frame: s.key_frame,
            decode_only: false,
            data: s.data,
        })
    }

    fn discard_until(&mut self, time_us: i64) {
        while self
            .samples
            .front()
            .is_some_and(|s| s.time_us < time_us)
        {
            self.samples.pop_front();
        }
    }

    fn largest_queued_timestamp_us(&self) -> Option<i64> {
        self.samples.iter().map(|s| s.time_us).max()
    }

    /// Trim the head of this queue so playback spliced in from a predecessor
    /// resumes on a key frame at or after `boundary_us`.
    ///
    /// Returns `false` when no such key frame has been parsed yet; the caller
    /// retries once more samples exist.
    fn splice_in_from(&mut self, boundary_us: Option<i64>) -> bool {
        let Some(boundary_us) = boundary_us else {
            return true;
        };
        let splice_point = self
            .samples
            .iter()
            .position(|s| s.key_frame && s.time_us >= boundary_us);
        match splice_point {
            Some(index) => {
                self.samples.drain(..index);
                true
            }
            None => false,
        }
    }

    fn clear(&mut self) {
        self.samples.clear();
    }
}

struct WrapperInner {
    demuxer: Box<dyn Demuxer>,
    allocator: Option<Arc<Allocator>>,
    queues: Vec<SampleQueue>,
    formats: Vec<Option<MediaFormat>>,
    declared_track_count: Option<usize>,
    largest_parsed_timestamp_us: Option<i64>,
    spliced: bool,
}

impl WrapperInner {
    fn is_prepared(&self) -> bool {
        match self.declared_track_count {
            Some(count) => self.formats.iter().take(count).all(Option::is_some),
            None => false,
        }
    }
}

struct WrapperOutput<'a> {
    allocator: &'a Arc<Allocator>,
    queues: &'a mut Vec<SampleQueue>,
    formats: &'a mut Vec<Option<MediaFormat>>,
    declared_track_count: &'a mut Option<usize>,
    largest_parsed_timestamp_us: &'a mut Option<i64>,
}

impl WrapperOutput<'_> {
    fn ensure_track(&mut self, track: usize) {
        while self.queues.len() <= track {
            self.queues.push(SampleQueue::new());
            self.formats.push(None);
        }
    }
}

impl DemuxOutput for WrapperOutput<'_> {
    fn declare_track(&mut self, track: usize, format: MediaFormat) {
        self.ensure_track(track);
        self.formats[track] = Some(format);
    }

    fn end_tracks(&mut self, track_count: usize) {
        if track_count > 0 {
            self.ensure_track(track_count - 1);
        }
        *self.declared_track_count = Some(track_count);
    }

    fn push_sample(&mut self, track: usize, time_us: i64, key_frame: bool, data: &[u8]) {
        self.ensure_track(track);
        let buf = self.allocator.allocate(data);
        self.queues[track].push(time_us, key_frame, buf);
        *self.largest_parsed_timestamp_us = Some(match *self.largest_parsed_timestamp_us {
            Some(current) => current.max(time_us),
            None => time_us,
        });
    }
}

/// Demultiplexer state for one segment, shared between the loader thread
/// (feeding bytes) and the driver thread (draining samples).
///
/// The wrapper becomes *prepared* once the demuxer has declared every track
/// and a format is known for each. Sample storage is borrowed from the
/// allocator passed to [`ExtractorWrapper::init`] and returned by
/// [`ExtractorWrapper::clear`] or when individual samples are dropped.
pub struct ExtractorWrapper {
    format: VariantFormat,
    trigger: Trigger,
    start_time_us: i64,
    inner: Mutex<WrapperInner>,
}

impl ExtractorWrapper {
    pub fn new(
        demuxer: Box<dyn Demuxer>,
        format: VariantFormat,
        trigger: Trigger,
        start_time_us: i64,
    ) -> Self {
        Self {
            format,
            trigger,
            start_time_us,
            inner: Mutex::new(WrapperInner {
                demuxer,
                allocator: None,
                queues: Vec::new(),
                formats: Vec::new(),
                declared_track_count: None,
                largest_parsed_timestamp_us: None,
                spliced: false,
            }),
        }
    }

    /// The variant format of the stream this wrapper was created for.
    pub fn format(&self) -> &VariantFormat {
        &self.format
    }

    /// Why the originating chunk was selected.
    pub fn trigger(&self) -> Trigger {
        self.trigger
    }

    /// Media time at which this wrapper's segment starts.
    pub fn start_time_us(&self) -> i64 {
        self.start_time_us
    }

    /// Attach the allocator that backs this wrapper's sample storage.
    pub fn init(&self, allocator: Arc<Allocator>) {
        self.inner.lock().allocator = Some(allocator);
    }

    /// Whether every track has been declared with a known format.
    pub fn is_prepared(&self) -> bool {
        self.inner.lock().is_prepared()
    }

    /// Number of elementary tracks. Only meaningful once prepared.
    pub fn track_count(&self) -> usize {
        let inner = self.inner.lock();
        assert!(inner.is_prepared(), "extractor not prepared");
        inner.declared_track_count.unwrap_or(0)
    }

    pub fn media_format(&self, track: usize) -> Option<MediaFormat> {
        self.inner.lock().formats.get(track).cloned().flatten()
    }

    pub fn has_samples(&self, track: usize) -> bool {
        self.inner
            .lock()
            .queues
            .get(track)
            .is_some_and(SampleQueue::has_samples)
    }

    pub fn read_sample(&self, track: usize) -> Option<Sample> {
        self.inner.lock().queues.get_mut(track).and_then(SampleQueue::pop)
    }

    /// Drop queued samples of `track` with timestamps below `time_us`.
    pub fn discard_until(&self, track: usize, time_us: i64) {
        if let Some(queue) = self.inner.lock().queues.get_mut(track) {
            queue.discard_until(time_us);
        }
    }

    /// Largest sample timestamp the demuxer has produced so far.
    pub fn largest_parsed_timestamp_us(&self) -> Option<i64> {
        self.inner.lock().largest_parsed_timestamp_us
    }

    /// Configure a seamless hand-off from this wrapper into `next`.
    ///
    /// Trims the head of each of `next`'s queues so the first sample consumed
    /// from it is a key frame at or after the largest timestamp still queued
    /// here. Takes effect once; repeated calls are no-ops after the splice is
    /// fully configured. Requires both wrappers to be prepared.
    pub fn configure_splice_to(&self, next: &ExtractorWrapper) {
        if std::ptr::eq(self, next) {
            return;
        }
        let mut inner = self.inner.lock();
        if inner.spliced || !inner.is_prepared() {
            return;
        }
        let mut next_inner = next.inner.lock();
        if !next_inner.is_prepared() {
            return;
        }
        let track_count = inner
            .declared_track_count
            .unwrap_or(0)
            .min(next_inner.declared_track_count.unwrap_or(0));
        let mut configured = true;
        for track in 0..track_count {
            let boundary = inner.queues[track].largest_queued_timestamp_us();
            configured &= next_inner.queues[track].splice_in_from(boundary);
        }
        inner.spliced = configured;
    }

    /// Release all pooled sample storage held by this wrapper.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        for queue in &mut inner.queues {
            queue.clear();
        }
    }

    /// Feed a buffer of downloaded segment data through the demuxer.
    ///
    /// Called from the loader thread while the driver thread may be reading
    /// samples concurrently.
    pub fn consume(&self, data: &[u8]) -> Result<(), LoadError> {
        let mut inner = self.inner.lock();
        let WrapperInner {
            demuxer,
            allocator,
            queues,
            formats,
            declared_track_count,
            largest_parsed_timestamp_us,
            ..
        } = &mut *inner;
        let allocator = allocator
            .as_ref()
            .expect("extractor fed before init(allocator)");
        let mut output = WrapperOutput {
            allocator,
            queues,
            formats,
            declared_track_count,
            largest_parsed_timestamp_us,
        };
        demuxer.consume(data, &mut output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{ScriptedDemuxer, ScriptedSample};

    fn audio_format() -> MediaFormat {
        MediaFormat::new("audio/mp4a-latm")
    }

    fn variant() -> VariantFormat {
        VariantFormat::new("v0", "application/x-mpegURL", 128_000)
    }

    fn sample(track: usize, time_us: i64, key_frame: bool) -> ScriptedSample {
        ScriptedSample {
            track,
            time_us,
            key_frame,
            payload: vec![0xAB; 8],
        }
    }

    fn wrapper_with(samples: Vec<ScriptedSample>) -> (Arc<Allocator>, ExtractorWrapper) {
        let allocator = Arc::new(Allocator::new(16, 64 * 1024));
        let demuxer = ScriptedDemuxer::new(vec![audio_format()], samples);
        let wrapper = ExtractorWrapper::new(Box::new(demuxer), variant(), Trigger::Initial, 0);
        wrapper.init(Arc::clone(&allocator));
        (allocator, wrapper)
    }

    #[test]
    fn unprepared_until_fed() {
        let (_allocator, wrapper) = wrapper_with(vec![sample(0, 0, true)]);
        assert!(!wrapper.is_prepared());

        wrapper.consume(&[0u8; 4]).unwrap();
        assert!(wrapper.is_prepared());
        assert_eq!(wrapper.track_count(), 1);
        assert_eq!(wrapper.media_format(0), Some(audio_format()));
    }

    #[test]
    fn samples_come_out_in_decode_order() {
        let (_allocator, wrapper) = wrapper_with(vec![
            sample(0, 0, true),
            sample(0, 1_000, false),
            sample(0, 2_000, false),
        ]);
        wrapper.consume(&[0u8; 4]).unwrap();

        assert!(wrapper.has_samples(0));
        let times: Vec<i64> = std::iter::from_fn(|| wrapper.read_sample(0))
            .map(|s| s.time_us)
            .collect();
        assert_eq!(times, vec![0, 1_000, 2_000]);
        assert!(!wrapper.has_samples(0));
    }

    #[test]
    fn discard_until_drops_only_older_samples() {
        let (_allocator, wrapper) = wrapper_with(vec![
            sample(0, 0, true),
            sample(0, 1_000, false),
            sample(0, 2_000, false),
        ]);
        wrapper.consume(&[0u8; 4]).unwrap();

        wrapper.discard_until(0, 1_500);
        let next = wrapper.read_sample(0).unwrap();
        assert_eq!(next.time_us, 2_000);
    }

    #[test]
    fn largest_parsed_timestamp_tracks_all_pushes() {
        let (_allocator, wrapper) =
            wrapper_with(vec![sample(0, 5_000, true), sample(0, 3_000, false)]);
        assert_eq!(wrapper.largest_parsed_timestamp_us(), None);

        wrapper.consume(&[0u8; 4]).unwrap();
        assert_eq!(wrapper.largest_parsed_timestamp_us(), Some(5_000));
    }

    #[test]
    fn clear_releases_pooled_storage() {
        let (allocator, wrapper) = wrapper_with(vec![sample(0, 0, true), sample(0, 1, false)]);
        wrapper.consume(&[0u8; 4]).unwrap();
        assert!(allocator.allocated_bytes() > 0);

        wrapper.clear();
        assert_eq!(allocator.allocated_bytes(), 0);
        assert!(!wrapper.has_samples(0));
    }

    #[test]
    fn splice_trims_next_head_to_key_frame() {
        let (_a1, current) = wrapper_with(vec![sample(0, 0, true), sample(0, 9_000, false)]);
        current.consume(&[0u8; 4]).unwrap();

        let (_a2, next) = wrapper_with(vec![
            sample(0, 8_500, false),
            sample(0, 10_000, true),
            sample(0, 11_000, false),
        ]);
        next.consume(&[0u8; 4]).unwrap();

        current.configure_splice_to(&next);

        let first = next.read_sample(0).unwrap();
        assert_eq!(first.time_us, 10_000);
        assert!(first.key_frame);
    }

    #[test]
    fn splice_waits_for_a_usable_key_frame() {
        let (_a1, current) = wrapper_with(vec![sample(0, 9_000, true)]);
        current.consume(&[0u8; 4]).unwrap();

        // Next wrapper has only pre-boundary samples so far; nothing is
        // trimmed and the splice stays unconfigured.
        let (_a2, next) = wrapper_with(vec![sample(0, 8_000, false)]);
        next.consume(&[0u8; 4]).unwrap();

        current.configure_splice_to(&next);
        assert!(next.has_samples(0));
        assert_eq!(next.read_sample(0).unwrap().time_us, 8_000);
    }

    #[test]
    fn splice_against_unprepared_next_is_a_no_op() {
        let (_a1, current) = wrapper_with(vec![sample(0, 0, true)]);
        current.consume(&[0u8; 4]).unwrap();

        let (_a2, next) = wrapper_with(vec![sample(0, 10_000, true)]);
        current.configure_splice_to(&next);
        assert!(!next.is_prepared());
    }
}
