#![allow(dead_code)]

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use aulos_events::EventBus;
use aulos_hls::fixture::{FakeChunkSource, ManualClock, ScriptedSample};
use aulos_hls::{
    Clock, DefaultLoadControl, HlsSampleSource, HlsSourceOptions, LoadControl, MediaFormat,
    ReadData, Sample, SourceEvent, TrackStream, VariantFormat,
};
use aulos_pool::Allocator;
use tokio::sync::broadcast;

pub const READ_TIMEOUT: Duration = Duration::from_secs(5);

pub fn audio_variant(id: &str, bitrate: u32) -> VariantFormat {
    VariantFormat::new(id, "application/x-mpegURL", bitrate)
}

pub fn video_variant(id: &str, bitrate: u32, width: u32, height: u32) -> VariantFormat {
    VariantFormat::new(id, "application/x-mpegURL", bitrate).with_resolution(width, height)
}

/// Key-frame samples for one track at the given timestamps.
pub fn key_samples(track: usize, times_us: &[i64]) -> Vec<ScriptedSample> {
    times_us
        .iter()
        .map(|&time_us| ScriptedSample {
            track,
            time_us,
            key_frame: true,
            payload: vec![0xA5; 16],
        })
        .collect()
}

/// A sample source wired to scripted collaborators, plus captured events.
pub struct Harness {
    pub source: HlsSampleSource,
    pub chunk_source: FakeChunkSource,
    pub clock: Arc<ManualClock>,
    pub control: Arc<DefaultLoadControl>,
    pub allocator: Arc<Allocator>,
    pub seen: Vec<SourceEvent>,
    rx: broadcast::Receiver<SourceEvent>,
}

impl Harness {
    pub fn new(chunk_source: FakeChunkSource) -> Self {
        Self::with_options(chunk_source, HlsSourceOptions::default())
    }

    pub fn with_options(chunk_source: FakeChunkSource, options: HlsSourceOptions) -> Self {
        let allocator = Arc::new(Allocator::new(64, 64 * 1024));
        let control = Arc::new(DefaultLoadControl::new(Arc::clone(&allocator)));
        let clock = Arc::new(ManualClock::new());
        let bus = EventBus::new(1024);
        let rx = bus.subscribe();
        let load_control: Arc<dyn LoadControl> = control.clone();
        let source_clock: Arc<dyn Clock> = clock.clone();
        let source = HlsSampleSource::with_clock(
            Box::new(chunk_source.clone()),
            load_control,
            bus,
            options,
            source_clock,
        );
        Self {
            source,
            chunk_source,
            clock,
            control,
            allocator,
            seen: Vec::new(),
            rx,
        }
    }

    /// Drain published events into `seen`.
    pub fn drain(&mut self) {
        while let Ok(event) = self.rx.try_recv() {
            self.seen.push(event);
        }
    }

    /// One driver-thread turn: fold in loader outcomes and capture events.
    ///
    /// Before the source is prepared this polls `prepare` (the renderer's
    /// driving loop), which also gives backed-off loads a chance to retry.
    pub fn pump(&mut self) {
        if self.source.is_prepared() {
            let _ = self.source.maybe_throw_error();
        } else {
            let _ = self.source.prepare(0);
        }
        self.drain();
    }

    pub fn pump_until(&mut self, mut pred: impl FnMut(&Harness) -> bool, what: &str) {
        let deadline = Instant::now() + READ_TIMEOUT;
        loop {
            self.pump();
            if pred(self) {
                return;
            }
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Poll `prepare` until the source reports ready.
    pub fn prepare_until_ready(&mut self, position_us: i64) {
        let deadline = Instant::now() + READ_TIMEOUT;
        loop {
            if self.source.prepare(position_us).expect("prepare failed") {
                self.drain();
                return;
            }
            self.drain();
            assert!(Instant::now() < deadline, "timed out preparing source");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    pub fn load_started_count(&self) -> usize {
        self.seen
            .iter()
            .filter(|e| matches!(e, SourceEvent::LoadStarted { .. }))
            .count()
    }

    pub fn load_error_count(&self) -> usize {
        self.seen
            .iter()
            .filter(|e| matches!(e, SourceEvent::LoadError { .. }))
            .count()
    }

    pub fn load_canceled_count(&self) -> usize {
        self.seen
            .iter()
            .filter(|e| matches!(e, SourceEvent::LoadCanceled { .. }))
            .count()
    }

    pub fn downstream_formats(&self) -> Vec<VariantFormat> {
        self.seen
            .iter()
            .filter_map(|e| match e {
                SourceEvent::DownstreamFormatChanged { format, .. } => Some(format.clone()),
                _ => None,
            })
            .collect()
    }
}

/// Read a stream to exhaustion, pumping the source while nothing is ready.
pub fn read_to_end(h: &mut Harness, stream: &TrackStream) -> (Vec<MediaFormat>, Vec<Sample>) {
    let deadline = Instant::now() + READ_TIMEOUT;
    let mut formats = Vec::new();
    let mut samples: Vec<Sample> = Vec::new();
    loop {
        match stream.read_data() {
            ReadData::Format(format) => formats.push(format),
            ReadData::Sample(sample) => samples.push(sample),
            ReadData::EndOfStream => break,
            ReadData::Nothing => {
                let position = samples.last().map_or(0, |s| s.time_us);
                h.source.continue_buffering(position);
                h.drain();
                assert!(Instant::now() < deadline, "timed out reading stream");
                std::thread::sleep(Duration::from_millis(1));
            }
        }
    }
    h.drain();
    (formats, samples)
}
