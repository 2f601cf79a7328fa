//! Progress events published by the sample source.
//!
//! Events are fire-and-forget value types: every payload is cloned onto the
//! bus and carries no handle back into source state. Media times are reported
//! in milliseconds.

use aulos_events::EventBus;
use aulos_loader::LoadError;

use crate::chunk::{ChunkKind, Trigger};
use crate::format::VariantFormat;
use crate::load_control::SourceId;

/// Notifications published during loading and playback.
#[derive(Clone, Debug)]
pub enum SourceEvent {
    /// A chunk load was dispatched.
    LoadStarted {
        source_id: SourceId,
        /// Declared byte length, when known.
        length: Option<u64>,
        kind: ChunkKind,
        trigger: Trigger,
        format: VariantFormat,
        /// Media time range for segment chunks; `None` for side data.
        media_start_ms: Option<i64>,
        media_end_ms: Option<i64>,
    },
    /// A chunk load finished.
    LoadCompleted {
        source_id: SourceId,
        bytes_loaded: u64,
        kind: ChunkKind,
        trigger: Trigger,
        format: VariantFormat,
        media_start_ms: Option<i64>,
        media_end_ms: Option<i64>,
        elapsed_ms: u64,
        load_duration_ms: u64,
    },
    /// An in-flight load was canceled.
    LoadCanceled {
        source_id: SourceId,
        bytes_loaded: u64,
    },
    /// A load attempt failed.
    LoadError {
        source_id: SourceId,
        error: String,
    },
    /// The variant feeding the downstream consumers changed.
    DownstreamFormatChanged {
        source_id: SourceId,
        format: VariantFormat,
        trigger: Trigger,
        position_ms: i64,
    },
}

fn us_to_ms(time_us: i64) -> i64 {
    time_us / 1_000
}

/// Publishes [`SourceEvent`]s for one source.
pub(crate) struct EventSink {
    bus: EventBus<SourceEvent>,
    source_id: SourceId,
}

impl EventSink {
    pub(crate) fn new(bus: EventBus<SourceEvent>, source_id: SourceId) -> Self {
        Self { bus, source_id }
    }

    pub(crate) fn notify_load_started(
        &self,
        length: Option<u64>,
        kind: ChunkKind,
        trigger: Trigger,
        format: &VariantFormat,
        media_range_us: Option<(i64, i64)>,
    ) {
        self.bus.publish(SourceEvent::LoadStarted {
            source_id: self.source_id,
            length,
            kind,
            trigger,
            format: format.clone(),
            media_start_ms: media_range_us.map(|(start, _)| us_to_ms(start)),
            media_end_ms: media_range_us.map(|(_, end)| us_to_ms(end)),
        });
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn notify_load_completed(
        &self,
        bytes_loaded: u64,
        kind: ChunkKind,
        trigger: Trigger,
        format: &VariantFormat,
        media_range_us: Option<(i64, i64)>,
        elapsed_ms: u64,
        load_duration_ms: u64,
    ) {
        self.bus.publish(SourceEvent::LoadCompleted {
            source_id: self.source_id,
            bytes_loaded,
            kind,
            trigger,
            format: format.clone(),
            media_start_ms: media_range_us.map(|(start, _)| us_to_ms(start)),
            media_end_ms: media_range_us.map(|(_, end)| us_to_ms(end)),
            elapsed_ms,
            load_duration_ms,
        });
    }

    pub(crate) fn notify_load_canceled(&self, bytes_loaded: u64) {
        self.bus.publish(SourceEvent::LoadCanceled {
            source_id: self.source_id,
            bytes_loaded,
        });
    }

    pub(crate) fn notify_load_error(&self, error: &LoadError) {
        self.bus.publish(SourceEvent::LoadError {
            source_id: self.source_id,
            error: error.to_string(),
        });
    }

    pub(crate) fn notify_downstream_format_changed(
        &self,
        format: &VariantFormat,
        trigger: Trigger,
        position_us: i64,
    ) {
        self.bus.publish(SourceEvent::DownstreamFormatChanged {
            source_id: self.source_id,
            format: format.clone(),
            trigger,
            position_ms: us_to_ms(position_us),
        });
    }
}
