//! Buffer-budget control across sample sources.

use std::{collections::HashMap, sync::Arc};

use aulos_pool::Allocator;
use parking_lot::Mutex;
use tracing::debug;

/// Identifies one registered sample source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SourceId(pub u32);

/// Budgets sample memory across sample sources and gates whether the next
/// load may begin.
///
/// The allocator it exposes is the sole backing store for buffered samples;
/// its `allocated_bytes` is the fill signal the budget decisions run on.
pub trait LoadControl: Send + Sync {
    /// Announce a source and its contribution to the shared byte budget.
    fn register(&self, source: SourceId, buffer_contribution: usize);

    /// Remove a source and its contribution.
    fn unregister(&self, source: SourceId);

    /// Report a source's state and learn whether it may start the next load.
    ///
    /// `next_load_position_us` is `None` when the source needs nothing more
    /// (finished, or no tracks enabled).
    fn update(
        &self,
        source: SourceId,
        downstream_position_us: i64,
        next_load_position_us: Option<i64>,
        loading_or_backed_off: bool,
    ) -> bool;

    /// The shared sample allocator.
    fn allocator(&self) -> Arc<Allocator>;

    /// Release recycled allocator capacity back to the heap.
    fn trim_allocator(&self);
}

struct SourceState {
    buffer_contribution: usize,
    next_load_position_us: Option<i64>,
    loading_or_backed_off: bool,
}

struct ControlInner {
    sources: HashMap<SourceId, SourceState>,
    target_bytes: usize,
    filling: bool,
}

/// Watermark-based [`LoadControl`].
///
/// Loads are granted while the allocator sits below the high watermark; once
/// it crosses, loading stops until consumption drains it below the low
/// watermark again. Among sources that still need data, the one with the
/// earliest next load position goes first.
pub struct DefaultLoadControl {
    allocator: Arc<Allocator>,
    inner: Mutex<ControlInner>,
}

const LOW_WATERMARK_FRACTION: usize = 5; // 1/5 of the target
const HIGH_WATERMARK_NUMERATOR: usize = 4; // 4/5 of the target

impl DefaultLoadControl {
    #[must_use]
    pub fn new(allocator: Arc<Allocator>) -> Self {
        Self {
            allocator,
            inner: Mutex::new(ControlInner {
                sources: HashMap::new(),
                target_bytes: 0,
                filling: true,
            }),
        }
    }

    /// Number of currently registered sources.
    pub fn registered_sources(&self) -> usize {
        self.inner.lock().sources.len()
    }
}

impl LoadControl for DefaultLoadControl {
    fn register(&self, source: SourceId, buffer_contribution: usize) {
        let mut inner = self.inner.lock();
        inner.target_bytes += buffer_contribution;
        inner.sources.insert(
            source,
            SourceState {
                buffer_contribution,
                next_load_position_us: None,
                loading_or_backed_off: false,
            },
        );
        debug!(
            source = source.0,
            target_bytes = inner.target_bytes,
            "load_control: register"
        );
    }

    fn unregister(&self, source: SourceId) {
        let mut inner = self.inner.lock();
        if let Some(state) = inner.sources.remove(&source) {
            inner.target_bytes = inner.target_bytes.saturating_sub(state.buffer_contribution);
        }
        debug!(
            source = source.0,
            target_bytes = inner.target_bytes,
            "load_control: unregister"
        );
    }

    fn update(
        &self,
        source: SourceId,
        _downstream_position_us: i64,
        next_load_position_us: Option<i64>,
        loading_or_backed_off: bool,
    ) -> bool {
        let mut inner = self.inner.lock();
        if let Some(state) = inner.sources.get_mut(&source) {
            state.next_load_position_us = next_load_position_us;
            state.loading_or_backed_off = loading_or_backed_off;
        }

        let allocated = usize::try_from(self.allocator.allocated_bytes()).unwrap_or(usize::MAX);
        let low = inner.target_bytes / LOW_WATERMARK_FRACTION;
        let high = inner.target_bytes * HIGH_WATERMARK_NUMERATOR / LOW_WATERMARK_FRACTION;
        if allocated >= high {
            inner.filling = false;
        } else if allocated <= low {
            inner.filling = true;
        }

        let next = inner
            .sources
            .iter()
            .filter_map(|(id, state)| state.next_load_position_us.map(|p| (p, *id)))
            .min_by_key(|(position, _)| *position)
            .map(|(_, id)| id);

        inner.filling && next == Some(source)
    }

    fn allocator(&self) -> Arc<Allocator> {
        Arc::clone(&self.allocator)
    }

    fn trim_allocator(&self) {
        self.allocator.trim();
    }
}
