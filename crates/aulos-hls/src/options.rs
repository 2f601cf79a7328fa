use crate::load_control::SourceId;

/// Default number of consecutive failures tolerated before a load error is
/// surfaced to the consumer.
pub const DEFAULT_MIN_LOADABLE_RETRY_COUNT: u32 = 3;

/// Default contribution of one source to the shared buffer budget.
pub const DEFAULT_BUFFER_SIZE_CONTRIBUTION: usize = 16 * 1024 * 1024;

/// Configuration for one sample source.
#[derive(Clone, Debug)]
pub struct HlsSourceOptions {
    /// Identifier carried on every event this source publishes.
    pub source_id: SourceId,
    /// Failures beyond this count make `maybe_throw_error` surface the error.
    pub min_loadable_retry_count: u32,
    /// Bytes this source contributes to the load control's budget.
    pub buffer_size_contribution: usize,
}

impl Default for HlsSourceOptions {
    fn default() -> Self {
        Self {
            source_id: SourceId(0),
            min_loadable_retry_count: DEFAULT_MIN_LOADABLE_RETRY_COUNT,
            buffer_size_contribution: DEFAULT_BUFFER_SIZE_CONTRIBUTION,
        }
    }
}

impl HlsSourceOptions {
    pub fn with_source_id(mut self, source_id: SourceId) -> Self {
        self.source_id = source_id;
        self
    }

    pub fn with_min_loadable_retry_count(mut self, count: u32) -> Self {
        self.min_loadable_retry_count = count;
        self
    }

    pub fn with_buffer_size_contribution(mut self, bytes: usize) -> Self {
        self.buffer_size_contribution = bytes;
        self
    }
}
