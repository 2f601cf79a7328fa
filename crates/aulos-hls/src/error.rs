use aulos_loader::LoadError;
use thiserror::Error;

/// Sample source errors surfaced to consumers.
///
/// Transient load failures accumulate inside the source and only become a
/// `Load` error once the retry budget is exhausted. `Source` covers
/// playlist-level failures reported by the chunk source while no load is in
/// flight.
#[derive(Clone, Debug, Error)]
pub enum HlsSourceError {
    #[error("load error: {0}")]
    Load(#[from] LoadError),

    #[error("source error: {0}")]
    Source(String),
}

pub type HlsResult<T> = Result<T, HlsSourceError>;
