use thiserror::Error;

/// Terminal failure of a single load attempt.
///
/// Cancellation is not an error; canceled loads surface through
/// [`crate::LoadOutcome::Canceled`] instead. The payloads are owned strings
/// so errors can be cloned into retry bookkeeping and event payloads.
#[derive(Clone, Debug, Error)]
pub enum LoadError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("parse error: {0}")]
    Parse(String),
}

/// A unit of blocking fetch work.
///
/// `load` runs on the loader's worker thread and must check
/// [`Loadable::is_load_canceled`] between units of work so that cancellation
/// takes effect promptly. Implementations are shared between the driver
/// thread (bookkeeping) and the worker thread (loading), so all mutability
/// is interior.
pub trait Loadable: Send + Sync + 'static {
    /// Perform the load. Blocking; returns when done, failed, or canceled.
    fn load(&self) -> Result<(), LoadError>;

    /// Request cooperative cancellation.
    fn cancel_load(&self);

    /// Whether cancellation has been requested.
    fn is_load_canceled(&self) -> bool;
}
