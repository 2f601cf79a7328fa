//! Background-load runtime for blocking fetch work.
//!
//! A [`Loader`] runs at most one [`Loadable`] at a time on a dedicated worker
//! thread. The worker never calls back into its owner: the terminal outcome of
//! each load (completed, canceled, errored) is posted onto a channel, and the
//! owning driver thread drains it via [`Loader::poll`]. This keeps all state
//! transitions on one thread and avoids ownership cycles between the loader
//! and the component that drives it.
//!
//! Protocol guarantees:
//! - Outcomes are delivered exactly once, in the order loads were started.
//! - [`Loader::is_loading`] stays `true` until the outcome has been polled.
//! - A load that was canceled reports [`LoadOutcome::Canceled`] no matter how
//!   the worker thread finished.
//! - [`Loader::release`] swallows any in-flight outcome; it is idempotent.

#![forbid(unsafe_code)]

mod loadable;
mod loader;

pub use loadable::{LoadError, Loadable};
pub use loader::{LoadEvent, LoadOutcome, Loader};
