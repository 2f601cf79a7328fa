//! Broadcast event bus for playback notifications.
//!
//! Notifications are fire-and-forget: publishers never block and never learn
//! whether anyone listened. Payloads must be value types (`Clone`) so that no
//! subscriber can reach back into publisher state.

#![forbid(unsafe_code)]

mod bus;

pub use bus::EventBus;
