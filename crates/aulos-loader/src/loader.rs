use std::sync::Arc;

use tracing::{trace, warn};

use crate::loadable::{LoadError, Loadable};

/// Terminal outcome of one load.
#[derive(Clone, Debug)]
pub enum LoadOutcome {
    Completed,
    Canceled,
    Error(LoadError),
}

/// A polled load result: the loadable it belongs to plus its outcome.
pub struct LoadEvent {
    pub loadable: Arc<dyn Loadable>,
    pub outcome: LoadOutcome,
}

struct ThreadResult {
    generation: u64,
    outcome: LoadOutcome,
}

struct CurrentLoad {
    loadable: Arc<dyn Loadable>,
    generation: u64,
    canceled: bool,
}

/// Runs one [`Loadable`] at a time on a background worker thread.
///
/// The worker posts its terminal outcome onto an internal channel; the
/// owning thread collects it with [`Loader::poll`]. A load counts as in
/// flight until its outcome has been polled, so callers observe the same
/// ordering they would with inline callbacks.
pub struct Loader {
    name: String,
    tx: kanal::Sender<ThreadResult>,
    rx: kanal::Receiver<ThreadResult>,
    current: Option<CurrentLoad>,
    generation: u64,
    released: bool,
}

impl Loader {
    /// Create a loader. `name` prefixes the worker thread names.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let (tx, rx) = kanal::unbounded();
        Self {
            name: name.into(),
            tx,
            rx,
            current: None,
            generation: 0,
            released: false,
        }
    }

    /// Whether a load is in flight (its outcome has not been polled yet).
    pub fn is_loading(&self) -> bool {
        self.current.is_some()
    }

    /// Start loading. Panics if a load is already in flight or the loader
    /// has been released.
    pub fn start_loading(&mut self, loadable: Arc<dyn Loadable>) {
        assert!(!self.released, "loader already released");
        assert!(!self.is_loading(), "load already in flight");

        self.generation += 1;
        let generation = self.generation;
        self.current = Some(CurrentLoad {
            loadable: Arc::clone(&loadable),
            generation,
            canceled: false,
        });

        let tx = self.tx.clone();
        let thread_name = format!("{}-{}", self.name, generation);
        trace!(thread = %thread_name, "loader: starting load");
        std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                let result = loadable.load();
                let outcome = if loadable.is_load_canceled() {
                    LoadOutcome::Canceled
                } else {
                    match result {
                        Ok(()) => LoadOutcome::Completed,
                        Err(e) => LoadOutcome::Error(e),
                    }
                };
                // The receiver may be gone after release; nothing to do then.
                let _ = tx.send(ThreadResult {
                    generation,
                    outcome,
                });
            })
            .expect("failed to spawn loader thread");
    }

    /// Request cooperative cancellation of the in-flight load, if any.
    ///
    /// The load stays in flight until its (canceled) outcome is polled.
    pub fn cancel_loading(&mut self) {
        if let Some(current) = &mut self.current {
            trace!(generation = current.generation, "loader: cancel requested");
            current.canceled = true;
            current.loadable.cancel_load();
        }
    }

    /// Collect the outcome of the in-flight load, if it has finished.
    ///
    /// Clears the in-flight state when an outcome is returned. Outcomes from
    /// superseded or released loads are discarded.
    pub fn poll(&mut self) -> Option<LoadEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(Some(result)) => {
                    let matches = self
                        .current
                        .as_ref()
                        .is_some_and(|c| c.generation == result.generation);
                    if !matches {
                        trace!(
                            generation = result.generation,
                            "loader: discarding stale outcome"
                        );
                        continue;
                    }
                    if let Some(current) = self.current.take() {
                        let outcome = if current.canceled {
                            LoadOutcome::Canceled
                        } else {
                            result.outcome
                        };
                        return Some(LoadEvent {
                            loadable: current.loadable,
                            outcome,
                        });
                    }
                }
                Ok(None) => return None,
                Err(_) => {
                    warn!("loader: result channel closed");
                    return None;
                }
            }
        }
    }

    /// Cancel any in-flight load and stop accepting new ones.
    ///
    /// The outcome of an in-flight load is swallowed: subsequent polls
    /// return `None`. Idempotent.
    pub fn release(&mut self) {
        self.cancel_loading();
        self.current = None;
        self.released = true;
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            mpsc, Arc, Mutex,
        },
        time::{Duration, Instant},
    };

    use super::*;

    /// A loadable that blocks until told to finish, with an optional failure.
    struct GatedLoadable {
        gate: Mutex<mpsc::Receiver<Result<(), LoadError>>>,
        canceled: AtomicBool,
    }

    impl GatedLoadable {
        fn new() -> (Arc<Self>, mpsc::Sender<Result<(), LoadError>>) {
            let (tx, rx) = mpsc::channel();
            let loadable = Arc::new(Self {
                gate: Mutex::new(rx),
                canceled: AtomicBool::new(false),
            });
            (loadable, tx)
        }
    }

    impl Loadable for GatedLoadable {
        fn load(&self) -> Result<(), LoadError> {
            let gate = self.gate.lock().unwrap();
            loop {
                if self.is_load_canceled() {
                    return Ok(());
                }
                match gate.recv_timeout(Duration::from_millis(1)) {
                    Ok(result) => return result,
                    Err(mpsc::RecvTimeoutError::Timeout) => continue,
                    Err(mpsc::RecvTimeoutError::Disconnected) => return Ok(()),
                }
            }
        }

        fn cancel_load(&self) {
            self.canceled.store(true, Ordering::SeqCst);
        }

        fn is_load_canceled(&self) -> bool {
            self.canceled.load(Ordering::SeqCst)
        }
    }

    fn poll_until_event(loader: &mut Loader) -> LoadEvent {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(event) = loader.poll() {
                return event;
            }
            assert!(Instant::now() < deadline, "timed out waiting for loader");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn completed_load_reports_once() {
        let mut loader = Loader::new("test-loader");
        let (loadable, gate) = GatedLoadable::new();

        loader.start_loading(loadable.clone());
        assert!(loader.is_loading());

        gate.send(Ok(())).unwrap();
        let event = poll_until_event(&mut loader);
        assert!(matches!(event.outcome, LoadOutcome::Completed));
        assert!(!loader.is_loading());
        assert!(loader.poll().is_none());
    }

    #[test]
    fn is_loading_until_polled() {
        let mut loader = Loader::new("test-loader");
        let (loadable, gate) = GatedLoadable::new();

        loader.start_loading(loadable);
        gate.send(Ok(())).unwrap();

        // Give the worker time to finish; the load is still "in flight"
        // because nobody polled.
        std::thread::sleep(Duration::from_millis(20));
        assert!(loader.is_loading());

        poll_until_event(&mut loader);
        assert!(!loader.is_loading());
    }

    #[test]
    fn error_outcome_carries_the_error() {
        let mut loader = Loader::new("test-loader");
        let (loadable, gate) = GatedLoadable::new();

        loader.start_loading(loadable);
        gate.send(Err(LoadError::Io("connection reset".into())))
            .unwrap();

        let event = poll_until_event(&mut loader);
        match event.outcome {
            LoadOutcome::Error(LoadError::Io(message)) => {
                assert_eq!(message, "connection reset");
            }
            other => panic!("expected Io error, got {other:?}"),
        }
    }

    #[test]
    fn cancel_wins_over_completion() {
        let mut loader = Loader::new("test-loader");
        let (loadable, gate) = GatedLoadable::new();

        loader.start_loading(loadable);
        loader.cancel_loading();
        // Even if the load also "finishes", the outcome is Canceled.
        let _ = gate.send(Ok(()));

        let event = poll_until_event(&mut loader);
        assert!(matches!(event.outcome, LoadOutcome::Canceled));
    }

    #[test]
    fn release_swallows_in_flight_outcome() {
        let mut loader = Loader::new("test-loader");
        let (loadable, gate) = GatedLoadable::new();

        loader.start_loading(loadable);
        loader.release();
        let _ = gate.send(Ok(()));

        std::thread::sleep(Duration::from_millis(20));
        assert!(loader.poll().is_none());
        assert!(!loader.is_loading());

        // Idempotent.
        loader.release();
    }

    #[test]
    #[should_panic(expected = "load already in flight")]
    fn second_start_while_loading_panics() {
        let mut loader = Loader::new("test-loader");
        let (first, _gate) = GatedLoadable::new();
        let (second, _gate2) = GatedLoadable::new();

        loader.start_loading(first);
        loader.start_loading(second);
    }
}
