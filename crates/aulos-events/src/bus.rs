use tokio::sync::broadcast;

/// Fan-out bus for a single event type.
///
/// Every component receives a cloned `EventBus` and publishes events
/// directly. Subscribers receive all events from all publishers.
///
/// `publish()` is a sync call — works from both async tasks and blocking
/// threads. If there are no subscribers, events are silently dropped.
#[derive(Debug)]
pub struct EventBus<E> {
    tx: broadcast::Sender<E>,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<E: Clone + Send + 'static> EventBus<E> {
    /// Create a new event bus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event to all subscribers.
    ///
    /// Accepts any type that converts `Into<E>`, so sub-enum values can be
    /// passed directly. This is a sync call (no `.await`); safe from
    /// blocking threads.
    pub fn publish<T: Into<E>>(&self, event: T) {
        let _ = self.tx.send(event.into());
    }

    /// Subscribe to all future events.
    ///
    /// Each subscriber gets an independent receiver. Slow subscribers
    /// receive `RecvError::Lagged(n)` instead of blocking publishers.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    enum TestEvent {
        Progress(u64),
        Done,
    }

    #[test]
    fn publish_without_subscribers_does_not_panic() {
        let bus = EventBus::<TestEvent>::new(16);
        bus.publish(TestEvent::Done);
    }

    #[tokio::test]
    async fn publish_and_subscribe() {
        let bus = EventBus::<TestEvent>::new(16);
        let mut rx = bus.subscribe();
        bus.publish(TestEvent::Progress(42));
        assert_eq!(rx.recv().await.unwrap(), TestEvent::Progress(42));
    }

    #[tokio::test]
    async fn multiple_subscribers_each_receive() {
        let bus = EventBus::<TestEvent>::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        bus.publish(TestEvent::Done);
        assert_eq!(rx1.recv().await.unwrap(), TestEvent::Done);
        assert_eq!(rx2.recv().await.unwrap(), TestEvent::Done);
    }

    #[tokio::test]
    async fn lagged_subscriber_gets_error() {
        let bus = EventBus::<TestEvent>::new(2);
        let mut rx = bus.subscribe();
        for i in 0..10 {
            bus.publish(TestEvent::Progress(i));
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
    }

    #[test]
    fn clone_shares_channel() {
        let bus1 = EventBus::<TestEvent>::new(16);
        let bus2 = bus1.clone();
        let mut rx = bus1.subscribe();
        bus2.publish(TestEvent::Done);
        assert!(rx.try_recv().is_ok());
    }
}
