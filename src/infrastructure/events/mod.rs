use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 1024;

/// Named lifecycle notification carried on an [`EventBus`].
pub trait NamedEvent: Clone + Send + 'static {
    fn name(&self) -> &'static str;
}

/// Fan-out publish/subscribe channel. Publishing never blocks; subscribers
/// that fall behind by more than the capacity observe a lag error.
#[derive(Clone)]
pub struct EventBus<E: NamedEvent> {
    sender: broadcast::Sender<E>,
}

impl<E: NamedEvent> Default for EventBus<E> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl<E: NamedEvent> EventBus<E> {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: E) {
        let name = event.name();
        match self.sender.send(event) {
            Ok(receivers) => log::trace!("Published {name} to {receivers} subscriber(s)"),
            Err(_) => log::trace!("Published {name} with no subscribers"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Ping(u32);

    impl NamedEvent for Ping {
        fn name(&self) -> &'static str {
            "ping"
        }
    }

    #[tokio::test]
    async fn subscribers_receive_events_in_order() {
        let bus = EventBus::<Ping>::default();
        let mut rx = bus.subscribe();
        bus.publish(Ping(1));
        bus.publish(Ping(2));
        assert_eq!(rx.recv().await.unwrap(), Ping(1));
        assert_eq!(rx.recv().await.unwrap(), Ping(2));
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let bus = EventBus::<Ping>::new(4);
        bus.publish(Ping(1));
        assert_eq!(bus.subscriber_count(), 0);
    }
}
