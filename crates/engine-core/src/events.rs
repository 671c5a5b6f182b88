use model::events::SyncEvent;
use tokio::sync::broadcast;
use tracing::debug;

/// Fan-out of completion events to the notification layer.
///
/// Publishing never blocks; with no subscribers the event is dropped, and
/// lagged subscribers lose the oldest events (broadcast semantics).
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        EventBus { sender }
    }

    pub fn publish(&self, event: SyncEvent) {
        match self.sender.send(event) {
            Ok(n) => debug!(subscribers = n, "published sync event"),
            Err(_) => debug!("no subscribers for sync event"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        bus.publish(SyncEvent::Completed {
            dataset_id: "ds-1".into(),
            job_id: "job-1".into(),
            rows: 3,
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.dataset_id(), "ds-1");
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_noop() {
        let bus = EventBus::new(8);
        bus.publish(SyncEvent::Failed {
            dataset_id: "ds-1".into(),
            job_id: "job-1".into(),
            error: "boom".into(),
        });
    }
}
