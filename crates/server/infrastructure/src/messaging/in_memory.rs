//! In-process event bus for local runs and tests.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

use labops_server_domain::event_bus::{EventBus, EventBusError};
use labops_server_domain::events::DomainEvent;

/// EventBus over a tokio broadcast channel. Subscribers see events
/// published after they subscribed; publishing without subscribers is
/// not an error.
pub struct InMemoryEventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl InMemoryEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// `topic` matches a subject exactly, or as a prefix when it ends with
/// the NATS-style `>` wildcard.
fn topic_matches(topic: &str, subject: &str) -> bool {
    match topic.strip_suffix('>') {
        Some(prefix) => subject.starts_with(prefix),
        None => topic == subject,
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, event: &DomainEvent) -> Result<(), EventBusError> {
        // A send error only means nobody is listening right now.
        let _ = self.sender.send(event.clone());
        debug!(subject = event.subject(), "Event published in-process");
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
    ) -> Result<BoxStream<'static, Result<DomainEvent, EventBusError>>, EventBusError> {
        let topic = topic.to_string();
        let stream = BroadcastStream::new(self.sender.subscribe())
            .filter_map(move |item| {
                let topic = topic.clone();
                async move {
                    match item {
                        Ok(event) if topic_matches(&topic, event.subject()) => Some(Ok(event)),
                        Ok(_) => None,
                        Err(e) => Some(Err(EventBusError::SubscribeError(e.to_string()))),
                    }
                }
            })
            .boxed();
        Ok(stream)
    }
}
