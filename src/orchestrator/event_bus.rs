//! Member event bus
//!
//! Asynchronous pub/sub for membership notifications. Subscribers hold an
//! explicit `Subscription` and release it with `unsubscribe`.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::fortune::Identity;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum MemberEvent {
    /// Someone started following the labeler
    NewMember(Identity),
    /// Someone interacted with the labeler (a like)
    Engagement(Identity),
}

impl MemberEvent {
    pub fn identity(&self) -> &str {
        match self {
            MemberEvent::NewMember(id) | MemberEvent::Engagement(id) => id,
        }
    }
}

pub struct EventBus {
    tx: broadcast::Sender<MemberEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self { tx }
    }

    /// Publish an event to all subscribers; returns how many received it.
    pub fn publish(&self, event: MemberEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription { rx: self.tx.subscribe() }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A live registration on the bus.
pub struct Subscription {
    rx: broadcast::Receiver<MemberEvent>,
}

impl Subscription {
    /// Next event, or `None` once the bus is gone. Lagged events are skipped.
    pub async fn recv(&mut self) -> Option<MemberEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Event subscriber lagged, dropping events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn unsubscribe(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_and_unsubscribe() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        assert_eq!(bus.publish(MemberEvent::NewMember("did:plc:a".into())), 1);
        assert_eq!(sub.recv().await, Some(MemberEvent::NewMember("did:plc:a".into())));

        sub.unsubscribe();
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.publish(MemberEvent::Engagement("did:plc:b".into())), 0);
    }

    #[tokio::test]
    async fn test_closed_bus_ends_subscription() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();
        drop(bus);
        assert_eq!(sub.recv().await, None);
    }
}
