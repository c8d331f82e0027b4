//! Notification polling
//!
//! Turns follow and like notifications into member events so new followers
//! get a fortune without waiting for the next day boundary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::bsky::{BskyClient, Notification};
use crate::error::Result;
use crate::orchestrator::event_bus::{EventBus, MemberEvent};

const NOTIFICATION_PAGE_LIMIT: u32 = 50;

#[async_trait]
pub trait NotificationSource: Send + Sync {
    async fn recent_notifications(&self, limit: u32) -> Result<Vec<Notification>>;
}

#[async_trait]
impl NotificationSource for BskyClient {
    async fn recent_notifications(&self, limit: u32) -> Result<Vec<Notification>> {
        self.list_notifications(limit).await
    }
}

pub struct NotificationPoller {
    source: Arc<dyn NotificationSource>,
    bus: Arc<EventBus>,
    last_seen: DateTime<Utc>,
}

impl NotificationPoller {
    /// Notifications indexed at or before `since` are treated as seen.
    pub fn new(source: Arc<dyn NotificationSource>, bus: Arc<EventBus>, since: DateTime<Utc>) -> Self {
        Self { source, bus, last_seen: since }
    }

    pub fn last_seen(&self) -> DateTime<Utc> {
        self.last_seen
    }

    /// Fetch once and publish events for unseen follows and likes.
    pub async fn poll_once(&mut self) -> Result<usize> {
        let notifications = self.source.recent_notifications(NOTIFICATION_PAGE_LIMIT).await?;
        let mut fresh: Vec<(DateTime<Utc>, MemberEvent)> = Vec::new();

        for n in notifications {
            let Ok(indexed_at) = DateTime::parse_from_rfc3339(&n.indexed_at) else {
                debug!(indexed_at = %n.indexed_at, "Skipping notification with bad timestamp");
                continue;
            };
            let indexed_at = indexed_at.with_timezone(&Utc);
            if indexed_at <= self.last_seen {
                continue;
            }
            let event = match n.reason.as_str() {
                "follow" => MemberEvent::NewMember(n.author.did),
                "like" => MemberEvent::Engagement(n.author.did),
                _ => continue,
            };
            fresh.push((indexed_at, event));
        }

        // Oldest first, so events arrive in the order they happened.
        fresh.sort_by_key(|(at, _)| *at);
        let count = fresh.len();
        for (at, event) in fresh {
            self.last_seen = self.last_seen.max(at);
            self.bus.publish(event);
        }
        Ok(count)
    }

    pub async fn run(mut self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        warn!("Notification poll failed: {}", e);
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        debug!("Notification poller stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::bsky::NotificationAuthor;
    use std::sync::Mutex;

    struct FixedSource(Mutex<Vec<Notification>>);

    #[async_trait]
    impl NotificationSource for FixedSource {
        async fn recent_notifications(&self, _limit: u32) -> Result<Vec<Notification>> {
            Ok(self.0.lock().unwrap().clone())
        }
    }

    fn notification(reason: &str, did: &str, at: &str) -> Notification {
        Notification {
            reason: reason.to_string(),
            author: NotificationAuthor { did: did.to_string() },
            indexed_at: at.to_string(),
        }
    }

    #[tokio::test]
    async fn test_emits_unseen_follows_and_likes_once() {
        let source = Arc::new(FixedSource(Mutex::new(vec![
            notification("like", "did:plc:b", "2024-01-01T00:00:02.000Z"),
            notification("follow", "did:plc:a", "2024-01-01T00:00:01.000Z"),
            notification("reply", "did:plc:c", "2024-01-01T00:00:03.000Z"),
            notification("follow", "did:plc:old", "2023-12-31T23:59:59.000Z"),
        ])));
        let bus = Arc::new(EventBus::new());
        let mut sub = bus.subscribe();
        let since = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap().with_timezone(&Utc);
        let mut poller = NotificationPoller::new(source, bus.clone(), since);

        assert_eq!(poller.poll_once().await.unwrap(), 2);
        assert_eq!(sub.recv().await, Some(MemberEvent::NewMember("did:plc:a".into())));
        assert_eq!(sub.recv().await, Some(MemberEvent::Engagement("did:plc:b".into())));

        // Same page again: nothing new.
        assert_eq!(poller.poll_once().await.unwrap(), 0);
    }
}
