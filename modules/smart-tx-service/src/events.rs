//! Engine notifications.
//!
//! Subscribers receive every event or only those of one uuid; the per-uuid
//! waits back the `/rpc/transactions/wait` route.

use dashmap::DashMap;
use smart_tx_types::SmartTransaction;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Per-subscriber channel depth
const SUBSCRIBER_BUFFER: usize = 256;

/// Notifications produced by the reconciliation engine
#[derive(Debug, Clone, PartialEq)]
pub enum SmartTxEvent {
    /// An existing record was updated; carries the record as stored
    StatusChanged(SmartTransaction),
    /// A confirmation attempt finished, successful or not
    ConfirmationFinished(SmartTransaction),
}

impl SmartTxEvent {
    pub fn record(&self) -> &SmartTransaction {
        match self {
            SmartTxEvent::StatusChanged(r) | SmartTxEvent::ConfirmationFinished(r) => r,
        }
    }

    pub fn uuid(&self) -> &str {
        &self.record().uuid
    }

    pub fn name(&self) -> &'static str {
        match self {
            SmartTxEvent::StatusChanged(_) => "smart_transaction.status_changed",
            SmartTxEvent::ConfirmationFinished(_) => "smart_transaction.confirmation_finished",
        }
    }
}

struct Subscriber {
    /// Only deliver events for this uuid when set
    uuid: Option<String>,
    sender: mpsc::Sender<SmartTxEvent>,
}

/// Fans engine notifications out to subscribers.
///
/// Delivery never blocks the reconciler: a full subscriber misses the event,
/// a closed one is dropped.
pub struct EventBroadcaster {
    subscribers: DashMap<String, Subscriber>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self {
            subscribers: DashMap::new(),
        }
    }

    /// Subscribe to every event. Returns (subscriber_id, receiver).
    pub fn subscribe(&self) -> (String, mpsc::Receiver<SmartTxEvent>) {
        self.add_subscriber(None)
    }

    /// Subscribe to events of one uuid only.
    pub fn subscribe_uuid(&self, uuid: &str) -> (String, mpsc::Receiver<SmartTxEvent>) {
        self.add_subscriber(Some(uuid.to_string()))
    }

    fn add_subscriber(&self, uuid: Option<String>) -> (String, mpsc::Receiver<SmartTxEvent>) {
        let subscriber_id = Uuid::new_v4().to_string();
        let (sender, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        log::debug!(
            "[STX_EVENTS] Subscriber {} added (uuid filter: {:?})",
            subscriber_id,
            uuid
        );
        self.subscribers
            .insert(subscriber_id.clone(), Subscriber { uuid, sender });
        (subscriber_id, rx)
    }

    pub fn unsubscribe(&self, subscriber_id: &str) {
        self.subscribers.remove(subscriber_id);
        log::debug!("[STX_EVENTS] Subscriber {} removed", subscriber_id);
    }

    pub fn broadcast(&self, event: SmartTxEvent) {
        let mut closed = Vec::new();

        for entry in self.subscribers.iter() {
            let subscriber = entry.value();
            if subscriber.uuid.as_deref().is_some_and(|u| u != event.uuid()) {
                continue;
            }
            match subscriber.sender.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    log::warn!(
                        "[STX_EVENTS] Channel full for subscriber {}, dropping '{}' for {}",
                        entry.key(),
                        event.name(),
                        event.uuid()
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(entry.key().clone()),
            }
        }

        for subscriber_id in closed {
            self.subscribers.remove(&subscriber_id);
            log::debug!("[STX_EVENTS] Removed closed subscriber {}", subscriber_id);
        }
    }

    pub fn client_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Wait for the next status change of `uuid`, up to `timeout`.
    pub async fn wait_for_status_change(
        &self,
        uuid: &str,
        timeout: Duration,
    ) -> Option<SmartTransaction> {
        self.wait_for(uuid, timeout, |e| matches!(e, SmartTxEvent::StatusChanged(_)))
            .await
    }

    /// Wait until a confirmation attempt for `uuid` finishes, up to `timeout`.
    pub async fn wait_for_confirmation(
        &self,
        uuid: &str,
        timeout: Duration,
    ) -> Option<SmartTransaction> {
        self.wait_for(uuid, timeout, |e| {
            matches!(e, SmartTxEvent::ConfirmationFinished(_))
        })
        .await
    }

    async fn wait_for<F>(&self, uuid: &str, timeout: Duration, wanted: F) -> Option<SmartTransaction>
    where
        F: Fn(&SmartTxEvent) -> bool,
    {
        let (subscriber_id, mut rx) = self.subscribe_uuid(uuid);
        let result = tokio::time::timeout(timeout, async {
            while let Some(event) = rx.recv().await {
                if wanted(&event) {
                    return Some(event.record().clone());
                }
            }
            None
        })
        .await
        .ok()
        .flatten();
        self.unsubscribe(&subscriber_id);
        result
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn record(uuid: &str) -> SmartTransaction {
        SmartTransaction {
            uuid: uuid.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_uuid_filter() {
        let events = EventBroadcaster::new();
        let (_, mut all) = events.subscribe();
        let (_, mut only_b) = events.subscribe_uuid("b");

        events.broadcast(SmartTxEvent::StatusChanged(record("a")));
        events.broadcast(SmartTxEvent::StatusChanged(record("b")));

        assert_eq!(all.recv().await.unwrap().uuid(), "a");
        assert_eq!(all.recv().await.unwrap().uuid(), "b");
        assert_eq!(only_b.recv().await.unwrap().uuid(), "b");
        assert!(only_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_subscribers_are_removed() {
        let events = EventBroadcaster::new();
        let (_, rx) = events.subscribe();
        drop(rx);
        assert_eq!(events.client_count(), 1);
        events.broadcast(SmartTxEvent::StatusChanged(record("a")));
        assert_eq!(events.client_count(), 0);
    }

    #[tokio::test]
    async fn test_wait_for_confirmation_ignores_status_changes() {
        let events = Arc::new(EventBroadcaster::new());
        let waiter = {
            let events = events.clone();
            tokio::spawn(async move {
                events
                    .wait_for_confirmation("a", Duration::from_secs(5))
                    .await
            })
        };
        while events.client_count() == 0 {
            tokio::task::yield_now().await;
        }

        events.broadcast(SmartTxEvent::StatusChanged(record("a")));
        let mut confirmed = record("a");
        confirmed.confirmed = true;
        events.broadcast(SmartTxEvent::ConfirmationFinished(confirmed));

        let result = waiter.await.unwrap().unwrap();
        assert!(result.confirmed);
        assert_eq!(events.client_count(), 0);
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let events = EventBroadcaster::new();
        let result = events
            .wait_for_status_change("a", Duration::from_millis(20))
            .await;
        assert!(result.is_none());
        assert_eq!(events.client_count(), 0);
    }
}
