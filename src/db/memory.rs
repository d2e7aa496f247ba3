use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::EventStore;
use crate::models::{NewSubscription, NewWhaleEvent, NotificationSubscription, WhaleEvent};

/// Process-local event store with the same semantics as the Postgres one.
/// Used by tests and for running without a database.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    events: Vec<WhaleEvent>,
    by_hash: HashMap<String, usize>,
    subscriptions: Vec<NotificationSubscription>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock cannot leave Inner half-written.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn event_by_hash(&self, hash: &str) -> Option<WhaleEvent> {
        let inner = self.lock();
        inner.by_hash.get(hash).map(|&i| inner.events[i].clone())
    }

    pub fn event_count(&self) -> usize {
        self.lock().events.len()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn insert_event_if_absent(
        &self,
        event: &NewWhaleEvent,
    ) -> anyhow::Result<Option<WhaleEvent>> {
        let mut inner = self.lock();
        if inner.by_hash.contains_key(&event.transaction_hash) {
            return Ok(None);
        }

        let row = event.clone().into_event(Uuid::new_v4(), Utc::now());
        let idx = inner.events.len();
        inner.by_hash.insert(row.transaction_hash.clone(), idx);
        inner.events.push(row.clone());
        Ok(Some(row))
    }

    async fn mark_notified(&self, event_id: Uuid) -> anyhow::Result<()> {
        let mut inner = self.lock();
        if let Some(event) = inner.events.iter_mut().find(|e| e.id == event_id) {
            event.notification_sent = true;
            event.notification_sent_at.get_or_insert_with(Utc::now);
        }
        Ok(())
    }

    async fn find_unnotified_since(
        &self,
        since: DateTime<Utc>,
        limit: i64,
    ) -> anyhow::Result<Vec<WhaleEvent>> {
        let inner = self.lock();
        let mut pending: Vec<WhaleEvent> = inner
            .events
            .iter()
            .filter(|e| !e.notification_sent && e.timestamp >= since)
            .cloned()
            .collect();
        pending.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        pending.truncate(limit.max(0) as usize);
        Ok(pending)
    }

    async fn list_active_subscriptions(&self) -> anyhow::Result<Vec<NotificationSubscription>> {
        Ok(self
            .lock()
            .subscriptions
            .iter()
            .filter(|s| s.active)
            .cloned()
            .collect())
    }

    async fn list_subscriptions(&self) -> anyhow::Result<Vec<NotificationSubscription>> {
        let mut subs = self.lock().subscriptions.clone();
        subs.reverse();
        Ok(subs)
    }

    async fn insert_subscription(
        &self,
        subscription: &NewSubscription,
    ) -> anyhow::Result<NotificationSubscription> {
        let row = subscription
            .clone()
            .into_subscription(Uuid::new_v4(), Utc::now());
        self.lock().subscriptions.push(row.clone());
        Ok(row)
    }

    async fn set_subscription_active(&self, id: Uuid, active: bool) -> anyhow::Result<bool> {
        let mut inner = self.lock();
        match inner.subscriptions.iter_mut().find(|s| s.id == id) {
            Some(sub) => {
                sub.active = active;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventType;
    use chrono::Duration;
    use rust_decimal::Decimal;

    fn draft(hash: &str, minutes_ago: i64) -> NewWhaleEvent {
        NewWhaleEvent {
            event_type: EventType::WhaleTransfer,
            blockchain: "ethereum".into(),
            transaction_hash: hash.into(),
            block_number: 1,
            timestamp: Utc::now() - Duration::minutes(minutes_ago),
            from_address: Some("0xfrom".into()),
            to_address: Some("0xto".into()),
            token_symbol: Some("ETH".into()),
            token_address: None,
            amount_raw: Some("40000000000000000000".into()),
            amount_decimal: Some(Decimal::from(40)),
            usd_value: Decimal::from(120_000),
            protocol: None,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn test_insert_is_idempotent_on_hash() {
        let store = InMemoryEventStore::new();

        let first = store.insert_event_if_absent(&draft("0xaa", 1)).await.unwrap();
        let second = store.insert_event_if_absent(&draft("0xaa", 1)).await.unwrap();

        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(store.event_count(), 1);
    }

    #[tokio::test]
    async fn test_mark_notified_twice_keeps_first_timestamp() {
        let store = InMemoryEventStore::new();
        let event = store
            .insert_event_if_absent(&draft("0xbb", 1))
            .await
            .unwrap()
            .unwrap();

        store.mark_notified(event.id).await.unwrap();
        let first_at = store.event_by_hash("0xbb").unwrap().notification_sent_at;
        store.mark_notified(event.id).await.unwrap();

        let stored = store.event_by_hash("0xbb").unwrap();
        assert!(stored.notification_sent);
        assert_eq!(stored.notification_sent_at, first_at);
    }

    #[tokio::test]
    async fn test_find_unnotified_respects_window_and_limit() {
        let store = InMemoryEventStore::new();
        store.insert_event_if_absent(&draft("0x01", 5)).await.unwrap();
        store.insert_event_if_absent(&draft("0x02", 10)).await.unwrap();
        store.insert_event_if_absent(&draft("0x03", 120)).await.unwrap();

        let since = Utc::now() - Duration::hours(1);
        let pending = store.find_unnotified_since(since, 100).await.unwrap();
        let hashes: Vec<_> = pending.iter().map(|e| e.transaction_hash.as_str()).collect();
        assert_eq!(hashes, vec!["0x01", "0x02"]);

        let limited = store.find_unnotified_since(since, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].transaction_hash, "0x01");
    }
}
