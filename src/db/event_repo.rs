use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{subscription_repo, EventStore};
use crate::models::{NewSubscription, NewWhaleEvent, NotificationSubscription, WhaleEvent};

/// Postgres-backed event store.
#[derive(Debug, Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Insert an event, doing nothing if the transaction hash already exists.
pub async fn insert_event_if_absent(
    pool: &PgPool,
    event: &NewWhaleEvent,
) -> anyhow::Result<Option<WhaleEvent>> {
    let row = sqlx::query_as::<_, WhaleEvent>(
        r#"
        INSERT INTO whale_events (
            event_type, blockchain, transaction_hash, block_number, timestamp,
            from_address, to_address, token_symbol, token_address,
            amount_raw, amount_decimal, usd_value, protocol, metadata
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        ON CONFLICT (transaction_hash) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(event.event_type.as_str())
    .bind(&event.blockchain)
    .bind(&event.transaction_hash)
    .bind(event.block_number)
    .bind(event.timestamp)
    .bind(&event.from_address)
    .bind(&event.to_address)
    .bind(&event.token_symbol)
    .bind(&event.token_address)
    .bind(&event.amount_raw)
    .bind(event.amount_decimal)
    .bind(event.usd_value)
    .bind(&event.protocol)
    .bind(&event.metadata)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Mark an event notified. The first notification timestamp is preserved.
pub async fn mark_notified(pool: &PgPool, event_id: Uuid) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE whale_events
        SET notification_sent = true,
            notification_sent_at = COALESCE(notification_sent_at, NOW())
        WHERE id = $1
        "#,
    )
    .bind(event_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetch events still waiting for notification inside the window.
pub async fn find_unnotified_since(
    pool: &PgPool,
    since: DateTime<Utc>,
    limit: i64,
) -> anyhow::Result<Vec<WhaleEvent>> {
    let events = sqlx::query_as::<_, WhaleEvent>(
        r#"
        SELECT * FROM whale_events
        WHERE notification_sent = false
          AND timestamp >= $1
        ORDER BY timestamp DESC
        LIMIT $2
        "#,
    )
    .bind(since)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(events)
}

/// Fetch an event by its transaction hash.
pub async fn get_event_by_hash(pool: &PgPool, hash: &str) -> anyhow::Result<Option<WhaleEvent>> {
    let event = sqlx::query_as::<_, WhaleEvent>(
        "SELECT * FROM whale_events WHERE transaction_hash = $1",
    )
    .bind(hash)
    .fetch_optional(pool)
    .await?;

    Ok(event)
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn insert_event_if_absent(
        &self,
        event: &NewWhaleEvent,
    ) -> anyhow::Result<Option<WhaleEvent>> {
        insert_event_if_absent(&self.pool, event).await
    }

    async fn mark_notified(&self, event_id: Uuid) -> anyhow::Result<()> {
        mark_notified(&self.pool, event_id).await
    }

    async fn find_unnotified_since(
        &self,
        since: DateTime<Utc>,
        limit: i64,
    ) -> anyhow::Result<Vec<WhaleEvent>> {
        find_unnotified_since(&self.pool, since, limit).await
    }

    async fn list_active_subscriptions(&self) -> anyhow::Result<Vec<NotificationSubscription>> {
        subscription_repo::get_active_subscriptions(&self.pool).await
    }

    async fn list_subscriptions(&self) -> anyhow::Result<Vec<NotificationSubscription>> {
        subscription_repo::get_all_subscriptions(&self.pool).await
    }

    async fn insert_subscription(
        &self,
        subscription: &NewSubscription,
    ) -> anyhow::Result<NotificationSubscription> {
        subscription_repo::insert_subscription(&self.pool, subscription).await
    }

    async fn set_subscription_active(&self, id: Uuid, active: bool) -> anyhow::Result<bool> {
        subscription_repo::set_subscription_active(&self.pool, id, active).await
    }

    async fn ping(&self) -> anyhow::Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
