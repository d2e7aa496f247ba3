pub mod event_repo;
pub mod memory;
pub mod subscription_repo;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{NewSubscription, NewWhaleEvent, NotificationSubscription, WhaleEvent};

pub use event_repo::PgEventStore;
pub use memory::InMemoryEventStore;

pub async fn init_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    // Verify connectivity
    sqlx::query("SELECT 1").execute(&pool).await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Storage operations the ingestion and notification core depends on.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist the event unless its transaction hash is already stored.
    /// Returns the stored row when inserted, `None` on a duplicate hash.
    async fn insert_event_if_absent(&self, event: &NewWhaleEvent)
        -> anyhow::Result<Option<WhaleEvent>>;

    /// Set notification_sent. Repeated calls keep the first timestamp.
    async fn mark_notified(&self, event_id: Uuid) -> anyhow::Result<()>;

    /// Un-notified events whose on-chain timestamp is at or after `since`,
    /// newest first.
    async fn find_unnotified_since(
        &self,
        since: DateTime<Utc>,
        limit: i64,
    ) -> anyhow::Result<Vec<WhaleEvent>>;

    async fn list_active_subscriptions(&self) -> anyhow::Result<Vec<NotificationSubscription>>;

    async fn list_subscriptions(&self) -> anyhow::Result<Vec<NotificationSubscription>>;

    async fn insert_subscription(
        &self,
        subscription: &NewSubscription,
    ) -> anyhow::Result<NotificationSubscription>;

    /// Returns false when no subscription has that id.
    async fn set_subscription_active(&self, id: Uuid, active: bool) -> anyhow::Result<bool>;

    /// Reachability check for health endpoints.
    async fn ping(&self) -> anyhow::Result<()>;
}
