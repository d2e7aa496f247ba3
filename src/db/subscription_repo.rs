use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{NewSubscription, NotificationSubscription};

/// Register a new, active subscription.
pub async fn insert_subscription(
    pool: &PgPool,
    sub: &NewSubscription,
) -> anyhow::Result<NotificationSubscription> {
    let row = sqlx::query_as::<_, NotificationSubscription>(
        r#"
        INSERT INTO notification_subscriptions (
            email, webhook_url, min_usd_value, blockchains, event_types
        )
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(&sub.email)
    .bind(&sub.webhook_url)
    .bind(sub.min_usd_value_or_default())
    .bind(&sub.blockchains)
    .bind(&sub.event_types)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Fetch all active subscriptions.
pub async fn get_active_subscriptions(pool: &PgPool) -> anyhow::Result<Vec<NotificationSubscription>> {
    let subs = sqlx::query_as::<_, NotificationSubscription>(
        "SELECT * FROM notification_subscriptions WHERE active = true ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    Ok(subs)
}

/// Fetch every subscription, newest first.
pub async fn get_all_subscriptions(pool: &PgPool) -> anyhow::Result<Vec<NotificationSubscription>> {
    let subs = sqlx::query_as::<_, NotificationSubscription>(
        "SELECT * FROM notification_subscriptions ORDER BY created_at DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(subs)
}

/// Activate or deactivate a subscription.
pub async fn set_subscription_active(pool: &PgPool, id: Uuid, active: bool) -> anyhow::Result<bool> {
    let result = sqlx::query(
        "UPDATE notification_subscriptions SET active = $2, updated_at = NOW() WHERE id = $1",
    )
    .bind(id)
    .bind(active)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}
