use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::{EventType, ModelError};

/// Default minimum USD value for a subscription that does not specify one.
pub const DEFAULT_MIN_USD_VALUE: i64 = 100_000;

/// Database row for notification_subscriptions.
///
/// `blockchains` / `event_types` of `None` (or empty) mean "all".
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NotificationSubscription {
    pub id: Uuid,
    pub email: Option<String>,
    pub webhook_url: Option<String>,
    pub min_usd_value: Decimal,
    pub blockchains: Option<Vec<String>>,
    pub event_types: Option<Vec<String>>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Registration request for a new subscription.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewSubscription {
    pub email: Option<String>,
    pub webhook_url: Option<String>,
    pub min_usd_value: Option<Decimal>,
    pub blockchains: Option<Vec<String>>,
    pub event_types: Option<Vec<String>>,
}

impl NewSubscription {
    /// Validate and canonicalize: at least one channel, known event types,
    /// lower-cased chain tags, empty lists collapsed to `None`.
    pub fn validate(mut self) -> Result<Self, ModelError> {
        self.email = non_empty(self.email);
        self.webhook_url = non_empty(self.webhook_url);

        if self.email.is_none() && self.webhook_url.is_none() {
            return Err(ModelError::InvalidSubscription(
                "either email or webhook_url is required".into(),
            ));
        }

        if let Some(min) = self.min_usd_value {
            if min.is_sign_negative() {
                return Err(ModelError::InvalidSubscription(
                    "min_usd_value must not be negative".into(),
                ));
            }
        }

        self.blockchains = self
            .blockchains
            .map(|chains| {
                chains
                    .into_iter()
                    .map(|c| c.trim().to_lowercase())
                    .filter(|c| !c.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|chains| !chains.is_empty());

        self.event_types = match self.event_types {
            Some(types) if !types.is_empty() => {
                let parsed = types
                    .iter()
                    .map(|t| t.parse::<EventType>().map(|t| t.as_str().to_string()))
                    .collect::<Result<Vec<_>, _>>()?;
                Some(parsed)
            }
            _ => None,
        };

        Ok(self)
    }

    pub fn min_usd_value_or_default(&self) -> Decimal {
        self.min_usd_value
            .unwrap_or_else(|| Decimal::from(DEFAULT_MIN_USD_VALUE))
    }

    /// Materialize as an active subscription row.
    pub fn into_subscription(self, id: Uuid, created_at: DateTime<Utc>) -> NotificationSubscription {
        let min_usd_value = self.min_usd_value_or_default();
        NotificationSubscription {
            id,
            email: self.email,
            webhook_url: self.webhook_url,
            min_usd_value,
            blockchains: self.blockchains,
            event_types: self.event_types,
            active: true,
            created_at,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
