use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::EventType;

/// Database row for the whale_events table.
///
/// Immutable once persisted apart from `notification_sent` and
/// `notification_sent_at`, which only ever move forward.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WhaleEvent {
    pub id: Uuid,
    #[sqlx(try_from = "String")]
    pub event_type: EventType,
    pub blockchain: String,
    pub transaction_hash: String,
    pub block_number: i64,
    pub timestamp: DateTime<Utc>,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub token_symbol: Option<String>,
    pub token_address: Option<String>,
    pub amount_raw: Option<String>,
    pub amount_decimal: Option<Decimal>,
    pub usd_value: Decimal,
    pub protocol: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub notification_sent: bool,
    pub notification_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Normalized event draft produced by the normalizer, before persistence
/// assigns an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewWhaleEvent {
    pub event_type: EventType,
    pub blockchain: String,
    pub transaction_hash: String,
    pub block_number: i64,
    pub timestamp: DateTime<Utc>,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub token_symbol: Option<String>,
    pub token_address: Option<String>,
    pub amount_raw: Option<String>,
    pub amount_decimal: Option<Decimal>,
    pub usd_value: Decimal,
    pub protocol: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl NewWhaleEvent {
    /// Materialize the draft as an un-notified event row.
    pub fn into_event(self, id: Uuid, created_at: DateTime<Utc>) -> WhaleEvent {
        WhaleEvent {
            id,
            event_type: self.event_type,
            blockchain: self.blockchain,
            transaction_hash: self.transaction_hash,
            block_number: self.block_number,
            timestamp: self.timestamp,
            from_address: self.from_address,
            to_address: self.to_address,
            token_symbol: self.token_symbol,
            token_address: self.token_address,
            amount_raw: self.amount_raw,
            amount_decimal: self.amount_decimal,
            usd_value: self.usd_value,
            protocol: self.protocol,
            metadata: self.metadata,
            notification_sent: false,
            notification_sent_at: None,
            created_at,
        }
    }
}
