pub mod activity;
pub mod event;
pub mod subscription;

pub use activity::{RawActivity, RawLiquidity, RawTransfer};
pub use event::{NewWhaleEvent, WhaleEvent};
pub use subscription::{NewSubscription, NotificationSubscription};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    #[error("invalid subscription: {0}")]
    InvalidSubscription(String),
}

// ---------------------------------------------------------------------------
// EventType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    WhaleTransfer,
    LiquidityAdd,
    LiquidityRemove,
    LargeSwap,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::WhaleTransfer => "whale_transfer",
            EventType::LiquidityAdd => "liquidity_add",
            EventType::LiquidityRemove => "liquidity_remove",
            EventType::LargeSwap => "large_swap",
        }
    }

    /// Human-readable name used in notification messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            EventType::WhaleTransfer => "Whale Transfer",
            EventType::LiquidityAdd => "Liquidity Added",
            EventType::LiquidityRemove => "Liquidity Removed",
            EventType::LargeSwap => "Large Swap",
        }
    }

    /// Liquidity events are gated by the liquidity threshold, everything
    /// else by the whale threshold.
    pub fn is_liquidity(&self) -> bool {
        matches!(self, EventType::LiquidityAdd | EventType::LiquidityRemove)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "whale_transfer" => Ok(EventType::WhaleTransfer),
            "liquidity_add" => Ok(EventType::LiquidityAdd),
            "liquidity_remove" => Ok(EventType::LiquidityRemove),
            "large_swap" => Ok(EventType::LargeSwap),
            other => Err(ModelError::UnknownEventType(other.to_string())),
        }
    }
}

impl TryFrom<String> for EventType {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// ---------------------------------------------------------------------------
// ChainFamily
// ---------------------------------------------------------------------------

/// Listener implementation family. Chosen once per chain at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
    Evm,
    Solana,
}

impl ChainFamily {
    /// Decimals assumed when a transfer does not carry its own.
    pub fn default_decimals(&self) -> u32 {
        match self {
            ChainFamily::Evm => 18,
            ChainFamily::Solana => 9,
        }
    }
}

impl fmt::Display for ChainFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainFamily::Evm => write!(f, "evm"),
            ChainFamily::Solana => write!(f, "solana"),
        }
    }
}
