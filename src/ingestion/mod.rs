pub mod chain_listener;
pub mod evm;
pub mod manager;
pub mod normalizer;
pub mod rpc;
pub mod solana;

use async_trait::async_trait;

use crate::models::RawActivity;

pub use chain_listener::{ChainListener, Ingested, ListenerContext, PollingListener, Thresholds};
pub use evm::EvmRpcSource;
pub use manager::{ChainStatus, IngestionManager};
pub use normalizer::EventNormalizer;
pub use solana::SolanaRpcSource;

/// Chain-specific discovery of recent on-chain activity.
///
/// Each call returns whatever is observable as of now. Overlap with earlier
/// calls is allowed; the event store drops repeated hashes.
#[async_trait]
pub trait ChainSource: Send + Sync {
    async fn fetch_latest(&self) -> anyhow::Result<Vec<RawActivity>>;
}
