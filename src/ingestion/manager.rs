use std::collections::BTreeMap;
use std::sync::Arc;

use reqwest::Client;
use rust_decimal::Decimal;
use serde::Serialize;

use super::chain_listener::{ChainListener, ListenerContext, PollingListener};
use super::evm::EvmRpcSource;
use super::solana::SolanaRpcSource;
use crate::config::{ChainConfig, KNOWN_CHAINS};
use crate::models::ChainFamily;

/// Per-chain status row.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChainStatus {
    pub chain: String,
    pub family: ChainFamily,
    pub configured: bool,
    pub running: bool,
}

/// Owns one listener per configured chain.
pub struct IngestionManager {
    listeners: BTreeMap<String, Arc<dyn ChainListener>>,
}

impl IngestionManager {
    pub fn new(listeners: impl IntoIterator<Item = Arc<dyn ChainListener>>) -> Self {
        let listeners = listeners
            .into_iter()
            .map(|l| (l.chain().to_string(), l))
            .collect();
        Self { listeners }
    }

    /// Build a listener for every chain with an RPC endpoint. Chains without
    /// one are skipped with a warning.
    pub fn from_config(chains: &[ChainConfig], http: Client, ctx: ListenerContext) -> Self {
        let mut listeners: Vec<Arc<dyn ChainListener>> = Vec::new();
        // Liquidity events are valued at zero, so they only pass a zero threshold
        let liquidity_logs = ctx.thresholds.liquidity_usd <= Decimal::ZERO;

        for chain in chains {
            let Some(url) = &chain.rpc_url else {
                tracing::warn!(chain = %chain.name, "No RPC endpoint configured, chain disabled");
                continue;
            };

            let listener: Arc<dyn ChainListener> = match chain.family {
                ChainFamily::Evm => Arc::new(PollingListener::new(
                    chain.name.clone(),
                    chain.family,
                    chain.poll_interval,
                    EvmRpcSource::new(chain.name.clone(), http.clone(), url.clone())
                        .with_liquidity_logs(liquidity_logs),
                    ctx.clone(),
                )),
                ChainFamily::Solana => Arc::new(PollingListener::new(
                    chain.name.clone(),
                    chain.family,
                    chain.poll_interval,
                    SolanaRpcSource::new(http.clone(), url.clone()),
                    ctx.clone(),
                )),
            };
            tracing::info!(chain = %chain.name, family = %chain.family, "Chain listener configured");
            listeners.push(listener);
        }

        Self::new(listeners)
    }

    pub fn start_all(&self) {
        for listener in self.listeners.values() {
            listener.start();
        }
        tracing::info!(listeners = self.listeners.len(), "Ingestion started");
    }

    pub fn stop_all(&self) {
        for listener in self.listeners.values() {
            listener.stop();
        }
        tracing::info!(listeners = self.listeners.len(), "Ingestion stopped");
    }

    pub fn get_listener(&self, chain: &str) -> Option<Arc<dyn ChainListener>> {
        self.listeners.get(chain).cloned()
    }

    pub fn chains(&self) -> impl Iterator<Item = &str> {
        self.listeners.keys().map(String::as_str)
    }

    pub fn is_running(&self) -> bool {
        self.listeners.values().any(|l| l.is_running())
    }

    /// One row per known chain, plus any extra chains registered directly.
    pub fn status(&self) -> Vec<ChainStatus> {
        let mut rows: Vec<ChainStatus> = KNOWN_CHAINS
            .iter()
            .map(|spec| {
                let listener = self.listeners.get(spec.name);
                ChainStatus {
                    chain: spec.name.to_string(),
                    family: spec.family,
                    configured: listener.is_some(),
                    running: listener.is_some_and(|l| l.is_running()),
                }
            })
            .collect();

        for (name, listener) in &self.listeners {
            if !KNOWN_CHAINS.iter().any(|spec| spec.name == name) {
                rows.push(ChainStatus {
                    chain: name.clone(),
                    family: listener.family(),
                    configured: true,
                    running: listener.is_running(),
                });
            }
        }
        rows
    }
}
