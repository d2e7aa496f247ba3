pub mod coingecko;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use metrics::counter;
use rust_decimal::Decimal;
use tokio::time::Instant;

pub use coingecko::CoinGeckoClient;

/// Default staleness bound for cached prices.
pub const DEFAULT_PRICE_TTL: Duration = Duration::from_secs(300);

/// What is being priced on a given chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AssetRef {
    Native,
    Token(String),
}

/// Upstream USD price provider. Errors are absorbed by [`PriceOracle`].
///
/// `Ok(None)` means the upstream answered but had no price for the asset.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn token_price(&self, platform: &str, address: &str) -> anyhow::Result<Option<Decimal>>;

    async fn native_price(&self, asset_id: &str) -> anyhow::Result<Option<Decimal>>;
}

/// Price-platform identifier used to look up contract tokens on a chain.
pub fn token_platform(chain: &str) -> Option<&'static str> {
    match chain {
        "ethereum" => Some("ethereum"),
        "bsc" => Some("binance-smart-chain"),
        "polygon" => Some("polygon-pos"),
        "solana" => Some("solana"),
        "arbitrum" => Some("arbitrum-one"),
        "optimism" => Some("optimistic-ethereum"),
        _ => None,
    }
}

/// Price identifier of a chain's native asset.
pub fn native_asset_id(chain: &str) -> Option<&'static str> {
    match chain {
        "ethereum" | "arbitrum" | "optimism" => Some("ethereum"),
        "bsc" => Some("binancecoin"),
        "polygon" => Some("matic-network"),
        "solana" => Some("solana"),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy)]
struct CachedPrice {
    price: Decimal,
    fetched_at: Instant,
}

/// USD unit-price resolver with a per-key TTL cache.
///
/// Never fails outward: unknown chains and upstream errors resolve to zero.
/// Concurrent misses on one key may both fetch; the later write wins.
pub struct PriceOracle {
    source: Arc<dyn PriceSource>,
    cache: DashMap<(String, String), CachedPrice>,
    ttl: Duration,
}

impl PriceOracle {
    pub fn new(source: Arc<dyn PriceSource>, ttl: Duration) -> Self {
        Self {
            source,
            cache: DashMap::new(),
            ttl,
        }
    }

    /// Resolve the USD unit price of `asset` on `chain`.
    pub async fn price(&self, asset: &AssetRef, chain: &str) -> Decimal {
        let chain = chain.to_lowercase();

        let (key, lookup) = match asset {
            AssetRef::Native => {
                let Some(asset_id) = native_asset_id(&chain) else {
                    tracing::warn!(chain = %chain, "No native asset mapping for chain");
                    return Decimal::ZERO;
                };
                ((chain.clone(), "native".to_string()), Lookup::Native(asset_id))
            }
            AssetRef::Token(address) => {
                let Some(platform) = token_platform(&chain) else {
                    tracing::warn!(chain = %chain, "No price platform mapping for chain");
                    return Decimal::ZERO;
                };
                (
                    (chain.clone(), address.to_lowercase()),
                    Lookup::Token(platform, address.clone()),
                )
            }
        };

        if let Some(price) = self.cached(&key) {
            counter!("price_cache_hits_total").increment(1);
            return price;
        }

        let fetched = match &lookup {
            Lookup::Native(asset_id) => self.source.native_price(asset_id).await,
            Lookup::Token(platform, address) => self.source.token_price(platform, address).await,
        };

        match fetched {
            Ok(price) => {
                let price = price.unwrap_or(Decimal::ZERO);
                self.cache.insert(
                    key,
                    CachedPrice {
                        price,
                        fetched_at: Instant::now(),
                    },
                );
                price
            }
            Err(e) => {
                counter!("price_fetch_errors_total").increment(1);
                tracing::warn!(
                    error = %e,
                    chain = %chain,
                    asset = ?asset,
                    "Price fetch failed, using zero"
                );
                Decimal::ZERO
            }
        }
    }

    fn cached(&self, key: &(String, String)) -> Option<Decimal> {
        let entry = self.cache.get(key)?;
        if entry.fetched_at.elapsed() < self.ttl {
            Some(entry.price)
        } else {
            None
        }
    }
}

enum Lookup {
    Native(&'static str),
    Token(&'static str, String),
}
