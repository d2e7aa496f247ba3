use rust_decimal::Decimal;
use std::env;
use std::time::Duration;

use crate::models::ChainFamily;
use crate::pricing::coingecko::COINGECKO_API_BASE;

/// A chain this service knows how to monitor.
#[derive(Debug, Clone, Copy)]
pub struct ChainSpec {
    pub name: &'static str,
    pub family: ChainFamily,
    pub rpc_env: &'static str,
    pub native_symbol: &'static str,
}

pub const KNOWN_CHAINS: &[ChainSpec] = &[
    ChainSpec { name: "ethereum", family: ChainFamily::Evm, rpc_env: "ETHEREUM_RPC_URL", native_symbol: "ETH" },
    ChainSpec { name: "bsc", family: ChainFamily::Evm, rpc_env: "BSC_RPC_URL", native_symbol: "BNB" },
    ChainSpec { name: "polygon", family: ChainFamily::Evm, rpc_env: "POLYGON_RPC_URL", native_symbol: "MATIC" },
    ChainSpec { name: "arbitrum", family: ChainFamily::Evm, rpc_env: "ARBITRUM_RPC_URL", native_symbol: "ETH" },
    ChainSpec { name: "optimism", family: ChainFamily::Evm, rpc_env: "OPTIMISM_RPC_URL", native_symbol: "ETH" },
    ChainSpec { name: "solana", family: ChainFamily::Solana, rpc_env: "SOLANA_RPC_URL", native_symbol: "SOL" },
];

pub fn chain_spec(chain: &str) -> Option<&'static ChainSpec> {
    KNOWN_CHAINS.iter().find(|c| c.name == chain)
}

pub fn native_symbol(chain: &str) -> Option<&'static str> {
    chain_spec(chain).map(|c| c.native_symbol)
}

/// Per-chain listener settings. `rpc_url` of `None` disables the chain.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub name: String,
    pub family: ChainFamily,
    pub rpc_url: Option<String>,
    pub poll_interval: Duration,
}

impl ChainConfig {
    pub fn is_enabled(&self) -> bool {
        self.rpc_url.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub api_token: Option<String>,

    // Detection thresholds (USD)
    pub whale_threshold_usd: Decimal,
    pub liquidity_threshold_usd: Decimal,

    // Chains
    pub chains: Vec<ChainConfig>,
    pub ingestion_autostart: bool,

    // Pricing
    pub price_cache_ttl: Duration,
    pub coingecko_api_url: String,
    pub coingecko_api_key: Option<String>,

    // Notifications
    pub notifications_enabled: bool,
    pub notification_sweep_interval: Duration,
    pub notification_sweep_window: Duration,
    pub notification_sweep_batch: i64,
    pub webhook_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup. Empty values count
    /// as unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let evm_poll = Duration::from_millis(parse_or(get("EVM_POLL_INTERVAL_MS"), 12_000u64));
        let solana_poll = Duration::from_millis(parse_or(get("SOLANA_POLL_INTERVAL_MS"), 400u64));

        let chains = KNOWN_CHAINS
            .iter()
            .map(|spec| ChainConfig {
                name: spec.name.to_string(),
                family: spec.family,
                rpc_url: get(spec.rpc_env),
                poll_interval: match spec.family {
                    ChainFamily::Evm => evm_poll,
                    ChainFamily::Solana => solana_poll,
                },
            })
            .collect();

        Ok(Self {
            database_url: get("DATABASE_URL")
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set"))?,
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: get("PORT").unwrap_or_else(|| "8080".into()).parse()?,
            api_token: get("API_TOKEN"),

            whale_threshold_usd: parse_or(get("WHALE_THRESHOLD_USD"), Decimal::from(100_000)),
            liquidity_threshold_usd: parse_or(get("LIQUIDITY_THRESHOLD_USD"), Decimal::from(50_000)),

            chains,
            ingestion_autostart: parse_or(get("INGESTION_AUTOSTART"), false),

            price_cache_ttl: Duration::from_secs(parse_or(get("PRICE_CACHE_TTL_SECS"), 300u64)),
            coingecko_api_url: get("COINGECKO_API_URL").unwrap_or_else(|| COINGECKO_API_BASE.into()),
            coingecko_api_key: get("COINGECKO_API_KEY"),

            notifications_enabled: parse_or(get("NOTIFICATIONS_ENABLED"), true),
            notification_sweep_interval: Duration::from_secs(parse_or(
                get("NOTIFICATION_SWEEP_INTERVAL_SECS"),
                30u64,
            )),
            notification_sweep_window: Duration::from_secs(parse_or(
                get("NOTIFICATION_SWEEP_WINDOW_SECS"),
                3_600u64,
            )),
            notification_sweep_batch: parse_or(get("NOTIFICATION_SWEEP_BATCH"), 100i64),
            webhook_timeout: Duration::from_secs(parse_or(get("WEBHOOK_TIMEOUT_SECS"), 10u64)),
        })
    }

    /// Chains with a configured RPC endpoint.
    pub fn enabled_chains(&self) -> impl Iterator<Item = &ChainConfig> {
        self.chains.iter().filter(|c| c.is_enabled())
    }

    /// Endpoint variables left unset, i.e. chains that will not be monitored.
    pub fn missing_endpoints(&self) -> Vec<&'static str> {
        KNOWN_CHAINS
            .iter()
            .filter(|spec| {
                self.chains
                    .iter()
                    .any(|c| c.name == spec.name && !c.is_enabled())
            })
            .map(|spec| spec.rpc_env)
            .collect()
    }
}

/// Parse a value, falling back to the default when absent or malformed.
fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}
