use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use metrics::counter;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::rpc::{hex_to_decimal_string, parse_hex_u64, topic_to_address, JsonRpcClient};
use super::ChainSource;
use crate::models::activity::LiquidityAction;
use crate::models::{RawActivity, RawLiquidity, RawTransfer};

/// keccak256("Transfer(address,address,uint256)")
pub const TRANSFER_TOPIC: &str = "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";
/// keccak256("Mint(address,uint256,uint256)"), UniswapV2-style pairs
pub const MINT_TOPIC: &str = "0x4c209b5fc8ad50758f13e2e1088ba56a560dff690a1c6fef26394f4c03821c4f";
/// keccak256("Burn(address,uint256,uint256,address)"), UniswapV2-style pairs
pub const BURN_TOPIC: &str = "0xdccd412f0b1252819cb1fd330b93224ca42612892bb3f4f789976e6d81936496";

/// Blocks fetched per poll when the listener has fallen behind.
const MAX_BLOCKS_PER_POLL: u64 = 5;

/// A tracked ERC-20 contract.
#[derive(Debug, Clone, Copy)]
pub struct KnownToken {
    pub address: &'static str,
    pub symbol: &'static str,
    pub decimals: u32,
}

const fn token(address: &'static str, symbol: &'static str, decimals: u32) -> KnownToken {
    KnownToken { address, symbol, decimals }
}

/// Major stablecoins and wrapped assets watched per EVM chain.
pub fn known_tokens(chain: &str) -> &'static [KnownToken] {
    const ETHEREUM: &[KnownToken] = &[
        token("0xdac17f958d2ee523a2206206994597c13d831ec7", "USDT", 6),
        token("0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48", "USDC", 6),
        token("0x6b175474e89094c44da98b954eedeac495271d0f", "DAI", 18),
        token("0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2", "WETH", 18),
        token("0x2260fac5e5542a773aa44fbcfedf7c193bc2c599", "WBTC", 8),
    ];
    const BSC: &[KnownToken] = &[
        token("0x55d398326f99059ff775485246999027b3197955", "USDT", 18),
        token("0x8ac76a51cc950d9822d68b83fe1ad97b32cd580d", "USDC", 18),
        token("0xbb4cdb9cbd36b01bd1cbaebf2de08d9173bc095c", "WBNB", 18),
        token("0x2170ed0880ac9a755fd29b2688956bd959f933f8", "ETH", 18),
    ];
    const POLYGON: &[KnownToken] = &[
        token("0xc2132d05d31c914a87c6611c10748aeb04b58e8f", "USDT", 6),
        token("0x2791bca1f2de4661ed88a30c99a7a9449aa84174", "USDC.e", 6),
        token("0x7ceb23fd6bc0add59e62ac25578270cff1b9f619", "WETH", 18),
        token("0x1bfd67037b42cf73acf2047067bd4f2c47d9bfd6", "WBTC", 8),
    ];
    const ARBITRUM: &[KnownToken] = &[
        token("0xfd086bc7cd5c481dcc9c85ebe478a1c0b69fcbb9", "USDT", 6),
        token("0xaf88d065e77c8cc2239327c5edb3a432268e5831", "USDC", 6),
        token("0x82af49447d8a07e3bd95bd0d56f35241523fbab1", "WETH", 18),
    ];
    const OPTIMISM: &[KnownToken] = &[
        token("0x94b008aa00579c1307b0ef2c499ad98a8ce58e58", "USDT", 6),
        token("0x0b2c639c533813f4aa9d7837caf62653d097ff85", "USDC", 6),
        token("0x4200000000000000000000000000000000000006", "WETH", 18),
    ];

    match chain {
        "ethereum" => ETHEREUM,
        "bsc" => BSC,
        "polygon" => POLYGON,
        "arbitrum" => ARBITRUM,
        "optimism" => OPTIMISM,
        _ => &[],
    }
}

#[derive(Debug, Deserialize)]
struct EvmBlock {
    number: String,
    timestamp: String,
    #[serde(default)]
    transactions: Vec<EvmTransaction>,
}

#[derive(Debug, Deserialize)]
struct EvmTransaction {
    hash: String,
    from: String,
    to: Option<String>,
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EvmLog {
    address: String,
    topics: Vec<String>,
    data: String,
    block_number: String,
    transaction_hash: String,
    #[serde(default)]
    removed: bool,
}

/// EVM chain source over standard `eth_*` JSON-RPC.
///
/// Each poll walks the blocks produced since the previous poll (capped),
/// emitting native value transfers and ERC-20 transfers of
/// [`known_tokens`]. UniswapV2-style Mint/Burn liquidity events are only
/// queried when enabled with [`EvmRpcSource::with_liquidity_logs`].
pub struct EvmRpcSource {
    chain: String,
    rpc: JsonRpcClient,
    tokens: &'static [KnownToken],
    query_liquidity: bool,
    /// Last fully processed block, 0 before the first poll.
    last_block: AtomicU64,
}

impl EvmRpcSource {
    pub fn new(chain: impl Into<String>, http: Client, rpc_url: impl Into<String>) -> Self {
        let chain = chain.into();
        let tokens = known_tokens(&chain);
        Self {
            rpc: JsonRpcClient::new(http, rpc_url),
            chain,
            tokens,
            query_liquidity: false,
            last_block: AtomicU64::new(0),
        }
    }

    /// Also query Mint/Burn logs. The filter has no address, which some
    /// public nodes reject.
    pub fn with_liquidity_logs(mut self, enabled: bool) -> Self {
        self.query_liquidity = enabled;
        self
    }

    pub fn last_block(&self) -> u64 {
        self.last_block.load(Ordering::Acquire)
    }

    async fn block_number(&self) -> anyhow::Result<u64> {
        let hex: String = self.rpc.call("eth_blockNumber", json!([])).await?;
        parse_hex_u64(&hex).ok_or_else(|| anyhow::anyhow!("invalid block number {hex}"))
    }

    async fn block(&self, number: u64) -> anyhow::Result<Option<EvmBlock>> {
        Ok(self
            .rpc
            .call_optional("eth_getBlockByNumber", json!([format!("0x{number:x}"), true]))
            .await?)
    }

    async fn get_logs(
        &self,
        mut filter: serde_json::Value,
        from: u64,
        to: u64,
    ) -> anyhow::Result<Vec<EvmLog>> {
        filter["fromBlock"] = json!(format!("0x{from:x}"));
        filter["toBlock"] = json!(format!("0x{to:x}"));
        Ok(self.rpc.call("eth_getLogs", json!([filter])).await?)
    }

    async fn token_logs(&self, from: u64, to: u64) -> anyhow::Result<Vec<EvmLog>> {
        if self.tokens.is_empty() {
            return Ok(Vec::new());
        }
        let addresses: Vec<&str> = self.tokens.iter().map(|t| t.address).collect();
        self.get_logs(json!({ "address": addresses, "topics": [TRANSFER_TOPIC] }), from, to)
            .await
    }

    /// Mint/Burn logs for the range. Failures yield no logs so the
    /// transfers already collected still go through.
    async fn liquidity_logs(&self, from: u64, to: u64) -> Vec<EvmLog> {
        if !self.query_liquidity {
            return Vec::new();
        }
        match self
            .get_logs(json!({ "topics": [[MINT_TOPIC, BURN_TOPIC]] }), from, to)
            .await
        {
            Ok(logs) => logs,
            Err(e) => {
                counter!("liquidity_log_errors_total", "chain" => self.chain.clone()).increment(1);
                tracing::warn!(error = %e, chain = %self.chain, from, to, "Liquidity log query failed");
                Vec::new()
            }
        }
    }

    fn known_token(&self, address: &str) -> Option<&KnownToken> {
        self.tokens
            .iter()
            .find(|t| t.address.eq_ignore_ascii_case(address))
    }

    fn log_to_activity(&self, log: &EvmLog, timestamp: i64) -> Option<RawActivity> {
        if log.removed {
            return None;
        }
        let block_number = parse_hex_u64(&log.block_number)?;
        let topic0 = log.topics.first()?.to_lowercase();
        let data = log.data.strip_prefix("0x").unwrap_or(&log.data);

        match topic0.as_str() {
            TRANSFER_TOPIC => {
                // ERC-721 transfers carry the token id as a third indexed topic
                if log.topics.len() != 3 {
                    return None;
                }
                let token = self.known_token(&log.address)?;
                Some(RawActivity::Transfer(RawTransfer {
                    hash: log.transaction_hash.clone(),
                    block_number,
                    timestamp,
                    from: topic_to_address(&log.topics[1])?,
                    to: Some(topic_to_address(&log.topics[2])?),
                    amount_raw: hex_to_decimal_string(data_word(data, 0)?)?,
                    token_address: Some(token.address.to_string()),
                    token_symbol: Some(token.symbol.to_string()),
                    token_decimals: Some(token.decimals),
                }))
            }
            MINT_TOPIC | BURN_TOPIC => {
                let action = if topic0 == MINT_TOPIC {
                    LiquidityAction::Add
                } else {
                    LiquidityAction::Remove
                };
                Some(RawActivity::Liquidity(RawLiquidity {
                    hash: log.transaction_hash.clone(),
                    block_number,
                    timestamp,
                    protocol: "uniswap_v2".to_string(),
                    action,
                    pool: log.address.to_lowercase(),
                    token0: None,
                    token1: None,
                    amount0: hex_to_decimal_string(data_word(data, 0)?)?,
                    amount1: hex_to_decimal_string(data_word(data, 1)?)?,
                    liquidity: None,
                }))
            }
            _ => None,
        }
    }
}

/// The `index`-th 32-byte word of ABI-encoded log data.
fn data_word(data: &str, index: usize) -> Option<&str> {
    data.get(index * 64..(index + 1) * 64)
}

fn native_transfers(block: &EvmBlock) -> anyhow::Result<(u64, i64, Vec<RawActivity>)> {
    let number = parse_hex_u64(&block.number)
        .ok_or_else(|| anyhow::anyhow!("invalid block number {}", block.number))?;
    let timestamp = parse_hex_u64(&block.timestamp)
        .and_then(|t| i64::try_from(t).ok())
        .ok_or_else(|| anyhow::anyhow!("invalid block timestamp {}", block.timestamp))?;

    let transfers = block
        .transactions
        .iter()
        .filter_map(|tx| {
            let amount_raw = hex_to_decimal_string(&tx.value)?;
            if amount_raw == "0" {
                return None;
            }
            Some(RawActivity::Transfer(RawTransfer {
                hash: tx.hash.clone(),
                block_number: number,
                timestamp,
                from: tx.from.to_lowercase(),
                to: tx.to.as_ref().map(|t| t.to_lowercase()),
                amount_raw,
                token_address: None,
                token_symbol: None,
                token_decimals: None,
            }))
        })
        .collect();

    Ok((number, timestamp, transfers))
}

#[async_trait]
impl ChainSource for EvmRpcSource {
    async fn fetch_latest(&self) -> anyhow::Result<Vec<RawActivity>> {
        let head = self.block_number().await?;
        let last = self.last_block();
        if last != 0 && head <= last {
            return Ok(Vec::new());
        }

        let from = if last == 0 {
            head
        } else {
            (last + 1).max(head.saturating_sub(MAX_BLOCKS_PER_POLL - 1))
        };
        if last != 0 && from > last + 1 {
            tracing::warn!(
                chain = %self.chain,
                skipped = from - last - 1,
                "Listener behind head, skipping blocks"
            );
        }

        let mut activities = Vec::new();
        let mut timestamps = HashMap::new();
        let mut processed_to = from.saturating_sub(1);

        for number in from..=head {
            // Not yet served by this node; retry next poll
            let Some(block) = self.block(number).await? else {
                break;
            };
            let (number, timestamp, transfers) = native_transfers(&block)?;
            timestamps.insert(number, timestamp);
            activities.extend(transfers);
            processed_to = number;
        }

        if processed_to < from {
            return Ok(activities);
        }

        let mut logs = self.token_logs(from, processed_to).await?;
        logs.extend(self.liquidity_logs(from, processed_to).await);

        for log in logs {
            let Some(block_number) = parse_hex_u64(&log.block_number) else {
                continue;
            };
            let Some(&timestamp) = timestamps.get(&block_number) else {
                continue;
            };
            if let Some(activity) = self.log_to_activity(&log, timestamp) {
                activities.push(activity);
            }
        }

        self.last_block.store(processed_to, Ordering::Release);
        tracing::debug!(
            chain = %self.chain,
            from,
            to = processed_to,
            activities = activities.len(),
            "EVM blocks scanned"
        );
        Ok(activities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> EvmRpcSource {
        EvmRpcSource::new("ethereum", Client::new(), "http://127.0.0.1:0")
    }

    fn log(address: &str, topics: &[&str], data: &str) -> EvmLog {
        EvmLog {
            address: address.into(),
            topics: topics.iter().map(|t| t.to_string()).collect(),
            data: data.into(),
            block_number: "0x10".into(),
            transaction_hash: "0xtx".into(),
            removed: false,
        }
    }

    const FROM_TOPIC: &str = "0x000000000000000000000000aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const TO_TOPIC: &str = "0x000000000000000000000000bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    #[test]
    fn test_native_transfers_skip_zero_value() {
        let block: EvmBlock = serde_json::from_value(json!({
            "number": "0x10",
            "timestamp": "0x6553f100",
            "transactions": [
                {"hash": "0x1", "from": "0xAA", "to": "0xBB", "value": "0x22b1c8c1227a00000"},
                {"hash": "0x2", "from": "0xAA", "to": "0xCC", "value": "0x0"},
                {"hash": "0x3", "from": "0xAA", "to": null, "value": "0x1"}
            ]
        }))
        .unwrap();

        let (number, timestamp, transfers) = native_transfers(&block).unwrap();
        assert_eq!(number, 16);
        assert_eq!(timestamp, 1_700_000_000);
        assert_eq!(transfers.len(), 2);

        let RawActivity::Transfer(first) = &transfers[0] else {
            panic!("expected transfer");
        };
        assert_eq!(first.amount_raw, "40000000000000000000");
        assert_eq!(first.from, "0xaa");
        assert_eq!(first.token_address, None);

        let RawActivity::Transfer(creation) = &transfers[1] else {
            panic!("expected transfer");
        };
        assert_eq!(creation.to, None);
    }

    #[test]
    fn test_known_token_transfer_log() {
        // 250,000 USDT (6 decimals)
        let data = format!("0x{:064x}", 250_000_000_000u64);
        let log = log(
            "0xdAC17F958D2ee523a2206206994597C13D831ec7",
            &[TRANSFER_TOPIC, FROM_TOPIC, TO_TOPIC],
            &data,
        );

        let Some(RawActivity::Transfer(t)) = source().log_to_activity(&log, 1_700_000_000) else {
            panic!("expected transfer");
        };
        assert_eq!(t.amount_raw, "250000000000");
        assert_eq!(t.token_symbol.as_deref(), Some("USDT"));
        assert_eq!(t.token_decimals, Some(6));
        assert_eq!(t.from, "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
        assert_eq!(t.to.as_deref(), Some("0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb"));
        assert_eq!(t.block_number, 16);
    }

    #[test]
    fn test_unknown_token_and_nft_logs_ignored() {
        let data = format!("0x{:064x}", 1u64);
        let unknown = log("0x1111111111111111111111111111111111111111", &[TRANSFER_TOPIC, FROM_TOPIC, TO_TOPIC], &data);
        assert!(source().log_to_activity(&unknown, 0).is_none());

        let nft = log(
            "0xdac17f958d2ee523a2206206994597c13d831ec7",
            &[TRANSFER_TOPIC, FROM_TOPIC, TO_TOPIC, FROM_TOPIC],
            "0x",
        );
        assert!(source().log_to_activity(&nft, 0).is_none());
    }

    #[test]
    fn test_mint_and_burn_become_liquidity() {
        let data = format!("0x{:064x}{:064x}", 1000u64, 2000u64);

        let mint = log("0xPAIR", &[MINT_TOPIC, FROM_TOPIC], &data);
        let Some(RawActivity::Liquidity(add)) = source().log_to_activity(&mint, 1) else {
            panic!("expected liquidity");
        };
        assert_eq!(add.action, LiquidityAction::Add);
        assert_eq!(add.pool, "0xpair");
        assert_eq!(add.amount0, "1000");
        assert_eq!(add.amount1, "2000");

        let burn = log("0xPAIR", &[BURN_TOPIC, FROM_TOPIC, TO_TOPIC], &data);
        let Some(RawActivity::Liquidity(remove)) = source().log_to_activity(&burn, 1) else {
            panic!("expected liquidity");
        };
        assert_eq!(remove.action, LiquidityAction::Remove);
    }

    #[test]
    fn test_removed_logs_ignored() {
        let data = format!("0x{:064x}{:064x}", 1u64, 2u64);
        let mut reorged = log("0xpair", &[MINT_TOPIC, FROM_TOPIC], &data);
        reorged.removed = true;
        assert!(source().log_to_activity(&reorged, 1).is_none());
    }

    #[test]
    fn test_known_tokens_per_chain() {
        assert!(known_tokens("ethereum").iter().any(|t| t.symbol == "USDT"));
        assert_eq!(known_tokens("bsc")[0].decimals, 18);
        assert!(known_tokens("solana").is_empty());
    }
}
