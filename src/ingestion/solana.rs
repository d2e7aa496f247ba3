use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::rpc::{JsonRpcClient, RpcError};
use super::ChainSource;
use crate::models::{RawActivity, RawTransfer};

/// Slots fetched per poll when the listener has fallen behind.
const MAX_SLOTS_PER_POLL: u64 = 4;

/// RPC error codes meaning the slot has no block to serve.
const SLOT_UNAVAILABLE_CODES: &[i64] = &[-32004, -32007, -32009];

/// A tracked SPL mint.
#[derive(Debug, Clone, Copy)]
pub struct KnownMint {
    pub mint: &'static str,
    pub symbol: &'static str,
    pub decimals: u32,
}

/// SPL mints whose transfers are priced. Others are dropped before pricing.
pub const KNOWN_MINTS: &[KnownMint] = &[
    KnownMint { mint: "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v", symbol: "USDC", decimals: 6 },
    KnownMint { mint: "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB", symbol: "USDT", decimals: 6 },
    KnownMint { mint: "So11111111111111111111111111111111111111112", symbol: "wSOL", decimals: 9 },
];

/// Mint addresses are base58 and case-sensitive.
pub fn known_mint(mint: &str) -> Option<&'static KnownMint> {
    KNOWN_MINTS.iter().find(|m| m.mint == mint)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SolanaBlock {
    block_time: Option<i64>,
    #[serde(default)]
    transactions: Vec<SolanaTransaction>,
}

#[derive(Debug, Deserialize)]
struct SolanaTransaction {
    transaction: TransactionBody,
    meta: Option<TransactionMeta>,
}

#[derive(Debug, Deserialize)]
struct TransactionBody {
    signatures: Vec<String>,
    message: TransactionMessage,
}

#[derive(Debug, Deserialize)]
struct TransactionMessage {
    #[serde(default)]
    instructions: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct TransactionMeta {
    err: Option<Value>,
}

/// Solana source over `getSlot` and `getBlock` with `jsonParsed` encoding.
///
/// Emits top-level System Program SOL transfers and SPL Token
/// `transferChecked` instructions of [`KNOWN_MINTS`] from successful
/// transactions.
pub struct SolanaRpcSource {
    rpc: JsonRpcClient,
    last_slot: AtomicU64,
}

impl SolanaRpcSource {
    pub fn new(http: Client, rpc_url: impl Into<String>) -> Self {
        Self {
            rpc: JsonRpcClient::new(http, rpc_url),
            last_slot: AtomicU64::new(0),
        }
    }

    async fn slot(&self) -> anyhow::Result<u64> {
        Ok(self
            .rpc
            .call("getSlot", json!([{ "commitment": "confirmed" }]))
            .await?)
    }

    async fn block(&self, slot: u64) -> anyhow::Result<Option<SolanaBlock>> {
        let params = json!([slot, {
            "encoding": "jsonParsed",
            "transactionDetails": "full",
            "rewards": false,
            "maxSupportedTransactionVersion": 0,
            "commitment": "confirmed",
        }]);

        match self.rpc.call_optional("getBlock", params).await {
            Ok(block) => Ok(block),
            Err(RpcError::Rpc { code, .. }) if SLOT_UNAVAILABLE_CODES.contains(&code) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn block_transfers(slot: u64, block: &SolanaBlock) -> Vec<RawActivity> {
    let Some(timestamp) = block.block_time else {
        return Vec::new();
    };

    let mut transfers = Vec::new();
    for tx in &block.transactions {
        if tx.meta.as_ref().is_some_and(|m| m.err.is_some()) {
            continue;
        }
        let Some(signature) = tx.transaction.signatures.first() else {
            continue;
        };
        transfers.extend(
            tx.transaction
                .message
                .instructions
                .iter()
                .filter_map(|ix| parse_instruction(ix, signature, slot, timestamp))
                .map(RawActivity::Transfer),
        );
    }
    transfers
}

/// Decode one `jsonParsed` instruction into a transfer, if it is one.
fn parse_instruction(ix: &Value, signature: &str, slot: u64, timestamp: i64) -> Option<RawTransfer> {
    let program = ix.get("program")?.as_str()?;
    let parsed = ix.get("parsed")?;
    let kind = parsed.get("type")?.as_str()?;
    let info = parsed.get("info")?;
    let text = |key: &str| info.get(key).and_then(Value::as_str).map(str::to_string);

    match (program, kind) {
        ("system", "transfer") => {
            let lamports = info.get("lamports")?.as_u64()?;
            if lamports == 0 {
                return None;
            }
            Some(RawTransfer {
                hash: signature.to_string(),
                block_number: slot,
                timestamp,
                from: text("source")?,
                to: text("destination"),
                amount_raw: lamports.to_string(),
                token_address: None,
                token_symbol: None,
                token_decimals: None,
            })
        }
        ("spl-token", "transferChecked") => {
            let known = known_mint(info.get("mint")?.as_str()?)?;
            let token_amount = info.get("tokenAmount")?;
            let amount_raw = token_amount.get("amount")?.as_str()?.to_string();
            if amount_raw.trim_start_matches('0').is_empty() {
                return None;
            }
            let decimals = token_amount
                .get("decimals")
                .and_then(Value::as_u64)
                .and_then(|d| u32::try_from(d).ok())
                .unwrap_or(known.decimals);
            Some(RawTransfer {
                hash: signature.to_string(),
                block_number: slot,
                timestamp,
                from: text("source")?,
                to: text("destination"),
                amount_raw,
                token_address: Some(known.mint.to_string()),
                token_symbol: Some(known.symbol.to_string()),
                token_decimals: Some(decimals),
            })
        }
        _ => None,
    }
}

#[async_trait]
impl ChainSource for SolanaRpcSource {
    async fn fetch_latest(&self) -> anyhow::Result<Vec<RawActivity>> {
        let head = self.slot().await?;
        let last = self.last_slot.load(Ordering::Acquire);
        if last != 0 && head <= last {
            return Ok(Vec::new());
        }

        let from = if last == 0 {
            head
        } else {
            (last + 1).max(head.saturating_sub(MAX_SLOTS_PER_POLL - 1))
        };

        let mut activities = Vec::new();
        for slot in from..=head {
            // Skipped slots have no block; move past them
            if let Some(block) = self.block(slot).await? {
                activities.extend(block_transfers(slot, &block));
            }
        }

        self.last_slot.store(head, Ordering::Release);
        tracing::debug!(from, to = head, activities = activities.len(), "Solana slots scanned");
        Ok(activities)
    }
}
