use serde::{Deserialize, Serialize};

/// Raw transfer as observed on-chain, before pricing.
///
/// `amount_raw` is an integer string in the chain's smallest unit (wei,
/// lamports, token base units). `token_address` of `None` means the chain's
/// native asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTransfer {
    pub hash: String,
    pub block_number: u64,
    /// Unix seconds of the block containing the transfer.
    pub timestamp: i64,
    pub from: String,
    pub to: Option<String>,
    pub amount_raw: String,
    pub token_address: Option<String>,
    pub token_symbol: Option<String>,
    pub token_decimals: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiquidityAction {
    Add,
    Remove,
}

/// Raw liquidity-pool add/remove record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLiquidity {
    pub hash: String,
    pub block_number: u64,
    pub timestamp: i64,
    pub protocol: String,
    pub action: LiquidityAction,
    pub pool: String,
    pub token0: Option<String>,
    pub token1: Option<String>,
    pub amount0: String,
    pub amount1: String,
    pub liquidity: Option<String>,
}

/// One unit of activity returned by a chain source poll.
#[derive(Debug, Clone, PartialEq)]
pub enum RawActivity {
    Transfer(RawTransfer),
    Liquidity(RawLiquidity),
}

impl RawActivity {
    pub fn hash(&self) -> &str {
        match self {
            RawActivity::Transfer(t) => &t.hash,
            RawActivity::Liquidity(l) => &l.hash,
        }
    }
}
