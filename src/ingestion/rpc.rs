use std::sync::atomic::{AtomicU64, Ordering};

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("RPC endpoint returned HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("RPC response for {0} had no result")]
    MissingResult(String),
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// Minimal JSON-RPC 2.0 client over HTTP POST.
#[derive(Debug)]
pub struct JsonRpcClient {
    http: Client,
    url: String,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(http: Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Call `method`, treating a null/absent result as an error.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        self.call_optional(method, params)
            .await?
            .ok_or_else(|| RpcError::MissingResult(method.to_string()))
    }

    /// Call `method`, returning `None` for a null result.
    pub async fn call_optional<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Option<T>, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let resp = self.http.post(&self.url).json(&payload).send().await?;
        if !resp.status().is_success() {
            return Err(RpcError::Status(resp.status()));
        }

        let body: RpcResponse<T> = resp.json().await?;
        if let Some(err) = body.error {
            return Err(RpcError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        Ok(body.result)
    }
}

/// Parse a `0x`-prefixed hex quantity.
pub fn parse_hex_u64(hex: &str) -> Option<u64> {
    let digits = hex.strip_prefix("0x").unwrap_or(hex);
    if digits.is_empty() {
        return Some(0);
    }
    u64::from_str_radix(digits, 16).ok()
}

/// Convert a hex quantity of up to 256 bits into its decimal string.
pub fn hex_to_decimal_string(hex: &str) -> Option<String> {
    let hex = hex.strip_prefix("0x").unwrap_or(hex);
    let hex = hex.trim_start_matches('0');
    if hex.is_empty() {
        return Some("0".to_string());
    }

    // Fast path: fits in u128
    if hex.len() <= 32 {
        return u128::from_str_radix(hex, 16).ok().map(|v| v.to_string());
    }

    // Full uint256: accumulate decimal digits, least significant first
    let mut digits: Vec<u8> = vec![0];
    for ch in hex.chars() {
        let mut carry = ch.to_digit(16)?;
        for d in digits.iter_mut() {
            let val = u32::from(*d) * 16 + carry;
            *d = (val % 10) as u8;
            carry = val / 10;
        }
        while carry > 0 {
            digits.push((carry % 10) as u8);
            carry /= 10;
        }
    }

    Some(digits.iter().rev().map(|d| char::from(b'0' + d)).collect())
}

/// Extract a 20-byte address from a 32-byte zero-padded topic word.
/// `None` when the tail is not plain hex.
pub fn topic_to_address(topic: &str) -> Option<String> {
    let hex = topic.strip_prefix("0x").unwrap_or(topic);
    let tail = hex.get(hex.len().saturating_sub(40)..)?;
    tail.chars()
        .all(|c| c.is_ascii_hexdigit())
        .then(|| format!("0x{}", tail.to_lowercase()))
}
