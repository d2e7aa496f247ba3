use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

use super::PriceSource;

pub const COINGECKO_API_BASE: &str = "https://api.coingecko.com/api/v3";

#[derive(Debug, Error)]
pub enum PriceSourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CoinGecko API error: {0}")]
    Status(reqwest::StatusCode),
}

#[derive(Debug, Deserialize)]
struct CoinPrice {
    usd: Option<Decimal>,
}

/// CoinGecko simple-price client.
#[derive(Debug, Clone)]
pub struct CoinGeckoClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl CoinGeckoClient {
    pub fn new(http: Client, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    async fn get_prices(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<HashMap<String, CoinPrice>, PriceSourceError> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.http.get(&url).query(query);
        if let Some(key) = &self.api_key {
            req = req.header("x-cg-demo-api-key", key);
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(PriceSourceError::Status(resp.status()));
        }

        let prices: HashMap<String, CoinPrice> = resp.json().await?;
        Ok(prices)
    }
}

#[async_trait]
impl PriceSource for CoinGeckoClient {
    /// GET /simple/token_price/{platform}?contract_addresses=..&vs_currencies=usd
    async fn token_price(&self, platform: &str, address: &str) -> anyhow::Result<Option<Decimal>> {
        let prices = self
            .get_prices(
                &format!("/simple/token_price/{platform}"),
                &[("contract_addresses", address), ("vs_currencies", "usd")],
            )
            .await?;

        // EVM addresses come back lower-cased; Solana mints keep their case.
        let price = prices
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(address))
            .and_then(|(_, p)| p.usd);
        Ok(price)
    }

    /// GET /simple/price?ids=..&vs_currencies=usd
    async fn native_price(&self, asset_id: &str) -> anyhow::Result<Option<Decimal>> {
        let prices = self
            .get_prices("/simple/price", &[("ids", asset_id), ("vs_currencies", "usd")])
            .await?;

        Ok(prices.get(asset_id).and_then(|p| p.usd))
    }
}
