use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::json;

use crate::config::native_symbol;
use crate::models::activity::LiquidityAction;
use crate::models::{ChainFamily, EventType, NewWhaleEvent, RawLiquidity, RawTransfer};
use crate::pricing::{AssetRef, PriceOracle};

/// Largest scale rust_decimal can represent.
const MAX_SCALE: u32 = 28;

/// Significant digits kept when converting raw integer amounts.
const MAX_DIGITS: usize = 28;

/// Turns raw chain records into priced [`NewWhaleEvent`] drafts.
pub struct EventNormalizer {
    oracle: Arc<PriceOracle>,
}

impl EventNormalizer {
    pub fn new(oracle: Arc<PriceOracle>) -> Self {
        Self { oracle }
    }

    /// Normalize a transfer and price it at the current oracle price.
    ///
    /// Missing decimals default to the chain family's native precision.
    pub async fn normalize_transfer(
        &self,
        chain: &str,
        family: ChainFamily,
        transfer: &RawTransfer,
    ) -> anyhow::Result<NewWhaleEvent> {
        let decimals = transfer
            .token_decimals
            .unwrap_or_else(|| family.default_decimals());
        let amount = raw_to_decimal(&transfer.amount_raw, decimals)
            .with_context(|| format!("invalid amount in {}", transfer.hash))?;

        let asset = match &transfer.token_address {
            Some(address) => AssetRef::Token(address.clone()),
            None => AssetRef::Native,
        };
        let unit_price = self.oracle.price(&asset, chain).await;

        let usd_value = amount.checked_mul(unit_price).unwrap_or_else(|| {
            tracing::warn!(
                chain = %chain,
                tx_hash = %transfer.hash,
                "USD value overflow, clamping"
            );
            Decimal::MAX
        });

        let token_symbol = match (&transfer.token_symbol, &transfer.token_address) {
            (Some(symbol), _) => Some(symbol.clone()),
            (None, None) => native_symbol(chain).map(str::to_string),
            (None, Some(_)) => None,
        };

        Ok(NewWhaleEvent {
            event_type: EventType::WhaleTransfer,
            blockchain: chain.to_string(),
            transaction_hash: transfer.hash.clone(),
            block_number: block_number(transfer.block_number)?,
            timestamp: unix_to_datetime(transfer.timestamp)?,
            from_address: Some(transfer.from.clone()),
            to_address: transfer.to.clone(),
            token_symbol,
            token_address: transfer.token_address.clone(),
            amount_raw: Some(transfer.amount_raw.clone()),
            amount_decimal: Some(amount),
            usd_value,
            protocol: None,
            metadata: None,
        })
    }

    /// Normalize a liquidity add/remove.
    ///
    /// LP positions are not priced: `usd_value` is recorded as zero and the
    /// raw pair and amounts are kept in `metadata` for later valuation.
    pub fn normalize_liquidity(
        &self,
        chain: &str,
        liquidity: &RawLiquidity,
    ) -> anyhow::Result<NewWhaleEvent> {
        let event_type = match liquidity.action {
            LiquidityAction::Add => EventType::LiquidityAdd,
            LiquidityAction::Remove => EventType::LiquidityRemove,
        };

        Ok(NewWhaleEvent {
            event_type,
            blockchain: chain.to_string(),
            transaction_hash: liquidity.hash.clone(),
            block_number: block_number(liquidity.block_number)?,
            timestamp: unix_to_datetime(liquidity.timestamp)?,
            from_address: None,
            to_address: None,
            token_symbol: None,
            token_address: None,
            amount_raw: None,
            amount_decimal: None,
            usd_value: Decimal::ZERO,
            protocol: Some(liquidity.protocol.clone()),
            metadata: Some(json!({
                "pool": liquidity.pool,
                "token0": liquidity.token0,
                "token1": liquidity.token1,
                "amount0": liquidity.amount0,
                "amount1": liquidity.amount1,
                "liquidity": liquidity.liquidity,
            })),
        })
    }
}

/// Convert an integer amount string in smallest units into a human-scale
/// decimal (`raw / 10^decimals`).
///
/// Amounts wider than 28 significant digits lose their least significant
/// digits; integer parts that do not fit at all are rejected.
pub fn raw_to_decimal(raw: &str, decimals: u32) -> anyhow::Result<Decimal> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        bail!("amount is not an unsigned integer: {raw:?}");
    }

    let digits = raw.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(Decimal::ZERO);
    }

    let mut scale = decimals;
    let mut keep = digits.len();

    if keep > MAX_DIGITS {
        let drop = (keep - MAX_DIGITS) as u32;
        if drop > scale {
            bail!("amount {raw} with {decimals} decimals exceeds representable range");
        }
        keep = MAX_DIGITS;
        scale -= drop;
    }
    if scale > MAX_SCALE {
        let drop = (scale - MAX_SCALE) as usize;
        keep = keep.saturating_sub(drop);
        scale = MAX_SCALE;
        if keep == 0 {
            return Ok(Decimal::ZERO);
        }
    }

    let mantissa: i128 = digits[..keep].parse()?;
    let value = Decimal::try_from_i128_with_scale(mantissa, scale)
        .map_err(|e| anyhow!("amount {raw} not representable: {e}"))?;
    Ok(value.normalize())
}

fn unix_to_datetime(secs: i64) -> anyhow::Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| anyhow!("invalid block timestamp {secs}"))
}

fn block_number(n: u64) -> anyhow::Result<i64> {
    i64::try_from(n).map_err(|_| anyhow!("block number {n} out of range"))
}
