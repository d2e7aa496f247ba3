use std::sync::Arc;

use chrono::Utc;
use futures_util::future::{join_all, BoxFuture};
use futures_util::FutureExt;
use metrics::counter;
use reqwest::header::USER_AGENT;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::json;

use super::email::EmailSender;
use super::matcher::match_subscriptions;
use crate::db::EventStore;
use crate::models::{NotificationSubscription, WhaleEvent};

pub const WEBHOOK_USER_AGENT: &str = concat!("whale-tracker/", env!("CARGO_PKG_VERSION"));

/// Outcome of one dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub matched: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// Fans a whale event out to matching subscriptions.
///
/// Channel failures are logged and counted, never returned.
pub struct NotificationDispatcher {
    store: Arc<dyn EventStore>,
    http: reqwest::Client,
    email: Arc<dyn EmailSender>,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<dyn EventStore>, http: reqwest::Client, email: Arc<dyn EmailSender>) -> Self {
        Self { store, http, email }
    }

    /// Deliver `event` to every matching subscription, then mark it notified.
    ///
    /// No match means no side effect. Otherwise the mark happens once all
    /// deliveries have been attempted, whatever their outcome.
    pub async fn process_event_notifications(&self, event: &WhaleEvent) -> anyhow::Result<DispatchReport> {
        let report = self.dispatch_without_marking(event).await?;
        if report.matched == 0 {
            return Ok(report);
        }

        self.store.mark_notified(event.id).await?;
        tracing::info!(
            event_id = %event.id,
            subscriptions = report.matched,
            delivered = report.delivered,
            failed = report.failed,
            "Event notifications sent"
        );
        Ok(report)
    }

    /// Deliver without touching the event's notified flag. Used for events
    /// that were never persisted.
    pub async fn dispatch_without_marking(&self, event: &WhaleEvent) -> anyhow::Result<DispatchReport> {
        let subs = self.store.list_active_subscriptions().await?;
        let matched = match_subscriptions(event, &subs);
        if matched.is_empty() {
            tracing::debug!(event_id = %event.id, "No matching subscriptions");
            return Ok(DispatchReport::default());
        }

        let message = format_event_message(event);
        let outcomes = join_all(self.deliveries(&matched, event, &message)).await;
        let delivered = outcomes.iter().filter(|ok| **ok).count();

        Ok(DispatchReport {
            matched: matched.len(),
            delivered,
            failed: outcomes.len() - delivered,
        })
    }

    fn deliveries<'a>(
        &'a self,
        subs: &[&'a NotificationSubscription],
        event: &'a WhaleEvent,
        message: &'a str,
    ) -> Vec<BoxFuture<'a, bool>> {
        let mut futures = Vec::new();
        for &sub in subs {
            if let Some(url) = sub.webhook_url.as_deref() {
                futures.push(self.send_webhook(url, event, message).boxed());
            }
            if let Some(to) = sub.email.as_deref() {
                futures.push(self.send_email(to, event, message).boxed());
            }
        }
        futures
    }

    /// POST the event to `url`. Non-2xx counts as failure.
    pub async fn send_webhook(&self, url: &str, event: &WhaleEvent, message: &str) -> bool {
        let body = webhook_payload(event, message);

        let result = self
            .http
            .post(url)
            .header(USER_AGENT, WEBHOOK_USER_AGENT)
            .json(&body)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                counter!("notifications_delivered_total", "channel" => "webhook").increment(1);
                tracing::debug!(url = %url, event_id = %event.id, "Webhook delivered");
                true
            }
            Ok(resp) => {
                counter!("notifications_failed_total", "channel" => "webhook").increment(1);
                tracing::warn!(url = %url, status = %resp.status(), "Webhook returned non-2xx");
                false
            }
            Err(e) => {
                counter!("notifications_failed_total", "channel" => "webhook").increment(1);
                tracing::warn!(error = %e, url = %url, "Failed to send webhook");
                false
            }
        }
    }

    pub async fn send_email(&self, to: &str, event: &WhaleEvent, message: &str) -> bool {
        let subject = format!("Whale Alert - {}", event.blockchain.to_uppercase());
        match self.email.send(to, &subject, message).await {
            Ok(()) => {
                counter!("notifications_delivered_total", "channel" => "email").increment(1);
                true
            }
            Err(e) => {
                counter!("notifications_failed_total", "channel" => "email").increment(1);
                tracing::warn!(error = %e, to = %to, "Failed to hand off email");
                false
            }
        }
    }
}

/// JSON body POSTed to webhook subscribers.
pub fn webhook_payload(event: &WhaleEvent, message: &str) -> serde_json::Value {
    json!({
        "type": "whale_event",
        "timestamp": Utc::now().to_rfc3339(),
        "event": {
            "id": event.id,
            "type": event.event_type,
            "blockchain": event.blockchain,
            "transaction_hash": event.transaction_hash,
            "usd_value": event.usd_value,
            "token_symbol": event.token_symbol,
            "from_address": event.from_address,
            "to_address": event.to_address,
            "timestamp": event.timestamp,
        },
        "message": message,
    })
}

/// Human-readable alert text shared by every channel.
pub fn format_event_message(event: &WhaleEvent) -> String {
    let mut lines = vec![
        format!(
            "*{}* detected on {}",
            event.event_type.display_name(),
            event.blockchain.to_uppercase()
        ),
        format!("Value: {}", format_usd(event.usd_value)),
    ];

    if let Some(symbol) = &event.token_symbol {
        lines.push(format!("Token: {symbol}"));
    }
    if let Some(from) = &event.from_address {
        lines.push(format!("From: {}", shorten_address(from)));
    }
    if let Some(to) = &event.to_address {
        lines.push(format!("To: {}", shorten_address(to)));
    }
    lines.push(format!("TX: {}", event.transaction_hash));

    lines.join("\n")
}

/// Whole dollars with thousands separators, e.g. `$1,234,568`.
pub fn format_usd(value: Decimal) -> String {
    let rounded = value.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    let digits = rounded.abs().trunc().to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    if rounded.is_sign_negative() && !rounded.is_zero() {
        format!("-${grouped}")
    } else {
        format!("${grouped}")
    }
}

/// First 10 and last 8 characters of a long address.
pub fn shorten_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 18 {
        return address.to_string();
    }
    let head: String = chars[..10].iter().collect();
    let tail: String = chars[chars.len() - 8..].iter().collect();
    format!("{head}...{tail}")
}
