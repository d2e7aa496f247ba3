use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::mpsc;

use whale_tracker::config::AppConfig;
use whale_tracker::db::{EventStore, InMemoryEventStore};
use whale_tracker::ingestion::{
    ChainSource, EventNormalizer, IngestionManager, ListenerContext, Thresholds,
};
use whale_tracker::models::{
    EventType, NewSubscription, NewWhaleEvent, NotificationSubscription, RawActivity, RawTransfer,
    WhaleEvent,
};
use whale_tracker::pricing::{PriceOracle, PriceSource};
use whale_tracker::services::{EmailSender, NotificationDispatcher};
use whale_tracker::AppState;

#[allow(dead_code)]
pub const USDT_ETHEREUM: &str = "0xdac17f958d2ee523a2206206994597c13d831ec7";

/// Price source with fixed quotes: ETH 3000, BNB 600, SOL 150, USDT 1.
#[allow(dead_code)]
pub struct FixedPrices;

#[async_trait]
impl PriceSource for FixedPrices {
    async fn token_price(&self, _platform: &str, address: &str) -> anyhow::Result<Option<Decimal>> {
        if address.eq_ignore_ascii_case(USDT_ETHEREUM) {
            Ok(Some(Decimal::ONE))
        } else {
            Ok(None)
        }
    }

    async fn native_price(&self, asset_id: &str) -> anyhow::Result<Option<Decimal>> {
        Ok(match asset_id {
            "ethereum" => Some(Decimal::from(3000)),
            "binancecoin" => Some(Decimal::from(600)),
            "solana" => Some(Decimal::from(150)),
            _ => None,
        })
    }
}

#[allow(dead_code)]
pub fn normalizer() -> Arc<EventNormalizer> {
    let oracle = PriceOracle::new(Arc::new(FixedPrices), Duration::from_secs(300));
    Arc::new(EventNormalizer::new(Arc::new(oracle)))
}

#[allow(dead_code)]
pub fn default_thresholds() -> Thresholds {
    Thresholds {
        whale_usd: Decimal::from(100_000),
        liquidity_usd: Decimal::from(50_000),
    }
}

#[allow(dead_code)]
pub fn listener_context(
    store: Arc<InMemoryEventStore>,
    event_tx: Option<mpsc::Sender<WhaleEvent>>,
) -> ListenerContext {
    ListenerContext {
        normalizer: normalizer(),
        store,
        thresholds: default_thresholds(),
        event_tx,
    }
}

/// Native ETH transfer of `eth` whole ether.
#[allow(dead_code)]
pub fn eth_transfer(hash: &str, eth: u64) -> RawTransfer {
    RawTransfer {
        hash: hash.into(),
        block_number: 19_000_000,
        timestamp: Utc::now().timestamp(),
        from: "0x28c6c06298d514db089934071355e5743bf21d60".into(),
        to: Some("0x21a31ee1afc51d94c2efccaa2092ad1028285549".into()),
        amount_raw: format!("{eth}000000000000000000"),
        token_address: None,
        token_symbol: None,
        token_decimals: None,
    }
}

/// Event draft on `chain` worth `usd`, observed at `timestamp`.
#[allow(dead_code)]
pub fn event_draft(chain: &str, hash: &str, usd: i64, timestamp: DateTime<Utc>) -> NewWhaleEvent {
    NewWhaleEvent {
        event_type: EventType::WhaleTransfer,
        blockchain: chain.into(),
        transaction_hash: hash.into(),
        block_number: 1,
        timestamp,
        from_address: Some("0xfrom0000000000000000000000000000000000001".into()),
        to_address: Some("0xto000000000000000000000000000000000000002".into()),
        token_symbol: Some("ETH".into()),
        token_address: None,
        amount_raw: None,
        amount_decimal: None,
        usd_value: Decimal::from(usd),
        protocol: None,
        metadata: None,
    }
}

/// Insert a draft and return the stored row.
#[allow(dead_code)]
pub async fn store_event(store: &InMemoryEventStore, draft: NewWhaleEvent) -> WhaleEvent {
    store
        .insert_event_if_absent(&draft)
        .await
        .expect("insert failed")
        .expect("unexpected duplicate")
}

#[allow(dead_code)]
pub async fn add_subscription(store: &InMemoryEventStore, sub: NewSubscription) -> NotificationSubscription {
    store
        .insert_subscription(&sub.validate().expect("invalid subscription"))
        .await
        .expect("insert subscription failed")
}

/// Chain source that replays scripted batches, then returns nothing.
#[allow(dead_code)]
#[derive(Default)]
pub struct ScriptedSource {
    batches: Mutex<VecDeque<Vec<RawActivity>>>,
    calls: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl ScriptedSource {
    pub fn new(batches: Vec<Vec<RawActivity>>) -> Self {
        Self {
            batches: Mutex::new(batches.into()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl ChainSource for ScriptedSource {
    async fn fetch_latest(&self) -> anyhow::Result<Vec<RawActivity>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.batches.lock().unwrap().pop_front().unwrap_or_default())
    }
}

/// Chain source that errors on the first `failures` calls, then replays
/// scripted batches.
#[allow(dead_code)]
pub struct FlakySource {
    failures: usize,
    inner: ScriptedSource,
}

#[allow(dead_code)]
impl FlakySource {
    pub fn new(failures: usize, batches: Vec<Vec<RawActivity>>) -> Self {
        Self {
            failures,
            inner: ScriptedSource::new(batches),
        }
    }

    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.inner.call_counter()
    }
}

#[async_trait]
impl ChainSource for FlakySource {
    async fn fetch_latest(&self) -> anyhow::Result<Vec<RawActivity>> {
        let call = self.inner.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            anyhow::bail!("rpc node unreachable");
        }
        Ok(self.inner.batches.lock().unwrap().pop_front().unwrap_or_default())
    }
}

/// Email sender that records every handoff.
#[allow(dead_code)]
#[derive(Default)]
pub struct RecordingEmail {
    pub sent: Mutex<Vec<(String, String, String)>>,
    pub fail: bool,
}

#[allow(dead_code)]
impl RecordingEmail {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailSender for RecordingEmail {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("smtp relay unavailable");
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string(), body.to_string()));
        Ok(())
    }
}

#[allow(dead_code)]
pub fn dispatcher(store: Arc<InMemoryEventStore>, email: Arc<RecordingEmail>) -> Arc<NotificationDispatcher> {
    Arc::new(NotificationDispatcher::new(store, reqwest::Client::new(), email))
}

/// Serve `router` on an ephemeral local port.
#[allow(dead_code)]
pub async fn spawn_server(router: axum::Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind failed");
    let addr = listener.local_addr().expect("no local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server failed");
    });
    addr
}

/// Poll `check` until it holds or `timeout` elapses.
#[allow(dead_code)]
pub async fn wait_for<F: Fn() -> bool>(check: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

#[allow(dead_code)]
pub fn test_config(extra: &[(&str, &str)]) -> AppConfig {
    let mut pairs: Vec<(String, String)> = vec![("DATABASE_URL".into(), "postgres://unused".into())];
    pairs.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
    AppConfig::from_lookup(move |key: &str| {
        pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
    })
    .expect("config")
}

/// App state over an in-memory store with no live chains.
#[allow(dead_code)]
pub fn test_state(
    store: Arc<InMemoryEventStore>,
    ingestion: IngestionManager,
    config: AppConfig,
) -> AppState {
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .build_recorder()
        .handle();
    let dispatcher = Arc::new(NotificationDispatcher::new(
        store.clone(),
        reqwest::Client::new(),
        Arc::new(RecordingEmail::default()),
    ));

    AppState {
        store,
        config,
        metrics_handle,
        ingestion: Arc::new(ingestion),
        dispatcher,
    }
}
