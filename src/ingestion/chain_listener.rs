use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use metrics::{counter, gauge};
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use super::normalizer::EventNormalizer;
use super::ChainSource;
use crate::db::EventStore;
use crate::models::{
    ChainFamily, EventType, NewWhaleEvent, RawActivity, RawLiquidity, RawTransfer, WhaleEvent,
};

/// USD thresholds an event must meet to be persisted.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub whale_usd: Decimal,
    pub liquidity_usd: Decimal,
}

impl Thresholds {
    pub fn for_event(&self, event_type: EventType) -> Decimal {
        if event_type.is_liquidity() {
            self.liquidity_usd
        } else {
            self.whale_usd
        }
    }
}

/// Outcome of processing one raw record.
#[derive(Debug, Clone)]
pub enum Ingested {
    Stored(WhaleEvent),
    Duplicate,
    BelowThreshold { usd_value: Decimal },
}

/// Counters for one poll iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub fetched: usize,
    pub stored: usize,
    pub duplicates: usize,
    pub below_threshold: usize,
    pub failed: usize,
}

/// A per-chain ingestion unit with a start/stop lifecycle.
#[async_trait]
pub trait ChainListener: Send + Sync {
    fn chain(&self) -> &str;

    fn family(&self) -> ChainFamily;

    /// Spawn the polling loop. No-op if it is already running.
    fn start(&self);

    /// Signal the loop to exit at its next check. An in-flight fetch is
    /// allowed to finish.
    fn stop(&self);

    fn is_running(&self) -> bool;

    /// Run a single fetch-normalize-filter-persist pass.
    async fn poll_once(&self) -> anyhow::Result<PollSummary>;

    async fn process_transfer_event(&self, transfer: &RawTransfer) -> anyhow::Result<Ingested>;

    async fn process_liquidity_event(&self, liquidity: &RawLiquidity) -> anyhow::Result<Ingested>;
}

/// Shared collaborators handed to every listener.
#[derive(Clone)]
pub struct ListenerContext {
    pub normalizer: Arc<EventNormalizer>,
    pub store: Arc<dyn EventStore>,
    pub thresholds: Thresholds,
    /// Newly stored events are forwarded here for live notification. A full
    /// channel drops the hand-off; the sweep worker covers those events.
    pub event_tx: Option<mpsc::Sender<WhaleEvent>>,
}

struct RunningTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl RunningTask {
    fn is_live(&self) -> bool {
        !self.cancel.is_cancelled() && !self.handle.is_finished()
    }
}

struct ListenerInner<S> {
    chain: String,
    family: ChainFamily,
    poll_interval: Duration,
    source: S,
    ctx: ListenerContext,
}

/// Polling listener over a chain-family specific [`ChainSource`].
pub struct PollingListener<S> {
    inner: Arc<ListenerInner<S>>,
    task: Mutex<Option<RunningTask>>,
}

impl<S: ChainSource + 'static> PollingListener<S> {
    pub fn new(
        chain: impl Into<String>,
        family: ChainFamily,
        poll_interval: Duration,
        source: S,
        ctx: ListenerContext,
    ) -> Self {
        Self {
            inner: Arc::new(ListenerInner {
                chain: chain.into(),
                family,
                poll_interval,
                source,
                ctx,
            }),
            task: Mutex::new(None),
        }
    }

    fn task(&self) -> MutexGuard<'_, Option<RunningTask>> {
        self.task.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl<S: ChainSource + 'static> ChainListener for PollingListener<S> {
    fn chain(&self) -> &str {
        &self.inner.chain
    }

    fn family(&self) -> ChainFamily {
        self.inner.family
    }

    fn start(&self) {
        let mut task = self.task();
        if task.as_ref().is_some_and(RunningTask::is_live) {
            tracing::debug!(chain = %self.inner.chain, "Listener already running");
            return;
        }

        let cancel = CancellationToken::new();
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(inner.run(cancel.clone()));
        *task = Some(RunningTask { cancel, handle });

        tracing::info!(
            chain = %self.inner.chain,
            family = %self.inner.family,
            poll_ms = self.inner.poll_interval.as_millis() as u64,
            "Chain listener started"
        );
    }

    fn stop(&self) {
        if let Some(task) = self.task().take() {
            task.cancel.cancel();
            tracing::info!(chain = %self.inner.chain, "Chain listener stopping");
        }
    }

    fn is_running(&self) -> bool {
        self.task().as_ref().is_some_and(RunningTask::is_live)
    }

    async fn poll_once(&self) -> anyhow::Result<PollSummary> {
        self.inner.poll_once().await
    }

    async fn process_transfer_event(&self, transfer: &RawTransfer) -> anyhow::Result<Ingested> {
        self.inner.process_transfer(transfer).await
    }

    async fn process_liquidity_event(&self, liquidity: &RawLiquidity) -> anyhow::Result<Ingested> {
        self.inner.process_liquidity(liquidity).await
    }
}

impl<S: ChainSource> ListenerInner<S> {
    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        gauge!("chain_listeners_running").increment(1.0);

        loop {
            if cancel.is_cancelled() {
                break;
            }

            match self.poll_once().await {
                Ok(summary) if summary.stored > 0 => {
                    tracing::info!(
                        chain = %self.chain,
                        fetched = summary.fetched,
                        stored = summary.stored,
                        duplicates = summary.duplicates,
                        "Poll stored new whale events"
                    );
                }
                Ok(summary) => {
                    tracing::debug!(chain = %self.chain, fetched = summary.fetched, "Poll complete");
                }
                Err(e) => {
                    counter!("chain_poll_errors_total", "chain" => self.chain.clone()).increment(1);
                    tracing::error!(error = %e, chain = %self.chain, "Chain poll failed");
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(self.poll_interval) => {}
            }
        }

        gauge!("chain_listeners_running").decrement(1.0);
        tracing::info!(chain = %self.chain, "Chain listener stopped");
    }

    async fn poll_once(&self) -> anyhow::Result<PollSummary> {
        let activities = self.source.fetch_latest().await?;
        let mut summary = PollSummary {
            fetched: activities.len(),
            ..Default::default()
        };

        for activity in &activities {
            let result = match activity {
                RawActivity::Transfer(t) => self.process_transfer(t).await,
                RawActivity::Liquidity(l) => self.process_liquidity(l).await,
            };

            match result {
                Ok(Ingested::Stored(_)) => summary.stored += 1,
                Ok(Ingested::Duplicate) => summary.duplicates += 1,
                Ok(Ingested::BelowThreshold { .. }) => summary.below_threshold += 1,
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(
                        error = %e,
                        chain = %self.chain,
                        tx_hash = %activity.hash(),
                        "Failed to process chain activity"
                    );
                }
            }
        }

        Ok(summary)
    }

    async fn process_transfer(&self, transfer: &RawTransfer) -> anyhow::Result<Ingested> {
        let event = self
            .ctx
            .normalizer
            .normalize_transfer(&self.chain, self.family, transfer)
            .await?;
        self.ingest(event).await
    }

    async fn process_liquidity(&self, liquidity: &RawLiquidity) -> anyhow::Result<Ingested> {
        let event = self.ctx.normalizer.normalize_liquidity(&self.chain, liquidity)?;
        self.ingest(event).await
    }

    /// Apply the threshold, then insert with dedup on transaction hash.
    async fn ingest(&self, event: NewWhaleEvent) -> anyhow::Result<Ingested> {
        let threshold = self.ctx.thresholds.for_event(event.event_type);
        if event.usd_value < threshold {
            counter!("whale_events_below_threshold_total", "chain" => self.chain.clone()).increment(1);
            tracing::trace!(
                chain = %self.chain,
                tx_hash = %event.transaction_hash,
                usd_value = %event.usd_value,
                "Below threshold, skipping"
            );
            return Ok(Ingested::BelowThreshold {
                usd_value: event.usd_value,
            });
        }

        let Some(stored) = self.ctx.store.insert_event_if_absent(&event).await? else {
            counter!("whale_events_duplicate_total", "chain" => self.chain.clone()).increment(1);
            tracing::debug!(
                chain = %self.chain,
                tx_hash = %event.transaction_hash,
                "Duplicate transaction hash, ignored"
            );
            return Ok(Ingested::Duplicate);
        };

        counter!(
            "whale_events_ingested_total",
            "chain" => self.chain.clone(),
            "event_type" => stored.event_type.as_str()
        )
        .increment(1);
        tracing::info!(
            chain = %self.chain,
            event_type = %stored.event_type,
            tx_hash = %stored.transaction_hash,
            usd_value = %stored.usd_value.round_dp(2),
            "Whale event stored"
        );

        if let Some(tx) = &self.ctx.event_tx {
            match tx.try_send(stored.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(event)) => {
                    counter!("live_dispatch_dropped_total", "chain" => self.chain.clone()).increment(1);
                    tracing::warn!(
                        chain = %self.chain,
                        tx_hash = %event.transaction_hash,
                        "Notification channel full, sweep will pick the event up"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::warn!(chain = %self.chain, "Notification channel closed, sweep will pick the event up");
                }
            }
        }

        Ok(Ingested::Stored(stored))
    }
}
