use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use whale_tracker::api::create_router;
use whale_tracker::config::AppConfig;
use whale_tracker::db::{self, EventStore, PgEventStore};
use whale_tracker::ingestion::{EventNormalizer, IngestionManager, ListenerContext, Thresholds};
use whale_tracker::metrics::init_metrics;
use whale_tracker::models::WhaleEvent;
use whale_tracker::pricing::{CoinGeckoClient, PriceOracle};
use whale_tracker::services::notification_worker::{run_live_dispatch, run_notification_sweep};
use whale_tracker::services::{LogEmailSender, NotificationDispatcher};
use whale_tracker::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    let addr = format!("{}:{}", config.host, config.port);
    let metrics_handle = init_metrics();

    tracing::info!("Connecting to database...");
    let pool = db::init_pool(&config.database_url).await?;
    tracing::info!("Database connected");
    let store: Arc<dyn EventStore> = Arc::new(PgEventStore::new(pool));

    let http = reqwest::Client::builder()
        .timeout(config.webhook_timeout)
        .build()?;
    let shutdown = CancellationToken::new();

    // --- Pricing + normalization ---
    let coingecko = CoinGeckoClient::new(
        http.clone(),
        config.coingecko_api_url.clone(),
        config.coingecko_api_key.clone(),
    );
    let oracle = Arc::new(PriceOracle::new(Arc::new(coingecko), config.price_cache_ttl));
    let normalizer = Arc::new(EventNormalizer::new(oracle));

    // --- Notifications: live dispatch + sweep ---
    let dispatcher = Arc::new(NotificationDispatcher::new(
        Arc::clone(&store),
        http.clone(),
        Arc::new(LogEmailSender),
    ));

    let event_tx = if config.notifications_enabled {
        let (tx, rx) = mpsc::channel::<WhaleEvent>(1000);
        tokio::spawn(run_live_dispatch(rx, Arc::clone(&dispatcher), shutdown.clone()));
        tokio::spawn(run_notification_sweep(
            Arc::clone(&store),
            Arc::clone(&dispatcher),
            config.notification_sweep_interval,
            config.notification_sweep_window,
            config.notification_sweep_batch,
            shutdown.clone(),
        ));
        Some(tx)
    } else {
        tracing::info!("Notifications disabled (NOTIFICATIONS_ENABLED=false)");
        None
    };

    // --- Ingestion ---
    let ctx = ListenerContext {
        normalizer,
        store: Arc::clone(&store),
        thresholds: Thresholds {
            whale_usd: config.whale_threshold_usd,
            liquidity_usd: config.liquidity_threshold_usd,
        },
        event_tx,
    };
    let ingestion = Arc::new(IngestionManager::from_config(&config.chains, http, ctx));

    let missing = config.missing_endpoints();
    if !missing.is_empty() {
        tracing::warn!(missing = ?missing, "Some chain RPC endpoints are not configured");
    }
    if config.ingestion_autostart {
        ingestion.start_all();
    } else {
        tracing::info!("Ingestion idle until POST /api/ingestion/start");
    }

    let state = AppState {
        store,
        config,
        metrics_handle,
        ingestion: Arc::clone(&ingestion),
        dispatcher,
    };
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {addr}");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    ingestion.stop_all();
    shutdown.cancel();
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(EnvFilter::from_default_env());

    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}
