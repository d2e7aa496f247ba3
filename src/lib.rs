pub mod api;
pub mod config;
pub mod db;
pub mod errors;
pub mod ingestion;
pub mod metrics;
pub mod models;
pub mod pricing;
pub mod services;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::EventStore;
use crate::ingestion::IngestionManager;
use crate::services::NotificationDispatcher;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EventStore>,
    pub config: AppConfig,
    pub metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
    pub ingestion: Arc<IngestionManager>,
    pub dispatcher: Arc<NotificationDispatcher>,
}
