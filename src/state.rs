use std::sync::Arc;

use crate::auth::RateLimiters;
use crate::config::Config;
use crate::storage::memory::InMemoryStorage;
use crate::storage::StorageBackend;
use crate::ws::{Registry, StatusTracker};

/// The global application state shared across every handler via Axum
/// `State`: one storage trait object, one WS registry, and the shared
/// HTTP client used for outbound webhook delivery.
pub struct AppState {
    pub storage: Arc<dyn StorageBackend>,
    pub ws_registry: Arc<Registry>,
    pub status_tracker: Arc<StatusTracker>,
    pub rate_limiters: RateLimiters,
    pub http_client: reqwest::Client,
    pub config: Config,
}

impl AppState {
    pub async fn new(config: Config) -> Self {
        let storage: Arc<dyn StorageBackend> = Arc::new(InMemoryStorage::load(&config.data_dir).await);
        let rate_limiters = RateLimiters::new(config.rate_limit_ingest_rps, config.rate_limit_query_rps);

        let http_client = reqwest::Client::builder()
            .timeout(config.webhook_timeout)
            .build()
            .expect("failed to build shared HTTP client");

        Self {
            storage,
            ws_registry: Arc::new(Registry::new()),
            status_tracker: Arc::new(StatusTracker::new()),
            rate_limiters,
            http_client,
            config,
        }
    }
}
