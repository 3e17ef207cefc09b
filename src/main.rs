use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hiveboard::config::Config;
use hiveboard::state::AppState;
use hiveboard::{http, retention};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hiveboard=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    let cors = match &config.allowed_origins {
        Some(origins) => {
            let allowed: Vec<_> = origins.iter().filter_map(|s| s.parse().ok()).collect();
            if allowed.is_empty() {
                tracing::warn!("CORS: ALLOWED_ORIGINS was set but no valid origins could be parsed — defaulting to permissive");
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                tracing::info!("CORS: restricting to {} origin(s)", allowed.len());
                CorsLayer::new().allow_origin(allowed).allow_methods(Any).allow_headers(Any)
            }
        }
        None => {
            tracing::warn!("CORS: no ALLOWED_ORIGINS set — defaulting to permissive (allow all) for dev mode");
            CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
        }
    };

    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(AppState::new(config).await);

    retention::spawn_daily(state.storage.clone(), Arc::new(state.config.clone()));
    spawn_status_sweep(state.clone());

    let app = http::router(state).layer(cors);

    let addr: SocketAddr = bind_addr.parse()?;
    tracing::info!("HiveBoard listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Periodic sweep so an agent can be observed going `stuck`
/// purely from elapsed time, without a new event to trigger the check in
/// `ingest`.
fn spawn_status_sweep(state: Arc<AppState>) {
    const SWEEP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(15);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let now = chrono::Utc::now();
            let tenants = match state.storage.list_tenants().await {
                Ok(t) => t,
                Err(e) => {
                    tracing::error!(error = %e, "status sweep: failed to list tenants");
                    continue;
                }
            };
            for tenant in tenants {
                let agents = match state
                    .storage
                    .list_agents(&tenant.tenant_id, hiveboard::storage::AgentFilter::default())
                    .await
                {
                    Ok(a) => a,
                    Err(e) => {
                        tracing::error!(error = %e, tenant_id = %tenant.tenant_id, "status sweep: failed to list agents");
                        continue;
                    }
                };
                for agent in &agents {
                    state.status_tracker.check_and_emit(&state.ws_registry, agent, now).await;
                }
            }
        }
    });
}
