use std::time::Duration;

/// Runtime settings the core reads. Loaded once in `main` from `.env` plus
/// the process environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub data_dir: std::path::PathBuf,
    pub jwt_secret: String,
    pub rate_limit_ingest_rps: u32,
    pub rate_limit_query_rps: u32,
    pub heartbeat_compaction_hours: i64,
    pub aggregate_retention_days: i64,
    pub webhook_timeout: Duration,
    pub allowed_origins: Option<Vec<String>>,
}

impl Config {
    pub fn from_env() -> Self {
        if dotenvy::dotenv().is_err() {
            tracing::warn!("no .env file found, relying on system environment variables");
        }

        let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string());

        let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
            if cfg!(debug_assertions) {
                tracing::warn!(
                    "JWT_SECRET not set. Using an insecure dev secret. Do not deploy like this."
                );
                "hiveboard-dev-secret-do-not-use-in-prod".to_string()
            } else {
                panic!(
                    "FATAL: JWT_SECRET environment variable is not set. \
                     The server cannot start without a secure signing secret."
                );
            }
        });

        let rate_limit_ingest_rps = std::env::var("RATE_LIMIT_INGEST_RPS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(100);
        let rate_limit_query_rps = std::env::var("RATE_LIMIT_QUERY_RPS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);
        let heartbeat_compaction_hours = std::env::var("HEARTBEAT_COMPACTION_HOURS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(24);
        let aggregate_retention_days = std::env::var("AGGREGATE_RETENTION_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(90);
        let webhook_timeout_secs: u64 = std::env::var("WEBHOOK_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);

        let allowed_origins = match std::env::var("ALLOWED_ORIGINS") {
            Ok(origins) if !origins.trim().is_empty() => {
                Some(origins.split(',').map(|s| s.trim().to_string()).collect())
            }
            _ => None,
        };

        Self {
            bind_addr,
            data_dir: data_dir.into(),
            jwt_secret,
            rate_limit_ingest_rps,
            rate_limit_query_rps,
            heartbeat_compaction_hours,
            aggregate_retention_days,
            webhook_timeout: Duration::from_secs(webhook_timeout_secs),
            allowed_origins,
        }
    }
}
