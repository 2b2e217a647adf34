use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::PgPool;
use url::Url;

const DEFAULT_MIN_CONNECTIONS: u32 = 1;
const DEFAULT_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub min_connections: u32,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: DEFAULT_MIN_CONNECTIONS,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout_secs: DEFAULT_ACQUIRE_TIMEOUT_SECS,
        }
    }
}

impl PoolConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

pub async fn create_pg_pool(database_url: &str, config: &PoolConfig) -> Result<PgPool> {
    let connect_options = database_url
        .parse::<PgConnectOptions>()
        .context("failed to parse PostgreSQL connection options")?;
    ensure_postgres_tls(&connect_options)?;

    tracing::debug!(
        url = %redact_database_url(database_url),
        max_connections = config.max_connections,
        "connecting to postgres"
    );

    PgPoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections.max(config.min_connections).max(1))
        .acquire_timeout(config.acquire_timeout())
        .connect_with(connect_options)
        .await
        .with_context(|| format!("failed to connect to {}", redact_database_url(database_url)))
}

/// Remote hosts must use TLS. Loopback connections may go without it.
fn ensure_postgres_tls(options: &PgConnectOptions) -> Result<()> {
    if is_loopback(options.get_host()) {
        return Ok(());
    }
    match options.get_ssl_mode() {
        PgSslMode::Require | PgSslMode::VerifyCa | PgSslMode::VerifyFull => Ok(()),
        mode => bail!(
            "PostgreSQL connection to {} must require TLS; got sslmode={mode:?}. Set sslmode=require (or stricter).",
            options.get_host()
        ),
    }
}

fn is_loopback(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "::1") || host.starts_with('/')
}

/// Strip the password from a database URL so it can be logged.
pub fn redact_database_url(database_url: &str) -> String {
    match Url::parse(database_url) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("***"));
            }
            url.to_string()
        }
        Err(_) => "<unparseable database url>".to_string(),
    }
}

pub async fn check_pool_health(pool: &PgPool) -> Result<()> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await
        .context("PostgreSQL health check failed")?;

    Ok(())
}
