//! PostgreSQL pool sizing and health logging.
//!
//! The API server holds one pool shared by every repository, the job worker
//! included. Pipeline runs keep a connection for the length of their graph
//! transaction, so `DB_MAX_CONNECTIONS` bounds concurrent runs plus requests.

use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, warn};

use atomic_core::{Error, Result};

/// Pool sizing and connection lifetimes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    /// How long a caller waits for a free connection.
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    /// `None` keeps connections until they go idle.
    pub max_lifetime: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Some(Duration::from_secs(1800)),
        }
    }
}

impl PoolConfig {
    /// `DB_MAX_CONNECTIONS`, `DB_MIN_CONNECTIONS`, `DB_ACQUIRE_TIMEOUT_SECS`,
    /// `DB_IDLE_TIMEOUT_SECS` and `DB_MAX_LIFETIME_SECS` (0 disables the
    /// lifetime cap). Unset or unparsable values keep the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let number = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let mut config = Self::default();

        if let Some(n) = number("DB_MAX_CONNECTIONS").and_then(|n| u32::try_from(n).ok()) {
            config.max_connections = n.max(1);
        }
        if let Some(n) = number("DB_MIN_CONNECTIONS").and_then(|n| u32::try_from(n).ok()) {
            config.min_connections = n;
        }
        if let Some(secs) = number("DB_ACQUIRE_TIMEOUT_SECS") {
            config.acquire_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = number("DB_IDLE_TIMEOUT_SECS") {
            config.idle_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = number("DB_MAX_LIFETIME_SECS") {
            config.max_lifetime = (secs > 0).then(|| Duration::from_secs(secs));
        }
        config.min_connections = config.min_connections.min(config.max_connections);
        config
    }
}

/// Open the pool and wait for its first connection.
pub async fn create_pool_with_config(database_url: &str, config: PoolConfig) -> Result<PgPool> {
    let start = Instant::now();
    debug!(
        subsystem = "database",
        component = "pool",
        op = "connect",
        ?config,
        "Opening connection pool"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .max_lifetime(config.max_lifetime)
        .connect(database_url)
        .await
        .map_err(Error::Database)?;

    info!(
        subsystem = "database",
        component = "pool",
        op = "connect",
        max_connections = config.max_connections,
        duration_ms = start.elapsed().as_millis() as u64,
        "Connection pool ready"
    );
    Ok(pool)
}

/// Called from the health endpoint. A pool with every connection checked
/// out usually means long graph transactions are piling up.
pub fn log_pool_metrics(pool: &PgPool) {
    let size = pool.size();
    let idle = pool.num_idle();
    debug!(subsystem = "database", component = "pool", pool_size = size, pool_idle = idle);
    if size > 0 && idle == 0 {
        warn!(
            subsystem = "database",
            component = "pool",
            pool_size = size,
            "All pooled connections are in use"
        );
    }
}
