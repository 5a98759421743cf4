use sqlx::PgPool;
use std::time::Duration;
use tracing::{info, warn};

use crate::catalog::utils::quote_ident;
use crate::error::{PgmergeError, Result};

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(200),
        }
    }
}

/// Connect with a handful of retries, tolerating transient startup/network issues.
pub async fn connect_with_retry(url: &str) -> Result<PgPool> {
    connect_with_retry_config(url, &ConnectionConfig::default()).await
}

pub async fn connect_with_retry_config(url: &str, config: &ConnectionConfig) -> Result<PgPool> {
    let mut last_error = None;

    for attempt in 0..=config.max_retries {
        match PgPool::connect(url).await {
            Ok(pool) => {
                if attempt > 0 {
                    info!("connected to database after {} retries", attempt);
                }
                return Ok(pool);
            }
            Err(e) => {
                last_error = Some(e);
                if attempt < config.max_retries {
                    warn!("database connection failed, retrying...");
                    tokio::time::sleep(config.retry_delay).await;
                }
            }
        }
    }

    Err(PgmergeError::CatalogError(format!(
        "failed to connect to database after {} attempts: {}",
        config.max_retries + 1,
        last_error.unwrap()
    )))
}

/// Force the session into the schema search path and UTF-8 client encoding the core
/// relies on (spec §4.5/§4.7: encoding is forced to UTF-8, warn + reset if not).
pub async fn initialize_session(pool: &PgPool, schema: &str) -> Result<()> {
    sqlx::query(&format!("SET search_path = {}, pg_catalog", quote_ident(schema)))
        .execute(pool)
        .await?;

    let encoding: (String,) = sqlx::query_as("SHOW client_encoding").fetch_one(pool).await?;
    if !encoding.0.eq_ignore_ascii_case("UTF8") {
        warn!(
            "client_encoding was {}, resetting session to UTF8",
            encoding.0
        );
        sqlx::query("SET client_encoding = 'UTF8'").execute(pool).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_connection_config() {
        let config = ConnectionConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay, Duration::from_millis(200));
    }
}
