//! Redis caching for read-mostly directory data.
//!
//! Values are stored as JSON under a service-wide key prefix with a TTL. Any
//! read failure is reported as a miss and the caller goes to the source of
//! truth.

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

const KEY_PREFIX: &str = "procurement";

#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    ttl: Duration,
}

impl RedisCache {
    pub async fn new(redis_url: &str, ttl_seconds: u64) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("Invalid REDIS_URL")?;
        let conn = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;

        tracing::info!(ttl_seconds, "Redis cache connected");

        Ok(Self {
            conn,
            ttl: Duration::from_secs(ttl_seconds),
        })
    }

    #[instrument(skip(self), fields(hit = tracing::field::Empty))]
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.conn.clone().get::<_, Option<String>>(namespaced(key)).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %e, "Redis read failed");
                None
            }
        };

        let value = raw.and_then(|data| {
            serde_json::from_str(&data)
                .map_err(|e| warn!(key, error = %e, "Discarding undecodable cache entry"))
                .ok()
        });

        tracing::Span::current().record("hit", value.is_some());
        value
    }

    #[instrument(skip(self, value))]
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let data = serde_json::to_string(value).context("Failed to encode cache entry")?;

        self.conn
            .clone()
            .set_ex::<_, _, ()>(namespaced(key), data, self.ttl.as_secs())
            .await
            .context("Failed to write cache entry")?;

        debug!(key, ttl_secs = self.ttl.as_secs(), "Cached");
        Ok(())
    }

    /// Returns whether an entry existed.
    #[instrument(skip(self))]
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let removed: i64 = self
            .conn
            .clone()
            .del(namespaced(key))
            .await
            .context("Failed to delete cache entry")?;
        Ok(removed > 0)
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: String = redis::cmd("PING")
            .query_async(&mut self.conn.clone())
            .await
            .context("Redis health check failed")?;
        Ok(())
    }
}

fn namespaced(key: &str) -> String {
    format!("{}:{}", KEY_PREFIX, key)
}

pub mod keys {
    /// Full supplier directory listing
    pub fn supplier_directory() -> String {
        "suppliers:directory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_namespaced() {
        assert_eq!(
            namespaced(&keys::supplier_directory()),
            "procurement:suppliers:directory"
        );
    }
}
