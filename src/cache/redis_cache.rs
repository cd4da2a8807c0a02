use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::OnceCell;

use crate::config::RedisConfig;
use crate::errors::ChaindResult;

use super::{CacheableMap, KvCache};

/// Redis-backed `KvCache`. Uses a multiplexed, auto-reconnecting
/// `ConnectionManager` rather than a connection pool, matching the
/// single-shared-client shape of `internal/cache/redis_cacher.go`'s
/// `*redis.Client` (the Go client multiplexes internally too).
pub struct RedisCache {
    url: String,
    conn: OnceCell<ConnectionManager>,
}

impl RedisCache {
    pub fn new(cfg: &RedisConfig) -> Self {
        let url = build_url(cfg);
        Self {
            url,
            conn: OnceCell::new(),
        }
    }

    async fn connection(&self) -> ChaindResult<ConnectionManager> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                let client = redis::Client::open(self.url.as_str())?;
                ConnectionManager::new(client).await
            })
            .await?;
        Ok(conn.clone())
    }
}

/// Builds the connection URL, percent-encoding the password via
/// `url::Url::set_password` so characters like `@`, `:`, or `/` in the
/// configured password can't be misread as the host/authority boundary.
fn build_url(cfg: &RedisConfig) -> String {
    let base = format!("redis://{}/{}", cfg.url, cfg.db);
    if cfg.password.is_empty() {
        return base;
    }

    match url::Url::parse(&base) {
        Ok(mut url) if url.set_password(Some(&cfg.password)).is_ok() => url.to_string(),
        _ => {
            tracing::warn!("failed to percent-encode redis password, using it verbatim");
            format!("redis://:{}@{}/{}", cfg.password, cfg.url, cfg.db)
        }
    }
}

#[async_trait]
impl KvCache for RedisCache {
    async fn start(&self) -> ChaindResult<()> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn stop(&self) -> ChaindResult<()> {
        // `ConnectionManager` has no explicit close; dropping it tears down
        // the underlying multiplexed connection.
        Ok(())
    }

    async fn get(&self, key: &str) -> ChaindResult<Option<Vec<u8>>> {
        let mut conn = self.connection().await?;
        Ok(conn.get(key).await?)
    }

    async fn set(&self, key: &str, value: &[u8]) -> ChaindResult<()> {
        let mut conn = self.connection().await?;
        let _: () = conn.set(key, value).await?;
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> ChaindResult<()> {
        let mut conn = self.connection().await?;
        let millis = ttl.as_millis() as u64;
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(millis)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn has(&self, key: &str) -> ChaindResult<bool> {
        let mut conn = self.connection().await?;
        let count: i64 = conn.exists(key).await?;
        Ok(count == 1)
    }

    async fn map_get(&self, key: &str, field: &str) -> ChaindResult<Option<Vec<u8>>> {
        let mut conn = self.connection().await?;
        Ok(conn.hget(key, field).await?)
    }

    async fn map_set_ex(&self, key: &str, vals: CacheableMap, ttl: Duration) -> ChaindResult<()> {
        let mut conn = self.connection().await?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (field, value) in vals {
            pipe.hset(key, field, value).ignore();
        }
        if ttl < Duration::from_secs(1) {
            pipe.pexpire(key, ttl.as_millis() as i64).ignore();
        } else {
            pipe.expire(key, ttl.as_secs() as i64).ignore();
        }
        pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> ChaindResult<()> {
        let mut conn = self.connection().await?;
        let _: () = conn.del(key).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(password: &str) -> RedisConfig {
        RedisConfig {
            url: "127.0.0.1:6379".to_string(),
            password: password.to_string(),
            db: 0,
        }
    }

    #[test]
    fn build_url_without_password() {
        assert_eq!(build_url(&cfg("")), "redis://127.0.0.1:6379/0");
    }

    #[test]
    fn build_url_percent_encodes_special_characters_in_password() {
        let url = build_url(&cfg("p@ss:word/1"));
        assert_eq!(url, "redis://:p%40ss%3Aword%2F1@127.0.0.1:6379/0");
    }
}
