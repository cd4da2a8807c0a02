//! KV Cache capability interface. Grounded on `internal/cache/cacher.go`;
//! `RedisCache` is the reference implementation, grounded on
//! `internal/cache/redis_cacher.go`.

pub mod redis_cache;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::ChaindResult;

pub use redis_cache::RedisCache;

pub type CacheableMap = HashMap<String, Vec<u8>>;

/// Opaque byte-store with TTL, field-map, exists, and delete operations.
/// Errors are reported, never retried at this layer — retry policy, if
/// any, belongs to the caller.
#[async_trait]
pub trait KvCache: Send + Sync {
    async fn start(&self) -> ChaindResult<()>;
    async fn stop(&self) -> ChaindResult<()>;

    /// Returns `None` for a missing key.
    async fn get(&self, key: &str) -> ChaindResult<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: &[u8]) -> ChaindResult<()>;
    /// `ttl` below one second is honored with millisecond precision.
    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> ChaindResult<()>;
    async fn has(&self, key: &str) -> ChaindResult<bool>;
    async fn map_get(&self, key: &str, field: &str) -> ChaindResult<Option<Vec<u8>>>;
    /// Atomic: all fields become visible together, and `ttl` applies to
    /// the whole key.
    async fn map_set_ex(&self, key: &str, vals: CacheableMap, ttl: Duration) -> ChaindResult<()>;
    async fn del(&self, key: &str) -> ChaindResult<()>;
}
