//! Upstream Selector: an ordered backend pool plus a periodic health-check
//! loop that maintains a single lock-free "current" index. Grounded on
//! `internal/backend/switcher.go` (the pool/failover logic) and
//! `internal/backend/eth_client.go` (the per-backend JSON-RPC client).

pub mod eth_client;

use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::config::{BackendConfig, BackendType};
use crate::errors::{ChaindError, ChaindResult};
use crate::jsonrpc;

pub use eth_client::EthClient;

const HEALTH_CHECK_TICK: Duration = Duration::from_secs(1);
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const PROBE_MAX_ATTEMPTS: u32 = 3;
const PROBE_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Eth,
}

#[derive(Debug, Clone)]
pub struct Backend {
    pub name: String,
    pub url: String,
    pub kind: BackendKind,
}

/// Ordered pool of backends for a single kind plus the atomic "current"
/// index. `-1` means no healthy backend.
struct BackendPool {
    backends: Vec<Backend>,
    current_index: AtomicI32,
}

impl BackendPool {
    fn new(mut backends: Vec<Backend>, primary_idx: Option<usize>) -> Self {
        if let Some(idx) = primary_idx {
            backends.swap(0, idx);
        }
        let current_index = if backends.is_empty() { -1 } else { 0 };
        Self {
            backends,
            current_index: AtomicI32::new(current_index),
        }
    }
}

pub struct Selector {
    eth: BackendPool,
    http: reqwest::Client,
    shutdown: Notify,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Selector {
    pub fn new(backends: &[BackendConfig]) -> Self {
        let mut eth_backends = Vec::new();
        let mut primary_idx = None;
        for cfg in backends {
            if cfg.kind == BackendType::Eth {
                if cfg.main {
                    primary_idx = Some(eth_backends.len());
                }
                eth_backends.push(Backend {
                    name: cfg.name.clone(),
                    url: cfg.url.clone(),
                    kind: BackendKind::Eth,
                });
            }
        }

        let http = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .expect("reqwest client builds with static config");

        Self {
            eth: BackendPool::new(eth_backends, primary_idx),
            http,
            shutdown: Notify::new(),
            task: tokio::sync::Mutex::new(None),
        }
    }

    /// Performs an initial synchronous sweep, then launches the periodic
    /// health loop as a background task.
    pub async fn start(self: &std::sync::Arc<Self>) -> ChaindResult<()> {
        tracing::info!("performing initial health checks on startup");
        self.health_check_tick().await;

        let this = std::sync::Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(HEALTH_CHECK_TICK);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => this.health_check_tick().await,
                    _ = this.shutdown.notified() => return,
                }
            }
        });
        *self.task.lock().await = Some(handle);
        Ok(())
    }

    pub async fn stop(&self) -> ChaindResult<()> {
        self.shutdown.notify_one();
        if let Some(handle) = self.task.lock().await.take() {
            let _ = handle.await;
        }
        Ok(())
    }

    /// O(1) lock-free read of the current index.
    pub fn backend_for(&self, kind: BackendKind) -> ChaindResult<Backend> {
        match kind {
            BackendKind::Eth => {
                let idx = self.eth.current_index.load(Ordering::Acquire);
                if idx == -1 {
                    return Err(ChaindError::NoBackend("eth".to_string()));
                }
                Ok(self.eth.backends[idx as usize].clone())
            }
        }
    }

    pub fn eth_client(&self) -> ChaindResult<EthClient> {
        let backend = self.backend_for(BackendKind::Eth)?;
        Ok(EthClient::new(backend.url))
    }

    /// Re-scans the whole pool once `current_index == -1` instead of
    /// freezing (DESIGN.md open question 1).
    async fn health_check_tick(&self) {
        let len = self.eth.backends.len() as i32;
        if len == 0 {
            return;
        }

        let idx = self.eth.current_index.load(Ordering::Acquire);
        let start = if idx == -1 { 0 } else { idx };

        let mut probe_idx = start;
        loop {
            let backend = &self.eth.backends[probe_idx as usize];
            tracing::debug!(name = %backend.name, url = %backend.url, "performing healthcheck");
            if self.probe_with_backoff(backend).await {
                tracing::debug!(name = %backend.name, "backend is ok");
                if probe_idx != idx {
                    crate::metrics::SELECTOR_FAILOVERS.inc();
                }
                self.eth.current_index.store(probe_idx, Ordering::Release);
                return;
            }
            tracing::warn!(name = %backend.name, "backend is unhealthy, trying another");

            probe_idx = (probe_idx + 1) % len;
            if probe_idx == start {
                tracing::error!("no more backends to try");
                self.eth.current_index.store(-1, Ordering::Release);
                return;
            }
        }
    }

    async fn probe_with_backoff(&self, backend: &Backend) -> bool {
        for attempt in 0..PROBE_MAX_ATTEMPTS {
            if self.probe(backend).await {
                return true;
            }
            if attempt + 1 < PROBE_MAX_ATTEMPTS {
                tokio::time::sleep(PROBE_BACKOFF).await;
            }
        }
        false
    }

    /// A probe succeeds iff the backend returns HTTP 200 with a valid
    /// JSON-RPC body whose `result` is the literal JSON `false` — a
    /// sync-status object (returned while catching up) must not pass.
    async fn probe(&self, backend: &Backend) -> bool {
        let id = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let body = jsonrpc::syncing_probe_body(id);

        let response = match self.http.post(&backend.url).json(&body).send().await {
            Ok(res) if res.status().is_success() => res,
            _ => return false,
        };

        let parsed: serde_json::Value = match response.json().await {
            Ok(v) => v,
            Err(_) => return false,
        };

        parsed.get("result") == Some(&serde_json::Value::Bool(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(name: &str) -> Backend {
        Backend {
            name: name.to_string(),
            url: format!("http://{name}.invalid"),
            kind: BackendKind::Eth,
        }
    }

    #[test]
    fn pool_moves_primary_to_index_zero() {
        let pool = BackendPool::new(vec![backend("a"), backend("b")], Some(1));
        assert_eq!(pool.backends[0].name, "b");
        assert_eq!(pool.current_index.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn empty_pool_starts_at_negative_one() {
        let pool = BackendPool::new(vec![], None);
        assert_eq!(pool.current_index.load(Ordering::Relaxed), -1);
    }
}
