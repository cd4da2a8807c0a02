//! Top-level orchestration: builds every subsystem, wires them together,
//! serves HTTP, and shuts down in the order `internal/start.go` uses
//! (switcher -> cacher -> watcher -> proxy -> warmer). The `spawn` +
//! background-future shape is grounded on `web3_proxy/src/app.rs`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::post;
use axum::{Extension, Router};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use crate::audit::{Auditor, LogAuditor};
use crate::cache::{KvCache, RedisCache};
use crate::config::Config;
use crate::eth_store::EthStore;
use crate::router::{self, RouterState};
use crate::selector::Selector;
use crate::warmer::Warmer;
use crate::watcher::Watcher;

pub struct App {
    pub selector: Arc<Selector>,
    pub cache: Arc<dyn KvCache>,
    pub watcher: Arc<Watcher>,
    pub warmer: Arc<Warmer>,
    http_shutdown: Arc<Notify>,
    http_task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

/// Graceful HTTP shutdown deadline, matching `internal/proxy/proxy.go`'s
/// `context.WithTimeout(..., 5*time.Second)`.
const HTTP_SHUTDOWN_DEADLINE: Duration = Duration::from_secs(5);

impl App {
    /// Builds and starts every subsystem, then returns the running `App`
    /// plus a future that resolves when the HTTP server (and, if enabled,
    /// the metrics server) exits.
    pub async fn spawn(
        config: Config,
    ) -> anyhow::Result<(Arc<App>, JoinHandle<anyhow::Result<()>>)> {
        config.validate()?;

        let selector = Arc::new(Selector::new(&config.backends));
        selector.start().await?;

        if config.enable_prometheus {
            tokio::spawn(async {
                if let Err(err) = crate::metrics::serve().await {
                    tracing::error!(%err, "metrics server exited");
                }
            });
        }

        let redis_cfg = config
            .redis
            .clone()
            .ok_or_else(|| anyhow::anyhow!("redis configuration is required"))?;
        let cache: Arc<dyn KvCache> = Arc::new(RedisCache::new(&redis_cfg));
        cache.start().await?;

        let auditor: Arc<dyn Auditor> = match &config.log_auditor {
            Some(cfg) => Arc::new(LogAuditor::new(cfg)),
            None => return Err(anyhow::anyhow!("no log auditor config defined")),
        };

        let watcher = Arc::new(Watcher::new(Arc::clone(&selector)));
        watcher.start().await?;

        let store = Arc::new(EthStore::new(Arc::clone(&cache), Arc::clone(&watcher)));

        let warmer = Arc::new(Warmer::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            Arc::clone(&watcher),
            Arc::clone(&selector),
        ));
        warmer.start().await?;

        let enabled_apis = config
            .eth
            .as_ref()
            .map(|eth| eth.apis.clone())
            .unwrap_or_default();
        let eth_path = config
            .eth
            .as_ref()
            .map(|eth| eth.path.clone())
            .unwrap_or_else(|| "eth".to_string());

        let router_state = Arc::new(RouterState::new(
            Arc::clone(&selector),
            Arc::clone(&store),
            auditor,
            enabled_apis,
        ));

        let app = Router::new()
            .route(&format!("/{eth_path}"), post(router::handle_eth_request))
            .layer(Extension(router_state))
            .layer(TraceLayer::new_for_http());

        let addr = SocketAddr::from(([0, 0, 0, 0], config.rpc_port));
        tracing::info!(%addr, "started");

        let http_shutdown = Arc::new(Notify::new());
        let (exited_tx, exited_rx) = tokio::sync::oneshot::channel::<anyhow::Result<()>>();

        let shutdown_for_server = Arc::clone(&http_shutdown);
        let server_task: JoinHandle<()> = tokio::spawn(async move {
            let result = axum::Server::bind(&addr)
                .serve(app.into_make_service())
                .with_graceful_shutdown(async move {
                    shutdown_for_server.notified().await;
                })
                .await
                .map_err(anyhow::Error::from);
            let _ = exited_tx.send(result);
        });

        let app = Arc::new(App {
            selector,
            cache,
            watcher,
            warmer,
            http_shutdown,
            http_task: tokio::sync::Mutex::new(Some(server_task)),
        });

        // Re-exposed to the caller so it can detect an unexpected exit of
        // the HTTP server (e.g. a bind failure surfacing asynchronously),
        // mirroring `web3_proxy::app::Web3ProxyApp::spawn`'s returned future.
        let watch_handle: JoinHandle<anyhow::Result<()>> = tokio::spawn(async move {
            match exited_rx.await {
                Ok(result) => result,
                Err(_) => Ok(()),
            }
        });

        Ok((app, watch_handle))
    }

    /// Stops every subsystem in the order the original process does:
    /// selector, cache, watcher, proxy, warmer. Each `stop` is idempotent.
    pub async fn shutdown(&self) {
        tracing::info!("interrupted, shutting down");
        if let Err(err) = self.selector.stop().await {
            tracing::error!(%err, "failed to stop backend switch");
        }
        if let Err(err) = self.cache.stop().await {
            tracing::error!(%err, "failed to stop cacher");
        }
        if let Err(err) = self.watcher.stop().await {
            tracing::error!(%err, "failed to stop finalization helper");
        }
        self.stop_http().await;
        if let Err(err) = self.warmer.stop().await {
            tracing::error!(%err, "failed to stop cache warmer");
        }
        tracing::info!("goodbye");
    }

    /// Signals the HTTP server to drain in-flight requests and waits up to
    /// `HTTP_SHUTDOWN_DEADLINE` before giving up, matching
    /// `internal/proxy/proxy.go`'s 5s `context.WithTimeout` shutdown.
    async fn stop_http(&self) {
        self.http_shutdown.notify_one();

        let handle = self.http_task.lock().await.take();
        let Some(handle) = handle else {
            return;
        };

        match tokio::time::timeout(HTTP_SHUTDOWN_DEADLINE, handle).await {
            Ok(Ok(())) => tracing::info!("proxy server shut down cleanly"),
            Ok(Err(err)) => tracing::error!(%err, "proxy server task panicked"),
            Err(_) => tracing::warn!(
                deadline_secs = HTTP_SHUTDOWN_DEADLINE.as_secs(),
                "proxy server did not shut down within deadline, abandoning"
            ),
        }
    }
}
