//! Chain-Head Watcher: polls the selected backend for the current block
//! number, exposes a finality predicate, and publishes height changes to
//! subscribers. Grounded on `internal/cache/block_height_watcher.go`.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::selector::{BackendKind, Selector};

pub const FINALITY_DEPTH: u64 = 7;

const POLL_TICK: Duration = Duration::from_secs(1);
const POLL_TIMEOUT: Duration = Duration::from_secs(1);

type Callback = Arc<dyn Fn(u64) -> futures::future::BoxFuture<'static, ()> + Send + Sync>;

pub struct Watcher {
    selector: Arc<Selector>,
    height: AtomicU64,
    subscribers: Mutex<Vec<(usize, Callback)>>,
    next_handle: AtomicUsize,
    shutdown: Notify,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Watcher {
    pub fn new(selector: Arc<Selector>) -> Self {
        Self {
            selector,
            height: AtomicU64::new(0),
            subscribers: Mutex::new(Vec::new()),
            next_handle: AtomicUsize::new(1),
            shutdown: Notify::new(),
            task: tokio::sync::Mutex::new(None),
        }
    }

    pub async fn start(self: &Arc<Self>) -> crate::errors::ChaindResult<()> {
        self.update_block_height().await;

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(POLL_TICK);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => this.update_block_height().await,
                    _ = this.shutdown.notified() => return,
                }
            }
        });
        *self.task.lock().await = Some(handle);
        Ok(())
    }

    pub async fn stop(&self) -> crate::errors::ChaindResult<()> {
        self.shutdown.notify_one();
        if let Some(handle) = self.task.lock().await.take() {
            let _ = handle.await;
        }
        Ok(())
    }

    pub fn block_height(&self) -> u64 {
        self.height.load(Ordering::Acquire)
    }

    /// Saturating-subtraction form (DESIGN.md open question 2): a block at
    /// height `h` is finalized iff `height - FINALITY_DEPTH >= h`, and no
    /// block is finalized while `height < FINALITY_DEPTH`.
    pub fn is_finalized(&self, h: u64) -> bool {
        self.block_height().saturating_sub(FINALITY_DEPTH) >= h
    }

    pub fn subscribe<F, Fut>(&self, cb: F) -> usize
    where
        F: Fn(u64) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let boxed: Callback = Arc::new(move |height| Box::pin(cb(height)));
        self.subscribers
            .lock()
            .expect("subscribers mutex poisoned")
            .push((handle, boxed));
        handle
    }

    pub fn unsubscribe(&self, handle: usize) {
        self.subscribers
            .lock()
            .expect("subscribers mutex poisoned")
            .retain(|(h, _)| *h != handle);
    }

    async fn update_block_height(&self) {
        let backend = match self.selector.backend_for(BackendKind::Eth) {
            Ok(b) => b,
            Err(err) => {
                tracing::error!(%err, "no backend available");
                return;
            }
        };

        let client = crate::selector::EthClient::new(backend.url);
        let height = match tokio::time::timeout(POLL_TIMEOUT, client.block_number()).await {
            Ok(Ok(height)) => height,
            Ok(Err(err)) => {
                tracing::error!(%err, "failed to fetch block height");
                return;
            }
            Err(_) => {
                tracing::error!("timed out fetching block height");
                return;
            }
        };

        let previous = self.height.swap(height, Ordering::AcqRel);
        tracing::debug!(from = previous, to = height, "updated block height");
        crate::metrics::CHAIN_HEAD_HEIGHT.set(height as f64);

        if previous != height {
            // Dispatch to each subscriber on its own task so a slow
            // callback can never block the poller; the lock is dropped
            // before spawning.
            let callbacks: Vec<Callback> = self
                .subscribers
                .lock()
                .expect("subscribers mutex poisoned")
                .iter()
                .map(|(_, cb)| Arc::clone(cb))
                .collect();
            for cb in callbacks {
                tokio::spawn(async move { cb(height).await });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finality_boundary_below_depth() {
        // height < FINALITY_DEPTH => nothing is finalized.
        let height = AtomicU64::new(3);
        assert!(height.load(Ordering::Relaxed).saturating_sub(FINALITY_DEPTH) == 0);
    }

    #[test]
    fn finality_predicate_matches_spec_example() {
        // head = 291 => finalized(284) == true, finalized(285) == false.
        let head = 291u64;
        assert!(head.saturating_sub(FINALITY_DEPTH) >= 284);
        assert!(!(head.saturating_sub(FINALITY_DEPTH) >= 285));
    }
}
