//! Cache Warmer: bounded-concurrency backfill of finalized blocks and
//! receipts. Grounded on `internal/cache/warmer.go`; the worker pool is
//! grounded on `pkg/concurrent/consumer.go`'s channel-draining goroutine
//! pool, translated to a tokio task pool draining a bounded channel per
//! spec.md's design note.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::cache::KvCache;
use crate::eth_store::EthStore;
use crate::errors::ChaindResult;
use crate::selector::Selector;
use crate::watcher::{Watcher, FINALITY_DEPTH};

const EAGERLY_LOADED_BLOCKS: u64 = 200;
const WARM_UP_CONCURRENCY: usize = 5;
const LAST_SEEN_KEY: &str = "lastseenblock";

pub struct Warmer {
    store: Arc<EthStore>,
    cache: Arc<dyn KvCache>,
    watcher: Arc<Watcher>,
    selector: Arc<Selector>,
    last_seen_block: AtomicU64,
    subscription: tokio::sync::Mutex<Option<usize>>,
}

impl Warmer {
    pub fn new(
        store: Arc<EthStore>,
        cache: Arc<dyn KvCache>,
        watcher: Arc<Watcher>,
        selector: Arc<Selector>,
    ) -> Self {
        Self {
            store,
            cache,
            watcher,
            selector,
            last_seen_block: AtomicU64::new(0),
            subscription: tokio::sync::Mutex::new(None),
        }
    }

    pub async fn start(self: &Arc<Self>) -> ChaindResult<()> {
        tracing::info!("performing initial warmup");
        self.warm().await?;
        tracing::info!("completed initial warmup");

        let this = Arc::clone(self);
        let handle = self.watcher.subscribe(move |number| {
            let this = Arc::clone(&this);
            async move { this.on_block(number).await }
        });
        *self.subscription.lock().await = Some(handle);
        Ok(())
    }

    pub async fn stop(&self) -> ChaindResult<()> {
        if let Some(handle) = self.subscription.lock().await.take() {
            self.watcher.unsubscribe(handle);
        }
        Ok(())
    }

    async fn warm(&self) -> ChaindResult<()> {
        let client = self.selector.eth_client()?;

        let last_seen_in_cache = match self.cache.get(LAST_SEEN_KEY).await {
            Ok(Some(bytes)) => String::from_utf8_lossy(&bytes).parse::<u64>().unwrap_or(0),
            Ok(None) => 0,
            Err(err) => {
                tracing::warn!(%err, "failed to get last seen key");
                0
            }
        };

        let height = client.block_number().await?;
        let end = height.saturating_sub(FINALITY_DEPTH);
        let start = last_seen_in_cache.max(end.saturating_sub(EAGERLY_LOADED_BLOCKS));

        if start > end {
            self.last_seen_block.store(start, Ordering::Release);
            tracing::info!("cache already warm");
            return Ok(());
        }

        self.cache_blocks_between(start, end).await;
        tracing::info!(start_block = start, end_block = end, "successfully warmed up cache");
        self.last_seen_block.store(end, Ordering::Release);
        if let Err(err) = self.cache.set(LAST_SEEN_KEY, end.to_string().as_bytes()).await {
            tracing::error!(%err, "failed to store last seen block in cache");
        }
        Ok(())
    }

    async fn on_block(&self, number: u64) {
        tracing::debug!(number, "got new block");
        let last_seen = self.last_seen_block.load(Ordering::Acquire);
        let last_finalized = number.saturating_sub(FINALITY_DEPTH);
        if last_finalized < last_seen {
            tracing::debug!(number, last_seen, "skipping non-finalized block");
            return;
        }

        self.cache_blocks_between(last_seen, last_finalized).await;
        self.last_seen_block.store(last_finalized, Ordering::Release);
        if let Err(err) = self.cache.set(LAST_SEEN_KEY, number.to_string().as_bytes()).await {
            tracing::error!(%err, "failed to store last seen block in cache");
        }
    }

    /// Drains `[start, end)` through a fixed pool of `WARM_UP_CONCURRENCY`
    /// workers. Traversal order is unspecified, matching
    /// `pkg/concurrent/consumer.go`'s stack-like draining.
    async fn cache_blocks_between(&self, start: u64, end: u64) {
        if start >= end {
            return;
        }
        let blocks: Vec<u64> = (start..end).collect();

        let (tx, rx) = mpsc::channel::<u64>(blocks.len().max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let mut workers = Vec::with_capacity(WARM_UP_CONCURRENCY);
        for _ in 0..WARM_UP_CONCURRENCY.min(blocks.len().max(1)) {
            let rx = Arc::clone(&rx);
            let selector = Arc::clone(&self.selector);
            let store = Arc::clone(&self.store);
            workers.push(tokio::spawn(async move {
                loop {
                    let item = rx.lock().await.recv().await;
                    match item {
                        Some(number) => cache_block(&selector, &store, number).await,
                        None => return,
                    }
                }
            }));
        }

        for block in blocks {
            let _ = tx.send(block).await;
        }
        drop(tx);

        for worker in workers {
            let _ = worker.await;
        }
    }
}

async fn cache_block(selector: &Arc<Selector>, store: &Arc<EthStore>, number: u64) {
    let client = match selector.eth_client() {
        Ok(client) => client,
        Err(err) => {
            tracing::error!(%err, "failed to get Ethereum client");
            return;
        }
    };

    let block = match client.get_block_by_number(number, true).await {
        Ok(block) => block,
        Err(err) => {
            tracing::error!(%err, "failed to get block by number");
            return;
        }
    };

    if let Err(err) = store.cache_block_by_number(&block, true).await {
        tracing::error!(%err, "failed to store block in cache");
    }

    let value: serde_json::Value = match serde_json::from_str(block.get()) {
        Ok(v) => v,
        Err(_) => return,
    };
    let tx_hashes: Vec<String> = value
        .pointer("/transactions")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|tx| tx.get("hash").and_then(|h| h.as_str()).map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    if !tx_hashes.is_empty() {
        let selector = Arc::clone(selector);
        let store = Arc::clone(store);
        tokio::spawn(async move { cache_receipts(&selector, &store, tx_hashes).await });
    }

    tracing::debug!(number, "successfully warmed up cache with block");
}

async fn cache_receipts(selector: &Arc<Selector>, store: &Arc<EthStore>, hashes: Vec<String>) {
    let (tx, rx) = mpsc::channel::<String>(hashes.len().max(1));
    let rx = Arc::new(tokio::sync::Mutex::new(rx));

    let mut workers = Vec::with_capacity(WARM_UP_CONCURRENCY);
    for _ in 0..WARM_UP_CONCURRENCY.min(hashes.len().max(1)) {
        let rx = Arc::clone(&rx);
        let selector = Arc::clone(selector);
        let store = Arc::clone(store);
        workers.push(tokio::spawn(async move {
            loop {
                let item = rx.lock().await.recv().await;
                match item {
                    Some(hash) => cache_tx_receipt(&selector, &store, &hash).await,
                    None => return,
                }
            }
        }));
    }

    for hash in hashes {
        let _ = tx.send(hash).await;
    }
    drop(tx);

    for worker in workers {
        let _ = worker.await;
    }
}

async fn cache_tx_receipt(selector: &Arc<Selector>, store: &Arc<EthStore>, hash: &str) {
    let client = match selector.eth_client() {
        Ok(client) => client,
        Err(err) => {
            tracing::error!(%err, "failed to get Ethereum client");
            return;
        }
    };

    let receipt = match client.get_transaction_receipt(hash).await {
        Ok(receipt) => receipt,
        Err(err) => {
            tracing::error!(%err, "failed to get transaction receipt");
            return;
        }
    };

    if let Err(err) = store.cache_transaction_receipt(&receipt).await {
        tracing::error!(%err, "failed to store tx receipt in cache");
    }

    tracing::debug!(tx_hash = hash, "successfully warmed up cache with transaction receipt");
}

#[cfg(test)]
mod tests {
    #[test]
    fn boundary_start_equals_end_issues_no_work() {
        let start = 100u64;
        let end = 100u64;
        assert!(start >= end);
    }
}
