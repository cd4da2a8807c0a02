//! ETH Store: the domain layer wrapping the KV Cache and the Chain-Head
//! Watcher, deciding what is cacheable based on finality. Grounded on
//! `internal/cache/eth_store.go`.

use std::sync::Arc;
use std::time::Duration;

use serde_json::value::RawValue;

use crate::cache::KvCache;
use crate::errors::ChaindResult;
use crate::jsonrpc::{hex, path};
use crate::watcher::Watcher;

const BLOCK_TTL: Duration = Duration::from_secs(3600);
const RECEIPT_TTL: Duration = Duration::from_secs(3600);
const BALANCE_TTL: Duration = Duration::from_secs(60);

pub struct EthStore {
    cache: Arc<dyn KvCache>,
    watcher: Arc<Watcher>,
}

fn block_key(number: u64, include_bodies: bool) -> String {
    format!("block:{number}:{include_bodies}")
}

fn tx_receipt_key(hash: &str) -> String {
    format!("txreceipt:{}", hash.to_lowercase())
}

fn balance_key(address: &str) -> String {
    format!("balance:{}:latest", address.to_lowercase())
}

impl EthStore {
    pub fn new(cache: Arc<dyn KvCache>, watcher: Arc<Watcher>) -> Self {
        Self { cache, watcher }
    }

    pub async fn get_block_by_number(
        &self,
        number: u64,
        include_bodies: bool,
    ) -> ChaindResult<Option<Vec<u8>>> {
        self.cache.get(&block_key(number, include_bodies)).await
    }

    pub async fn cache_block_by_number(
        &self,
        data: &RawValue,
        include_bodies: bool,
    ) -> ChaindResult<()> {
        let value: serde_json::Value = serde_json::from_str(data.get())?;
        if value.is_null() {
            tracing::debug!("skipping post-processing for null block");
            return Ok(());
        }

        let block_num_str = match path::get_string(&value, "number") {
            Ok(s) => s,
            Err(_) => {
                tracing::debug!("skipping post-processing for null block");
                return Ok(());
            }
        };
        let block_num = match hex::hex_to_u64(&block_num_str) {
            Ok(n) => n,
            Err(_) => {
                tracing::error!("encountered invalid block number, bailing");
                return Ok(());
            }
        };

        if !self.watcher.is_finalized(block_num) {
            tracing::debug!(number = block_num, "not caching un-finalized block");
            return Ok(());
        }

        self.cache
            .set_ex(
                &block_key(block_num, include_bodies),
                data.get().as_bytes(),
                BLOCK_TTL,
            )
            .await
    }

    pub async fn get_transaction_receipt(&self, hash: &str) -> ChaindResult<Option<Vec<u8>>> {
        self.cache.get(&tx_receipt_key(hash)).await
    }

    pub async fn cache_transaction_receipt(&self, data: &RawValue) -> ChaindResult<()> {
        let value: serde_json::Value = serde_json::from_str(data.get())?;
        if value.is_null() {
            tracing::debug!("skipping post-processing for null transaction");
            return Ok(());
        }

        let tx_hash = path::get_string(&value, "transactionHash").unwrap_or_default();
        let block_num_str = match path::get_string(&value, "blockNumber") {
            Ok(s) => s,
            Err(_) => {
                tracing::debug!(tx_hash = %tx_hash, "skipping pending transaction");
                return Ok(());
            }
        };
        let block_num = hex::hex_to_u64(&block_num_str)?;

        if !self.watcher.is_finalized(block_num) {
            tracing::debug!(tx_hash = %tx_hash, number = block_num, "not caching un-finalized tx receipt");
            return Ok(());
        }

        self.cache
            .set_ex(&tx_receipt_key(&tx_hash), data.get().as_bytes(), RECEIPT_TTL)
            .await
    }

    /// A cached balance is served only if the current head has not
    /// advanced past the height it was written at — `latest` balances
    /// change every block and cannot be finalized.
    pub async fn get_balance(&self, address: &str) -> ChaindResult<Option<Vec<u8>>> {
        let key = balance_key(address);
        let height_bytes = self.cache.map_get(&key, "blockNumber").await?;
        let stored_height = match height_bytes {
            Some(bytes) => decode_varint(&bytes),
            None => return Ok(None),
        };

        if self.watcher.block_height() > stored_height {
            return Ok(None);
        }

        self.cache.map_get(&key, "balance").await
    }

    pub async fn cache_balance(&self, address: &str, data: &RawValue) -> ChaindResult<()> {
        let height = self.watcher.block_height();
        let mut vals = crate::cache::CacheableMap::new();
        vals.insert("balance".to_string(), data.get().as_bytes().to_vec());
        vals.insert("blockNumber".to_string(), encode_varint(height));
        self.cache
            .map_set_ex(&balance_key(address), vals, BALANCE_TTL)
            .await
    }

    pub fn block_height(&self) -> u64 {
        self.watcher.block_height()
    }
}

fn encode_varint(mut value: u64) -> Vec<u8> {
    let mut buf = Vec::new();
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
    buf
}

fn decode_varint(bytes: &[u8]) -> u64 {
    let mut result: u64 = 0;
    let mut shift = 0;
    for &byte in bytes {
        result |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_roundtrip() {
        for n in [0u64, 1, 127, 128, 300, u64::MAX] {
            assert_eq!(decode_varint(&encode_varint(n)), n);
        }
    }

    #[test]
    fn cache_keys_match_canonical_format() {
        assert_eq!(block_key(16, true), "block:16:true");
        assert_eq!(tx_receipt_key("0xABC"), "txreceipt:0xabc");
        assert_eq!(balance_key("0xDEF"), "balance:0xdef:latest");
    }
}
