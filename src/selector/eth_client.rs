//! Thin per-backend Ethereum JSON-RPC client. Grounded on
//! `internal/backend/eth_client.go`; uses `reqwest` where the original
//! wraps `net/http` directly.

use std::time::Duration;

use serde::Serialize;
use serde_json::value::RawValue;

use crate::errors::{ChaindError, ChaindResult};
use crate::jsonrpc::{self, hex};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct OutgoingRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: serde_json::Value,
}

pub struct EthClient {
    url: String,
    http: reqwest::Client,
}

impl EthClient {
    pub fn new(url: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client builds with static config");
        Self { url, http }
    }

    async fn call(&self, method: &str, params: serde_json::Value) -> ChaindResult<Box<RawValue>> {
        let req = OutgoingRequest {
            jsonrpc: jsonrpc::VERSION,
            id: 1,
            method,
            params,
        };

        let response = self.http.post(&self.url).json(&req).send().await?;
        let body: jsonrpc::Response = response.json().await?;
        Ok(body.result)
    }

    pub async fn block_number(&self) -> ChaindResult<u64> {
        let raw = self.call("eth_blockNumber", serde_json::json!([])).await?;
        let height_str: String = serde_json::from_str(raw.get())
            .map_err(|_| ChaindError::BadPath("mal-formed block number".to_string()))?;
        hex::hex_to_u64(&height_str)
    }

    pub async fn get_block_by_number(
        &self,
        number: u64,
        include_bodies: bool,
    ) -> ChaindResult<Box<RawValue>> {
        self.call(
            "eth_getBlockByNumber",
            serde_json::json!([hex::u64_to_hex(number), include_bodies]),
        )
        .await
    }

    pub async fn get_transaction_receipt(&self, hash: &str) -> ChaindResult<Box<RawValue>> {
        self.call("eth_getTransactionReceipt", serde_json::json!([hash]))
            .await
    }
}
