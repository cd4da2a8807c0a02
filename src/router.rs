//! Request Router: the single HTTP entry point, the before/after handler
//! dispatch per spec.md §4.5, and batch response framing. Grounded on
//! `internal/proxy/proxy.go` and `internal/proxy/eth_handler.go`, with the
//! axum handler shape grounded on `web3_proxy/src/frontend/http_proxy.rs`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::Extension;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::value::RawValue;
use tracing::Instrument;
use uuid::Uuid;

use crate::audit::Auditor;
use crate::eth_store::EthStore;
use crate::jsonrpc::{self, hex, path, Request as RpcRequest, Response as RpcResponse};
use crate::selector::{Backend, BackendKind, Selector};

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(1);

pub struct RouterState {
    pub selector: Arc<Selector>,
    pub store: Arc<EthStore>,
    pub auditor: Arc<dyn Auditor>,
    pub enabled_apis: HashSet<String>,
    pub http: reqwest::Client,
}

impl RouterState {
    pub fn new(
        selector: Arc<Selector>,
        store: Arc<EthStore>,
        auditor: Arc<dyn Auditor>,
        enabled_apis: Vec<String>,
    ) -> Self {
        Self {
            selector,
            store,
            auditor,
            enabled_apis: enabled_apis.into_iter().collect(),
            http: reqwest::Client::new(),
        }
    }
}

/// `POST /<eth.path>`. Non-POST is rejected by axum's router (405) before
/// this handler ever runs, since the route is registered for POST only.
pub async fn handle_eth_request(
    Extension(state): Extension<Arc<RouterState>>,
    body: Bytes,
) -> Response {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("eth_request", %request_id);
    process_request(state, body).instrument(span).await
}

async fn process_request(state: Arc<RouterState>, body: Bytes) -> Response {
    let backend = match state.selector.backend_for(BackendKind::Eth) {
        Ok(backend) => backend,
        Err(_) => return StatusCode::SERVICE_UNAVAILABLE.into_response(),
    };

    let first_non_ws = body.iter().find(|b| !b.is_ascii_whitespace()).copied();
    let out = match first_non_ws {
        Some(b'[') => {
            tracing::debug!("got batch request");
            let requests: Vec<RpcRequest> = match serde_json::from_slice(&body) {
                Ok(reqs) => reqs,
                Err(_) => {
                    tracing::warn!("received mal-formed batch request");
                    return StatusCode::BAD_REQUEST.into_response();
                }
            };
            let mut bodies = Vec::with_capacity(requests.len());
            for req in &requests {
                bodies.push(process_single(&state, &backend, req).await);
            }
            tracing::debug!("processed batch request");
            frame_batch(bodies)
        }
        Some(_) => {
            tracing::debug!("got single request");
            let req: RpcRequest = match serde_json::from_slice(&body) {
                Ok(req) => req,
                Err(_) => {
                    tracing::warn!("received mal-formed request");
                    return StatusCode::BAD_REQUEST.into_response();
                }
            };
            process_single(&state, &backend, &req).await
        }
        None => return StatusCode::BAD_REQUEST.into_response(),
    };

    ([("content-type", "application/json")], out).into_response()
}

/// Joins the per-element bodies into `[b0,b1,...]`, dropping any
/// zero-length element entirely and preserving input order (spec.md §8
/// invariant).
fn frame_batch(bodies: Vec<Vec<u8>>) -> Vec<u8> {
    let mut out = Vec::new();
    out.push(b'[');
    let mut first = true;
    for body in bodies {
        if body.is_empty() {
            continue;
        }
        if !first {
            out.push(b',');
        }
        first = false;
        out.extend_from_slice(&body);
    }
    out.push(b']');
    out
}

/// Runs the single-request pipeline from spec.md §4.6 steps 1-7. Always
/// returns a well-formed JSON-RPC body (see DESIGN.md open question 3).
async fn process_single(state: &RouterState, backend: &Backend, req: &RpcRequest) -> Vec<u8> {
    if let Ok(raw) = serde_json::to_vec(req) {
        state.auditor.record_request(&raw, BackendKind::Eth).await;
    }

    crate::metrics::PROXIED_REQUESTS
        .with_label_values(&[req.method.as_str()])
        .inc();

    let family = jsonrpc::method_family(&req.method);
    if !state.enabled_apis.contains(family) {
        tracing::debug!(%family, "disallowed method family");
        return error_envelope(&req.id, -32602, "bad request");
    }

    if let Some(body) = try_before(state, req).await {
        tracing::debug!(method = %req.method, "request handled in before filter");
        crate::metrics::CACHE_HITS.inc();
        return body;
    }
    crate::metrics::CACHE_MISSES.inc();

    let serialized = match serde_json::to_vec(req) {
        Ok(bytes) => bytes,
        Err(_) => return error_envelope(&req.id, -32603, "internal error"),
    };

    let upstream = match state
        .http
        .post(&backend.url)
        .timeout(UPSTREAM_TIMEOUT)
        .header("content-type", "application/json")
        .body(serialized)
        .send()
        .await
    {
        Ok(res) if res.status().is_success() => res,
        _ => return error_envelope(&req.id, -32602, "bad request"),
    };

    let resp_bytes = match upstream.bytes().await {
        Ok(bytes) => bytes.to_vec(),
        Err(_) => return error_envelope(&req.id, -32602, "bad request"),
    };

    match serde_json::from_slice::<RpcResponse>(&resp_bytes) {
        Ok(parsed) => try_after(state, req, &parsed).await,
        Err(_) => tracing::debug!("skipping post-processors for error response"),
    }

    resp_bytes
}

async fn try_before(state: &RouterState, req: &RpcRequest) -> Option<Vec<u8>> {
    match req.method.as_str() {
        "eth_blockNumber" => before_block_number(state, req).await,
        "eth_getBlockByNumber" => before_get_block_by_number(state, req).await,
        "eth_getTransactionReceipt" => before_get_transaction_receipt(state, req).await,
        "eth_getBalance" => before_get_balance(state, req).await,
        _ => None,
    }
}

async fn try_after(state: &RouterState, req: &RpcRequest, res: &RpcResponse) {
    let result = match req.method.as_str() {
        "eth_getBlockByNumber" => after_get_block_by_number(state, req, res).await,
        "eth_getTransactionReceipt" => after_get_transaction_receipt(state, res).await,
        "eth_getBalance" => after_get_balance(state, req, res).await,
        _ => {
            tracing::debug!(method = %req.method, "no post-processor found");
            Ok(())
        }
    };

    if let Err(err) = result {
        tracing::error!(%err, method = %req.method, "request post-processing failed");
    }
}

fn params_value(req: &RpcRequest) -> serde_json::Value {
    serde_json::from_str(req.params.get()).unwrap_or(serde_json::Value::Null)
}

async fn before_block_number(state: &RouterState, req: &RpcRequest) -> Option<Vec<u8>> {
    let height = state.store.block_height();
    if height == 0 {
        tracing::warn!("received zero block height");
        return None;
    }
    Some(write_response(&req.id, format!("\"{}\"", hex::u64_to_hex(height)).into_bytes()))
}

async fn before_get_block_by_number(state: &RouterState, req: &RpcRequest) -> Option<Vec<u8>> {
    let params = params_value(req);
    let block_num_str = path::get_string(&params, "0").ok()?;
    let block_num = hex::hex_to_u64(&block_num_str).ok()?;
    let include_bodies = path::get_bool(&params, "1").unwrap_or(false);

    let cached = state
        .store
        .get_block_by_number(block_num, include_bodies)
        .await
        .ok()??;
    Some(write_response(&req.id, cached))
}

async fn after_get_block_by_number(
    state: &RouterState,
    req: &RpcRequest,
    res: &RpcResponse,
) -> crate::errors::ChaindResult<()> {
    let params = params_value(req);
    let include_bodies = path::get_bool(&params, "1").unwrap_or(false);
    state.store.cache_block_by_number(&res.result, include_bodies).await
}

async fn before_get_transaction_receipt(state: &RouterState, req: &RpcRequest) -> Option<Vec<u8>> {
    let params = params_value(req);
    let tx_hash = path::get_string(&params, "0").ok()?;
    if tx_hash.is_empty() {
        return None;
    }
    let cached = state.store.get_transaction_receipt(&tx_hash).await.ok()??;
    Some(write_response(&req.id, cached))
}

async fn after_get_transaction_receipt(
    state: &RouterState,
    res: &RpcResponse,
) -> crate::errors::ChaindResult<()> {
    state.store.cache_transaction_receipt(&res.result).await
}

async fn before_get_balance(state: &RouterState, req: &RpcRequest) -> Option<Vec<u8>> {
    let params = params_value(req);
    let block_tag = path::get_string(&params, "1").ok()?;
    if block_tag != "latest" {
        return None;
    }
    let addr = path::get_string(&params, "0").ok()?;
    if addr.is_empty() {
        return None;
    }
    let cached = state.store.get_balance(&addr).await.ok()??;
    Some(write_response(&req.id, cached))
}

async fn after_get_balance(
    state: &RouterState,
    req: &RpcRequest,
    res: &RpcResponse,
) -> crate::errors::ChaindResult<()> {
    let params = params_value(req);
    let addr = match path::get_string(&params, "0") {
        Ok(addr) => addr,
        Err(_) => return Ok(()),
    };
    state.store.cache_balance(&addr, &res.result).await
}

fn write_response(id: &Option<Box<RawValue>>, data: Vec<u8>) -> Vec<u8> {
    let id_json = id.as_ref().map(|v| v.get()).unwrap_or("null");
    format!(
        "{{\"jsonrpc\":\"{}\",\"id\":{},\"result\":{}}}",
        jsonrpc::VERSION,
        id_json,
        String::from_utf8_lossy(&data)
    )
    .into_bytes()
}

fn error_envelope(id: &Option<Box<RawValue>>, code: i64, message: &str) -> Vec<u8> {
    let id_json = id.as_ref().map(|v| v.get()).unwrap_or("null");
    let escaped = message.replace('"', "\\\"");
    let out = format!(
        "{{\"jsonrpc\":\"{}\",\"id\":{},\"error\":{{\"code\":{},\"message\":\"{}\"}}}}",
        jsonrpc::VERSION,
        id_json,
        code,
        escaped
    );
    out.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_batch_joins_non_empty_elements_in_order() {
        let out = frame_batch(vec![b"{\"a\":1}".to_vec(), vec![], b"{\"a\":2}".to_vec()]);
        assert_eq!(out, b"[{\"a\":1},{\"a\":2}]");
    }

    #[test]
    fn frame_batch_all_empty_yields_empty_array() {
        let out = frame_batch(vec![vec![], vec![]]);
        assert_eq!(out, b"[]");
    }

    #[test]
    fn error_envelope_matches_canonical_error_shape() {
        let out = error_envelope(&None, -32602, "bad request");
        let parsed: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed["error"]["code"], -32602);
        assert_eq!(parsed["error"]["message"], "bad request");
    }

    #[test]
    fn write_response_embeds_raw_result_bytes() {
        let id = Some(RawValue::from_string("7".to_string()).unwrap());
        let out = write_response(&id, b"{\"number\":\"0x10\"}".to_vec());
        let parsed: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed["id"], 7);
        assert_eq!(parsed["result"]["number"], "0x10");
    }
}
