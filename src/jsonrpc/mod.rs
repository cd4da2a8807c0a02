//! JSON-RPC wire types and helpers: request/response bodies, the duck-typed
//! path lookup, and hex conversions. Grounded on `pkg/jsonrpc/` in the
//! original source.

pub mod hex;
pub mod path;

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

pub const VERSION: &str = "2.0";

/// A single JSON-RPC request. `id` and `params` are kept as raw JSON
/// tokens — the id because it is heterogeneous (`int | string | null`)
/// and must round-trip verbatim, params because the router never
/// interprets them beyond handing them to a handful of handlers that
/// reach into specific positions via the path utility.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Request {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Box<RawValue>>,
    pub method: String,
    #[serde(default = "empty_params")]
    pub params: Box<RawValue>,
}

fn empty_params() -> Box<RawValue> {
    RawValue::from_string("[]".to_string()).expect("static json is valid")
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Response {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Box<RawValue>>,
    pub result: Box<RawValue>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ErrorData {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ErrorResponse {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Box<RawValue>>,
    pub error: ErrorData,
}

/// The fixed body sent to probe a backend's health: `eth_syncing` with the
/// given id (the probe's epoch-seconds timestamp per spec.md §4.2).
pub fn syncing_probe_body(id: u64) -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": VERSION,
        "method": "eth_syncing",
        "params": [],
        "id": id,
    })
}

/// Extracts the method family (text before the first `_`) used to gate
/// requests against the configured API allow-list.
pub fn method_family(method: &str) -> &str {
    method.split('_').next().unwrap_or(method)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_family_splits_on_underscore() {
        assert_eq!(method_family("eth_getBalance"), "eth");
        assert_eq!(method_family("net_version"), "net");
        assert_eq!(method_family("noUnderscore"), "noUnderscore");
    }

    #[test]
    fn request_round_trips_heterogeneous_id() {
        let raw = r#"{"jsonrpc":"2.0","id":"abc","method":"eth_blockNumber","params":[]}"#;
        let parsed: Request = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.id.unwrap().get(), "\"abc\"");

        let raw_numeric = r#"{"jsonrpc":"2.0","id":42,"method":"eth_blockNumber","params":[]}"#;
        let parsed: Request = serde_json::from_str(raw_numeric).unwrap();
        assert_eq!(parsed.id.unwrap().get(), "42");
    }
}
