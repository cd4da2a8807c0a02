use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use derive_more::{Display, Error, From};
use serde::Serialize;

/// A JSON-RPC error envelope, the shape every failure the router surfaces to a
/// client ultimately gets flattened into.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcErrorBody {
    pub jsonrpc: &'static str,
    pub error: JsonRpcErrorPayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Box<serde_json::value::RawValue>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcErrorPayload {
    pub code: i64,
    pub message: String,
}

/// The canonical internal-error body used when even marshalling the real
/// error envelope fails.
pub fn canonical_internal_error_bytes() -> &'static [u8] {
    br#"{"jsonrpc":"2.0","error":{"code":-32603,"message":"internal error"}}"#
}

#[derive(Debug, Display, Error, From)]
pub enum ChaindError {
    #[display(fmt = "config error: {_0}")]
    #[from(ignore)]
    Config(String),

    #[display(fmt = "config io error: {_0}")]
    ConfigIo(std::io::Error),

    #[display(fmt = "config parse error: {_0}")]
    ConfigParse(toml::de::Error),

    #[display(fmt = "cache transport error: {_0}")]
    Cache(redis::RedisError),

    #[display(fmt = "http transport error: {_0}")]
    Http(reqwest::Error),

    #[display(fmt = "json error: {_0}")]
    Json(serde_json::Error),

    #[display(fmt = "no healthy backend for {_0}")]
    #[from(ignore)]
    NoBackend(String),

    #[display(fmt = "unsupported backend kind: {_0}")]
    #[from(ignore)]
    UnsupportedKind(String),

    #[display(fmt = "bad path: {_0}")]
    #[from(ignore)]
    BadPath(String),

    #[display(fmt = "null field: {_0}")]
    #[from(ignore)]
    NullField(String),

    #[display(fmt = "upstream request failed: {_0}")]
    #[from(ignore)]
    UpstreamBadRequest(String),

    #[display(fmt = "disallowed method family: {_0}")]
    #[from(ignore)]
    DisallowedFamily(String),

    #[display(fmt = "malformed request body")]
    #[from(ignore)]
    MalformedRequest,
}

impl ChaindError {
    /// Maps an error to the JSON-RPC error code/message pair the router is
    /// required to emit. HTTP status is always 200 for JSON-RPC-shaped
    /// errors; only truly fatal startup errors use a non-200 status, and
    /// those never flow through this path.
    pub fn as_jsonrpc(&self) -> (i64, String) {
        match self {
            ChaindError::UpstreamBadRequest(_)
            | ChaindError::Http(_)
            | ChaindError::NoBackend(_) => (-32602, "bad request".to_string()),
            ChaindError::DisallowedFamily(_) => (-32602, "bad request".to_string()),
            ChaindError::MalformedRequest => (-32602, "bad request".to_string()),
            _ => (-32603, "internal error".to_string()),
        }
    }
}

impl IntoResponse for ChaindError {
    fn into_response(self) -> Response {
        match &self {
            ChaindError::NoBackend(kind) => {
                tracing::error!(%kind, "no healthy backend");
                return StatusCode::SERVICE_UNAVAILABLE.into_response();
            }
            ChaindError::MalformedRequest => {
                tracing::warn!("malformed request body");
                return StatusCode::BAD_REQUEST.into_response();
            }
            ChaindError::Config(msg) => tracing::error!(%msg, "config error"),
            ChaindError::ConfigIo(err) => tracing::error!(%err, "config io error"),
            ChaindError::ConfigParse(err) => tracing::error!(%err, "config parse error"),
            ChaindError::Cache(err) => tracing::warn!(%err, "cache transport error"),
            ChaindError::Http(err) => tracing::warn!(%err, "upstream transport error"),
            ChaindError::Json(err) => tracing::warn!(%err, "json error"),
            ChaindError::UnsupportedKind(kind) => tracing::warn!(%kind, "unsupported backend kind"),
            ChaindError::BadPath(path) => tracing::debug!(%path, "bad path"),
            ChaindError::NullField(path) => tracing::debug!(%path, "null field"),
            ChaindError::UpstreamBadRequest(msg) => tracing::warn!(%msg, "upstream bad request"),
            ChaindError::DisallowedFamily(family) => {
                tracing::debug!(%family, "disallowed method family")
            }
        }

        let (code, message) = self.as_jsonrpc();
        let body = JsonRpcErrorBody {
            jsonrpc: "2.0",
            error: JsonRpcErrorPayload { code, message },
            id: None,
        };
        (StatusCode::OK, Json(body)).into_response()
    }
}

pub type ChaindResult<T> = Result<T, ChaindError>;
