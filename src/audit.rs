//! Audit sink. The core consumes only the `Auditor` contract
//! (`record_request`); `LogAuditor` is the concrete implementation,
//! grounded on `internal/audit/log_auditor.go`, translated from log15's
//! file handler to this crate's `tracing` idiom.

use async_trait::async_trait;

use crate::config::LogAuditorConfig;
use crate::selector::BackendKind;

#[async_trait]
pub trait Auditor: Send + Sync {
    /// Fire-and-forget: failures are logged by the implementation and
    /// never surfaced to the caller.
    async fn record_request(&self, raw_body: &[u8], kind: BackendKind);
}

pub struct LogAuditor {
    target: &'static str,
}

impl LogAuditor {
    pub fn new(_cfg: &LogAuditorConfig) -> Self {
        // The original writes to a dedicated log15 file handler
        // (`cfg.log_file`); here the audit trail rides the same
        // `tracing` pipeline as everything else, under its own target
        // so operators can route it to a separate sink via their
        // subscriber's filtering if they want file-based audit logs back.
        Self {
            target: "chaind::audit",
        }
    }
}

#[async_trait]
impl Auditor for LogAuditor {
    async fn record_request(&self, raw_body: &[u8], kind: BackendKind) {
        if !matches!(kind, BackendKind::Eth) {
            return;
        }

        let request: crate::jsonrpc::Request = match serde_json::from_slice(raw_body) {
            Ok(req) => req,
            Err(_) => {
                tracing::error!(target: self.target, "received request with invalid JSON body");
                return;
            }
        };

        tracing::info!(
            target: self.target,
            rpc_method = %request.method,
            rpc_params = %request.params.get(),
            "received JSON-RPC request",
        );
    }
}
