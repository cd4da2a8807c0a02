//! Global logger init. Grounded on `pkg/log/log.go`'s `log15`-based level
//! setup, translated to `tracing-subscriber`'s `EnvFilter`; `web3_proxy`
//! initializes the same `tracing_subscriber::fmt` + `EnvFilter` pair at
//! process start.

use tracing_subscriber::EnvFilter;

/// Parses `level` (`debug|info|warn|error`) and installs a process-wide
/// `tracing` subscriber. An unrecognized level falls back to `info` with a
/// warning, matching `log15.LvlFromString`'s fallback in the Go source.
pub fn init(level: &str) {
    let filter = match level.to_lowercase().as_str() {
        "debug" => "debug",
        "info" => "info",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if !matches!(level.to_lowercase().as_str(), "debug" | "info" | "warn" | "error") {
        tracing::warn!(%level, "invalid log level, falling back to INFO");
    }
}
