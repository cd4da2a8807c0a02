//! Prometheus scrape endpoint. Grounded on `internal/start.go`'s
//! `promhttp.Handler()` served on port 2112; uses the `prometheus` crate's
//! registry/encoder instead of `web3_proxy`'s `serde_prometheus` since
//! there's no existing stats struct here to derive a tree from.

use std::net::SocketAddr;

use axum::routing::get;
use axum::Router;
use once_cell::sync::Lazy;
use prometheus::{Counter, CounterVec, Gauge, Opts, Registry};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static PROXIED_REQUESTS: Lazy<CounterVec> = Lazy::new(|| {
    let counter = CounterVec::new(
        Opts::new("chaind_proxied_requests_total", "JSON-RPC requests handled by the router"),
        &["method"],
    )
    .expect("metric options are valid");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("metric only registered once");
    counter
});

pub static CACHE_HITS: Lazy<Counter> = Lazy::new(|| {
    let counter = Counter::new("chaind_cache_hits_total", "Before-handler cache hits")
        .expect("metric options are valid");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("metric only registered once");
    counter
});

pub static CACHE_MISSES: Lazy<Counter> = Lazy::new(|| {
    let counter = Counter::new("chaind_cache_misses_total", "Before-handler cache misses")
        .expect("metric options are valid");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("metric only registered once");
    counter
});

pub static SELECTOR_FAILOVERS: Lazy<Counter> = Lazy::new(|| {
    let counter = Counter::new(
        "chaind_selector_failovers_total",
        "Times the upstream selector moved off the previously current backend",
    )
    .expect("metric options are valid");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("metric only registered once");
    counter
});

pub static CHAIN_HEAD_HEIGHT: Lazy<Gauge> = Lazy::new(|| {
    let gauge = Gauge::new("chaind_chain_head_height", "Last observed chain head height")
        .expect("metric options are valid");
    REGISTRY
        .register(Box::new(gauge.clone()))
        .expect("metric only registered once");
    gauge
});

async fn handler() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buf = Vec::new();
    encoder
        .encode(&metric_families, &mut buf)
        .expect("encoding prometheus metrics never fails");
    String::from_utf8(buf).expect("prometheus text format is valid utf8")
}

/// Serves `/metrics` on port 2112, exactly as `internal/start.go` does
/// when `enable_prometheus` is set.
pub async fn serve() -> anyhow::Result<()> {
    let app = Router::new().route("/metrics", get(handler));
    let addr = SocketAddr::from(([0, 0, 0, 0], 2112));
    tracing::info!(%addr, "Prometheus metrics enabled, listening");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}
