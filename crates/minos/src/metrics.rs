//! Prometheus metrics for the judgment worker.

use std::sync::LazyLock;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

/// Global metrics registry.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Wall-clock time spent inside the sandbox, per language.
pub static SANDBOX_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        "minos_sandbox_duration_seconds",
        "Wall-clock time spent inside the sandbox",
    )
    .buckets(vec![0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 40.0, 80.0]);
    HistogramVec::new(opts, &["code_language"]).expect("failed to create histogram")
});

/// Peak memory observed per case, per language.
pub static CASE_MEMORY_USED_MB: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        "minos_case_memory_used_mb",
        "Peak memory used by a passing test case",
    )
    .buckets(vec![8.0, 32.0, 64.0, 128.0, 256.0, 512.0, 1024.0]);
    HistogramVec::new(opts, &["code_language"]).expect("failed to create histogram")
});

/// Verdicts by failure cause (`"PASSED"` for passing verdicts).
pub static VERDICT_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    let opts = Opts::new("minos_verdict_total", "Total verdicts by outcome");
    IntCounterVec::new(opts, &["outcome"]).expect("failed to create counter")
});

/// Jobs that reached a final Judgment (Passed or Unpassed).
pub static JOBS_JUDGED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("minos_jobs_judged_total", "Total jobs that produced a final judgment")
        .expect("failed to create counter")
});

/// Jobs torn down as a system failure (spec §7).
pub static JOBS_ABORTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("minos_jobs_aborted_total", "Total jobs torn down as a system failure")
        .expect("failed to create counter")
});

/// Currently running jobs.
pub static ACTIVE_JOBS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new("minos_active_jobs", "Currently running judgment jobs")
        .expect("failed to create gauge")
});

/// Webhook dispatches by resulting HTTP status class.
pub static WEBHOOK_DISPATCH_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    let opts = Opts::new("minos_webhook_dispatch_total", "Webhook dispatches by status class");
    IntCounterVec::new(opts, &["status_class"]).expect("failed to create counter")
});

/// Registers all metrics. Call once at startup.
pub fn init_metrics() {
    REGISTRY
        .register(Box::new(SANDBOX_DURATION.clone()))
        .expect("failed to register metric");
    REGISTRY
        .register(Box::new(CASE_MEMORY_USED_MB.clone()))
        .expect("failed to register metric");
    REGISTRY
        .register(Box::new(VERDICT_TOTAL.clone()))
        .expect("failed to register metric");
    REGISTRY
        .register(Box::new(JOBS_JUDGED.clone()))
        .expect("failed to register metric");
    REGISTRY
        .register(Box::new(JOBS_ABORTED.clone()))
        .expect("failed to register metric");
    REGISTRY
        .register(Box::new(ACTIVE_JOBS.clone()))
        .expect("failed to register metric");
    REGISTRY
        .register(Box::new(WEBHOOK_DISPATCH_TOTAL.clone()))
        .expect("failed to register metric");
}

pub fn record_verdict(outcome: &str) {
    VERDICT_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record one job's sandbox wall time, labeled by language.
pub fn record_sandbox_duration(code_language: &str, duration_secs: f64) {
    SANDBOX_DURATION
        .with_label_values(&[code_language])
        .observe(duration_secs);
}

pub fn record_webhook_dispatch(status: u16) {
    let class = match status {
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        500..=599 => "5xx",
        _ => "other",
    };
    WEBHOOK_DISPATCH_TOTAL.with_label_values(&[class]).inc();
}

/// HTTP server exposing `/metrics` and `/health`.
pub struct MetricsServer;

impl MetricsServer {
    pub async fn run(port: u16) -> anyhow::Result<()> {
        use axum::{routing::get, Router};
        use std::net::SocketAddr;

        init_metrics();

        let app = Router::new()
            .route("/metrics", get(Self::metrics_handler))
            .route("/health", get(|| async { "OK" }));

        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        tracing::info!(%addr, "metrics server listening");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    async fn metrics_handler() -> String {
        let encoder = TextEncoder::new();
        let metric_families = REGISTRY.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }
}
