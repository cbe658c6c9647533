use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder,
};
use tokio::net::TcpListener;
use tracing::info;

const BATCH_SECONDS_BUCKETS: &[f64] = &[0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];

#[derive(Clone)]
pub struct PipelineMetrics {
    registry: Registry,
    pub matches_processed: IntCounter,
    pub batches_processed: IntCounter,
    pub buffer_size: IntGauge,
    pub batch_seconds: Histogram,
    pub fetch_failures: IntCounter,
    pub events_ingested: IntCounter,
    pub discovery_rounds: IntCounter,
}

impl PipelineMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let matches_processed = IntCounter::new(
            "matches_processed_total",
            "Total matches processed in batches",
        )?;
        let batches_processed =
            IntCounter::new("batches_processed_total", "Total batches processed")?;
        let buffer_size = IntGauge::new("match_buffer_size", "Current size of the match buffer")?;
        let batch_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "match_batch_processing_seconds",
                "Time spent processing a batch of matches",
            )
            .buckets(BATCH_SECONDS_BUCKETS.to_vec()),
        )?;
        let fetch_failures = IntCounter::new(
            "match_fetch_failures_total",
            "Matches whose event log could not be fetched",
        )?;
        let events_ingested =
            IntCounter::new("events_ingested_total", "Events appended to the event log")?;
        let discovery_rounds =
            IntCounter::new("discovery_rounds_total", "Completed discovery rounds")?;

        registry.register(Box::new(matches_processed.clone()))?;
        registry.register(Box::new(batches_processed.clone()))?;
        registry.register(Box::new(buffer_size.clone()))?;
        registry.register(Box::new(batch_seconds.clone()))?;
        registry.register(Box::new(fetch_failures.clone()))?;
        registry.register(Box::new(events_ingested.clone()))?;
        registry.register(Box::new(discovery_rounds.clone()))?;

        Ok(Self {
            registry,
            matches_processed,
            batches_processed,
            buffer_size,
            batch_seconds,
            fetch_failures,
            events_ingested,
            discovery_rounds,
        })
    }

    pub fn record_batch(&self, matches: usize, failed: usize, events: usize, elapsed: Duration) {
        self.matches_processed.inc_by(matches as u64);
        self.batches_processed.inc();
        self.fetch_failures.inc_by(failed as u64);
        self.events_ingested.inc_by(events as u64);
        self.batch_seconds.observe(elapsed.as_secs_f64());
    }

    pub fn set_buffer_len(&self, len: usize) {
        self.buffer_size.set(len as i64);
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn encode(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .context("encode metrics")?;
        String::from_utf8(buffer).context("metrics are not utf-8")
    }
}

pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind metrics endpoint {addr}"))
}

pub async fn serve(listener: TcpListener, metrics: PipelineMetrics) -> Result<()> {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics);
    if let Ok(addr) = listener.local_addr() {
        info!("metrics endpoint listening on http://{addr}/metrics");
    }
    axum::serve(listener, app)
        .await
        .context("metrics server stopped")
}

async fn metrics_handler(State(metrics): State<PipelineMetrics>) -> Response {
    match metrics.encode() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}")).into_response(),
    }
}
