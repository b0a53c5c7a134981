use std::sync::OnceLock;
use std::time::Instant;

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::Request;
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts as PromOpts, Registry,
    TextEncoder,
};

struct Metrics {
    registry: Registry,
    http_requests_total: IntCounterVec,
    http_request_duration_seconds: HistogramVec,
    http_in_flight_requests: IntGauge,
    upstream_requests_total: IntCounterVec,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

fn build() -> prometheus::Result<Metrics> {
    let registry = Registry::new();

    let http_requests_total = IntCounterVec::new(
        PromOpts::new(
            "skitvoice_http_requests_total",
            "Total HTTP requests served by skitvoice-server.",
        ),
        &["status"],
    )?;

    let http_request_duration_seconds = HistogramVec::new(
        HistogramOpts::new(
            "skitvoice_http_request_duration_seconds",
            "HTTP request latency in seconds.",
        ),
        &["status"],
    )?;

    let http_in_flight_requests = IntGauge::new(
        "skitvoice_http_in_flight_requests",
        "Current number of in-flight HTTP requests.",
    )?;

    let upstream_requests_total = IntCounterVec::new(
        PromOpts::new(
            "skitvoice_upstream_requests_total",
            "Voice generation requests sent upstream, by tone and upstream status.",
        ),
        &["tone", "status"],
    )?;

    registry.register(Box::new(http_requests_total.clone()))?;
    registry.register(Box::new(http_request_duration_seconds.clone()))?;
    registry.register(Box::new(http_in_flight_requests.clone()))?;
    registry.register(Box::new(upstream_requests_total.clone()))?;

    Ok(Metrics {
        registry,
        http_requests_total,
        http_request_duration_seconds,
        http_in_flight_requests,
        upstream_requests_total,
    })
}

pub fn init() -> prometheus::Result<()> {
    if METRICS.get().is_some() {
        return Ok(());
    }
    let _ = METRICS.set(build()?);
    Ok(())
}

pub fn record_upstream(tone: &str, status: u16) {
    if let Some(m) = METRICS.get() {
        let status = status.to_string();
        m.upstream_requests_total
            .with_label_values(&[tone, status.as_str()])
            .inc();
    }
}

pub async fn prometheus_metrics() -> Response {
    let Some(m) = METRICS.get() else {
        return (StatusCode::SERVICE_UNAVAILABLE, "metrics disabled").into_response();
    };

    let families = m.registry.gather();
    let mut buf = Vec::new();
    if TextEncoder::new().encode(&families, &mut buf).is_err() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "failed to encode metrics",
        )
            .into_response();
    }

    (
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
        )],
        buf,
    )
        .into_response()
}

pub async fn track_http_metrics(req: Request<Body>, next: Next) -> Response {
    let Some(m) = METRICS.get() else {
        return next.run(req).await;
    };

    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str())
        .unwrap_or_else(|| req.uri().path())
        .to_owned();

    if route == "/metrics" || route == "/healthz" {
        return next.run(req).await;
    }

    let start = Instant::now();

    m.http_in_flight_requests.inc();
    let response = next.run(req).await;
    m.http_in_flight_requests.dec();

    let status = response.status().as_u16().to_string();
    m.http_requests_total.with_label_values(&[&status]).inc();
    m.http_request_duration_seconds
        .with_label_values(&[&status])
        .observe(start.elapsed().as_secs_f64());

    response
}
