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

use subgen::JobState;

struct Metrics {
    registry: Registry,
    http_requests_total: IntCounterVec,
    http_request_duration_seconds: HistogramVec,
    http_in_flight_requests: IntGauge,
    jobs_total: IntCounterVec,
    jobs_in_flight: IntGauge,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

fn metrics() -> &'static Metrics {
    METRICS.get_or_init(|| {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            PromOpts::new(
                "subgen_http_requests_total",
                "Total HTTP requests served by subgen-server.",
            ),
            &["status"],
        )
        .expect("metrics definition must be valid");

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "subgen_http_request_duration_seconds",
                "HTTP request latency in seconds.",
            ),
            &["status"],
        )
        .expect("metrics definition must be valid");

        let http_in_flight_requests = IntGauge::new(
            "subgen_http_in_flight_requests",
            "Current number of in-flight HTTP requests.",
        )
        .expect("metrics definition must be valid");

        let jobs_total = IntCounterVec::new(
            PromOpts::new(
                "subgen_jobs_total",
                "Finished transcription jobs by outcome.",
            ),
            &["outcome"],
        )
        .expect("metrics definition must be valid");

        let jobs_in_flight = IntGauge::new(
            "subgen_jobs_in_flight",
            "Current number of in-flight transcription jobs.",
        )
        .expect("metrics definition must be valid");

        registry
            .register(Box::new(http_requests_total.clone()))
            .expect("metrics must register");
        registry
            .register(Box::new(http_request_duration_seconds.clone()))
            .expect("metrics must register");
        registry
            .register(Box::new(http_in_flight_requests.clone()))
            .expect("metrics must register");
        registry
            .register(Box::new(jobs_total.clone()))
            .expect("metrics must register");
        registry
            .register(Box::new(jobs_in_flight.clone()))
            .expect("metrics must register");

        Metrics {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            http_in_flight_requests,
            jobs_total,
            jobs_in_flight,
        }
    })
}

pub fn init() {
    let _ = metrics();
}

/// One job's slot in the in-flight gauge.
///
/// Worker tasks can panic, and the gauge must come back down anyway, so the
/// slot decrements on drop. An unresolved drop counts the job as failed,
/// matching what the worker's own guard does to the job record.
pub struct InFlightJob {
    resolved: bool,
}

impl InFlightJob {
    /// Record that a job was accepted and its worker spawned.
    pub fn start() -> Self {
        metrics().jobs_in_flight.inc();
        Self { resolved: false }
    }

    /// Record the job's terminal state and release the gauge slot.
    pub fn finish(mut self, outcome: JobState) {
        self.resolved = true;
        record_outcome(outcome);
    }
}

impl Drop for InFlightJob {
    fn drop(&mut self) {
        if !self.resolved {
            record_outcome(JobState::Failed);
        }
    }
}

fn record_outcome(outcome: JobState) {
    metrics().jobs_in_flight.dec();
    metrics()
        .jobs_total
        .with_label_values(&[outcome.as_str()])
        .inc();
}

pub async fn prometheus_metrics() -> Response {
    let families = metrics().registry.gather();
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

    metrics().http_in_flight_requests.inc();
    let response = next.run(req).await;
    metrics().http_in_flight_requests.dec();

    let status = response.status().as_u16().to_string();
    metrics()
        .http_requests_total
        .with_label_values(&[&status])
        .inc();
    metrics()
        .http_request_duration_seconds
        .with_label_values(&[&status])
        .observe(start.elapsed().as_secs_f64());

    response
}
