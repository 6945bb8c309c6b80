//! Prometheus metrics definitions and HTTP server

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram, Counter,
    CounterVec, Encoder, Gauge, Histogram, TextEncoder,
};
use tokio::net::TcpListener;
use tracing::{error, info};

lazy_static::lazy_static! {
    /// Job watch events by type (ADDED, MODIFIED, DELETED)
    pub static ref JOB_EVENTS: CounterVec = register_counter_vec!(
        "kubespresso_job_events_total",
        "Total number of Job watch events",
        &["type"]
    ).unwrap();

    /// Handler failures by handler name
    pub static ref HANDLER_ERRORS: CounterVec = register_counter_vec!(
        "kubespresso_handler_errors_total",
        "Total number of event handler failures",
        &["handler"]
    ).unwrap();

    /// Coffee decisions by outcome
    pub static ref COFFEE_DECISIONS: CounterVec = register_counter_vec!(
        "kubespresso_coffee_decisions_total",
        "Total number of coffee decisions by outcome",
        &["outcome"]
    ).unwrap();

    /// Cups brewed
    pub static ref COFFEES_BREWED: Counter = register_counter!(
        "kubespresso_coffees_brewed_total",
        "Total number of coffees brewed"
    ).unwrap();

    /// Failed brew requests
    pub static ref BREW_ERRORS: Counter = register_counter!(
        "kubespresso_brew_errors_total",
        "Total number of failed brew requests"
    ).unwrap();

    /// Brew request duration histogram
    pub static ref BREW_DURATION: Histogram = register_histogram!(
        "kubespresso_brew_duration_seconds",
        "Duration of brew requests in seconds",
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    ).unwrap();

    /// Errors returned by the Job watch
    pub static ref WATCH_ERRORS: Counter = register_counter!(
        "kubespresso_watch_errors_total",
        "Total number of Job watch errors"
    ).unwrap();

    /// Jobs currently known to exist
    pub static ref KNOWN_JOBS: Gauge = register_gauge!(
        "kubespresso_known_jobs",
        "Number of Jobs currently tracked"
    ).unwrap();

    /// Operator health (1 = healthy, 0 = unhealthy)
    pub static ref OPERATOR_HEALTH: Gauge = register_gauge!(
        "kubespresso_health",
        "Controller health status (1 = healthy, 0 = unhealthy)"
    ).unwrap();
}

static READY: AtomicBool = AtomicBool::new(false);

/// Flip the readiness endpoint, set once the first Job list completed
pub fn set_ready(ready: bool) {
    READY.store(ready, Ordering::Relaxed);
}

pub fn is_ready() -> bool {
    READY.load(Ordering::Relaxed)
}

/// Start the metrics HTTP server
pub async fn serve(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    OPERATOR_HEALTH.set(1.0);

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(handle_request))
                .await
            {
                error!("Error serving connection: {}", e);
            }
        });
    }
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    Ok(route(req.uri().path()))
}

/// Response for a request path
pub fn route(path: &str) -> Response<Full<Bytes>> {
    match path {
        "/metrics" => metrics_response(),
        "/healthz" | "/health" => health_response(),
        "/readyz" | "/ready" => ready_response(),
        _ => text_response(StatusCode::NOT_FOUND, "Not Found"),
    }
}

fn metrics_response() -> Response<Full<Bytes>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return text_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics");
    }

    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", encoder.format_type())
        .body(Full::new(Bytes::from(buffer)))
        .unwrap()
}

fn health_response() -> Response<Full<Bytes>> {
    if OPERATOR_HEALTH.get() > 0.0 {
        text_response(StatusCode::OK, "ok")
    } else {
        text_response(StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    }
}

fn ready_response() -> Response<Full<Bytes>> {
    if is_ready() {
        text_response(StatusCode::OK, "ok")
    } else {
        text_response(StatusCode::SERVICE_UNAVAILABLE, "waiting for initial Job list")
    }
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}
