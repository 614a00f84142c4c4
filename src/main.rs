//! Airport Locator Server
//!
//! Serves nearest-airport and route-distance lookups over HTTP.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Airport Locator                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │   Dataset    │───▶│   Locator    │◀───│  HTTP API    │       │
//! │  │   Watcher    │    │   Service    │    │  (hyper)     │       │
//! │  │  (reload)    │    │  + cache     │    │              │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use clap::{Parser, ValueEnum};
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use once_cell::sync::Lazy;
use prometheus::{Encoder, GaugeVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use airport_locator::cache::{
    CacheBackend, CacheConfig, HttpKvBackend, HttpKvConfig, InMemoryBackend,
};
use airport_locator::error::{Error, Result};
use airport_locator::service::{LocatorConfig, LocatorService};
use airport_locator::store::{import, InMemoryLocationStore};
use airport_locator::{DistanceUnit, NearestQuery};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Cache backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendKind {
    Memory,
    Consul,
}

/// Airport Locator - nearest-airport lookups with a TTL cache
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the JSON airport dataset
    #[arg(long, env = "DATASET")]
    dataset: PathBuf,

    /// HTTP bind address
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    listen_addr: String,

    /// Dataset change poll interval in seconds (0 disables polling)
    #[arg(long, env = "RELOAD_INTERVAL_SECONDS", default_value = "60")]
    reload_interval_seconds: u64,

    /// Cache backend
    #[arg(long, env = "CACHE_BACKEND", value_enum, default_value = "memory")]
    cache_backend: BackendKind,

    /// Consul agent URL (consul backend only)
    #[arg(long, env = "CONSUL_URL", default_value = "http://127.0.0.1:8500")]
    consul_url: String,

    /// Consul ACL token
    #[arg(long, env = "CONSUL_TOKEN")]
    consul_token: Option<String>,

    /// Cache key namespace
    #[arg(long, env = "CACHE_NAMESPACE", default_value = "airports")]
    cache_namespace: String,

    /// Cache backend call timeout in milliseconds
    #[arg(long, env = "CACHE_TIMEOUT_MS", default_value = "250")]
    cache_timeout_ms: u64,

    /// Disable the computation cache
    #[arg(long, env = "CACHE_DISABLED")]
    cache_disabled: bool,

    /// TTL of cached nearest-airport answers in seconds
    #[arg(long, env = "NEAREST_TTL_SECONDS", default_value = "300")]
    nearest_ttl_seconds: u64,

    /// TTL of cached route distances in seconds
    #[arg(long, env = "DISTANCE_TTL_SECONDS", default_value = "900")]
    distance_ttl_seconds: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

type Service = LocatorService<InMemoryLocationStore>;

struct AppState {
    service: Service,
    dataset: PathBuf,
    metrics: ServerMetrics,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    info!("Starting Airport Locator");
    info!("  Dataset: {}", args.dataset.display());
    info!("  Cache backend: {:?}", args.cache_backend);
    info!("  Nearest TTL: {}s", args.nearest_ttl_seconds);
    info!("  Distance TTL: {}s", args.distance_ttl_seconds);

    let backend = build_backend(&args)?;
    let config = LocatorConfig {
        nearest_ttl: Duration::from_secs(args.nearest_ttl_seconds),
        distance_ttl: Duration::from_secs(args.distance_ttl_seconds),
        cache: CacheConfig {
            namespace: args.cache_namespace.clone(),
            backend_timeout: Duration::from_millis(args.cache_timeout_ms),
            enabled: !args.cache_disabled,
            ..Default::default()
        },
    };

    let store = Arc::new(InMemoryLocationStore::new());
    let state = Arc::new(AppState {
        service: LocatorService::new(store, backend, config),
        dataset: args.dataset.clone(),
        metrics: ServerMetrics::new()?,
    });

    // Initial load; the server still starts so /readyz can report the failure
    let mut last_modified = modified_at(&state.dataset);
    if let Err(e) = reload_dataset(&state).await {
        error!("Initial dataset load failed: {}", e);
        error!("Continuing anyway - lookups return 503 until a reload succeeds");
    }

    if args.reload_interval_seconds > 0 {
        let watcher_state = state.clone();
        let interval = Duration::from_secs(args.reload_interval_seconds);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let current = modified_at(&watcher_state.dataset);
                if current.is_some() && current != last_modified {
                    info!("Dataset changed, reloading");
                    match reload_dataset(&watcher_state).await {
                        Ok(_) => last_modified = current,
                        Err(e) => warn!("Dataset reload failed: {}", e),
                    }
                }
            }
        });
    }

    tokio::select! {
        result = run_server(&args.listen_addr, state) => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutdown signal received"),
    }

    info!("Airport Locator shutdown complete");
    Ok(())
}

fn build_backend(args: &Args) -> Result<Arc<dyn CacheBackend>> {
    match args.cache_backend {
        BackendKind::Memory => Ok(Arc::new(InMemoryBackend::new())),
        BackendKind::Consul => {
            let backend = HttpKvBackend::new(HttpKvConfig {
                base_url: args.consul_url.clone(),
                token: args.consul_token.clone(),
                request_timeout: Duration::from_millis(args.cache_timeout_ms),
                ..Default::default()
            })?;
            info!("  Consul URL: {}", args.consul_url);
            Ok(Arc::new(backend))
        }
    }
}

fn modified_at(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

async fn reload_dataset(state: &AppState) -> Result<usize> {
    let path = state.dataset.clone();
    let records = tokio::task::spawn_blocking(move || import::load_records(path))
        .await
        .map_err(|e| Error::Internal(format!("Dataset load task failed: {}", e)))??;

    let count = state.service.reload(records).await?;
    state.metrics.locations.set(count as i64);
    Ok(count)
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=warn"] {
        if let Ok(d) = directive.parse() {
            filter = filter.add_directive(d);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Prometheus Metrics
// =============================================================================

static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

struct ServerMetrics {
    requests: IntCounterVec,
    cache: GaugeVec,
    locations: IntGauge,
}

impl ServerMetrics {
    fn new() -> Result<Self> {
        let requests = IntCounterVec::new(
            Opts::new("airport_locator_requests_total", "HTTP requests by route and status"),
            &["route", "status"],
        )
        .map_err(metrics_error)?;
        let cache = GaugeVec::new(
            Opts::new("airport_locator_cache", "Computation cache counters"),
            &["event"],
        )
        .map_err(metrics_error)?;
        let locations = IntGauge::new("airport_locator_locations", "Records in the current snapshot")
            .map_err(metrics_error)?;

        REGISTRY.register(Box::new(requests.clone())).map_err(metrics_error)?;
        REGISTRY.register(Box::new(cache.clone())).map_err(metrics_error)?;
        REGISTRY.register(Box::new(locations.clone())).map_err(metrics_error)?;

        Ok(Self {
            requests,
            cache,
            locations,
        })
    }

    /// Copy cache counters into gauges before a scrape
    fn refresh(&self, service: &Service) {
        let snap = service.cache().metrics().snapshot();
        let values = [
            ("hit", snap.hits),
            ("miss", snap.misses),
            ("compute", snap.computes),
            ("compute_error", snap.compute_errors),
            ("coalesced", snap.coalesced),
            ("backend_error", snap.backend_errors),
            ("backend_timeout", snap.backend_timeouts),
            ("corrupt_entry", snap.corrupt_entries),
            ("invalidation", snap.invalidations),
        ];
        for (event, value) in values {
            self.cache.with_label_values(&[event]).set(value as f64);
        }
        self.cache.with_label_values(&["hit_ratio"]).set(snap.hit_ratio);
    }
}

fn metrics_error(e: prometheus::Error) -> Error {
    Error::Internal(format!("Metrics registration failed: {}", e))
}

// =============================================================================
// HTTP Server
// =============================================================================

async fn run_server(addr: &str, state: Arc<AppState>) -> Result<()> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Config(format!("Invalid listen address: {}", e)))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind server: {}", e)))?;

    info!("HTTP server listening on {}", addr);

    loop {
        let (stream, _) = listener
            .accept()
            .await
            .map_err(|e| Error::Internal(format!("Server accept error: {}", e)))?;

        let io = TokioIo::new(stream);
        let state = state.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let state = state.clone();
                async move { Ok::<_, Infallible>(handle(&state, req).await) }
            });
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!("Connection error: {}", e);
            }
        });
    }
}

async fn handle(state: &AppState, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let params = query_params(req.uri().query());

    let (route, response) = match (req.method(), req.uri().path()) {
        (&Method::GET, "/nearest") => ("nearest", nearest(state, &params).await),
        (&Method::GET, "/distance") => ("distance", distance(state, &params).await),
        (&Method::POST, "/reload") => ("reload", reload(state).await),
        (&Method::GET, "/healthz") | (&Method::GET, "/livez") => {
            ("healthz", text_response(StatusCode::OK, "ok"))
        }
        (&Method::GET, "/readyz") => {
            let response = if state.service.is_ready() {
                text_response(StatusCode::OK, "ok")
            } else {
                text_response(StatusCode::SERVICE_UNAVAILABLE, "no dataset loaded")
            };
            ("readyz", response)
        }
        (&Method::GET, "/metrics") => ("metrics", metrics(state)),
        _ => ("other", text_response(StatusCode::NOT_FOUND, "not found")),
    };

    state
        .metrics
        .requests
        .with_label_values(&[route, response.status().as_str()])
        .inc();
    response
}

async fn nearest(state: &AppState, params: &HashMap<String, String>) -> Response<Full<Bytes>> {
    let query = match parse_nearest(params) {
        Ok(query) => query,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, &message),
    };

    match state.service.nearest(&query).await {
        Ok(results) => json_response(StatusCode::OK, &results),
        Err(e) => service_error(e),
    }
}

async fn distance(state: &AppState, params: &HashMap<String, String>) -> Response<Full<Bytes>> {
    let (Some(from), Some(to)) = (params.get("from"), params.get("to")) else {
        return error_response(StatusCode::BAD_REQUEST, "from and to are required");
    };
    let unit = match params.get("unit").map(|u| u.parse::<DistanceUnit>()).transpose() {
        Ok(unit) => unit.unwrap_or_default(),
        Err(e) => return service_error(e),
    };

    match state.service.distance_between(from, to, unit).await {
        Ok(route) => json_response(StatusCode::OK, &route),
        Err(e) => service_error(e),
    }
}

async fn reload(state: &AppState) -> Response<Full<Bytes>> {
    #[derive(Serialize)]
    struct Reloaded {
        records: usize,
    }

    match reload_dataset(state).await {
        Ok(records) => json_response(StatusCode::OK, &Reloaded { records }),
        Err(e) => service_error(e),
    }
}

fn metrics(state: &AppState) -> Response<Full<Bytes>> {
    state.metrics.refresh(&state.service);

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
    }

    build_response(StatusCode::OK, encoder.format_type(), Bytes::from(buffer))
}

fn parse_nearest(params: &HashMap<String, String>) -> std::result::Result<NearestQuery, String> {
    fn required(params: &HashMap<String, String>, name: &str) -> std::result::Result<f64, String> {
        let raw = params.get(name).ok_or_else(|| format!("{} is required", name))?;
        raw.parse().map_err(|_| format!("{} must be a number", name))
    }

    let mut query = NearestQuery::new(required(params, "lat")?, required(params, "lon")?);

    if let Some(raw) = params.get("limit") {
        let limit = raw
            .parse()
            .map_err(|_| "limit must be a non-negative integer".to_string())?;
        query = query.limit(limit);
    }
    if let Some(raw) = params.get("radius_km") {
        let radius = raw
            .parse()
            .map_err(|_| "radius_km must be a number".to_string())?;
        query = query.radius_km(radius);
    }
    if let Some(country) = params.get("country") {
        query = query.country(country.as_str());
    }
    if let Some(raw) = params.get("unit") {
        query = query.unit(raw.parse().map_err(|e: Error| e.to_string())?);
    }
    Ok(query)
}

/// Decode `a=1&b=2` into a map; later duplicates win
fn query_params(query: Option<&str>) -> HashMap<String, String> {
    query
        .unwrap_or_default()
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            let value = value.replace('+', " ");
            let name = urlencoding::decode(name).ok()?.into_owned();
            let value = urlencoding::decode(&value).ok()?.into_owned();
            Some((name, value))
        })
        .collect()
}

fn status_for(error: &Error) -> StatusCode {
    match error {
        e if e.is_validation() => StatusCode::BAD_REQUEST,
        Error::LocationNotFound(_) => StatusCode::NOT_FOUND,
        Error::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::InvalidRecord { .. } | Error::Serialization(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn service_error(error: Error) -> Response<Full<Bytes>> {
    let status = status_for(&error);
    if status.is_server_error() {
        warn!("Request failed: {}", error);
    }
    error_response(status, &error.to_string())
}

fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    #[derive(Serialize)]
    struct ErrorBody<'a> {
        error: &'a str,
    }
    json_response(status, &ErrorBody { error: message })
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(body) {
        Ok(encoded) => build_response(status, "application/json", Bytes::from(encoded)),
        Err(e) => text_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

fn text_response(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    build_response(status, "text/plain; charset=utf-8", Bytes::from(body.to_string()))
}

fn build_response(status: StatusCode, content_type: &str, body: Bytes) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", content_type)
        .body(Full::new(body))
        .unwrap_or_else(|_| {
            let mut response = Response::new(Full::new(Bytes::from_static(b"internal error")));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_query_params_decoding() {
        let parsed = query_params(Some("lat=31.76&lon=-106.49&country=u%73&name=El+Paso&flag"));
        assert_eq!(parsed.get("lat").map(String::as_str), Some("31.76"));
        assert_eq!(parsed.get("country").map(String::as_str), Some("us"));
        assert_eq!(parsed.get("name").map(String::as_str), Some("El Paso"));
        assert_eq!(parsed.get("flag").map(String::as_str), Some(""));
        assert!(query_params(None).is_empty());
    }

    #[test]
    fn test_parse_nearest_defaults() {
        let query = parse_nearest(&params(&[("lat", "31.76"), ("lon", "-106.49")])).unwrap();
        assert_eq!(query, NearestQuery::new(31.76, -106.49));
    }

    #[test]
    fn test_parse_nearest_all_parameters() {
        let query = parse_nearest(&params(&[
            ("lat", "31.76"),
            ("lon", "-106.49"),
            ("limit", "5"),
            ("radius_km", "150"),
            ("country", "mx"),
            ("unit", "MI"),
        ]))
        .unwrap();

        assert_eq!(query.limit, 5);
        assert_eq!(query.radius_km, 150.0);
        assert_eq!(query.country.as_deref(), Some("MX"));
        assert_eq!(query.unit, DistanceUnit::Mi);
    }

    #[test]
    fn test_parse_nearest_rejects_bad_input() {
        assert_matches!(parse_nearest(&params(&[("lon", "1")])), Err(m) if m.contains("lat"));
        assert_matches!(
            parse_nearest(&params(&[("lat", "x"), ("lon", "1")])),
            Err(m) if m.contains("number")
        );
        assert!(parse_nearest(&params(&[("lat", "1"), ("lon", "1"), ("limit", "-1")])).is_err());
        assert!(parse_nearest(&params(&[("lat", "1"), ("lon", "1"), ("unit", "nm")])).is_err());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&Error::InvalidLimit(0)), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(&Error::StoreUnavailable("x".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(status_for(&Error::LocationNotFound("X".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(&Error::Internal("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_response_body() {
        let response = error_response(StatusCode::BAD_REQUEST, "lat is required");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get("Content-Type").map(|v| v.as_bytes()),
            Some(&b"application/json"[..])
        );
    }
}
