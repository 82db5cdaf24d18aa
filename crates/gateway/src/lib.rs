//! HTTP gateway for the consumer token sidecar.
//!
//! Wires the token-issuance handler (C8), the health aggregator (C9), and
//! the router (C10) onto one `axum::Router`, sharing a single set of
//! long-lived subsystems (governor, resilient wrapper, telemetry) across
//! every request.

pub mod health;
pub mod metrics;
pub mod openapi;
pub mod shutdown;
pub mod tokens;

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use sidecar_config::AppConfig;
use sidecar_gatewayclient::GatewayAdminClient;
use sidecar_governor::{CardinalityGovernor, VolumeClassifier};
use sidecar_resilience::{default_clock, LocalStaleCache, ResilientGatewayWrapper};
use sidecar_telemetry::TelemetryEngine;

/// Subsystems shared by every request handler. One instance lives for the
/// process lifetime, constructed once in [`build_state`] (spec §9 "avoid
/// module-level mutable state").
pub struct AppState {
    pub config: AppConfig,
    pub wrapper: ResilientGatewayWrapper,
    pub admin_client: GatewayAdminClient,
    pub cardinality: CardinalityGovernor,
    pub volume: VolumeClassifier,
    pub telemetry: TelemetryEngine,
    pub started_at: Instant,
}

pub type SharedState = Arc<AppState>;

/// Construct every long-lived subsystem from a loaded config (spec §4.2–
/// §4.7 constructors wired together).
pub fn build_state(config: AppConfig) -> SharedState {
    let admin_client = GatewayAdminClient::with_timeouts(
        config.gateway_admin_url.clone(),
        config.gateway_admin_token.clone(),
        config.admin_request_timeout,
        config.admin_health_timeout,
    );

    let clock = default_clock();
    let cache = Arc::new(LocalStaleCache::new(
        config.stale_tolerance_minutes * 60 * 1000,
        clock.clone(),
    ));
    let fetcher_client = GatewayAdminClient::with_timeouts(
        config.gateway_admin_url.clone(),
        config.gateway_admin_token.clone(),
        config.admin_request_timeout,
        config.admin_health_timeout,
    );
    let mut wrapper = ResilientGatewayWrapper::new(
        Arc::new(fetcher_client),
        cache,
        clock,
        config.breaker_enabled,
    );
    for op in ["getConsumerSecret", "createConsumerSecret", "healthCheck"] {
        wrapper = wrapper.with_policy(op, config.policy_for(op));
    }

    Arc::new(AppState {
        cardinality: CardinalityGovernor::new(config.max_unique_consumers),
        volume: VolumeClassifier::new(),
        telemetry: TelemetryEngine::new(),
        admin_client,
        wrapper,
        config,
        started_at: Instant::now(),
    })
}

/// Build the full router: token issuance, health, metrics, and the
/// OpenAPI document, wrapped with request-id, CORS, body-size-limit, and
/// 404/405-to-problem+json normalization (spec §4.10).
pub fn build_router(state: SharedState) -> Router {
    let max_body_bytes = state.config.max_body_bytes;

    Router::new()
        .route("/", get(openapi::serve_openapi))
        .route("/tokens", get(tokens::handle_token_request))
        .route("/health", get(health::rollup_handler))
        .route("/health/ready", get(health::readiness_handler))
        .route("/health/telemetry", get(health::telemetry_handler))
        .route("/metrics", get(metrics::snapshot_handler))
        .fallback(not_found_handler)
        .layer(middleware::from_fn(normalize_method_errors))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(middleware::from_fn_with_state(state.clone(), cors_and_options))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server and run until a termination signal is received
/// (spec §5 graceful shutdown, A5).
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.bind_host, config.bind_port);
    let state = build_state(config);

    let cardinality_handle = spawn_reset_timer(
        "cardinality",
        Duration::from_secs(state.config.cardinality_reset_minutes * 60),
        {
            let state = state.clone();
            move || state.cardinality.reset()
        },
    );
    let volume_handle = spawn_reset_timer(
        "volume",
        Duration::from_secs(state.config.volume_reset_minutes * 60),
        {
            let state = state.clone();
            move || state.volume.reset()
        },
    );

    let app = build_router(state);

    info!(addr = %addr, "gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown::wait_for_signal())
        .await?;

    cardinality_handle.abort();
    volume_handle.abort();
    info!("gateway stopped");

    Ok(())
}

/// Spawn a periodic reset timer, cancellable via the returned handle
/// (spec §5 "Timers", matching the teacher's `WorkflowEngine::start`
/// `tokio::spawn` + `tokio::time::interval` shape).
fn spawn_reset_timer(
    name: &'static str,
    period: Duration,
    reset: impl Fn() + Send + 'static,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await; // first tick fires immediately; skip it
        loop {
            ticker.tick().await;
            info!(timer = name, "periodic reset firing");
            reset();
        }
    })
}

// --- Ambient middleware (A2/A3/A5 support, spec §6) ---

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Stamps every response with `X-Request-Id`, generating one per request
/// if the caller didn't supply one, and stores it in request extensions
/// for handlers to read (spec §4.8 "attach the request id to both the
/// response body and the `X-Request-Id` header").
async fn request_id_middleware(mut req: axum::extract::Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    req.extensions_mut().insert(RequestId(request_id.clone()));

    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}

/// The per-request id, threaded through `axum::extract::Request` extensions.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

impl Default for RequestId {
    fn default() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// `OPTIONS *` short-circuits with CORS headers (spec §4.10); every other
/// response gets the same CORS headers appended on the way out.
async fn cors_and_options(
    State(state): State<SharedState>,
    req: axum::extract::Request,
    next: Next,
) -> Response {
    let origin = state.config.cors_allow_origin.clone();
    if req.method() == Method::OPTIONS {
        return (
            StatusCode::NO_CONTENT,
            [
                (axum::http::header::ACCESS_CONTROL_ALLOW_ORIGIN, origin),
                (
                    axum::http::header::ACCESS_CONTROL_ALLOW_METHODS,
                    "GET, OPTIONS".to_string(),
                ),
                (
                    axum::http::header::ACCESS_CONTROL_ALLOW_HEADERS,
                    "content-type, x-consumer-id, x-consumer-username, x-anonymous-consumer"
                        .to_string(),
                ),
            ],
        )
            .into_response();
    }

    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&origin) {
        response
            .headers_mut()
            .insert(axum::http::header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
    }
    response
}

#[derive(Serialize)]
struct ProblemDetails {
    #[serde(rename = "type")]
    kind: &'static str,
    title: &'static str,
    status: u16,
    detail: String,
    instance: String,
    #[serde(rename = "requestId")]
    request_id: String,
}

async fn not_found_handler(req: axum::extract::Request) -> Response {
    let path = req.uri().path().to_string();
    let request_id = req
        .extensions()
        .get::<RequestId>()
        .cloned()
        .unwrap_or_default()
        .0;
    problem_404(&path, &request_id)
}

fn problem_404(path: &str, request_id: &str) -> Response {
    let body = ProblemDetails {
        kind: "about:blank",
        title: "Not Found",
        status: 404,
        detail: format!("no route for {path}"),
        instance: path.to_string(),
        request_id: request_id.to_string(),
    };
    (
        StatusCode::NOT_FOUND,
        [(axum::http::header::CONTENT_TYPE, "application/problem+json")],
        Json(body),
    )
        .into_response()
}

/// Axum returns a bare 405 for a registered path called with the wrong
/// method; rewrite it to the same problem+json 404 shape the spec
/// specifies for "unknown paths/methods" (§4.10).
async fn normalize_method_errors(req: axum::extract::Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    let request_id = req
        .extensions()
        .get::<RequestId>()
        .cloned()
        .unwrap_or_default()
        .0;
    let response = next.run(req).await;
    if response.status() == StatusCode::METHOD_NOT_ALLOWED {
        warn!(path = %path, "method not allowed, normalizing to problem+json 404");
        return problem_404(&path, &request_id);
    }
    response
}

/// Shared shape for every non-404 error body (spec §7 "every error
/// response carries `{error, requestId, timestamp}`").
#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub timestamp: String,
}

pub fn error_response(status: StatusCode, message: impl Into<String>, request_id: &str) -> Response {
    let body = ErrorBody {
        error: message.into(),
        request_id: request_id.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    if status == StatusCode::SERVICE_UNAVAILABLE {
        return (
            status,
            [(axum::http::header::RETRY_AFTER, "30")],
            Json(body),
        )
            .into_response();
    }
    (status, Json(body)).into_response()
}

pub fn log_and_error(
    status: StatusCode,
    message: impl Into<String>,
    request_id: &str,
) -> Response {
    let message = message.into();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::PAYLOAD_TOO_LARGE => {
            warn!(status = status.as_u16(), request_id, %message, "request rejected");
        }
        _ => error!(status = status.as_u16(), request_id, %message, "request failed"),
    }
    error_response(status, message, request_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_config() -> AppConfig {
        std::env::set_var("GATEWAY_ADMIN_URL", "http://localhost:9999");
        std::env::set_var("SIGNING_AUTHORITY", "gw-1");
        std::env::set_var("SIGNING_AUDIENCE", "my-api");
        AppConfig::load().unwrap()
    }

    #[tokio::test]
    async fn unknown_path_returns_problem_json_404() {
        let state = build_state(test_config());
        let app = build_router(state);

        let req = Request::builder()
            .uri("/does-not-exist")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response
                .headers()
                .get(axum::http::header::CONTENT_TYPE)
                .unwrap(),
            "application/problem+json"
        );
    }

    #[tokio::test]
    async fn options_request_short_circuits_with_cors_headers() {
        let state = build_state(test_config());
        let app = build_router(state);

        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri("/tokens")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response
            .headers()
            .contains_key(axum::http::header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }

    #[tokio::test]
    async fn every_response_carries_request_id_header() {
        let state = build_state(test_config());
        let app = build_router(state);

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert!(response.headers().contains_key("x-request-id"));
    }
}
