//! End-to-end scenarios for the consumer token sidecar gateway (spec §8).
//!
//! Exercises the full router with a stubbed admin-API fetcher, matching
//! the teacher's convention of one `tests/e2e_integration.rs` per binary
//! crate driven via `tower::ServiceExt::oneshot`.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use sidecar_core::{ConsumerSecret, Error};
use sidecar_gateway::{build_router, AppState};
use sidecar_resilience::{
    default_clock, ConsumerSecretFetcher, LocalStaleCache, ResilientGatewayWrapper,
};

fn env_lock() -> &'static Mutex<()> {
    static LOCK: Mutex<()> = Mutex::new(());
    &LOCK
}

fn base_config() -> sidecar_config::AppConfig {
    std::env::set_var("GATEWAY_ADMIN_URL", "http://admin.internal");
    std::env::set_var("SIGNING_AUTHORITY", "gw-1");
    std::env::set_var("SIGNING_AUDIENCE", "my-api");
    sidecar_config::AppConfig::load().unwrap()
}

struct StubFetcher(Box<dyn Fn(&str) -> sidecar_core::Result<ConsumerSecret> + Send + Sync>);

#[async_trait::async_trait]
impl ConsumerSecretFetcher for StubFetcher {
    async fn get_consumer_secret(&self, consumer_id: &str) -> sidecar_core::Result<ConsumerSecret> {
        (self.0)(consumer_id)
    }
}

fn state_with(
    config: sidecar_config::AppConfig,
    fetcher: StubFetcher,
) -> Arc<AppState> {
    let clock = default_clock();
    let cache = Arc::new(LocalStaleCache::new(
        config.stale_tolerance_minutes * 60 * 1000,
        clock.clone(),
    ));
    let mut wrapper = ResilientGatewayWrapper::new(Arc::new(fetcher), cache, clock, config.breaker_enabled);
    for op in ["getConsumerSecret", "createConsumerSecret", "healthCheck"] {
        wrapper = wrapper.with_policy(op, config.policy_for(op));
    }

    Arc::new(AppState {
        admin_client: sidecar_gatewayclient::GatewayAdminClient::new(
            config.gateway_admin_url.clone(),
            config.gateway_admin_token.clone(),
        ),
        cardinality: sidecar_governor::CardinalityGovernor::new(config.max_unique_consumers),
        volume: sidecar_governor::VolumeClassifier::new(),
        telemetry: sidecar_telemetry::TelemetryEngine::new(),
        wrapper,
        config,
        started_at: Instant::now(),
    })
}

fn tokens_request(consumer_id: &str, username: &str, anonymous: &str) -> Request<Body> {
    Request::builder()
        .uri("/tokens")
        .header("x-consumer-id", consumer_id)
        .header("x-consumer-username", username)
        .header("x-anonymous-consumer", anonymous)
        .body(Body::empty())
        .unwrap()
}

fn secret(consumer_id: &str) -> ConsumerSecret {
    ConsumerSecret {
        credential_id: "cred-1".into(),
        key: "k1".into(),
        secret: b"s1".to_vec(),
        consumer_id: consumer_id.to_string(),
    }
}

#[tokio::test]
async fn scenario_1_happy_path() {
    let _guard = env_lock().lock().unwrap();
    let state = state_with(
        base_config(),
        StubFetcher(Box::new(|id| Ok(secret(id)))),
    );
    let app = build_router(state);

    let response = app.oneshot(tokens_request("c1", "alice", "false")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    let token = body["access_token"].as_str().unwrap();
    assert_eq!(token.matches('.').count(), 2);
    assert_eq!(body["expires_in"], 300);
}

#[tokio::test]
async fn scenario_2_anonymous_rejected() {
    let _guard = env_lock().lock().unwrap();
    let state = state_with(
        base_config(),
        StubFetcher(Box::new(|id| Ok(secret(id)))),
    );
    let app = build_router(state);

    let response = app.oneshot(tokens_request("c1", "alice", "true")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["error"].as_str().unwrap().contains("Anonymous"));
}

#[tokio::test]
async fn scenario_3_admin_api_unreachable() {
    let _guard = env_lock().lock().unwrap();
    let state = state_with(
        base_config(),
        StubFetcher(Box::new(|_| Err(Error::Transport("connection refused".into())))),
    );
    let app = build_router(state);

    let response = app.oneshot(tokens_request("c1", "alice", "false")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        response.headers().get(axum::http::header::RETRY_AFTER).unwrap(),
        "30"
    );
}

#[tokio::test]
async fn scenario_4_cache_pollution_yields_401_and_no_cache_write() {
    let _guard = env_lock().lock().unwrap();
    let state = state_with(
        base_config(),
        StubFetcher(Box::new(|_| Ok(secret("c2")))),
    );
    let app = build_router(state.clone());

    let response = app.oneshot(tokens_request("c1", "alice", "false")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(state.wrapper.cache_len(), Some(0));
}

#[tokio::test]
async fn scenario_5_breaker_open_serves_cache_but_denies_uncached_consumer() {
    let _guard = env_lock().lock().unwrap();
    std::env::set_var("GET_CONSUMER_SECRET_VOLUME_THRESHOLD", "1");
    std::env::set_var("GET_CONSUMER_SECRET_ERROR_THRESHOLD_PERCENT", "1");
    let config = base_config();
    std::env::remove_var("GET_CONSUMER_SECRET_VOLUME_THRESHOLD");
    std::env::remove_var("GET_CONSUMER_SECRET_ERROR_THRESHOLD_PERCENT");

    let call_count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = call_count.clone();
    let state = state_with(
        config,
        StubFetcher(Box::new(move |id| {
            let n = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if n == 0 {
                Ok(secret(id))
            } else {
                Err(Error::Transport("down".into()))
            }
        })),
    );
    let app = build_router(state);

    // Seed the cache with a validated entry for c1.
    let first = app.clone().oneshot(tokens_request("c1", "alice", "false")).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    // Trip the breaker.
    let second = app.clone().oneshot(tokens_request("c1", "alice", "false")).await.unwrap();
    assert_eq!(second.status(), StatusCode::SERVICE_UNAVAILABLE);

    // Breaker open, c1 served from cache.
    let third = app.clone().oneshot(tokens_request("c1", "alice", "false")).await.unwrap();
    assert_eq!(third.status(), StatusCode::OK);

    // c2 has no cache entry: 401-equivalent, not 503.
    let fourth = app.oneshot(tokens_request("c2", "bob", "false")).await.unwrap();
    assert_eq!(fourth.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn scenario_6_cardinality_overflow_reported_via_metrics() {
    let _guard = env_lock().lock().unwrap();
    std::env::set_var("MAX_UNIQUE_CONSUMERS", "2");
    let config = base_config();
    std::env::remove_var("MAX_UNIQUE_CONSUMERS");

    let state = state_with(config, StubFetcher(Box::new(|id| Ok(secret(id)))));
    let app = build_router(state);

    for id in ["c1", "c2", "c3"] {
        let response = app
            .clone()
            .oneshot(tokens_request(id, "user", "false"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics?view=cardinality")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["tracked"], 2);
    assert_eq!(body["limit_exceeded"], true);
}
