//! OpenAPI Document (A3) — `GET /` serves a static OpenAPI 3.0 document
//! with `ETag`/`If-None-Match` support.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;

fn document() -> &'static serde_json::Value {
    static DOC: OnceLock<serde_json::Value> = OnceLock::new();
    DOC.get_or_init(|| {
        json!({
            "openapi": "3.0.3",
            "info": {
                "title": "Consumer Token Sidecar",
                "version": "1.0.0",
                "description": "Stateless authentication sidecar issuing signed bearer tokens for gateway-identified consumers."
            },
            "paths": {
                "/tokens": {
                    "get": {
                        "summary": "Issue a bearer token for the calling consumer",
                        "responses": {
                            "200": {"description": "Token issued"},
                            "401": {"description": "Invalid consumer credentials"},
                            "503": {"description": "Upstream gateway admin API unavailable"}
                        }
                    }
                },
                "/health": {
                    "get": {
                        "summary": "Rollup health of this sidecar and its dependencies",
                        "responses": {"200": {"description": "Rollup status"}, "503": {"description": "Unhealthy"}}
                    }
                },
                "/health/ready": {
                    "get": {
                        "summary": "Readiness probe",
                        "responses": {"200": {"description": "Ready"}, "503": {"description": "Not ready"}}
                    }
                },
                "/health/telemetry": {
                    "get": {
                        "summary": "Telemetry endpoint reachability probe",
                        "responses": {"200": {"description": "Reachability status"}}
                    }
                },
                "/metrics": {
                    "get": {
                        "summary": "Operational snapshot",
                        "parameters": [{"name": "view", "in": "query", "required": false}],
                        "responses": {"200": {"description": "Snapshot"}, "400": {"description": "Unknown view"}}
                    }
                }
            }
        })
    })
}

fn etag() -> &'static str {
    static ETAG: OnceLock<String> = OnceLock::new();
    ETAG.get_or_init(|| {
        let mut hasher = DefaultHasher::new();
        document().to_string().hash(&mut hasher);
        format!("\"{:016x}\"", hasher.finish())
    })
}

/// `GET /` — serves the OpenAPI document, honoring `If-None-Match`.
pub async fn serve_openapi(headers: HeaderMap) -> Response {
    let current_etag = etag();

    if let Some(if_none_match) = headers.get(header::IF_NONE_MATCH).and_then(|v| v.to_str().ok()) {
        if if_none_match == current_etag {
            return (
                StatusCode::NOT_MODIFIED,
                [(header::ETAG, current_etag)],
            )
                .into_response();
        }
    }

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::ETAG, current_etag),
        ],
        axum::Json(document().clone()),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{build_router, build_state};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_config() -> sidecar_config::AppConfig {
        std::env::set_var("GATEWAY_ADMIN_URL", "http://localhost:9999");
        std::env::set_var("SIGNING_AUTHORITY", "gw-1");
        std::env::set_var("SIGNING_AUDIENCE", "my-api");
        sidecar_config::AppConfig::load().unwrap()
    }

    #[tokio::test]
    async fn root_serves_openapi_document_with_etag() {
        let state = build_state(test_config());
        let app = build_router(state);

        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(header::ETAG));
    }

    #[tokio::test]
    async fn matching_if_none_match_yields_304() {
        let state = build_state(test_config());
        let app = build_router(state.clone());

        let first = Request::builder().uri("/").body(Body::empty()).unwrap();
        let first_response = app.clone().oneshot(first).await.unwrap();
        let tag = first_response
            .headers()
            .get(header::ETAG)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();

        let second = Request::builder()
            .uri("/")
            .header(header::IF_NONE_MATCH, tag)
            .body(Body::empty())
            .unwrap();
        let second_response = app.oneshot(second).await.unwrap();
        assert_eq!(second_response.status(), StatusCode::NOT_MODIFIED);
    }
}
