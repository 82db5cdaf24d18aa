//! Health Aggregator (C9) — `/health`, `/health/ready`, `/health/telemetry`.
//! Spec §4.9, ambient `/health/telemetry` reachability probe per SPEC_FULL §6.

use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;

use sidecar_gatewayclient::HealthStatus;

use crate::SharedState;

#[derive(Serialize)]
struct GatewayCheck {
    status: &'static str,
    #[serde(rename = "responseTimeMs")]
    response_time_ms: u64,
}

#[derive(Serialize)]
struct TelemetryCheck {
    status: &'static str,
}

#[derive(Serialize)]
struct RollupChecks {
    gateway: GatewayCheck,
    #[serde(skip_serializing_if = "Option::is_none")]
    telemetry: Option<TelemetryCheck>,
}

#[derive(Serialize)]
struct RollupBody {
    status: &'static str,
    checks: RollupChecks,
}

#[derive(Serialize)]
struct ReadyBody {
    ready: bool,
    checks: Option<RollupChecks>,
}

#[derive(Serialize)]
struct TelemetryEndpointStatus {
    endpoint: String,
    reachable: bool,
}

#[derive(Serialize)]
struct TelemetryBody {
    configured: bool,
    endpoints: Vec<TelemetryEndpointStatus>,
}

async fn probe_gateway(state: &SharedState) -> HealthStatus {
    let admin_client = &state.admin_client;
    state
        .wrapper
        .wrap_operation(
            "healthCheck",
            || async {
                let status = admin_client.health_check().await;
                if status.healthy {
                    Ok(status)
                } else {
                    Err(sidecar_core::Error::Transport(
                        status.error.clone().unwrap_or_else(|| "unhealthy".into()),
                    ))
                }
            },
            || HealthStatus {
                healthy: false,
                response_time_ms: 0,
                error: Some("circuit open, no health status available".into()),
            },
        )
        .await
        .unwrap_or(HealthStatus {
            healthy: false,
            response_time_ms: 0,
            error: Some("health check denied by breaker policy".into()),
        })
}

/// `true` iff every configured telemetry endpoint answered a `HEAD`
/// within budget; vacuously `true` when none are configured.
async fn telemetry_reachable(state: &SharedState) -> bool {
    let endpoints = &state.config.telemetry_endpoints;
    if endpoints.is_empty() {
        return true;
    }
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(1))
        .build()
        .expect("failed to build telemetry probe client");
    for endpoint in endpoints {
        if client.head(endpoint).send().await.is_err() {
            return false;
        }
    }
    true
}

/// `GET /health` — worst-of-dependencies rollup (spec §4.9): healthy iff
/// the gateway is healthy AND every configured telemetry endpoint is
/// reachable. A gateway failure with no telemetry endpoints configured
/// degrades rather than fails, since nothing else is depended on.
pub async fn rollup_handler(State(state): State<SharedState>) -> Response {
    let gateway = probe_gateway(&state).await;
    let gateway_status = if gateway.healthy { "healthy" } else { "unhealthy" };

    let telemetry_configured = !state.config.telemetry_endpoints.is_empty();
    let telemetry_ok = if telemetry_configured {
        telemetry_reachable(&state).await
    } else {
        true
    };

    let status = if gateway.healthy && telemetry_ok {
        "healthy"
    } else if gateway.healthy && !telemetry_ok {
        "unhealthy"
    } else if !telemetry_configured {
        // Gateway is the only hard dependency when no telemetry endpoints
        // are configured, so its failure alone doesn't fail the rollup.
        "degraded"
    } else {
        "unhealthy"
    };

    let body = RollupBody {
        status,
        checks: RollupChecks {
            gateway: GatewayCheck {
                status: gateway_status,
                response_time_ms: gateway.response_time_ms,
            },
            telemetry: telemetry_configured.then(|| TelemetryCheck {
                status: if telemetry_ok { "healthy" } else { "unhealthy" },
            }),
        },
    };

    let code = if status == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (code, Json(body)).into_response()
}

/// `GET /health/ready` — `200 {ready:true}` iff the gateway health check
/// succeeds within its operation budget.
pub async fn readiness_handler(State(state): State<SharedState>) -> Response {
    let gateway = probe_gateway(&state).await;

    if gateway.healthy {
        (StatusCode::OK, Json(ReadyBody { ready: true, checks: None })).into_response()
    } else {
        let body = ReadyBody {
            ready: false,
            checks: Some(RollupChecks {
                gateway: GatewayCheck {
                    status: "unhealthy",
                    response_time_ms: gateway.response_time_ms,
                },
                telemetry: None,
            }),
        };
        (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
    }
}

/// `GET /health/telemetry` — reachability probe only; no exporter wiring
/// lives behind this (SPEC_FULL §6).
pub async fn telemetry_handler(State(state): State<SharedState>) -> Response {
    let endpoints = &state.config.telemetry_endpoints;
    if endpoints.is_empty() {
        return Json(TelemetryBody {
            configured: false,
            endpoints: Vec::new(),
        })
        .into_response();
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(1))
        .build()
        .expect("failed to build telemetry probe client");

    let mut statuses = Vec::with_capacity(endpoints.len());
    for endpoint in endpoints {
        let reachable = client.head(endpoint).send().await.is_ok();
        statuses.push(TelemetryEndpointStatus {
            endpoint: endpoint.clone(),
            reachable,
        });
    }

    Json(TelemetryBody {
        configured: true,
        endpoints: statuses,
    })
    .into_response()
}
