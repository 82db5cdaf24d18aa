//! `/metrics` — operational snapshot (cardinality, volume, breaker, cache,
//! request telemetry), filterable via `?view=` (SPEC_FULL §6).

use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};

use sidecar_governor::{CardinalityStats, VolumeStats};
use sidecar_resilience::BreakerStateKind;
use sidecar_telemetry::TelemetrySnapshot;

use crate::SharedState;

const OPERATIONS: &[&str] = &["getConsumerSecret", "createConsumerSecret", "healthCheck"];

#[derive(Deserialize)]
pub struct ViewQuery {
    view: Option<String>,
}

#[derive(Serialize)]
struct BreakerSnapshot {
    operation: &'static str,
    state: &'static str,
}

fn state_str(kind: BreakerStateKind) -> &'static str {
    match kind {
        BreakerStateKind::Closed => "closed",
        BreakerStateKind::Open => "open",
        BreakerStateKind::HalfOpen => "half_open",
    }
}

#[derive(Serialize)]
struct CacheSnapshot {
    #[serde(rename = "localEntries")]
    local_entries: Option<usize>,
}

#[derive(Serialize)]
struct FullSnapshot {
    cardinality: CardinalityStats,
    volume: VolumeStats,
    breakers: Vec<BreakerSnapshot>,
    cache: CacheSnapshot,
    telemetry: TelemetrySnapshot,
}

/// `GET /metrics`, `GET /metrics?view={cardinality,volume,breaker,cache,telemetry}`.
/// An unrecognized `view` value is a 400, per spec §6.
pub async fn snapshot_handler(
    State(state): State<SharedState>,
    Query(params): Query<ViewQuery>,
) -> Response {
    let breakers: Vec<BreakerSnapshot> = OPERATIONS
        .iter()
        .map(|&op| BreakerSnapshot {
            operation: op,
            state: state_str(state.wrapper.breaker_state(op)),
        })
        .collect();

    match params.view.as_deref() {
        None => Json(FullSnapshot {
            cardinality: state.cardinality.stats(),
            volume: state.volume.stats(),
            breakers,
            cache: CacheSnapshot {
                local_entries: state.wrapper.cache_len(),
            },
            telemetry: state.telemetry.snapshot(),
        })
        .into_response(),
        Some("cardinality") => Json(state.cardinality.stats()).into_response(),
        Some("volume") => Json(state.volume.stats()).into_response(),
        Some("breaker") => Json(breakers).into_response(),
        Some("cache") => Json(CacheSnapshot {
            local_entries: state.wrapper.cache_len(),
        })
        .into_response(),
        Some("telemetry") => Json(state.telemetry.snapshot()).into_response(),
        Some(other) => {
            let mut body = HashMap::new();
            body.insert("error", format!("unknown metrics view {other:?}"));
            (StatusCode::BAD_REQUEST, Json(body)).into_response()
        }
    }
}
