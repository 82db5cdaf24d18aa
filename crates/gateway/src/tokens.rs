//! Token-Issuance Handler (C8) — `GET /tokens`. Spec §4.8.
//!
//! The six-step algorithm is strictly sequential within one request;
//! breaker state observed along the way may race with other requests'
//! updates, which is intentional (spec §5 "Ordering guarantees").

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use axum::extract::{Extension, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use tracing::info_span;
use tracing::Instrument;

use sidecar_core::ConsumerIdentity;
use sidecar_resilience::ConsumerSecretOutcome;
use sidecar_signer::SignRequest;
use sidecar_telemetry::AuthResult;

use crate::{error_response, log_and_error, RequestId, SharedState};

#[derive(Serialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Serialize)]
struct ServiceUnavailableBody {
    error: &'static str,
    #[serde(rename = "retryAfter")]
    retry_after: u32,
}

pub async fn handle_token_request(
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
) -> Response {
    let span = info_span!("token_request", request_id = %request_id.0, method = "GET", path = "/tokens");
    handle(state, request_id, headers).instrument(span).await
}

async fn handle(state: SharedState, request_id: RequestId, headers: HeaderMap) -> Response {
    let started = Instant::now();
    let request_id = request_id.0;

    // Step 2: validate consumer headers.
    let identity = match ConsumerIdentity::from_headers(
        header_str(&headers, &state.config.consumer_id_header),
        header_str(&headers, &state.config.consumer_username_header),
        header_str(&headers, &state.config.anonymous_header),
    ) {
        Ok(identity) => identity,
        Err(err) => {
            state.telemetry.record_auth_attempt(AuthResult::HeaderValidationFailed);
            return log_and_error(StatusCode::UNAUTHORIZED, err.to_string(), &request_id);
        }
    };

    // Step 3: bound cardinality, classify volume.
    let bounded_id = state.cardinality.bound(&identity.consumer_id);
    state.volume.increment(&identity.consumer_id);
    let volume = state.volume.bucket_of(&identity.consumer_id);
    state.telemetry.record_consumer_request(volume);

    // Step 4: fetch the signing credential through the resilient wrapper.
    let outcome = state
        .wrapper
        .wrap_consumer_operation("getConsumerSecret", &identity.consumer_id)
        .await;

    let secret = match outcome {
        ConsumerSecretOutcome::Unavailable => {
            state.telemetry.record_auth_attempt(AuthResult::KongUnavailable);
            tracing::warn!(bounded_id, "gateway admin API unavailable");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                [(axum::http::header::RETRY_AFTER, "30")],
                Json(ServiceUnavailableBody {
                    error: "Service Unavailable",
                    retry_after: 30,
                }),
            )
                .into_response();
        }
        ConsumerSecretOutcome::NotFound => {
            state.telemetry.record_auth_attempt(AuthResult::ConsumerLookupFailed);
            return error_response(
                StatusCode::UNAUTHORIZED,
                "Invalid consumer credentials",
                &request_id,
            );
        }
        ConsumerSecretOutcome::Found(secret) => secret,
    };

    // Step 5: sign.
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs();
    let issued = match sidecar_signer::sign(
        &SignRequest {
            subject: &identity.username,
            signing_key_id: &secret.key,
            signing_secret: &secret.secret,
            authority: &state.config.signing_authority,
            audience: &state.config.signing_audience,
            issuer: &state.config.signing_issuer,
            ttl_minutes: state.config.token_ttl_minutes,
            key_claim_name: &state.config.key_claim_name,
        },
        now,
    ) {
        Ok(issued) => issued,
        Err(err) => {
            return log_and_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("internal error: {err}"),
                &request_id,
            );
        }
    };

    // Step 6: success.
    state.telemetry.record_token_issued();
    state.telemetry.record_auth_attempt(AuthResult::Success);
    state
        .telemetry
        .record_consumer_latency(volume, started.elapsed().as_millis() as u64);

    Json(TokenResponse {
        access_token: issued.token,
        expires_in: issued.expires_in,
    })
    .into_response()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
