//! # Gateway Admin Client (C4)
//!
//! A typed client for the two admin-API operations the sidecar needs:
//! fetching a consumer's JWT signing credential, and checking that the
//! admin API itself is reachable. No retry logic lives here — retries,
//! circuit breaking, and caching are the resilient wrapper's job (C6).

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use sidecar_core::ConsumerSecret;

const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum GatewayClientError {
    /// Connect refused, read timeout, or a 5xx response.
    #[error("transport error calling gateway admin API: {0}")]
    Transport(String),

    /// Any 4xx other than 404.
    #[error("gateway admin API rejected the request ({status}): {message}")]
    Client { status: u16, message: String },

    /// The consumer resource itself doesn't exist (a literal 404 from the
    /// admin API) — distinct from [`Self::ConsumerWithoutCredentials`]
    /// (spec §9 open question). Both fold to `sidecar_core::Error::NotFound`
    /// at the boundary but are logged differently, since the former means
    /// "no such consumer" and the latter means "consumer exists, no jwt
    /// credential provisioned".
    #[error("consumer not found")]
    ConsumerNotFound,

    /// The consumer exists but has no JWT credentials on file.
    #[error("consumer has no jwt credentials")]
    ConsumerWithoutCredentials,
}

impl From<GatewayClientError> for sidecar_core::Error {
    fn from(err: GatewayClientError) -> Self {
        match err {
            GatewayClientError::Transport(msg) => sidecar_core::Error::Transport(msg),
            GatewayClientError::Client { status, message } => {
                sidecar_core::Error::Transport(format!("{status}: {message}"))
            }
            GatewayClientError::ConsumerNotFound => sidecar_core::Error::NotFound,
            GatewayClientError::ConsumerWithoutCredentials => sidecar_core::Error::NotFound,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub healthy: bool,
    pub response_time_ms: u64,
    pub error: Option<String>,
}

/// Client for the gateway's admin API.
pub struct GatewayAdminClient {
    base_url: String,
    admin_token: Option<String>,
    client: reqwest::Client,
    health_client: reqwest::Client,
}

impl GatewayAdminClient {
    pub fn new(base_url: impl Into<String>, admin_token: Option<String>) -> Self {
        Self::with_timeouts(base_url, admin_token, Duration::from_secs(3), DEFAULT_HEALTH_TIMEOUT)
    }

    pub fn with_timeouts(
        base_url: impl Into<String>,
        admin_token: Option<String>,
        request_timeout: Duration,
        health_timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .expect("failed to build gateway admin HTTP client");
        let health_client = reqwest::Client::builder()
            .timeout(health_timeout)
            .build()
            .expect("failed to build gateway admin health HTTP client");

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            admin_token,
            client,
            health_client,
        }
    }

    /// `GET {base}/consumers/{id}/jwt`, parse the first credential. A 404
    /// yields [`GatewayClientError::ConsumerNotFound`]; an empty `data`
    /// array yields [`GatewayClientError::ConsumerWithoutCredentials`]
    /// (spec §4.4). Both fold to the same `NotFound` outcome upstream.
    pub async fn get_consumer_secret(
        &self,
        consumer_id: &str,
    ) -> Result<ConsumerSecret, GatewayClientError> {
        let url = format!("{}/consumers/{}/jwt", self.base_url, consumer_id);

        let mut request = self.client.get(&url);
        if let Some(token) = &self.admin_token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }

        let response = request.send().await.map_err(|e| {
            GatewayClientError::Transport(format!("admin API request failed: {e}"))
        })?;

        let status = response.status();
        if status.as_u16() == 404 {
            debug!(consumer_id, "admin API returned 404, no such consumer");
            return Err(GatewayClientError::ConsumerNotFound);
        }
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "admin API returned 5xx");
            return Err(GatewayClientError::Transport(format!(
                "admin API returned {status}"
            )));
        }
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayClientError::Client {
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed: JwtCredentialsResponse = response.json().await.map_err(|e| {
            GatewayClientError::Transport(format!("failed to parse admin API response: {e}"))
        })?;

        let first = parsed.data.into_iter().next().ok_or_else(|| {
            warn!(consumer_id, "consumer has no jwt credentials provisioned");
            GatewayClientError::ConsumerWithoutCredentials
        })?;

        debug!(consumer_id, credential_id = %first.id, "fetched consumer jwt credential");

        Ok(ConsumerSecret {
            credential_id: first.id,
            key: first.key,
            secret: first.secret.into_bytes(),
            consumer_id: first.consumer.id,
        })
    }

    /// Quick reachability probe with a short, independent timeout
    /// (spec §4.4, default 1s).
    pub async fn health_check(&self) -> HealthStatus {
        let started = std::time::Instant::now();
        let url = format!("{}/status", self.base_url);

        match self.health_client.get(&url).send().await {
            Ok(response) if response.status().is_success() => HealthStatus {
                healthy: true,
                response_time_ms: started.elapsed().as_millis() as u64,
                error: None,
            },
            Ok(response) => HealthStatus {
                healthy: false,
                response_time_ms: started.elapsed().as_millis() as u64,
                error: Some(format!("admin API status {}", response.status())),
            },
            Err(e) => HealthStatus {
                healthy: false,
                response_time_ms: started.elapsed().as_millis() as u64,
                error: Some(e.to_string()),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct JwtCredentialsResponse {
    data: Vec<JwtCredential>,
}

#[derive(Debug, Deserialize)]
struct JwtCredential {
    id: String,
    key: String,
    secret: String,
    consumer: JwtConsumerRef,
}

#[derive(Debug, Deserialize)]
struct JwtConsumerRef {
    id: String,
}
