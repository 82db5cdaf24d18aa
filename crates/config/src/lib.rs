//! Configuration loading and validation for the consumer token sidecar.
//!
//! Loads `AppConfig` from environment variables with typed defaults.
//! Unlike the teacher's TOML-file config, every setting here is always a
//! string at the OS boundary, so this crate hand-parses each one with
//! `.parse()` and an explicit default rather than deriving `Deserialize`.
//! Validated once at startup; invalid values fail closed before the
//! listener binds (spec §7 `ConfigError`).

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use thiserror::Error;

use sidecar_resilience::{FallbackStrategy, OperationPolicy, PolicyOverrides};

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "none",
    }
}

/// The root configuration structure, loaded once at process start.
#[derive(Clone)]
pub struct AppConfig {
    pub gateway_admin_url: String,
    pub gateway_admin_token: Option<String>,

    pub consumer_id_header: String,
    pub consumer_username_header: String,
    pub anonymous_header: String,

    pub signing_authority: String,
    pub signing_audience: String,
    pub signing_issuer: String,
    pub key_claim_name: String,
    pub token_ttl_minutes: u32,

    /// How long a cached consumer secret is still served on breaker-open
    /// fallback (spec §9 Open Question: independent of the ledger resets
    /// below).
    pub stale_tolerance_minutes: u64,
    pub cardinality_reset_minutes: u64,
    pub volume_reset_minutes: u64,
    pub max_unique_consumers: usize,

    pub breaker_enabled: bool,
    pub ha_mode: bool,
    pub shared_kv_url: Option<String>,

    pub bind_host: String,
    pub bind_port: u16,
    pub cors_allow_origin: String,
    pub max_body_bytes: usize,
    pub admin_request_timeout: Duration,
    pub admin_health_timeout: Duration,

    pub log_format: LogFormat,

    /// Endpoints probed for reachability by `GET /health/telemetry`
    /// (spec §6 ambient surface). No exporter wiring lives behind these —
    /// this is a reachability check only (spec §1 Non-goals).
    pub telemetry_endpoints: Vec<String>,

    policy_overrides: HashMap<String, PolicyOverrides>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("gateway_admin_url", &self.gateway_admin_url)
            .field("gateway_admin_token", &redact(&self.gateway_admin_token))
            .field("consumer_id_header", &self.consumer_id_header)
            .field("consumer_username_header", &self.consumer_username_header)
            .field("anonymous_header", &self.anonymous_header)
            .field("signing_authority", &self.signing_authority)
            .field("signing_audience", &self.signing_audience)
            .field("signing_issuer", &self.signing_issuer)
            .field("key_claim_name", &self.key_claim_name)
            .field("token_ttl_minutes", &self.token_ttl_minutes)
            .field("stale_tolerance_minutes", &self.stale_tolerance_minutes)
            .field("cardinality_reset_minutes", &self.cardinality_reset_minutes)
            .field("volume_reset_minutes", &self.volume_reset_minutes)
            .field("max_unique_consumers", &self.max_unique_consumers)
            .field("breaker_enabled", &self.breaker_enabled)
            .field("ha_mode", &self.ha_mode)
            .field("shared_kv_url", &redact(&self.shared_kv_url))
            .field("bind_host", &self.bind_host)
            .field("bind_port", &self.bind_port)
            .field("cors_allow_origin", &self.cors_allow_origin)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("telemetry_endpoints", &self.telemetry_endpoints)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("validation failed: {0}")]
    Validation(String),
}

impl From<ConfigError> for sidecar_core::Error {
    fn from(err: ConfigError) -> Self {
        sidecar_core::Error::Config(err.to_string())
    }
}

const OPERATIONS: &[&str] = &["getConsumerSecret", "createConsumerSecret", "healthCheck"];

impl AppConfig {
    /// Load from the process environment. Required: `GATEWAY_ADMIN_URL`,
    /// `SIGNING_AUTHORITY`, `SIGNING_AUDIENCE`. Everything else has a
    /// spec-documented default.
    pub fn load() -> Result<Self, ConfigError> {
        let config = Self {
            gateway_admin_url: require("GATEWAY_ADMIN_URL")?,
            gateway_admin_token: env::var("GATEWAY_ADMIN_TOKEN").ok(),

            consumer_id_header: env_or("CONSUMER_ID_HEADER", "x-consumer-id"),
            consumer_username_header: env_or("CONSUMER_USERNAME_HEADER", "x-consumer-username"),
            anonymous_header: env_or("ANONYMOUS_HEADER", "x-anonymous-consumer"),

            signing_authority: require("SIGNING_AUTHORITY")?,
            signing_audience: require("SIGNING_AUDIENCE")?,
            signing_issuer: env_or("SIGNING_ISSUER", "token-sidecar"),
            key_claim_name: env_or("KEY_CLAIM_NAME", "key"),
            token_ttl_minutes: parse_or("TOKEN_TTL_MINUTES", 5)?,

            stale_tolerance_minutes: parse_or("STALE_TOLERANCE_MINUTES", 60)?,
            cardinality_reset_minutes: parse_or("CARDINALITY_RESET_MINUTES", 15)?,
            volume_reset_minutes: parse_or("VOLUME_RESET_MINUTES", 15)?,
            max_unique_consumers: parse_or("MAX_UNIQUE_CONSUMERS", 10_000)?,

            breaker_enabled: parse_bool_or("BREAKER_ENABLED", true)?,
            ha_mode: parse_bool_or("HA_MODE", false)?,
            shared_kv_url: env::var("SHARED_KV_URL").ok(),

            bind_host: env_or("BIND_HOST", "0.0.0.0"),
            bind_port: parse_or("BIND_PORT", 8080)?,
            cors_allow_origin: env_or("CORS_ALLOW_ORIGIN", "*"),
            max_body_bytes: parse_or("MAX_BODY_BYTES", 10 * 1024 * 1024)?,
            admin_request_timeout: Duration::from_millis(parse_or(
                "ADMIN_REQUEST_TIMEOUT_MS",
                3_000,
            )?),
            admin_health_timeout: Duration::from_millis(parse_or(
                "ADMIN_HEALTH_TIMEOUT_MS",
                1_000,
            )?),

            log_format: match env_or("LOG_FORMAT", "text").as_str() {
                "json" => LogFormat::Json,
                _ => LogFormat::Text,
            },

            telemetry_endpoints: env::var("TELEMETRY_ENDPOINTS")
                .ok()
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),

            policy_overrides: load_policy_overrides()?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.gateway_admin_url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "GATEWAY_ADMIN_URL must not be empty".into(),
            ));
        }
        if self.token_ttl_minutes == 0 {
            return Err(ConfigError::Validation(
                "TOKEN_TTL_MINUTES must be greater than zero".into(),
            ));
        }
        if self.ha_mode && self.shared_kv_url.is_none() {
            return Err(ConfigError::Validation(
                "HA_MODE=true requires SHARED_KV_URL".into(),
            ));
        }
        for op in OPERATIONS {
            if let Some(pct) = self
                .policy_overrides
                .get(*op)
                .and_then(|o| o.error_threshold_percent)
            {
                if pct > 100 {
                    return Err(ConfigError::Validation(format!(
                        "error threshold percent for {op} must be between 0 and 100, got {pct}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Built-in defaults merged with any configured override, per
    /// operation (spec §3 `OperationPolicy`, §4.6 defaults table).
    pub fn policy_for(&self, op_name: &str) -> OperationPolicy {
        let base = OperationPolicy::defaults_for(op_name);
        match self.policy_overrides.get(op_name) {
            Some(&overrides) => base.with_overrides(overrides),
            None => base,
        }
    }
}

fn require(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn env_or(name: &'static str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => raw.parse().map_err(|e| ConfigError::Invalid {
            name,
            reason: format!("{e}"),
        }),
    }
}

fn parse_bool_or(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => match raw.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(ConfigError::Invalid {
                name,
                reason: format!("expected a boolean, got {other:?}"),
            }),
        },
    }
}

/// Per-operation overrides, read from `{OP}_TIMEOUT_MS`,
/// `{OP}_ERROR_THRESHOLD_PERCENT`, `{OP}_RESET_TIMEOUT_MS`,
/// `{OP}_VOLUME_THRESHOLD`, `{OP}_FALLBACK` where `OP` is the operation
/// name upper-cased with underscores (`GET_CONSUMER_SECRET`, etc).
fn load_policy_overrides() -> Result<HashMap<String, PolicyOverrides>, ConfigError> {
    let mut out = HashMap::new();
    for op in OPERATIONS {
        let prefix = to_env_prefix(op);
        let overrides = PolicyOverrides {
            timeout_ms: parse_opt(&format!("{prefix}_TIMEOUT_MS"))?,
            error_threshold_percent: parse_opt(&format!("{prefix}_ERROR_THRESHOLD_PERCENT"))?,
            reset_timeout_ms: parse_opt(&format!("{prefix}_RESET_TIMEOUT_MS"))?,
            volume_threshold: parse_opt(&format!("{prefix}_VOLUME_THRESHOLD"))?,
            fallback_strategy: parse_fallback_opt(&format!("{prefix}_FALLBACK"))?,
        };
        out.insert((*op).to_string(), overrides);
    }
    Ok(out)
}

fn to_env_prefix(op_name: &str) -> String {
    let mut out = String::new();
    for (i, c) in op_name.chars().enumerate() {
        if c.is_uppercase() && i > 0 {
            out.push('_');
        }
        out.push(c.to_ascii_uppercase());
    }
    out
}

fn parse_opt<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Err(_) => Ok(None),
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| ConfigError::Invalid {
                name: Box::leak(name.to_string().into_boxed_str()),
                reason: format!("{e}"),
            }),
    }
}

fn parse_fallback_opt(name: &str) -> Result<Option<FallbackStrategy>, ConfigError> {
    match env::var(name) {
        Err(_) => Ok(None),
        Ok(raw) => match raw.as_str() {
            "deny" => Ok(Some(FallbackStrategy::Deny)),
            "cache" => Ok(Some(FallbackStrategy::Cache)),
            "graceful_degradation" => Ok(Some(FallbackStrategy::GracefulDegradation)),
            other => Err(ConfigError::Invalid {
                name: Box::leak(name.to_string().into_boxed_str()),
                reason: format!("unknown fallback strategy {other:?}"),
            }),
        },
    }
}
