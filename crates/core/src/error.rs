//! The error taxonomy shared across the sidecar (spec §7).
//!
//! Every crate defines its own bounded-context error enum; this is the
//! one the HTTP layer converts to a status code. Other crates' errors
//! fold into it via `#[from]` at the point where they cross into the
//! request-handling boundary (C6/C8).

use thiserror::Error;

/// The top-level error type for token-issuance requests.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or missing consumer headers, anonymous caller, or an
    /// oversized request body. Surfaced as 401 or 413.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The consumer or its credentials are not present upstream.
    /// Surfaced as 401 "Invalid consumer credentials".
    #[error("consumer not found")]
    NotFound,

    /// The admin API was unreachable, timed out, or returned 5xx.
    /// Surfaced as 503 with `Retry-After`.
    #[error("upstream transport error: {0}")]
    Transport(String),

    /// The circuit breaker refused the call and no fallback applied.
    /// Surfaced as 503 (deny/degradation) or served from cache upstream
    /// of this error (cache hits never reach this variant).
    #[error("circuit open for operation {0}")]
    CircuitOpen(String),

    /// A cached or freshly fetched secret's consumer id disagreed with
    /// the request. Treated identically to `NotFound` at the boundary,
    /// logged at high severity.
    #[error("cache pollution detected for consumer {0}")]
    CachePollution(String),

    /// Invalid configuration at startup. The process must exit non-zero
    /// before accepting requests.
    #[error("configuration error: {0}")]
    Config(String),

    /// Anything else. Surfaced as 500 with a generic message.
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for the operation's clean "nothing there" outcome, which the
    /// circuit breaker must not count as a failure (spec §4.5).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound)
    }
}
