//! Consumer identity extracted from the gateway's forwarded headers.
//!
//! The upstream gateway authenticates a caller by whatever means it likes
//! (API key, mTLS, ...) and forwards this sidecar a pair of headers naming
//! the consumer. We never see the original credential — only the identity
//! the gateway vouches for.

use crate::error::Error;

/// Maximum length, in bytes, of either header value (spec §3).
pub const MAX_HEADER_LEN: usize = 256;

/// An identified consumer, extracted and validated from request headers.
///
/// Immutable for the lifetime of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerIdentity {
    pub consumer_id: String,
    pub username: String,
}

impl ConsumerIdentity {
    /// Validate and construct an identity from raw header values.
    ///
    /// `anonymous` is the raw value of the anonymous-marker header, if
    /// present. Fails if either value is empty, exceeds
    /// [`MAX_HEADER_LEN`] bytes, or the caller is marked anonymous.
    pub fn from_headers(
        consumer_id: Option<&str>,
        username: Option<&str>,
        anonymous: Option<&str>,
    ) -> Result<Self, Error> {
        if anonymous.is_some_and(|v| v.eq_ignore_ascii_case("true")) {
            return Err(Error::Validation(
                "Anonymous consumers are not allowed".into(),
            ));
        }

        let consumer_id = consumer_id
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::Validation("missing consumer identity headers".into()))?;
        let username = username
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::Validation("missing consumer identity headers".into()))?;

        if consumer_id.len() > MAX_HEADER_LEN || username.len() > MAX_HEADER_LEN {
            return Err(Error::Validation(
                "consumer identity header exceeds maximum length".into(),
            ));
        }

        Ok(Self {
            consumer_id: consumer_id.to_string(),
            username: username.to_string(),
        })
    }
}
