//! # Token Signer (C1)
//!
//! Builds and HMAC-signs a compact, JWT-shaped bearer token for an
//! identified consumer. The three segments are base64url(header),
//! base64url(payload), base64url(HMAC-SHA256(header "." payload, secret)).
//!
//! This crate never retries and never logs secret material — the
//! signing secret is held only long enough to compute one HMAC.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("signing secret must not be empty")]
    EmptySecret,
}

impl From<SignerError> for sidecar_core::Error {
    fn from(err: SignerError) -> Self {
        match err {
            SignerError::EmptySecret => {
                sidecar_core::Error::Config("signing secret must not be empty".into())
            }
        }
    }
}

/// Everything needed to mint one token for one consumer.
pub struct SignRequest<'a> {
    /// Placed in the `sub` claim — the consumer's username.
    pub subject: &'a str,
    /// Placed in the JWT header's `kid` field.
    pub signing_key_id: &'a str,
    /// Raw HMAC key material. Never logged.
    pub signing_secret: &'a [u8],
    /// Placed in the gateway-key claim (default claim name `"key"`).
    pub authority: &'a str,
    pub audience: &'a str,
    pub issuer: &'a str,
    pub ttl_minutes: u32,
    /// Claim name used for the gateway key (default `"key"`).
    pub key_claim_name: &'a str,
}

/// The minted token and its lifetime in seconds.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_in: u64,
}

#[derive(Serialize)]
struct Header<'a> {
    alg: &'static str,
    typ: &'static str,
    kid: &'a str,
}

/// Sign a new token for the given request, failing only on empty secret
/// material (spec §4.1). `now` is the unix timestamp (seconds) to stamp
/// into `iat`/`exp`, passed in rather than read from the clock so callers
/// can test deterministically.
pub fn sign(req: &SignRequest<'_>, now: u64) -> Result<IssuedToken, SignerError> {
    if req.signing_secret.is_empty() {
        return Err(SignerError::EmptySecret);
    }

    let header = Header {
        alg: "HS256",
        typ: "JWT",
        kid: req.signing_key_id,
    };

    let ttl_secs = u64::from(req.ttl_minutes) * 60;
    let exp = now + ttl_secs;

    let mut payload = serde_json::Map::new();
    payload.insert("iss".into(), req.issuer.into());
    payload.insert("aud".into(), req.audience.into());
    payload.insert("sub".into(), req.subject.into());
    payload.insert("iat".into(), now.into());
    payload.insert("exp".into(), exp.into());
    payload.insert(req.key_claim_name.to_string(), req.authority.into());

    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).unwrap());
    let payload_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload).unwrap());
    let signing_input = format!("{header_b64}.{payload_b64}");

    // `Hmac::<Sha256>::new_from_slice` only fails for key lengths unsupported
    // by the algorithm, which does not apply to HMAC (any length is valid).
    let mut mac = HmacSha256::new_from_slice(req.signing_secret)
        .expect("HMAC-SHA256 accepts any key length");
    mac.update(signing_input.as_bytes());
    let signature = mac.finalize().into_bytes();
    let signature_b64 = URL_SAFE_NO_PAD.encode(signature);

    Ok(IssuedToken {
        token: format!("{signing_input}.{signature_b64}"),
        expires_in: ttl_secs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req<'a>(secret: &'a [u8]) -> SignRequest<'a> {
        SignRequest {
            subject: "alice",
            signing_key_id: "k1",
            signing_secret: secret,
            authority: "gw-1",
            audience: "my-api",
            issuer: "token-sidecar",
            ttl_minutes: 5,
            key_claim_name: "key",
        }
    }

    #[test]
    fn produces_three_dot_separated_segments() {
        let token = sign(&req(b"s1"), 1_000).unwrap();
        assert_eq!(token.token.matches('.').count(), 2);
        assert_eq!(token.expires_in, 300);
    }

    #[test]
    fn empty_secret_is_a_config_error() {
        let err = sign(&req(b""), 1_000).unwrap_err();
        assert!(matches!(err, SignerError::EmptySecret));
    }

    #[test]
    fn header_decodes_to_expected_shape() {
        let token = sign(&req(b"s1"), 1_000).unwrap();
        let header_b64 = token.token.split('.').next().unwrap();
        let header_json = URL_SAFE_NO_PAD.decode(header_b64).unwrap();
        let header: serde_json::Value = serde_json::from_slice(&header_json).unwrap();
        assert_eq!(header["alg"], "HS256");
        assert_eq!(header["typ"], "JWT");
        assert_eq!(header["kid"], "k1");
    }

    #[test]
    fn payload_carries_standard_claims() {
        let token = sign(&req(b"s1"), 1_000).unwrap();
        let payload_b64 = token.token.split('.').nth(1).unwrap();
        let payload_json = URL_SAFE_NO_PAD.decode(payload_b64).unwrap();
        let payload: serde_json::Value = serde_json::from_slice(&payload_json).unwrap();
        assert_eq!(payload["sub"], "alice");
        assert_eq!(payload["iss"], "token-sidecar");
        assert_eq!(payload["aud"], "my-api");
        assert_eq!(payload["iat"], 1_000);
        assert_eq!(payload["exp"], 1_300);
        assert_eq!(payload["key"], "gw-1");
    }

    #[test]
    fn same_inputs_are_deterministic() {
        let a = sign(&req(b"s1"), 1_000).unwrap();
        let b = sign(&req(b"s1"), 1_000).unwrap();
        assert_eq!(a.token, b.token);
    }

    #[test]
    fn different_secrets_produce_different_signatures() {
        let a = sign(&req(b"s1"), 1_000).unwrap();
        let b = sign(&req(b"s2"), 1_000).unwrap();
        assert_ne!(a.token, b.token);
    }

    #[test]
    fn accepts_before_expiry_rejects_after() {
        let token = sign(&req(b"s1"), 1_000).unwrap();
        let payload_b64 = token.token.split('.').nth(1).unwrap();
        let payload_json = URL_SAFE_NO_PAD.decode(payload_b64).unwrap();
        let payload: serde_json::Value = serde_json::from_slice(&payload_json).unwrap();
        let exp = payload["exp"].as_u64().unwrap();

        assert!(999 < exp); // now < exp: valid
        assert!(exp <= 1_300); // now >= exp: expired
    }
}
