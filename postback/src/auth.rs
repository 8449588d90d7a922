//! Postback authentication.
//!
//! Two modes, selected by [`AuthMode`]: HMAC-SHA256 over a canonical
//! signing string (`sig` parameter), or a plain shared secret
//! (`password` parameter). Both comparisons are constant time.
//! Callers must not distinguish the failure causes in responses -
//! only in logs.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use primitives::config::AuthMode;
use primitives::postback::PostbackParams;
use primitives::Config;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_LENGTH: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("sig parameter is missing")]
    MissingSignature,
    #[error("sig parameter is not a valid hex digest")]
    MalformedSignature,
    #[error("signature mismatch")]
    BadSignature,
    #[error("password parameter is missing")]
    MissingPassword,
    #[error("password mismatch")]
    BadPassword,
    /// No usable secret for the active mode. The endpoint fails closed.
    #[error("no authentication secret is configured")]
    Misconfigured,
}

/// Builds the canonical signing string shared with the postback sender.
///
/// The field order is a wire contract: `tracking_id`, `offer_id`,
/// `payout`, `ts`, `nonce`, joined with `&`. Absent optional fields
/// serialize as empty values. The order never depends on map iteration.
pub fn signing_string(params: &PostbackParams) -> String {
    [
        ("tracking_id", Some(params.tracking_id.as_str())),
        ("offer_id", params.offer_id.as_deref()),
        ("payout", params.payout.as_deref()),
        ("ts", params.ts.as_deref()),
        ("nonce", params.nonce.as_deref()),
    ]
    .iter()
    .map(|(field, value)| format!("{}={}", field, value.unwrap_or("")))
    .collect::<Vec<_>>()
    .join("&")
}

/// HMAC-SHA256 hex digest of the canonical string. Also used by tests
/// and by senders integrating against this endpoint.
pub fn sign(signing_string: &str, secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(signing_string.as_bytes());

    hex::encode(mac.finalize().into_bytes())
}

/// Verifies the postback against the configured authentication mode.
pub fn verify(config: &Config, params: &PostbackParams) -> Result<(), AuthError> {
    match config.auth_mode {
        AuthMode::Signature => {
            let secret = configured_secret(&config.hmac_secret)?;
            let sig = params.sig.as_deref().ok_or(AuthError::MissingSignature)?;

            verify_signature(&signing_string(params), sig, secret)
        }
        AuthMode::SharedSecret => {
            let expected = configured_secret(&config.postback_password)?;
            let given = params
                .password
                .as_deref()
                .ok_or(AuthError::MissingPassword)?;

            verify_password(given, expected)
        }
    }
}

fn configured_secret(secret: &Option<String>) -> Result<&str, AuthError> {
    secret
        .as_deref()
        .filter(|secret| !secret.is_empty())
        .ok_or(AuthError::Misconfigured)
}

fn verify_signature(signing_string: &str, sig: &str, secret: &str) -> Result<(), AuthError> {
    let sig_bytes = hex::decode(sig).map_err(|_| AuthError::MalformedSignature)?;
    // a wrong-length digest can never match; failing before the MAC
    // comparison reveals nothing the digest length doesn't already
    if sig_bytes.len() != SIGNATURE_LENGTH {
        return Err(AuthError::MalformedSignature);
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(signing_string.as_bytes());

    // constant-time comparison via the HMAC library
    mac.verify_slice(&sig_bytes)
        .map_err(|_| AuthError::BadSignature)
}

fn verify_password(given: &str, expected: &str) -> Result<(), AuthError> {
    if given.len() != expected.len() {
        return Err(AuthError::BadPassword);
    }

    if given.as_bytes().ct_eq(expected.as_bytes()).into() {
        Ok(())
    } else {
        Err(AuthError::BadPassword)
    }
}
