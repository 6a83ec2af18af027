//! Webhook signature verification.
//!
//! The platform signs each webhook body with HMAC-SHA256 using the shared
//! secret and sends the base64 digest in `X-KC-Signature`.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-kc-signature";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("webhook secret is not configured")]
    NotConfigured,
    #[error("signature header is missing")]
    Missing,
    #[error("signature header is not valid base64")]
    Malformed,
    #[error("signature does not match payload")]
    Mismatch,
    #[error("webhook secret cannot be used as an HMAC key")]
    InvalidKey,
}

/// Base64 HMAC-SHA256 of `body` under `secret`.
pub fn sign(secret: &str, body: &[u8]) -> Result<String, SignatureError> {
    Ok(STANDARD.encode(mac(secret, body)?.finalize().into_bytes()))
}

/// Check `signature` against `body` in constant time.
pub fn verify(secret: Option<&str>, signature: Option<&str>, body: &[u8]) -> Result<(), SignatureError> {
    let secret = secret
        .filter(|secret| !secret.is_empty())
        .ok_or(SignatureError::NotConfigured)?;
    let signature = signature.ok_or(SignatureError::Missing)?;
    let expected = STANDARD
        .decode(signature.trim())
        .map_err(|_| SignatureError::Malformed)?;

    mac(secret, body)?
        .verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}

fn mac(secret: &str, body: &[u8]) -> Result<HmacSha256, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::InvalidKey)?;
    mac.update(body);
    Ok(mac)
}
