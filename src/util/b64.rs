//! Base64 codec for the `PAYMENT-REQUIRED`, `PAYMENT-SIGNATURE` and
//! `PAYMENT-RESPONSE` HTTP headers.
//!
//! Each header carries a JSON object, base64-encoded. This module
//! generalizes the teacher's fixed `Base64Bytes` wrapper into a
//! `encode`/`decode` pair over any `Serialize + DeserializeOwned` type, so
//! the same codec covers `PaymentRequired`, `PaymentPayload`, and the
//! settlement receipt alike.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;
use serde::Serialize;
use serde::de::DeserializeOwned;

#[derive(Debug, thiserror::Error)]
pub enum HeaderCodecError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Base64-encodes a value as JSON for use in an x402 HTTP header.
pub fn encode_header<T: Serialize>(value: &T) -> Result<String, HeaderCodecError> {
    let json = serde_json::to_vec(value)?;
    Ok(b64.encode(json))
}

/// Decodes a base64-encoded JSON header value back into `T`.
pub fn decode_header<T: DeserializeOwned>(header: &str) -> Result<T, HeaderCodecError> {
    let raw = b64.decode(header.trim())?;
    let value = serde_json::from_slice(&raw)?;
    Ok(value)
}
