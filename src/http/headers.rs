//! The `PAYMENT-REQUIRED` / `PAYMENT-SIGNATURE` / `PAYMENT-RESPONSE`
//! header envelope (spec.md §6 "HTTP envelope"), built on the generalized
//! base64-JSON codec in [`crate::util::b64`].

use axum::http::{HeaderName, HeaderValue};
use axum::response::Response;
use serde::{Deserialize, Serialize};

use crate::proto::PaymentRequirements;
use crate::util::b64::{decode_header, encode_header, HeaderCodecError};

pub const PAYMENT_REQUIRED_HEADER: &str = "PAYMENT-REQUIRED";
pub const PAYMENT_SIGNATURE_HEADER: &str = "PAYMENT-SIGNATURE";
pub const PAYMENT_RESPONSE_HEADER: &str = "PAYMENT-RESPONSE";
pub const UPTO_SESSION_ID_HEADER: &str = "x-upto-session-id";

/// Carried on the `PAYMENT-REQUIRED` header of a `402` response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    pub x402_version: u32,
    pub accepts: Vec<PaymentRequirements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn encode_payment_required(value: &PaymentRequired) -> Result<String, HeaderCodecError> {
    encode_header(value)
}

pub fn decode_payment_required(header: &str) -> Result<PaymentRequired, HeaderCodecError> {
    decode_header(header)
}

/// Encodes `value` and inserts it into `response` under `header_name`,
/// logging and dropping the header on failure rather than failing the
/// response (the header is an informational envelope, not the payload).
pub fn encode_header_or_log<T: Serialize>(response: &mut Response, header_name: &str, value: &T) {
    let Ok(name) = HeaderName::from_bytes(header_name.as_bytes()) else {
        tracing::warn!(header_name, "invalid header name");
        return;
    };
    match encode_header(value) {
        Ok(encoded) => match HeaderValue::from_str(&encoded) {
            Ok(header_value) => {
                response.headers_mut().insert(name, header_value);
            }
            Err(err) => tracing::warn!(error = %err, header_name, "header value not representable as ASCII"),
        },
        Err(err) => tracing::warn!(error = %err, header_name, "failed to encode header"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_payment_required_envelope() {
        let requirements = PaymentRequirements {
            scheme: "upto".to_string(),
            network: "eip155:8453".parse().unwrap(),
            asset: "0xusdc".to_string(),
            pay_to: "0xb".to_string(),
            amount: "250000".to_string(),
            max_timeout_seconds: 60,
            extra: None,
        };
        let value = PaymentRequired {
            x402_version: 1,
            accepts: vec![requirements],
            error: None,
        };
        let encoded = encode_payment_required(&value).unwrap();
        let decoded = decode_payment_required(&encoded).unwrap();
        assert_eq!(value, decoded);
    }
}
