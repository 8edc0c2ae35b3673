//! Wire types for the EIP-2612 permit-based "upto" payment scheme
//! (spec.md §3 "Upto Authorization"). Grounded in the teacher's
//! `scheme/v2_eip155_upto/types.rs`, flattened to this crate's decimal-
//! string-over-JSON convention instead of the teacher's typed `U256`
//! fields, since this crate parses monetary fields with the saturating
//! policy in [`crate::amount`] rather than rejecting malformed input at
//! deserialization.

use serde::{Deserialize, Serialize};

/// The signed EIP-2612 permit plus its authorization fields, carried in
/// `PaymentPayload.payload` for the `upto` scheme.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UptoEvmPayload {
    /// 65-byte ECDSA signature, hex-encoded with a `0x` prefix.
    pub signature: String,
    pub authorization: UptoEvmAuthorization,
}

/// EIP-2612 permit authorization data (spec.md §3 "Upto Authorization").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UptoEvmAuthorization {
    /// Token owner (the payer).
    pub from: String,
    /// Spender (the facilitator); falls back to `requirements.payTo` when absent.
    #[serde(default)]
    pub to: Option<String>,
    /// Maximum spending cap, decimal string of base units.
    pub value: String,
    /// EIP-2612 nonce, decimal string.
    pub nonce: String,
    /// Deadline, unix seconds as a decimal string.
    pub valid_before: String,
}

/// `PaymentRequirements.extra` for the upto scheme: the EIP-712 domain
/// hints the client signed against.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirementsExtra {
    pub name: Option<String>,
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_amount_required: Option<String>,
    /// Legacy alias for `max_amount_required`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_amount: Option<String>,
}

impl PaymentRequirementsExtra {
    pub fn max_amount_required(&self) -> Option<&str> {
        self.max_amount_required
            .as_deref()
            .or(self.max_amount.as_deref())
    }
}
