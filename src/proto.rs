//! Wire types for the x402 protocol: payment requirements, payloads, and
//! the verify/settle/supported response shapes.
//!
//! These mirror the teacher's `proto` module in spirit (camelCase JSON,
//! typed response enums) but follow spec.md's flatter wire contract
//! directly instead of the teacher's polymorphic `serde_json::Value`
//! envelope, since this crate's protocol surface is fixed rather than
//! multi-version.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::network::NetworkId;

/// What a merchant requires in order to accept a payment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    pub scheme: String,
    pub network: NetworkId,
    pub asset: String,
    pub pay_to: String,
    /// Decimal string of base units.
    pub amount: String,
    pub max_timeout_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

/// The client's signed payment, pinned against the exact requirements it
/// was signed over (`accepted`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub x402_version: u32,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub extensions: Vec<String>,
    pub accepted: PaymentRequirements,
    pub payload: serde_json::Value,
}

/// `GET /supported` aggregate response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedResponse {
    pub kinds: Vec<SupportedKind>,
    pub signers: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedKind {
    pub network: String,
    pub scheme: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

/// Response to a `verify` call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<VerifyErrorTag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
}

impl VerifyResponse {
    pub fn valid(payer: impl Into<String>) -> Self {
        Self {
            is_valid: true,
            invalid_reason: None,
            payer: Some(payer.into()),
        }
    }

    pub fn invalid(reason: VerifyErrorTag) -> Self {
        Self {
            is_valid: false,
            invalid_reason: Some(reason),
            payer: None,
        }
    }

    pub fn invalid_with_payer(reason: VerifyErrorTag, payer: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            invalid_reason: Some(reason),
            payer: Some(payer.into()),
        }
    }
}

/// Response to a `settle` call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<SettleErrorTag>,
    pub transaction: String,
    pub network: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
}

impl SettleResponse {
    pub fn success(transaction: impl Into<String>, network: impl Into<String>, payer: impl Into<String>) -> Self {
        Self {
            success: true,
            error_reason: None,
            transaction: transaction.into(),
            network: network.into(),
            payer: Some(payer.into()),
        }
    }

    pub fn failure(reason: SettleErrorTag, network: impl Into<String>) -> Self {
        Self {
            success: false,
            error_reason: Some(reason),
            transaction: String::new(),
            network: network.into(),
            payer: None,
        }
    }

    pub fn failure_with_transaction(
        reason: SettleErrorTag,
        transaction: impl Into<String>,
        network: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            error_reason: Some(reason),
            transaction: transaction.into(),
            network: network.into(),
            payer: None,
        }
    }
}

/// Stable, wire-contract tags for verify failures (spec.md §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyErrorTag {
    UnsupportedScheme,
    UnsupportedSchemeNetwork,
    InvalidUptoEvmPayload,
    NetworkMismatch,
    MissingEip712Domain,
    RecipientMismatch,
    CapTooLow,
    CapBelowRequiredMax,
    AuthorizationExpired,
    InvalidChainId,
    InvalidPermitSignature,
    VerificationError,
}

impl std::fmt::Display for VerifyErrorTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| std::fmt::Error)?;
        write!(f, "{}", json.trim_matches('"'))
    }
}

/// Stable, wire-contract tags for settle failures (spec.md §7). Includes
/// every [`VerifyErrorTag`] so a failed re-verify during settle can be
/// carried through without a second taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettleErrorTag {
    UnsupportedScheme,
    UnsupportedSchemeNetwork,
    InvalidUptoEvmPayload,
    NetworkMismatch,
    MissingEip712Domain,
    RecipientMismatch,
    CapTooLow,
    CapBelowRequiredMax,
    AuthorizationExpired,
    InvalidChainId,
    InvalidPermitSignature,
    VerificationError,
    TotalExceedsCap,
    UnsupportedSignatureType,
    InsufficientAllowance,
    PermitFailed,
    InvalidTransactionState,
    TransactionFailed,
    SettlementFailed,
}

impl std::fmt::Display for SettleErrorTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| std::fmt::Error)?;
        write!(f, "{}", json.trim_matches('"'))
    }
}

impl From<VerifyErrorTag> for SettleErrorTag {
    fn from(tag: VerifyErrorTag) -> Self {
        match tag {
            VerifyErrorTag::UnsupportedScheme => SettleErrorTag::UnsupportedScheme,
            VerifyErrorTag::UnsupportedSchemeNetwork => SettleErrorTag::UnsupportedSchemeNetwork,
            VerifyErrorTag::InvalidUptoEvmPayload => SettleErrorTag::InvalidUptoEvmPayload,
            VerifyErrorTag::NetworkMismatch => SettleErrorTag::NetworkMismatch,
            VerifyErrorTag::MissingEip712Domain => SettleErrorTag::MissingEip712Domain,
            VerifyErrorTag::RecipientMismatch => SettleErrorTag::RecipientMismatch,
            VerifyErrorTag::CapTooLow => SettleErrorTag::CapTooLow,
            VerifyErrorTag::CapBelowRequiredMax => SettleErrorTag::CapBelowRequiredMax,
            VerifyErrorTag::AuthorizationExpired => SettleErrorTag::AuthorizationExpired,
            VerifyErrorTag::InvalidChainId => SettleErrorTag::InvalidChainId,
            VerifyErrorTag::InvalidPermitSignature => SettleErrorTag::InvalidPermitSignature,
            VerifyErrorTag::VerificationError => SettleErrorTag::VerificationError,
        }
    }
}
