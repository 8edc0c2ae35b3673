//! `UptoEip155Handler` (spec.md §4.3): the EIP-2612 permit-based "upto"
//! scheme handler for EVM chains.
//!
//! Grounded in the teacher's `scheme/v2_eip155_upto/mod.rs`
//! (`verify_upto_payment`/`settle_upto_payment`), generalized so that
//! `settle` applies an **override amount** supplied by the caller (the
//! session engine's `pendingSpent`) rather than always settling the full
//! permit cap, since batching accrued charges under one permit is this
//! crate's addition on top of the teacher's one-shot settlement.

pub mod types;

use std::str::FromStr;
use std::sync::Arc;

use alloy_primitives::{Address, Bytes, Signature, U256};
use alloy_sol_types::{eip712_domain, SolStruct};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::amount::parse_amount_saturating;
use crate::handler::SchemeHandler;
use crate::network::CaipFamilyPattern;
use crate::proto::{PaymentPayload, PaymentRequirements, SettleErrorTag, SettleResponse, VerifyErrorTag, VerifyResponse};
use crate::signer::{ReadContractRequest, SignerPort, VerifyTypedDataRequest, WriteContractRequest};
use crate::timestamp::UnixTimestamp;

use types::{PaymentRequirementsExtra, UptoEvmPayload};

/// Minimum time-to-deadline a permit must still have for `verify` to
/// accept it (spec.md §4.3 "deadline >= now + 6s").
const MIN_DEADLINE_BUFFER_SEC: u64 = 6;

/// Shape of a 65-byte ECDSA signature, hex-encoded with an optional `0x`
/// prefix. Grounded in the teacher's `SIG_REGEX` (`src/types.rs`), which
/// checks the same shape before attempting to recover an address from it.
static SIGNATURE_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(0x)?[0-9a-fA-F]{130}$").expect("valid signature regex"));

/// Solidity-compatible struct for the EIP-2612 Permit typed-data message.
alloy_sol_types::sol! {
    struct Permit {
        address owner;
        address spender;
        uint256 value;
        uint256 nonce;
        uint256 deadline;
    }
}

pub struct UptoEip155Handler {
    signer: Arc<dyn SignerPort>,
    signer_addresses: Vec<String>,
}

impl UptoEip155Handler {
    /// Resolves `signer.get_addresses()` once at construction so
    /// `get_signers` (required synchronous by [`SchemeHandler`]) can just
    /// return the cached list, following the teacher's `EvmProvider`
    /// (`src/chain/evm.rs`), which resolves `signer_addresses` once in its
    /// constructor rather than on every `/supported` call. An address
    /// resolution failure is advertised as no signers rather than failing
    /// construction — the handler still functions for local verification.
    pub async fn new(signer: Arc<dyn SignerPort>) -> Self {
        let signer_addresses = signer
            .get_addresses()
            .await
            .unwrap_or_default()
            .into_iter()
            .map(|address| address.to_string())
            .collect();
        Self {
            signer,
            signer_addresses,
        }
    }
}

struct ParsedUpto {
    owner: Address,
    spender: Address,
    cap: U256,
    nonce: U256,
    deadline: U256,
    signature: String,
}

/// Parses and structurally validates the upto payload, without touching
/// the network (spec.md §4.3 steps 2-3, 9).
fn parse_payload(
    payload: &PaymentPayload,
    requirements: &PaymentRequirements,
) -> Result<ParsedUpto, VerifyErrorTag> {
    if payload.accepted.scheme != "upto" || requirements.scheme != "upto" {
        return Err(VerifyErrorTag::UnsupportedScheme);
    }

    let upto: UptoEvmPayload = serde_json::from_value(payload.payload.clone())
        .map_err(|_| VerifyErrorTag::InvalidUptoEvmPayload)?;

    let owner = Address::from_str(upto.authorization.from.trim())
        .map_err(|_| VerifyErrorTag::InvalidUptoEvmPayload)?;
    let to_str = upto
        .authorization
        .to
        .as_deref()
        .unwrap_or(&requirements.pay_to);
    let spender =
        Address::from_str(to_str.trim()).map_err(|_| VerifyErrorTag::InvalidUptoEvmPayload)?;

    if upto.authorization.nonce.trim().is_empty()
        || upto.authorization.value.trim().is_empty()
        || upto.authorization.valid_before.trim().is_empty()
        || upto.signature.trim().is_empty()
    {
        return Err(VerifyErrorTag::InvalidUptoEvmPayload);
    }

    if !SIGNATURE_SHAPE.is_match(upto.signature.trim()) {
        return Err(VerifyErrorTag::InvalidUptoEvmPayload);
    }

    let cap = parse_amount_saturating(&upto.authorization.value);
    let nonce = parse_amount_saturating(&upto.authorization.nonce);
    let deadline = parse_amount_saturating(&upto.authorization.valid_before);

    Ok(ParsedUpto {
        owner,
        spender,
        cap,
        nonce,
        deadline,
        signature: upto.signature,
    })
}

fn chain_id_of(network_reference: &str) -> Result<u64, VerifyErrorTag> {
    network_reference
        .parse::<u64>()
        .map_err(|_| VerifyErrorTag::InvalidChainId)
}

/// Runs the full check sequence from spec.md §4.3, returning the payer
/// address on success.
async fn verify_upto_payment(
    signer: &dyn SignerPort,
    payload: &PaymentPayload,
    requirements: &PaymentRequirements,
) -> Result<Address, (VerifyErrorTag, Option<Address>)> {
    let parsed = parse_payload(payload, requirements).map_err(|tag| (tag, None))?;
    let payer = parsed.owner;

    if payload.accepted.network != requirements.network {
        return Err((VerifyErrorTag::NetworkMismatch, Some(payer)));
    }

    let extra: PaymentRequirementsExtra = requirements
        .extra
        .clone()
        .and_then(|v| serde_json::from_value(v).ok())
        .ok_or((VerifyErrorTag::MissingEip712Domain, Some(payer)))?;
    let (name, version) = match (extra.name.clone(), extra.version.clone()) {
        (Some(name), Some(version)) => (name, version),
        _ => return Err((VerifyErrorTag::MissingEip712Domain, Some(payer))),
    };

    let required_pay_to = Address::from_str(requirements.pay_to.trim())
        .map_err(|_| (VerifyErrorTag::RecipientMismatch, Some(payer)))?;
    if parsed.spender != required_pay_to {
        return Err((VerifyErrorTag::RecipientMismatch, Some(payer)));
    }

    let required_amount = parse_amount_saturating(&requirements.amount);
    if parsed.cap < required_amount {
        return Err((VerifyErrorTag::CapTooLow, Some(payer)));
    }

    if let Some(max_amount_required) = extra.max_amount_required() {
        let max_amount_required = parse_amount_saturating(max_amount_required);
        if parsed.cap < max_amount_required {
            return Err((VerifyErrorTag::CapBelowRequiredMax, Some(payer)));
        }
    }

    let now = UnixTimestamp::now();
    let deadline = UnixTimestamp::from_secs(parsed.deadline.try_into().unwrap_or(u64::MAX));
    if deadline < now + MIN_DEADLINE_BUFFER_SEC {
        return Err((VerifyErrorTag::AuthorizationExpired, Some(payer)));
    }

    let chain_id =
        chain_id_of(requirements.network.reference()).map_err(|tag| (tag, Some(payer)))?;

    let asset =
        Address::from_str(requirements.asset.trim()).map_err(|_| (VerifyErrorTag::InvalidUptoEvmPayload, Some(payer)))?;
    let domain = eip712_domain! {
        name: name,
        version: version,
        chain_id: chain_id,
        verifying_contract: asset,
    };
    let permit = Permit {
        owner: parsed.owner,
        spender: parsed.spender,
        value: parsed.cap,
        nonce: parsed.nonce,
        deadline: parsed.deadline,
    };
    let hash = permit.eip712_signing_hash(&domain);

    let signature_bytes = parsed
        .signature
        .strip_prefix("0x")
        .unwrap_or(&parsed.signature);
    let signature_bytes =
        hex::decode(signature_bytes).map_err(|_| (VerifyErrorTag::InvalidPermitSignature, Some(payer)))?;

    let verified = signer
        .verify_typed_data(VerifyTypedDataRequest {
            address: parsed.owner,
            domain,
            primary_type: "Permit".to_string(),
            message: serde_json::json!({
                "owner": parsed.owner.to_string(),
                "spender": parsed.spender.to_string(),
                "value": parsed.cap.to_string(),
                "nonce": parsed.nonce.to_string(),
                "deadline": parsed.deadline.to_string(),
            }),
            signature: Bytes::from(signature_bytes.clone()),
        })
        .await
        .unwrap_or(false);

    if !verified {
        let recovered = Signature::try_from(signature_bytes.as_slice())
            .ok()
            .and_then(|sig| sig.recover_address_from_prehash(&hash).ok());
        if recovered != Some(parsed.owner) {
            return Err((VerifyErrorTag::InvalidPermitSignature, Some(payer)));
        }
    }

    Ok(payer)
}

/// Derives a session's cap and deadline from its upto authorization, for
/// the HTTP layer to mint a session on first successful verify (spec.md §3:
/// "a session is created when the first upto payment succeeds
/// verification"). Returns `None` if the payload doesn't parse as an upto
/// authorization; callers should only invoke this once `verify` has already
/// succeeded.
pub fn session_terms(
    payload: &PaymentPayload,
    requirements: &PaymentRequirements,
) -> Option<(U256, UnixTimestamp)> {
    let parsed = parse_payload(payload, requirements).ok()?;
    let deadline = UnixTimestamp::from_secs(parsed.deadline.try_into().unwrap_or(u64::MAX));
    Some((parsed.cap, deadline))
}

#[async_trait]
impl SchemeHandler for UptoEip155Handler {
    fn scheme(&self) -> &str {
        "upto"
    }

    fn caip_family(&self) -> CaipFamilyPattern {
        CaipFamilyPattern::new("eip155")
    }

    fn get_extra(&self, _network: &str) -> Option<serde_json::Value> {
        None
    }

    fn get_signers(&self, _network: &str) -> Vec<String> {
        self.signer_addresses.clone()
    }

    #[tracing::instrument(skip_all, fields(network = %requirements.network))]
    async fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> VerifyResponse {
        match verify_upto_payment(self.signer.as_ref(), payload, requirements).await {
            Ok(payer) => VerifyResponse::valid(payer.to_string()),
            Err((tag, Some(payer))) => VerifyResponse::invalid_with_payer(tag, payer.to_string()),
            Err((tag, None)) => VerifyResponse::invalid(tag),
        }
    }

    #[tracing::instrument(skip_all, fields(network = %requirements.network, amount = %requirements.amount))]
    async fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> SettleResponse {
        let network = requirements.network.to_string();

        let payer = match verify_upto_payment(self.signer.as_ref(), payload, requirements).await {
            Ok(payer) => payer,
            Err((tag, _)) => {
                return SettleResponse::failure(tag.into(), network);
            }
        };

        // parse_payload cannot fail here: verify_upto_payment already succeeded.
        let parsed = match parse_payload(payload, requirements) {
            Ok(parsed) => parsed,
            Err(tag) => return SettleResponse::failure(tag.into(), network),
        };

        let settle_amount = parse_amount_saturating(&requirements.amount);
        if settle_amount > parsed.cap {
            return SettleResponse::failure(SettleErrorTag::TotalExceedsCap, network);
        }

        let signature_hex = parsed.signature.strip_prefix("0x").unwrap_or(&parsed.signature);
        let signature_bytes = match hex::decode(signature_hex) {
            Ok(bytes) => bytes,
            Err(_) => return SettleResponse::failure(SettleErrorTag::UnsupportedSignatureType, network),
        };
        let signature = match Signature::try_from(signature_bytes.as_slice()) {
            Ok(sig) => sig,
            Err(_) => return SettleResponse::failure(SettleErrorTag::UnsupportedSignatureType, network),
        };
        let v = signature.v().y_parity_byte_non_eip155().unwrap_or(signature.v().y_parity_byte());
        let r = signature.r().to_string();
        let s = signature.s().to_string();

        let asset = match Address::from_str(requirements.asset.trim()) {
            Ok(address) => address,
            Err(_) => return SettleResponse::failure(SettleErrorTag::InvalidUptoEvmPayload, network),
        };
        let pay_to = match Address::from_str(requirements.pay_to.trim()) {
            Ok(address) => address,
            Err(_) => return SettleResponse::failure(SettleErrorTag::RecipientMismatch, network),
        };

        // Submission alone does not tell us whether the permit was applied:
        // a reverted permit (the common nonce-already-consumed replay case,
        // spec.md §4.3 step 5) only surfaces once its receipt is awaited,
        // exactly as the transferFrom path below awaits its own receipt.
        let permit_succeeded = match self
            .signer
            .write_contract(WriteContractRequest {
                address: asset,
                function_name: "permit".to_string(),
                args: vec![
                    serde_json::json!(parsed.owner.to_string()),
                    serde_json::json!(parsed.spender.to_string()),
                    serde_json::json!(parsed.cap.to_string()),
                    serde_json::json!(parsed.deadline.to_string()),
                    serde_json::json!(v),
                    serde_json::json!(r),
                    serde_json::json!(s),
                ],
            })
            .await
        {
            Ok(permit_tx) => self
                .signer
                .wait_for_transaction_receipt(permit_tx)
                .await
                .map(|receipt| receipt.is_success())
                .unwrap_or(false),
            Err(_) => false,
        };

        if !permit_succeeded {
            let allowance = match self
                .signer
                .read_contract(ReadContractRequest {
                    address: asset,
                    function_name: "allowance".to_string(),
                    args: vec![
                        serde_json::json!(parsed.owner.to_string()),
                        serde_json::json!(parsed.spender.to_string()),
                    ],
                })
                .await
            {
                Ok(value) => value
                    .as_str()
                    .map(parse_amount_saturating)
                    .unwrap_or(U256::ZERO),
                Err(_) => return SettleResponse::failure(SettleErrorTag::PermitFailed, network),
            };

            if allowance < settle_amount {
                return SettleResponse::failure(SettleErrorTag::InsufficientAllowance, network);
            }
        }

        let tx_hash = match self
            .signer
            .write_contract(WriteContractRequest {
                address: asset,
                function_name: "transferFrom".to_string(),
                args: vec![
                    serde_json::json!(parsed.owner.to_string()),
                    serde_json::json!(pay_to.to_string()),
                    serde_json::json!(settle_amount.to_string()),
                ],
            })
            .await
        {
            Ok(hash) => hash,
            Err(_) => return SettleResponse::failure(SettleErrorTag::TransactionFailed, network),
        };

        let receipt = match self.signer.wait_for_transaction_receipt(tx_hash).await {
            Ok(receipt) => receipt,
            Err(_) => return SettleResponse::failure(SettleErrorTag::TransactionFailed, network),
        };

        if !receipt.is_success() {
            return SettleResponse::failure_with_transaction(
                SettleErrorTag::InvalidTransactionState,
                tx_hash.to_string(),
                network,
            );
        }

        SettleResponse::success(tx_hash.to_string(), network, payer.to_string())
    }
}
