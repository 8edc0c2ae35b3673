//! `SignerPort`: the chain-signer abstraction the upto-EVM scheme handler
//! consumes (spec.md §6). This crate specifies the interface only — no
//! concrete EVM RPC/signing implementation is provided, per spec.md §1's
//! explicit Non-goal ("chain signer abstraction... treat as external
//! collaborator, specify only the interface").

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::Eip712Domain;
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptStatus {
    Success,
    Reverted,
}

#[derive(Debug, Clone)]
pub struct TransactionReceipt {
    pub status: ReceiptStatus,
    pub transaction_hash: B256,
}

impl TransactionReceipt {
    pub fn is_success(&self) -> bool {
        matches!(self.status, ReceiptStatus::Success)
    }
}

/// A typed-data verification request (EIP-712).
#[derive(Debug, Clone)]
pub struct VerifyTypedDataRequest {
    pub address: Address,
    pub domain: Eip712Domain,
    pub primary_type: String,
    /// The EIP-712 message fields, by name.
    pub message: serde_json::Value,
    pub signature: Bytes,
}

/// A read-only contract call request.
#[derive(Debug, Clone)]
pub struct ReadContractRequest {
    pub address: Address,
    pub function_name: String,
    pub args: Vec<serde_json::Value>,
}

/// A state-changing contract call request.
#[derive(Debug, Clone)]
pub struct WriteContractRequest {
    pub address: Address,
    pub function_name: String,
    pub args: Vec<serde_json::Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("contract call reverted: {0}")]
    Reverted(String),
    #[error("no signer address available")]
    NoSigner,
}

/// The facilitator-side signer for EVM chains: reads chain state, signs
/// and submits transactions, and waits for receipts. The facilitator
/// treats implementations as thread-safe and as owning their own nonce
/// management (spec.md §5 "Shared resources").
#[async_trait]
pub trait SignerPort: Send + Sync {
    async fn get_addresses(&self) -> Result<Vec<Address>, SignerError>;

    async fn verify_typed_data(&self, request: VerifyTypedDataRequest) -> Result<bool, SignerError>;

    async fn read_contract(&self, request: ReadContractRequest) -> Result<serde_json::Value, SignerError>;

    async fn write_contract(&self, request: WriteContractRequest) -> Result<B256, SignerError>;

    async fn wait_for_transaction_receipt(&self, hash: B256) -> Result<TransactionReceipt, SignerError>;
}

/// A [`SignerPort`] with no backing chain client, used as this crate's
/// default binding until a real EVM RPC/signing stack (spec.md §1
/// Non-goal) is plugged in.
///
/// `verify_typed_data` always errs rather than answering `true`/`false`;
/// [`crate::scheme::upto_eip155::UptoEip155Handler::verify`] treats that as
/// "unknown" and falls back to recovering the signer address locally from
/// the EIP-712 hash, so verification still works end-to-end without any
/// chain access. Every on-chain write/read used by `settle` errs, so
/// settlement correctly fails with a tagged reason (`permit_failed` /
/// `transaction_failed`) rather than silently pretending to move funds.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSigner;

#[async_trait]
impl SignerPort for NullSigner {
    async fn get_addresses(&self) -> Result<Vec<Address>, SignerError> {
        Ok(Vec::new())
    }

    async fn verify_typed_data(&self, _request: VerifyTypedDataRequest) -> Result<bool, SignerError> {
        Err(SignerError::NoSigner)
    }

    async fn read_contract(&self, _request: ReadContractRequest) -> Result<serde_json::Value, SignerError> {
        Err(SignerError::NoSigner)
    }

    async fn write_contract(&self, _request: WriteContractRequest) -> Result<B256, SignerError> {
        Err(SignerError::NoSigner)
    }

    async fn wait_for_transaction_receipt(&self, _hash: B256) -> Result<TransactionReceipt, SignerError> {
        Err(SignerError::NoSigner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_signer_errs_on_every_chain_operation_except_addresses() {
        let signer = NullSigner;
        assert_eq!(signer.get_addresses().await.unwrap(), Vec::<Address>::new());
        assert!(signer
            .write_contract(WriteContractRequest {
                address: Address::ZERO,
                function_name: "permit".to_string(),
                args: vec![],
            })
            .await
            .is_err());
        assert!(signer
            .read_contract(ReadContractRequest {
                address: Address::ZERO,
                function_name: "allowance".to_string(),
                args: vec![],
            })
            .await
            .is_err());
        assert!(signer
            .wait_for_transaction_receipt(B256::ZERO)
            .await
            .is_err());
    }
}
