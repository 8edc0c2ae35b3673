//! The `SchemeHandler` contract (spec.md §4.2): the interface every
//! per-scheme-per-network plugin implements so the dispatcher can route
//! verify/settle/capability requests to it uniformly.

use async_trait::async_trait;

use crate::network::CaipFamilyPattern;
use crate::proto::{PaymentPayload, PaymentRequirements, SettleResponse, VerifyResponse};

/// A scheme handler object, registered in the [`crate::dispatcher::FacilitatorDispatcher`]
/// under `(network, scheme)`. Modeled on the teacher's `X402SchemeFacilitator`
/// trait, generalized with the `getExtra`/`getSigners`/`caipFamily` members
/// spec.md requires for the `/supported` aggregate view.
#[async_trait]
pub trait SchemeHandler: Send + Sync {
    /// The scheme name this handler answers for (e.g. `"upto"`, `"exact"`).
    fn scheme(&self) -> &str;

    /// The chain family this handler belongs to, for `/supported` grouping.
    fn caip_family(&self) -> CaipFamilyPattern;

    /// Scheme metadata advertised to clients for the given network (EIP-712
    /// domain hints, paymaster endpoints, sponsor addresses, ...).
    fn get_extra(&self, network: &str) -> Option<serde_json::Value>;

    /// Facilitator-side addresses that pay gas or sign for this handler.
    fn get_signers(&self, network: &str) -> Vec<String>;

    /// Verifies a payment payload against the given requirements without
    /// moving funds.
    async fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> VerifyResponse;

    /// Settles a (previously or concurrently) verified payment on-chain.
    /// Handlers never throw across this boundary — all failure modes are
    /// carried in the returned [`SettleResponse`].
    async fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> SettleResponse;
}
