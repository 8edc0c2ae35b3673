//! The facilitator dispatcher (spec.md §4.1): a registry routing
//! verify/settle/capability requests to the correct per-scheme-per-network
//! [`SchemeHandler`], wrapped by a six-slot lifecycle hook pipeline.

pub mod hooks;

use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::handler::SchemeHandler;
use crate::network::NetworkId;
use crate::proto::{
    PaymentPayload, PaymentRequirements, SettleErrorTag, SettleResponse, SupportedKind,
    SupportedResponse, VerifyErrorTag, VerifyResponse,
};

use hooks::{fire, HandlerRef, Hook, HookContext, HookSlots, Phase};

type RegistryKey = (NetworkId, String);

/// Holds the registry of `(network, scheme) -> handler` and the hook
/// pipeline, and implements the verify/settle/supported algorithms.
///
/// The registry is a [`DashMap`] so `register` can be called safely from
/// multiple tasks even though, per spec.md §5, it is expected to be
/// populated once at startup and treated as immutable thereafter.
pub struct FacilitatorDispatcher {
    handlers: DashMap<RegistryKey, Arc<dyn SchemeHandler>>,
    registration_order: Mutex<Vec<RegistryKey>>,
    hooks: HookSlots,
}

impl Default for FacilitatorDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl FacilitatorDispatcher {
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
            registration_order: Mutex::new(Vec::new()),
            hooks: HookSlots::new(),
        }
    }

    /// Registers `handler` under `(network, handler.scheme())`. Overwrite
    /// is allowed; the most recently registered handler for a key wins.
    pub fn register(&self, network: NetworkId, handler: Arc<dyn SchemeHandler>) {
        let key = (network, handler.scheme().to_string());
        let is_new = !self.handlers.contains_key(&key);
        self.handlers.insert(key.clone(), handler);
        if is_new {
            self.registration_order.lock().unwrap().push(key);
        }
    }

    pub fn on_before_verify(&mut self, hook: Arc<dyn Hook>) {
        self.hooks.on_before_verify.push(hook);
    }

    pub fn on_after_verify(&mut self, hook: Arc<dyn Hook>) {
        self.hooks.on_after_verify.push(hook);
    }

    pub fn on_verify_failure(&mut self, hook: Arc<dyn Hook>) {
        self.hooks.on_verify_failure.push(hook);
    }

    pub fn on_before_settle(&mut self, hook: Arc<dyn Hook>) {
        self.hooks.on_before_settle.push(hook);
    }

    pub fn on_after_settle(&mut self, hook: Arc<dyn Hook>) {
        self.hooks.on_after_settle.push(hook);
    }

    pub fn on_settle_failure(&mut self, hook: Arc<dyn Hook>) {
        self.hooks.on_settle_failure.push(hook);
    }

    fn lookup(&self, network: &NetworkId, scheme: &str) -> Option<Arc<dyn SchemeHandler>> {
        self.handlers
            .get(&(network.clone(), scheme.to_string()))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Verifies `payload` against `requirements` (spec.md §4.1 "Verify algorithm").
    pub async fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> VerifyResponse {
        let mut context = HookContext::new(payload.clone(), requirements.clone(), Phase::Verify);

        let handler = match self.lookup(&requirements.network, &requirements.scheme) {
            Some(handler) => handler,
            None => {
                let response = VerifyResponse::invalid(VerifyErrorTag::UnsupportedSchemeNetwork);
                context.verify_response = Some(response.clone());
                context.error_reason = Some(VerifyErrorTag::UnsupportedSchemeNetwork.to_string());
                fire(&self.hooks.on_verify_failure, &context).await;
                return response;
            }
        };

        context.handler = Some(HandlerRef {
            scheme: requirements.scheme.clone(),
            network: requirements.network.clone(),
        });

        fire(&self.hooks.on_before_verify, &context).await;

        let response = handler.verify(payload, requirements).await;

        context.verify_response = Some(response.clone());
        if response.is_valid {
            fire(&self.hooks.on_after_verify, &context).await;
        } else {
            context.error_reason = response.invalid_reason.map(|r| r.to_string());
            fire(&self.hooks.on_verify_failure, &context).await;
        }
        response
    }

    /// Settles `payload` against `requirements` (spec.md §4.1 "Settle algorithm").
    /// Does not re-verify first — handlers are responsible for their own
    /// idempotency and re-checking.
    pub async fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> SettleResponse {
        let mut context = HookContext::new(payload.clone(), requirements.clone(), Phase::Settle);

        let handler = match self.lookup(&requirements.network, &requirements.scheme) {
            Some(handler) => handler,
            None => {
                let response = SettleResponse::failure(
                    SettleErrorTag::UnsupportedSchemeNetwork,
                    requirements.network.to_string(),
                );
                context.settle_response = Some(response.clone());
                context.error_reason = Some(SettleErrorTag::UnsupportedSchemeNetwork.to_string());
                fire(&self.hooks.on_settle_failure, &context).await;
                return response;
            }
        };

        context.handler = Some(HandlerRef {
            scheme: requirements.scheme.clone(),
            network: requirements.network.clone(),
        });

        fire(&self.hooks.on_before_settle, &context).await;

        let response = handler.settle(payload, requirements).await;

        context.settle_response = Some(response.clone());
        if response.success {
            fire(&self.hooks.on_after_settle, &context).await;
        } else {
            context.error_reason = response.error_reason.map(|r| r.to_string());
            fire(&self.hooks.on_settle_failure, &context).await;
        }
        response
    }

    /// Aggregates `{kinds, signers}` across every registered handler
    /// (spec.md §4.1 "getSupported").
    pub fn get_supported(&self) -> SupportedResponse {
        let order = self.registration_order.lock().unwrap().clone();
        let mut kinds = Vec::with_capacity(order.len());
        let mut signers: HashMap<String, Vec<String>> = HashMap::new();
        let mut seen: HashMap<String, HashSet<String>> = HashMap::new();

        for key in order {
            let Some(handler) = self.handlers.get(&key) else {
                continue;
            };
            let network_str = key.0.to_string();
            kinds.push(SupportedKind {
                network: network_str.clone(),
                scheme: key.1.clone(),
                extra: handler.get_extra(&network_str),
            });

            let family = handler.caip_family().to_string();
            let seen_for_family = seen.entry(family.clone()).or_default();
            let bucket = signers.entry(family).or_default();
            for address in handler.get_signers(&network_str) {
                if seen_for_family.insert(address.clone()) {
                    bucket.push(address);
                }
            }
        }

        SupportedResponse { kinds, signers }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::CaipFamilyPattern;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockHandler {
        scheme: &'static str,
        family: &'static str,
        valid: bool,
    }

    #[async_trait]
    impl SchemeHandler for MockHandler {
        fn scheme(&self) -> &str {
            self.scheme
        }

        fn caip_family(&self) -> CaipFamilyPattern {
            CaipFamilyPattern::new(self.family)
        }

        fn get_extra(&self, _network: &str) -> Option<serde_json::Value> {
            None
        }

        fn get_signers(&self, _network: &str) -> Vec<String> {
            vec!["0xfacilitator".to_string()]
        }

        async fn verify(
            &self,
            _payload: &PaymentPayload,
            _requirements: &PaymentRequirements,
        ) -> VerifyResponse {
            if self.valid {
                VerifyResponse::valid("0xpayer")
            } else {
                VerifyResponse::invalid(VerifyErrorTag::RecipientMismatch)
            }
        }

        async fn settle(
            &self,
            _payload: &PaymentPayload,
            _requirements: &PaymentRequirements,
        ) -> SettleResponse {
            SettleResponse::success("0xtx", "eip155:8453", "0xpayer")
        }
    }

    fn sample_payload(scheme: &str, network: &str) -> (PaymentPayload, PaymentRequirements) {
        let requirements = PaymentRequirements {
            scheme: scheme.to_string(),
            network: network.parse().unwrap(),
            asset: "0xusdc".to_string(),
            pay_to: "0xb".to_string(),
            amount: "250000".to_string(),
            max_timeout_seconds: 60,
            extra: None,
        };
        let payload = PaymentPayload {
            x402_version: 1,
            resource: None,
            extensions: vec![],
            accepted: requirements.clone(),
            payload: serde_json::json!({}),
        };
        (payload, requirements)
    }

    #[tokio::test]
    async fn unsupported_scheme_network_fires_verify_failure_exactly_once() {
        let dispatcher = FacilitatorDispatcher::new();
        dispatcher.register(
            "eip155:8453".parse().unwrap(),
            Arc::new(MockHandler {
                scheme: "exact",
                family: "eip155",
                valid: true,
            }),
        );

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let mut dispatcher = dispatcher;
        dispatcher.on_verify_failure(Arc::new(move |_ctx: &HookContext| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        let (payload, requirements) = sample_payload("upto", "eip155:8453");
        let response = dispatcher.verify(&payload, &requirements).await;

        assert!(!response.is_valid);
        assert_eq!(
            response.invalid_reason,
            Some(VerifyErrorTag::UnsupportedSchemeNetwork)
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn registry_lookup_hits_most_recently_registered_handler() {
        let dispatcher = FacilitatorDispatcher::new();
        let network: NetworkId = "eip155:8453".parse().unwrap();
        dispatcher.register(
            network.clone(),
            Arc::new(MockHandler {
                scheme: "exact",
                family: "eip155",
                valid: false,
            }),
        );
        dispatcher.register(
            network.clone(),
            Arc::new(MockHandler {
                scheme: "exact",
                family: "eip155",
                valid: true,
            }),
        );

        let (payload, requirements) = sample_payload("exact", "eip155:8453");
        let response = dispatcher.verify(&payload, &requirements).await;
        assert!(response.is_valid);
    }

    #[tokio::test]
    async fn happy_path_verify_fires_after_verify_hook() {
        let dispatcher = FacilitatorDispatcher::new();
        dispatcher.register(
            "eip155:8453".parse().unwrap(),
            Arc::new(MockHandler {
                scheme: "upto",
                family: "eip155",
                valid: true,
            }),
        );
        let mut dispatcher = dispatcher;
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        dispatcher.on_after_verify(Arc::new(move |_ctx: &HookContext| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        let (payload, requirements) = sample_payload("upto", "eip155:8453");
        let response = dispatcher.verify(&payload, &requirements).await;

        assert!(response.is_valid);
        assert_eq!(response.payer.as_deref(), Some("0xpayer"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn get_supported_dedupes_signers_by_family() {
        let dispatcher = FacilitatorDispatcher::new();
        dispatcher.register(
            "eip155:8453".parse().unwrap(),
            Arc::new(MockHandler {
                scheme: "exact",
                family: "eip155",
                valid: true,
            }),
        );
        dispatcher.register(
            "eip155:1".parse().unwrap(),
            Arc::new(MockHandler {
                scheme: "upto",
                family: "eip155",
                valid: true,
            }),
        );

        let supported = dispatcher.get_supported();
        assert_eq!(supported.kinds.len(), 2);
        assert_eq!(supported.signers.get("eip155:*").unwrap(), &vec!["0xfacilitator".to_string()]);
    }
}
