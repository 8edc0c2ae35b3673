//! The six-slot lifecycle hook pipeline wrapping every verify/settle call
//! (spec.md §4.1, §6). Hooks are observability-only: a failing hook is
//! logged and swallowed, never blocking or altering the request.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::network::NetworkId;
use crate::proto::{PaymentPayload, PaymentRequirements, SettleResponse, VerifyResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Verify,
    Settle,
}

/// Which handler (scheme, network) a hook invocation concerns.
#[derive(Debug, Clone)]
pub struct HandlerRef {
    pub scheme: String,
    pub network: NetworkId,
}

/// The record passed to every hook invocation.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub payload: PaymentPayload,
    pub requirements: PaymentRequirements,
    pub phase: Phase,
    pub handler: Option<HandlerRef>,
    pub verify_response: Option<VerifyResponse>,
    pub settle_response: Option<SettleResponse>,
    pub error_reason: Option<String>,
}

impl HookContext {
    pub fn new(payload: PaymentPayload, requirements: PaymentRequirements, phase: Phase) -> Self {
        Self {
            payload,
            requirements,
            phase,
            handler: None,
            verify_response: None,
            settle_response: None,
            error_reason: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("hook failed: {0}")]
pub struct HookError(pub String);

/// An asynchronous observer invoked around a verify/settle phase. Never
/// alters control flow — its return value is only used for logging.
#[async_trait]
pub trait Hook: Send + Sync {
    async fn call(&self, context: &HookContext) -> Result<(), HookError>;
}

#[async_trait]
impl<F> Hook for F
where
    F: Fn(&HookContext) -> Result<(), HookError> + Send + Sync,
{
    async fn call(&self, context: &HookContext) -> Result<(), HookError> {
        self(context)
    }
}

/// The six hook slots named in spec.md §4.1.
#[derive(Default)]
pub struct HookSlots {
    pub on_before_verify: Vec<Arc<dyn Hook>>,
    pub on_after_verify: Vec<Arc<dyn Hook>>,
    pub on_verify_failure: Vec<Arc<dyn Hook>>,
    pub on_before_settle: Vec<Arc<dyn Hook>>,
    pub on_after_settle: Vec<Arc<dyn Hook>>,
    pub on_settle_failure: Vec<Arc<dyn Hook>>,
}

impl fmt::Debug for HookSlots {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookSlots")
            .field("on_before_verify", &self.on_before_verify.len())
            .field("on_after_verify", &self.on_after_verify.len())
            .field("on_verify_failure", &self.on_verify_failure.len())
            .field("on_before_settle", &self.on_before_settle.len())
            .field("on_after_settle", &self.on_after_settle.len())
            .field("on_settle_failure", &self.on_settle_failure.len())
            .finish()
    }
}

impl HookSlots {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Fires every hook in `slot` in registration order. Each hook failure is
/// logged and swallowed — it never blocks or fails the calling request.
pub(crate) async fn fire(slot: &[Arc<dyn Hook>], context: &HookContext) {
    for hook in slot {
        if let Err(err) = hook.call(context).await {
            tracing::warn!(error = %err, phase = ?context.phase, "hook failed, swallowing");
        }
    }
}
