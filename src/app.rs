//! Wires the dispatcher and the upto session engine together behind the
//! [`crate::session::orchestrator::FacilitatorClient`] seam, so the
//! orchestrator never depends on [`FacilitatorDispatcher`] directly —
//! mirroring the teacher's practice of depending on its `Facilitator`
//! trait rather than a concrete type in `handlers.rs`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::dispatcher::FacilitatorDispatcher;
use crate::proto::{PaymentPayload, PaymentRequirements, SettleResponse};
use crate::session::orchestrator::FacilitatorClient;

pub struct DispatcherFacilitatorClient {
    dispatcher: Arc<FacilitatorDispatcher>,
}

impl DispatcherFacilitatorClient {
    pub fn new(dispatcher: Arc<FacilitatorDispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl FacilitatorClient for DispatcherFacilitatorClient {
    async fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> SettleResponse {
        self.dispatcher.settle(payload, requirements).await
    }
}
