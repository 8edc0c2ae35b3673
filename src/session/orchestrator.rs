//! `UptoSettlementOrchestrator` (spec.md §4.5): transitions a session
//! through `settling`, calls the facilitator, and persists the outcome.

use async_trait::async_trait;

use crate::proto::{PaymentPayload, PaymentRequirements, SettleErrorTag, SettleResponse};
use crate::timestamp::UnixTimestamp;

use super::store::UptoSessionStore;
use super::{LastSettlement, SessionStatus};

/// The facilitator-side collaborator the orchestrator settles through.
/// A thin adapter over [`crate::dispatcher::FacilitatorDispatcher`]
/// implements this so the orchestrator never depends on the dispatcher
/// type directly, mirroring the teacher's practice of depending on the
/// `Facilitator` trait rather than a concrete type in its HTTP handlers.
#[async_trait]
pub trait FacilitatorClient: Send + Sync {
    async fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> SettleResponse;
}

/// Default buffer (seconds) before a session's deadline at which it is
/// force-closed rather than left open (spec.md §4.5 step 9, §5).
pub const DEFAULT_DEADLINE_BUFFER_SEC: u64 = 60;

/// Settles a single session's accrued pending spend (spec.md §4.5). Never
/// returns an error to its caller: every failure mode is absorbed into the
/// session's recorded `lastSettlement` and the session's status.
pub async fn settle_upto_session<C: FacilitatorClient>(
    store: &UptoSessionStore,
    client: &C,
    session_id: &str,
    reason: &str,
    close_after: bool,
    deadline_buffer_sec: u64,
) {
    let Some(session) = store.get(session_id) else {
        return;
    };

    if session.status != SessionStatus::Open {
        return;
    }

    let now = UnixTimestamp::now();

    if session.pending_spent.is_zero() {
        if close_after {
            let _ = store.transition(session_id, SessionStatus::Open, SessionStatus::Closed);
        }
        return;
    }

    let Ok(locked_session) =
        store.transition(session_id, SessionStatus::Open, SessionStatus::Settling)
    else {
        // Another settlement attempt won the race; nothing to do.
        return;
    };

    // Re-read pendingSpent from the session the CAS returned, not the
    // pre-lock snapshot above: `accrue` is only excluded once `status` has
    // moved to `settling`, so a concurrent accrual between the earlier
    // `get` and this transition must still be captured here (spec.md §4.5
    // step 5 computes settleAmount strictly after step 4's lock).
    let settle_amount = locked_session.pending_spent;
    let mut overridden_requirements = locked_session.payment_requirements.clone();
    overridden_requirements.amount = settle_amount.to_string();

    let receipt = client
        .settle(&locked_session.payment_payload, &overridden_requirements)
        .await;

    store.update(session_id, |s| {
        if receipt.success {
            s.settled_total = s.settled_total.saturating_add(settle_amount);
            s.pending_spent = alloy_primitives::U256::ZERO;
        }
        s.last_settlement = Some(LastSettlement {
            at: now,
            reason: reason.to_string(),
            receipt: receipt.clone(),
        });

        let should_close = close_after
            || s.settled_total >= s.cap
            || s.deadline.as_secs() <= now.as_secs().saturating_add(deadline_buffer_sec);
        s.status = if should_close {
            SessionStatus::Closed
        } else {
            SessionStatus::Open
        };
    });
}

/// Builds the non-fatal failure receipt used when a `FacilitatorClient`
/// call itself cannot be completed (spec.md §4.5 step 6). The orchestrator
/// never propagates an error to its caller; this receipt documents the
/// failure on the session instead.
pub fn settlement_failed_receipt(network: impl Into<String>) -> SettleResponse {
    SettleResponse::failure(SettleErrorTag::SettlementFailed, network)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::PaymentRequirements;
    use crate::session::Session;
    use alloy_primitives::U256;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    struct MockClient {
        succeed: bool,
        last_amount: Mutex<Option<String>>,
        calls: AtomicU64,
    }

    impl MockClient {
        fn new(succeed: bool) -> Self {
            Self {
                succeed,
                last_amount: Mutex::new(None),
                calls: AtomicU64::new(0),
            }
        }
    }

    #[async_trait]
    impl FacilitatorClient for MockClient {
        async fn settle(
            &self,
            _payload: &PaymentPayload,
            requirements: &PaymentRequirements,
        ) -> SettleResponse {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_amount.lock().unwrap() = Some(requirements.amount.clone());
            if self.succeed {
                SettleResponse::success("0xtx", requirements.network.to_string(), "0xpayer")
            } else {
                settlement_failed_receipt(requirements.network.to_string())
            }
        }
    }

    fn sample_session(id: &str, cap: u64, deadline_secs: u64) -> Session {
        let requirements = PaymentRequirements {
            scheme: "upto".to_string(),
            network: "eip155:8453".parse().unwrap(),
            asset: "0xusdc".to_string(),
            pay_to: "0xb".to_string(),
            amount: "0".to_string(),
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
        Session::new(
            id.to_string(),
            payload,
            requirements,
            U256::from(cap),
            UnixTimestamp::from_secs(deadline_secs),
        )
    }

    #[tokio::test]
    async fn batched_accrual_settles_once_with_summed_amount() {
        let store = UptoSessionStore::new();
        store.set(sample_session("s1", 1_000_000, 1_000_000_000));
        for _ in 0..3 {
            store
                .accrue("s1", U256::from(100_000u64), UnixTimestamp::from_secs(0), 60)
                .unwrap();
        }

        let client = MockClient::new(true);
        settle_upto_session(&store, &client, "s1", "periodic", false, 60).await;

        let session = store.get("s1").unwrap();
        assert_eq!(session.settled_total, U256::from(300_000u64));
        assert_eq!(session.pending_spent, U256::ZERO);
        assert_eq!(session.status, SessionStatus::Open);
        assert_eq!(*client.last_amount.lock().unwrap(), Some("300000".to_string()));

        store
            .accrue("s1", U256::from(50_000u64), UnixTimestamp::from_secs(0), 60)
            .unwrap();
        settle_upto_session(&store, &client, "s1", "idle", true, 60).await;
        let session = store.get("s1").unwrap();
        assert_eq!(session.settled_total, U256::from(350_000u64));
        assert_eq!(session.status, SessionStatus::Closed);
    }

    #[tokio::test]
    async fn settlement_failure_preserves_pending_and_reopens() {
        let store = UptoSessionStore::new();
        store.set(sample_session("s1", 1_000_000, 1_000_000_000));
        store
            .accrue("s1", U256::from(200_000u64), UnixTimestamp::from_secs(0), 60)
            .unwrap();

        let client = MockClient::new(false);
        settle_upto_session(&store, &client, "s1", "periodic", false, 60).await;

        let session = store.get("s1").unwrap();
        assert_eq!(session.pending_spent, U256::from(200_000u64));
        assert_eq!(session.settled_total, U256::ZERO);
        assert_eq!(session.status, SessionStatus::Open);
        assert!(!session.last_settlement.unwrap().receipt.success);
    }

    #[tokio::test]
    async fn zero_pending_with_close_after_closes_without_calling_client() {
        let store = UptoSessionStore::new();
        store.set(sample_session("s1", 1_000_000, 1_000_000_000));

        let client = MockClient::new(true);
        settle_upto_session(&store, &client, "s1", "manual_close", true, 60).await;

        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.get("s1").unwrap().status, SessionStatus::Closed);
    }

    #[tokio::test]
    async fn non_open_session_is_a_silent_no_op() {
        let store = UptoSessionStore::new();
        store.set(sample_session("s1", 1_000_000, 1_000_000_000));
        store
            .transition("s1", SessionStatus::Open, SessionStatus::Closed)
            .unwrap();

        let client = MockClient::new(true);
        settle_upto_session(&store, &client, "s1", "periodic", false, 60).await;
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }
}
