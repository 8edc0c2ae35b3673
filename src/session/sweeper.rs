//! `UptoSweeper` (spec.md §4.6): a background task that periodically, and
//! on idle-triggered wakeups, invokes the settlement orchestrator across
//! every open session.
//!
//! Modeled on the teacher's `SigDown` use of
//! `tokio_util::sync::CancellationToken` for coordinated shutdown
//! (`src/sig_down.rs`); the periodic cadence itself uses
//! `tokio::time::interval` and idle wakeups arrive over an `mpsc` channel
//! fed by the HTTP layer after a metered charge is recorded.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::timestamp::UnixTimestamp;

use super::orchestrator::{settle_upto_session, FacilitatorClient};
use super::store::UptoSessionStore;
use super::SessionStatus;

/// Reason a sweep pass was triggered, carried through to
/// `lastSettlement.reason` on every session it touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepTrigger {
    Periodic,
    Idle,
    ManualClose,
}

impl SweepTrigger {
    fn reason(self) -> &'static str {
        match self {
            SweepTrigger::Periodic => "periodic",
            SweepTrigger::Idle => "idle",
            SweepTrigger::ManualClose => "manual_close",
        }
    }
}

/// Handle used by other components (e.g. the HTTP layer, after recording a
/// metered charge) to request an out-of-band sweep.
#[derive(Clone)]
pub struct SweeperHandle {
    idle_tx: mpsc::Sender<()>,
}

impl SweeperHandle {
    /// Requests an idle-triggered sweep pass. Non-blocking: if the
    /// sweeper's queue is full, the request is dropped — another pass is
    /// already pending.
    pub fn trigger_idle(&self) {
        let _ = self.idle_tx.try_send(());
    }
}

/// Runs the sweep loop until `cancellation_token` fires. Call
/// [`UptoSessionStore::recover_settling`] once at startup before spawning
/// this loop (spec.md §5, §9 crash-recovery open question).
pub struct UptoSweeper<C: FacilitatorClient> {
    store: Arc<UptoSessionStore>,
    client: Arc<C>,
    period: Duration,
    deadline_buffer_sec: u64,
    idle_rx: mpsc::Receiver<()>,
}

impl<C: FacilitatorClient + 'static> UptoSweeper<C> {
    pub fn new(
        store: Arc<UptoSessionStore>,
        client: Arc<C>,
        period: Duration,
        deadline_buffer_sec: u64,
    ) -> (Self, SweeperHandle) {
        let (idle_tx, idle_rx) = mpsc::channel(1);
        (
            Self {
                store,
                client,
                period,
                deadline_buffer_sec,
                idle_rx,
            },
            SweeperHandle { idle_tx },
        )
    }

    /// Runs until `cancellation_token` is cancelled, sweeping on every
    /// timer tick and every idle trigger.
    pub async fn run(mut self, cancellation_token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.period);
        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    tracing::info!("sweeper shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    self.sweep_once(SweepTrigger::Periodic).await;
                }
                Some(()) = self.idle_rx.recv() => {
                    self.sweep_once(SweepTrigger::Idle).await;
                }
            }
        }
    }

    /// Sweeps every session once, closing any whose deadline is within the
    /// buffer window and settling any with non-zero pending spend.
    pub async fn sweep_once(&self, trigger: SweepTrigger) {
        let now = UnixTimestamp::now();
        for session in self.store.iterate() {
            if session.status != SessionStatus::Open {
                continue;
            }
            let deadline_approaching =
                session.deadline.as_secs() <= now.as_secs().saturating_add(self.deadline_buffer_sec);
            let reason = if deadline_approaching {
                "deadline_approaching"
            } else {
                trigger.reason()
            };
            settle_upto_session(
                &self.store,
                self.client.as_ref(),
                &session.id,
                reason,
                deadline_approaching,
                self.deadline_buffer_sec,
            )
            .await;
        }
    }

    /// Performs an immediate, out-of-band sweep of a single session
    /// (`POST /api/upto-close`), always with `closeAfter=true`.
    pub async fn close_now(&self, session_id: &str) {
        settle_upto_session(
            &self.store,
            self.client.as_ref(),
            session_id,
            SweepTrigger::ManualClose.reason(),
            true,
            self.deadline_buffer_sec,
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{PaymentPayload, PaymentRequirements, SettleResponse};
    use crate::session::Session;
    use alloy_primitives::U256;
    use async_trait::async_trait;

    struct MockClient;

    #[async_trait]
    impl FacilitatorClient for MockClient {
        async fn settle(
            &self,
            _payload: &PaymentPayload,
            requirements: &PaymentRequirements,
        ) -> SettleResponse {
            SettleResponse::success("0xtx", requirements.network.to_string(), "0xpayer")
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
    async fn sweep_once_closes_sessions_past_deadline_buffer() {
        let store = Arc::new(UptoSessionStore::new());
        let now = UnixTimestamp::now();
        store.set(sample_session("s1", 1_000_000, now.as_secs() + 10));
        let _ = store.accrue("s1", U256::from(1u64), now, 0);

        let (sweeper, _handle) = UptoSweeper::new(
            store.clone(),
            Arc::new(MockClient),
            Duration::from_secs(3600),
            60,
        );
        sweeper.sweep_once(SweepTrigger::Periodic).await;

        assert_eq!(store.get("s1").unwrap().status, SessionStatus::Closed);
    }

    #[tokio::test]
    async fn close_now_settles_and_closes_regardless_of_deadline() {
        let store = Arc::new(UptoSessionStore::new());
        let now = UnixTimestamp::now();
        store.set(sample_session("s1", 1_000_000, now.as_secs() + 1_000_000));
        store.accrue("s1", U256::from(500u64), now, 0).unwrap();

        let (sweeper, _handle) = UptoSweeper::new(
            store.clone(),
            Arc::new(MockClient),
            Duration::from_secs(3600),
            60,
        );
        sweeper.close_now("s1").await;

        let session = store.get("s1").unwrap();
        assert_eq!(session.status, SessionStatus::Closed);
        assert_eq!(session.settled_total, U256::from(500u64));
    }
}
