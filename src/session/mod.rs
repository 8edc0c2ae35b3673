//! The upto session engine (spec.md §3 "Session", §4.4-§4.6): tracks
//! per-session accrued spend against a capped permit, enforces the cap and
//! deadline invariants, and coalesces metered charges into batched
//! on-chain settlements.

pub mod orchestrator;
pub mod store;
pub mod sweeper;

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::proto::{PaymentPayload, PaymentRequirements, SettleResponse};
use crate::timestamp::UnixTimestamp;

/// Opaque session identifier, merchant-chosen or facilitator-minted.
pub type SessionId = String;

/// Mints a facilitator-side session id for a merchant that did not supply
/// one of its own (spec.md §3 "id: opaque merchant-chosen or
/// facilitator-minted identifier"). 16 CSPRNG bytes, hex-encoded, following
/// the teacher's `rand::fill`-over-`ThreadRng` idiom for nonce generation.
pub fn mint_session_id() -> SessionId {
    let mut bytes = [0u8; 16];
    rand::fill(&mut bytes);
    hex::encode(bytes)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Open,
    Settling,
    Closed,
}

/// Record of the most recent settlement attempt on a session.
#[derive(Debug, Clone)]
pub struct LastSettlement {
    pub at: UnixTimestamp,
    pub reason: String,
    pub receipt: SettleResponse,
}

/// A capped, metered "upto" session (spec.md §3). Mutated only through
/// [`store::UptoSessionStore`]'s atomic operations — never constructed as a
/// loose mutable value passed between components.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub payment_payload: PaymentPayload,
    pub payment_requirements: PaymentRequirements,
    pub cap: U256,
    pub deadline: UnixTimestamp,
    pub settled_total: U256,
    pub pending_spent: U256,
    pub status: SessionStatus,
    pub last_settlement: Option<LastSettlement>,
}

impl Session {
    pub fn new(
        id: SessionId,
        payment_payload: PaymentPayload,
        payment_requirements: PaymentRequirements,
        cap: U256,
        deadline: UnixTimestamp,
    ) -> Self {
        Self {
            id,
            payment_payload,
            payment_requirements,
            cap,
            deadline,
            settled_total: U256::ZERO,
            pending_spent: U256::ZERO,
            status: SessionStatus::Open,
            last_settlement: None,
        }
    }

    /// `settledTotal + pendingSpent <= cap` (spec.md §3 invariant).
    pub fn is_within_cap(&self) -> bool {
        self.settled_total.saturating_add(self.pending_spent) <= self.cap
    }
}

/// Reasons an `accrue` call can be rejected (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AccrueError {
    #[error("session not found")]
    NotFound,
    #[error("session is not open")]
    NotOpen,
    #[error("accrual would exceed cap")]
    CapExceeded,
    #[error("session deadline is within the buffer window")]
    DeadlineTooClose,
}

/// Reasons a `transition` CAS can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("session not found")]
    NotFound,
    #[error("session was not in the expected status")]
    UnexpectedStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mint_session_id_produces_distinct_hex_ids() {
        let a = mint_session_id();
        let b = mint_session_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
