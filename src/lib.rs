//! x402 payment facilitator core: the facilitator dispatcher (spec.md
//! §4.1) and the "upto" capped-session settlement engine (spec.md §4.4-
//! §4.6), plus the upto-EVM scheme handler (spec.md §4.3) that defines the
//! protocol contract the session engine settles against.
//!
//! # Modules
//!
//! - [`proto`] — wire types: payment requirements/payloads, verify/settle/
//!   supported responses, error tags.
//! - [`network`] — CAIP-2 network identifiers and `family:*` patterns.
//! - [`amount`] — decimal-string monetary amounts, saturating on parse.
//! - [`timestamp`] — unix timestamp helpers for deadlines.
//! - [`handler`] — the [`handler::SchemeHandler`] plugin contract.
//! - [`dispatcher`] — the registry + six-slot hook pipeline routing verify/
//!   settle/supported calls to scheme handlers.
//! - [`session`] — the upto session store, settlement orchestrator, and
//!   sweeper.
//! - [`scheme`] — concrete [`handler::SchemeHandler`] implementations
//!   (currently the EIP-2612 permit-based upto-EVM handler).
//! - [`signer`] — the [`signer::SignerPort`] chain-signer abstraction
//!   (interface only; no concrete chain client is in scope).
//! - [`app`] — wires the dispatcher and the session engine together behind
//!   the orchestrator's `FacilitatorClient` seam.
//! - [`http`] — the thin axum HTTP edge (`/verify`, `/settle`, `/supported`,
//!   `/api/upto-close`) plus the `PAYMENT-*` header codec.
//! - [`config`] — CLI/env/JSON-file facilitator configuration.
//! - [`telemetry`] — `tracing` subscriber initialization.
//! - [`util`] — base64 header codec and graceful shutdown coordination.

pub mod amount;
pub mod app;
pub mod config;
pub mod dispatcher;
pub mod handler;
pub mod http;
pub mod network;
pub mod proto;
pub mod scheme;
pub mod session;
pub mod signer;
pub mod telemetry;
pub mod timestamp;
pub mod util;
