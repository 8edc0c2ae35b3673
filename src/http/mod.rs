//! Thin axum HTTP edge (spec.md §1, §6): the `/verify`, `/settle`,
//! `/supported` protocol endpoints plus `/api/upto-close` for explicit
//! session closure. Grounded in the teacher's `handlers.rs` route/handler
//! split; the full merchant-side route handling (charge metering, 402
//! response formatting for arbitrary resources) stays out of scope per
//! spec.md §1.

pub mod headers;

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::app::DispatcherFacilitatorClient;
use crate::dispatcher::FacilitatorDispatcher;
use crate::proto::{PaymentPayload, PaymentRequirements, SettleResponse, VerifyResponse};
use crate::scheme::upto_eip155::session_terms;
use crate::session::orchestrator::{settle_upto_session, DEFAULT_DEADLINE_BUFFER_SEC};
use crate::session::store::UptoSessionStore;
use crate::session::sweeper::SweeperHandle;
use crate::session::Session;
use crate::util::b64::decode_header;

use headers::{
    encode_header_or_log, PAYMENT_RESPONSE_HEADER, PAYMENT_SIGNATURE_HEADER, UPTO_SESSION_ID_HEADER,
};

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<FacilitatorDispatcher>,
    pub session_store: Arc<UptoSessionStore>,
    pub sweeper_handle: SweeperHandle,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(get_root))
        .route("/health", get(get_health))
        .route("/supported", get(get_supported))
        .route("/verify", post(post_verify))
        .route("/settle", post(post_settle))
        .route("/api/upto-close", post(post_upto_close))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOrSettleRequest {
    pub payment_payload: PaymentPayload,
    pub payment_requirements: PaymentRequirements,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UptoCloseRequest {
    pub session_id: String,
}

async fn get_root() -> impl IntoResponse {
    let pkg_name = env!("CARGO_PKG_NAME");
    (StatusCode::OK, format!("Hello from {pkg_name}!"))
}

async fn get_health(State(state): State<AppState>) -> impl IntoResponse {
    get_supported(State(state)).await
}

#[tracing::instrument(skip_all)]
async fn get_supported(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.dispatcher.get_supported())
}

/// Prefers the `PAYMENT-SIGNATURE` header's encoded `PaymentPayload` over
/// the JSON body's `paymentPayload` field (spec.md §6: the client retries
/// with the payload on that header) — a caller forwarding the client's
/// original request can pass the header straight through instead of
/// re-encoding a JSON body.
fn payment_payload_from_header(headers: &HeaderMap) -> Option<PaymentPayload> {
    let raw = headers.get(PAYMENT_SIGNATURE_HEADER)?.to_str().ok()?;
    match decode_header(raw) {
        Ok(payload) => Some(payload),
        Err(err) => {
            tracing::warn!(error = %err, "failed to decode PAYMENT-SIGNATURE header");
            None
        }
    }
}

/// Looks up the session named by an incoming `x-upto-session-id` header, or
/// mints a new one on the first successful "upto" verify (spec.md §3
/// "a session is created when the first upto payment succeeds
/// verification"). Returns `None` when the payload isn't a parseable upto
/// authorization and no existing session was named.
fn resolve_upto_session(
    store: &UptoSessionStore,
    existing_session_id: Option<&str>,
    payload: &PaymentPayload,
    requirements: &PaymentRequirements,
) -> Option<String> {
    if let Some(id) = existing_session_id {
        if store.get(id).is_some() {
            return Some(id.to_string());
        }
    }
    let (cap, deadline) = session_terms(payload, requirements)?;
    let id = crate::session::mint_session_id();
    store.set(Session::new(
        id.clone(),
        payload.clone(),
        requirements.clone(),
        cap,
        deadline,
    ));
    Some(id)
}

fn insert_session_id_header(response: &mut Response, session_id: &str) {
    let Ok(name) = axum::http::HeaderName::from_bytes(UPTO_SESSION_ID_HEADER.as_bytes()) else {
        return;
    };
    match axum::http::HeaderValue::from_str(session_id) {
        Ok(value) => {
            response.headers_mut().insert(name, value);
        }
        Err(err) => tracing::warn!(error = %err, "session id not representable as a header value"),
    }
}

#[tracing::instrument(skip_all)]
async fn post_verify(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<VerifyOrSettleRequest>,
) -> Response {
    let payment_payload = payment_payload_from_header(&headers).unwrap_or(body.payment_payload);
    let response: VerifyResponse = state
        .dispatcher
        .verify(&payment_payload, &body.payment_requirements)
        .await;

    let mut http_response = (StatusCode::OK, Json(response.clone())).into_response();
    if response.is_valid && body.payment_requirements.scheme == "upto" {
        let existing_session_id = headers
            .get(UPTO_SESSION_ID_HEADER)
            .and_then(|value| value.to_str().ok());
        if let Some(session_id) = resolve_upto_session(
            &state.session_store,
            existing_session_id,
            &payment_payload,
            &body.payment_requirements,
        ) {
            insert_session_id_header(&mut http_response, &session_id);
        }
    }
    http_response
}

#[tracing::instrument(skip_all)]
async fn post_settle(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<VerifyOrSettleRequest>,
) -> impl IntoResponse {
    let payment_payload = payment_payload_from_header(&headers).unwrap_or(body.payment_payload);
    let response: SettleResponse = state
        .dispatcher
        .settle(&payment_payload, &body.payment_requirements)
        .await;
    (StatusCode::OK, Json(response))
}

/// `POST /api/upto-close`: triggers an immediate, out-of-band settlement
/// and closure of one session (spec.md §6). The response carries the
/// final receipt on the `PAYMENT-RESPONSE` header.
#[tracing::instrument(skip_all)]
async fn post_upto_close(
    State(state): State<AppState>,
    Json(body): Json<UptoCloseRequest>,
) -> Response {
    let client = DispatcherFacilitatorClient::new(state.dispatcher.clone());
    settle_upto_session(
        &state.session_store,
        &client,
        &body.session_id,
        "manual_close",
        true,
        DEFAULT_DEADLINE_BUFFER_SEC,
    )
    .await;
    state.sweeper_handle.trigger_idle();

    let receipt = state
        .session_store
        .get(&body.session_id)
        .and_then(|session| session.last_settlement)
        .map(|last| last.receipt);

    let mut response = (StatusCode::OK, Json(receipt.clone())).into_response();
    if let Some(receipt) = receipt {
        encode_header_or_log(&mut response, PAYMENT_RESPONSE_HEADER, &receipt);
    }
    response
}
