//! x402 upto-facilitator HTTP entrypoint.
//!
//! Launches an axum server exposing `/verify`, `/settle`, `/supported` and
//! `/api/upto-close`, backed by the [`x402_upto_facilitator::dispatcher::FacilitatorDispatcher`]
//! and the upto session engine's background sweeper. Grounded in the
//! teacher's `run.rs` (`.env` loading, `Config::load`, `SigDown`-driven
//! graceful shutdown), trimmed to this crate's single `upto` scheme and
//! flat network registration list (spec.md §1 Non-goals: no concrete
//! per-chain RPC client).

use std::net::SocketAddr;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;
use dotenvy::dotenv;
use tower_http::cors;

use x402_upto_facilitator::app::DispatcherFacilitatorClient;
use x402_upto_facilitator::config::Config;
use x402_upto_facilitator::dispatcher::FacilitatorDispatcher;
use x402_upto_facilitator::http::{routes, AppState};
use x402_upto_facilitator::scheme::upto_eip155::UptoEip155Handler;
use x402_upto_facilitator::session::store::UptoSessionStore;
use x402_upto_facilitator::session::sweeper::UptoSweeper;
use x402_upto_facilitator::signer::{NullSigner, SignerPort};
use x402_upto_facilitator::util::ShutdownSignal;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    x402_upto_facilitator::telemetry::init();

    let config = Config::load()?;

    // No concrete chain signer is in scope (spec.md §1 Non-goal); every
    // registered handler shares the placeholder `NullSigner` until an
    // operator plugs in a real `SignerPort` binding. Verification still
    // works end-to-end via local EIP-712 signature recovery; settlement
    // fails with a tagged reason until a real signer is wired in.
    let signer: Arc<dyn SignerPort> = Arc::new(NullSigner);

    let mut dispatcher = FacilitatorDispatcher::new();
    for registered in config.networks() {
        if registered.scheme != "upto" {
            tracing::warn!(
                scheme = %registered.scheme,
                network = %registered.network,
                "skipping registration: only the 'upto' scheme is implemented"
            );
            continue;
        }
        dispatcher.register(
            registered.network.clone(),
            Arc::new(UptoEip155Handler::new(signer.clone()).await),
        );
    }
    let dispatcher = Arc::new(dispatcher);

    let session_store = Arc::new(UptoSessionStore::new());
    session_store.recover_settling();

    let facilitator_client = Arc::new(DispatcherFacilitatorClient::new(dispatcher.clone()));
    let session_engine_config = config.session_engine();
    let (sweeper, sweeper_handle) = UptoSweeper::new(
        session_store.clone(),
        facilitator_client,
        Duration::from_secs(session_engine_config.sweep_interval_secs),
        session_engine_config.deadline_buffer_secs,
    );

    let shutdown = ShutdownSignal::try_new()?;
    let sweeper_cancellation = shutdown.cancellation_token();
    let sweeper_task = tokio::spawn(sweeper.run(sweeper_cancellation));

    let app_state = AppState {
        dispatcher,
        session_store,
        sweeper_handle,
    };
    let app = routes(app_state).layer(
        cors::CorsLayer::new()
            .allow_origin(cors::Any)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(cors::Any),
    );

    let addr = SocketAddr::new(config.host(), config.port());
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .inspect_err(|e| tracing::error!("failed to bind to {addr}: {e}"))?;
    tracing::info!("listening on http://{addr}");

    let axum_cancellation = shutdown.cancellation_token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { axum_cancellation.cancelled().await })
        .await?;

    sweeper_task.await.ok();
    Ok(())
}
