//! Structured logging initialization, following the teacher's
//! `telemetry.rs`. OpenTelemetry/OTLP export is not carried — this crate
//! has no externally-observed metrics surface in scope (see DESIGN.md).

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Installs a `tracing` subscriber reading its filter from `RUST_LOG`,
/// defaulting to `info` for this crate and `warn` elsewhere.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,x402_upto_facilitator=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
