//! Shared utilities: base64 header codec and graceful shutdown.

pub mod b64;
pub mod shutdown;

pub use b64::*;
pub use shutdown::*;
