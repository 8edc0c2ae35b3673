//! Concrete [`crate::handler::SchemeHandler`] implementations.

pub mod upto_eip155;
