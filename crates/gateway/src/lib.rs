//! Chat Gateway - path-routing API gateway with live response streaming
//!
//! The gateway sits between a browser (or terminal) client and two backend
//! services. It resolves each inbound path against a fixed route table,
//! rewrites the path for the chosen backend, forwards the bearer credential,
//! and relays the upstream body back chunk by chunk.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod proxy;
pub mod relay;
pub mod routes;
pub mod testing;

pub use error::{GatewayError, Result};
