//! VLESS edge server.
//!
//! This crate wires the transports, the relay engine, and the outbound
//! dialer behind a single HTTP ingress. It is exposed as a library for the
//! binary and the integration tests.

pub mod doh;
mod error;
mod handler;
pub mod ingress;
mod outbound;
mod server;
mod state;
mod transport;
pub mod web;

pub use error::ServerError;
pub use server::{run_with_shutdown, serve};
pub use state::ServerState;
pub use vless_core::CancellationToken;
