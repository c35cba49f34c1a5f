//! Core relay machinery shared across the edge node.
//!
//! This crate provides:
//! - The bidirectional relay engine with its two pump strategies
//! - Buffered-read helpers driving the incremental header parser
//! - The abort watcher that reclaims remote sockets after a client abort
//! - Default configuration constants

pub mod defaults;
pub mod io;
pub mod watch;

// Re-export the abort token type so downstream crates agree on it.
pub use tokio_util::sync::CancellationToken;

/// Project name.
pub const PROJECT_NAME: &str = "vless-edge";
/// Project version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
