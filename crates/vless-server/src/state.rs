//! Server state shared across connections.

use std::time::Duration;

use vless_config::Settings;
use vless_core::io::RelayConfig;

use crate::error::ServerError;

/// Shared server state for all connections.
pub struct ServerState {
    pub settings: Settings,
    pub relay: RelayConfig,
    /// Outbound HTTP client for the DoH collaborator.
    pub http: reqwest::Client,
}

impl ServerState {
    pub fn new(settings: Settings) -> Result<Self, ServerError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            relay: settings.relay_config(),
            settings,
            http,
        })
    }
}
