//! Settings for the edge node, sourced from process environment variables.
//!
//! Every key is optional; unset keys take the defaults from
//! `vless_core::defaults`. The loader is a pure function over a key-lookup
//! closure so tests never touch process-global state.

use std::net::SocketAddr;
use std::time::Duration;

use tracing::debug;
use uuid::Uuid;
use vless_core::defaults;
use vless_core::io::{RelayConfig, Scheduler};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),
    #[error("invalid listen address '{0}'")]
    InvalidListen(String),
}

/// Runtime settings, one field per environment key.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Shared identity. `None` disables proxying; the ingress serves a help
    /// page instead.
    pub uuid: Option<Uuid>,
    /// Raw fallback relay list; split on whitespace/comma at dial time.
    pub proxy: String,
    pub ws_path: String,
    pub xhttp_path: String,
    pub doh_query_path: String,
    pub ip_query_path: String,
    /// High-water mark for transport byte queues, in bytes. Zero selects the
    /// runtime default (effectively unbounded).
    pub buffer_size: usize,
    /// Raw `"min-max"` padding range for xhttp responses.
    pub xpadding_range: String,
    pub scheduler: Scheduler,
    /// Bytes per yield slice.
    pub yield_size: usize,
    pub yield_delay: Duration,
    pub upstream_doh: String,
    pub log_level: String,
    /// Hour offset applied to log timestamps.
    pub time_zone: i32,
    pub listen: SocketAddr,
}

impl Settings {
    /// Load settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings from an arbitrary key-lookup function.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let uuid = match lookup("UUID").filter(|v| !v.trim().is_empty()) {
            Some(raw) => Some(Uuid::parse_str(raw.trim())?),
            None => None,
        };

        let listen_raw = lookup("LISTEN").unwrap_or_else(|| defaults::DEFAULT_LISTEN.to_string());
        let listen = listen_raw
            .parse()
            .map_err(|_| ConfigError::InvalidListen(listen_raw))?;

        let settings = Self {
            uuid,
            proxy: lookup("PROXY").unwrap_or_default(),
            ws_path: normalize_path(&lookup("WS_PATH").unwrap_or_default()),
            xhttp_path: normalize_path(&lookup("XHTTP_PATH").unwrap_or_default()),
            doh_query_path: normalize_path(&lookup("DOH_QUERY_PATH").unwrap_or_default()),
            ip_query_path: normalize_path(&lookup("IP_QUERY_PATH").unwrap_or_default()),
            buffer_size: parse_or(&lookup("BUFFER_SIZE"), defaults::DEFAULT_BUFFER_KIB)
                * defaults::KIB,
            xpadding_range: lookup("XPADDING_RANGE")
                .unwrap_or_else(|| defaults::DEFAULT_XPADDING_RANGE.to_string()),
            scheduler: lookup("RELAY_SCHEDULER")
                .unwrap_or_default()
                .parse()
                .unwrap_or_default(),
            yield_size: parse_or(&lookup("YIELD_SIZE"), defaults::DEFAULT_YIELD_KIB)
                .max(1)
                * defaults::KIB,
            yield_delay: Duration::from_millis(parse_or(
                &lookup("YIELD_DELAY"),
                defaults::DEFAULT_YIELD_DELAY_MS,
            )),
            upstream_doh: lookup("UPSTREAM_DOH")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| defaults::DEFAULT_UPSTREAM_DOH.to_string()),
            log_level: lookup("LOG_LEVEL")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| defaults::DEFAULT_LOG_LEVEL.to_string()),
            time_zone: parse_or(&lookup("TIME_ZONE"), 0),
            listen,
        };
        debug!(scheduler = ?settings.scheduler, buffer_size = settings.buffer_size, "settings loaded");
        Ok(settings)
    }

    /// Relay tuning derived from the scheduler settings.
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            scheduler: self.scheduler,
            yield_size: self.yield_size,
            yield_delay: self.yield_delay,
        }
    }

    /// Queue capacity for transport buffers, resolving the `0 = unbounded`
    /// convention to the stand-in default.
    pub fn stream_buffer(&self) -> usize {
        if self.buffer_size == 0 {
            defaults::UNBOUNDED_STREAM_BUFFER
        } else {
            self.buffer_size
        }
    }

    /// The tracing filter directive for `LOG_LEVEL`; `none` silences output.
    pub fn log_filter(&self) -> &str {
        if self.log_level.eq_ignore_ascii_case("none") {
            "off"
        } else {
            &self.log_level
        }
    }
}

/// Normalize a feature path: empty disables, anything else gains a leading
/// and trailing `/`.
pub fn normalize_path(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let mut path = String::with_capacity(trimmed.len() + 2);
    if !trimmed.starts_with('/') {
        path.push('/');
    }
    path.push_str(trimmed);
    if !path.ends_with('/') {
        path.push('/');
    }
    path
}

/// Parse an `"a-b"` decimal range with `1 <= a <= b`.
///
/// Malformed input and the literal `"0"` disable padding.
pub fn parse_padding_range(raw: &str) -> Option<(usize, usize)> {
    let (lo, hi) = raw.trim().split_once('-')?;
    let lo: usize = lo.trim().parse().ok()?;
    let hi: usize = hi.trim().parse().ok()?;
    if lo == 0 || lo > hi {
        return None;
    }
    Some((lo, hi))
}

fn parse_or<T: std::str::FromStr + Copy>(raw: &Option<String>, default: T) -> T {
    raw.as_deref()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
