//! Default configuration values.
//!
//! Centralized default constants for use across all crates.

use std::time::Duration;

/// Timeout for a single outbound TCP connect attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_millis(8000);

/// How often the abort watcher polls the client signal.
pub const ABORT_POLL: Duration = Duration::from_millis(3000);
/// Grace period between observing an abort and forcing the remote closed,
/// allowing in-flight bytes to drain.
pub const ABORT_GRACE: Duration = Duration::from_millis(3000);

/// Default high-water mark for transport byte queues, in KiB.
pub const DEFAULT_BUFFER_KIB: usize = 128;
/// Stand-in queue capacity when `BUFFER_SIZE=0` asks for the runtime
/// default (effectively unbounded).
pub const UNBOUNDED_STREAM_BUFFER: usize = 4 << 20;

/// Default bytes per yield slice, in KiB.
pub const DEFAULT_YIELD_KIB: usize = 2048;
/// Default delay between yield slices, in milliseconds.
pub const DEFAULT_YIELD_DELAY_MS: u64 = 0;

/// Read chunk size used by the yield pump.
pub const COPY_CHUNK: usize = 16 * 1024;

pub const KIB: usize = 1024;

/// Default padding-length range for xhttp responses.
pub const DEFAULT_XPADDING_RANGE: &str = "100-1000";
/// Default upstream DNS-over-HTTPS resolver.
pub const DEFAULT_UPSTREAM_DOH: &str = "https://dns.google/dns-query";
/// Default log filter. `none` keeps the node silent.
pub const DEFAULT_LOG_LEVEL: &str = "none";
/// Default bind address.
pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";
