//! I/O primitives: buffered header reads and the relay engine.

mod read;
mod relay;

pub use read::{ReadError, read_at_least};
pub use relay::{RelayConfig, RelayError, RelaySetup, RelayStats, Scheduler, pump, relay};
