//! Best-effort reclamation of the remote socket after a client abort.
//!
//! Pumps observing the abort token normally unwind on their own. The watcher
//! covers the pathological case where the downloader is stuck reading from a
//! half-open remote: it polls the client signal, waits a grace period so
//! in-flight bytes can drain, then cancels the remote guard the downloader
//! pump is selecting on.

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Poll `signal` every `poll` interval; once it has fired, wait `grace` and
/// then cancel `remote_guard`. The caller aborts this task when the relay
/// settles on its own.
pub async fn watch_abort(
    signal: CancellationToken,
    remote_guard: CancellationToken,
    poll: Duration,
    grace: Duration,
) {
    let mut ticker = tokio::time::interval(poll);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if signal.is_cancelled() {
            break;
        }
    }
    tokio::time::sleep(grace).await;
    debug!("abort grace elapsed, forcing remote closed");
    remote_guard.cancel();
}
