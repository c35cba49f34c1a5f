//! vless-edge entry point.
//!
//! Settings come from the environment (see `vless-config`); the CLI only
//! overrides the bind address. SIGINT/SIGTERM trigger a graceful shutdown.

use std::future::Future;
use std::net::SocketAddr;

use chrono::{FixedOffset, Utc};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use vless_config::Settings;
use vless_server::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "vless-edge", version, about = "VLESS proxy edge node")]
struct Args {
    /// Bind address (overrides the LISTEN environment variable)
    #[arg(short, long)]
    listen: Option<SocketAddr>,
}

/// Log timestamps rendered in the configured fixed hour offset.
struct ZonedClock {
    offset: FixedOffset,
}

impl FormatTime for ZonedClock {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Utc::now().with_timezone(&self.offset);
        write!(w, "{}", now.format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

fn init_tracing(settings: &Settings) {
    let filter =
        EnvFilter::try_new(settings.log_filter()).unwrap_or_else(|_| EnvFilter::new("off"));
    let seconds = settings.time_zone.clamp(-23, 23) * 3600;
    let offset = FixedOffset::east_opt(seconds).expect("offset within a day");
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(ZonedClock { offset })
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let mut settings = Settings::from_env()?;
    if let Some(listen) = args.listen {
        settings.listen = listen;
    }
    init_tracing(&settings);

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(interrupt(), terminate(), shutdown.clone()));

    vless_server::run_with_shutdown(settings, shutdown).await?;
    Ok(())
}

/// Cancel `shutdown` as soon as either signal future resolves.
///
/// Cancelling the token stops the accept loop; in-flight relays drain
/// through the ingress's graceful shutdown rather than being torn down.
async fn cancel_on_signal<I, T>(interrupt: I, terminate: T, shutdown: CancellationToken)
where
    I: Future<Output = ()>,
    T: Future<Output = ()>,
{
    tokio::select! {
        _ = interrupt => info!("interrupt received, draining connections"),
        _ = terminate => info!("terminate received, draining connections"),
    }
    shutdown.cancel();
}

/// Resolves on Ctrl+C. If the handler cannot be installed the node keeps
/// running and only SIGTERM (or the supervisor) can stop it.
async fn interrupt() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("interrupt handler unavailable: {err}");
        std::future::pending::<()>().await;
    }
}

/// Resolves on SIGTERM; never resolves where SIGTERM does not exist.
#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            term.recv().await;
        }
        Err(err) => {
            warn!("terminate handler unavailable: {err}");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
