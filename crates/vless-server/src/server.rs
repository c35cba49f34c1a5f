//! Listener setup and serving loop.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use vless_config::Settings;

use crate::error::ServerError;
use crate::ingress;
use crate::state::ServerState;

/// Serve the ingress on an existing listener until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    state: Arc<ServerState>,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    let app = ingress::router(state).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}

/// Run the server with a cancellation token for graceful shutdown.
///
/// Binds the address from `settings.listen`. The host runtime fronts this
/// node, so there is no socket-level tuning beyond what tokio defaults to.
pub async fn run_with_shutdown(
    settings: Settings,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    let addr = settings.listen;
    let state = Arc::new(ServerState::new(settings)?);
    let listener = TcpListener::bind(addr).await?;
    info!(address = %addr, "listening");
    serve(listener, state, shutdown).await
}
