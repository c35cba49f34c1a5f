//! Request routing: WebSocket upgrade, xhttp streaming POST, DoH, and the
//! plain info endpoints.
//!
//! Feature paths are configured at runtime, so routing is a single fallback
//! dispatcher doing normalized suffix matches rather than a static route
//! table.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::ws::WebSocket;
use axum::extract::{ConnectInfo, FromRequestParts, Request, State, WebSocketUpgrade};
use axum::http::{HeaderMap, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use tracing::{debug, error};
use uuid::Uuid;

use crate::handler;
use crate::state::ServerState;
use crate::transport::ws::WsIo;
use crate::transport::xhttp;
use crate::web;

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new().fallback(dispatch).with_state(state)
}

/// The catch-all response. The deployed clients expect the literal words
/// `Bad Request` with status 404; hyper owns the status line, so the phrase
/// travels in the body.
pub(crate) fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Bad Request").into_response()
}

async fn dispatch(
    State(state): State<Arc<ServerState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    req: Request,
) -> Response {
    let Some(uuid) = state.settings.uuid else {
        return (StatusCode::OK, web::help_page()).into_response();
    };

    let path = normalize_request_path(req.uri().path());
    let settings = &state.settings;

    if is_websocket_upgrade(req.headers()) && path_matches(&path, &settings.ws_path) {
        return upgrade_ws(state.clone(), req, uuid).await;
    }
    if req.method() == Method::POST && path_matches(&path, &settings.xhttp_path) {
        return serve_xhttp(state.clone(), req, uuid).await;
    }
    if path_matches(&path, &settings.doh_query_path) {
        return serve_doh(&state, req).await;
    }
    if req.method() == Method::GET {
        if path_matches(&path, &settings.ip_query_path) {
            return web::client_ip_response(peer, req.headers());
        }
        if query_has_uuid(req.uri().query(), &uuid)
            && (path_matches(&path, &settings.ws_path)
                || path_matches(&path, &settings.xhttp_path))
        {
            let host = host_header(req.headers());
            return (StatusCode::OK, web::config_page(settings, &uuid, &host)).into_response();
        }
    }
    debug!(peer = %peer, path = %path, method = %req.method(), "unroutable request");
    not_found()
}

async fn upgrade_ws(state: Arc<ServerState>, req: Request, uuid: Uuid) -> Response {
    let (mut parts, _body) = req.into_parts();
    let upgrade = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
        Ok(upgrade) => upgrade,
        Err(rejection) => return rejection.into_response(),
    };
    upgrade
        .on_upgrade(move |socket| handle_ws(state, socket, uuid))
        .into_response()
}

async fn handle_ws(state: Arc<ServerState>, socket: WebSocket, uuid: Uuid) {
    let io = WsIo::new(socket);
    let signal = io.abort_token();
    let (reader, writer) = tokio::io::split(io);
    match handler::establish(reader, &uuid, &state.settings.proxy).await {
        Ok(established) => {
            handler::run_relay(established, writer, Some(signal), state.relay).await;
        }
        // the 101 is already on the wire; dropping both halves closes the socket
        Err(err) => error!("websocket client setup failed: {err}"),
    }
}

async fn serve_xhttp(state: Arc<ServerState>, req: Request, uuid: Uuid) -> Response {
    let body = req.into_body();
    let (reader, writer, response_body) =
        xhttp::split_body(body, state.settings.stream_buffer());

    match handler::establish(reader, &uuid, &state.settings.proxy).await {
        Ok(established) => {
            let relay_cfg = state.relay;
            tokio::spawn(async move {
                handler::run_relay(established, writer, None, relay_cfg).await;
            });
            xhttp::response(
                response_body,
                web::random_padding(&state.settings.xpadding_range),
            )
        }
        Err(err) => {
            error!("xhttp client setup failed: {err}");
            not_found()
        }
    }
}

async fn serve_doh(state: &ServerState, req: Request) -> Response {
    let method = req.method().clone();
    let query = req.uri().query().map(str::to_owned);
    let body = match axum::body::to_bytes(req.into_body(), 64 * 1024).await {
        Ok(bytes) => bytes,
        Err(_) => return not_found(),
    };
    crate::doh::forward(
        &state.http,
        &state.settings.upstream_doh,
        &method,
        query.as_deref(),
        body,
    )
    .await
}

fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}

/// Request paths are matched with a trailing slash so `/tunnel` and
/// `/tunnel/` land in the same place.
fn normalize_request_path(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{path}/")
    }
}

/// Feature paths match as suffixes, letting deployments prefix them freely.
fn path_matches(request_path: &str, feature_path: &str) -> bool {
    !feature_path.is_empty() && request_path.ends_with(feature_path)
}

fn query_has_uuid(query: Option<&str>, uuid: &Uuid) -> bool {
    let expected = uuid.to_string();
    query
        .unwrap_or_default()
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .any(|(key, value)| key == "uuid" && value.eq_ignore_ascii_case(&expected))
}

fn host_header(headers: &HeaderMap) -> String {
    headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("example.com")
        .to_string()
}
