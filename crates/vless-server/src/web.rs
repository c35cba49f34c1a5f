//! Plain web endpoints: help page, client config template, IP info.

use std::net::SocketAddr;

use axum::http::HeaderMap;
use axum::response::{IntoResponse, Json, Response};
use rand::Rng;
use uuid::Uuid;
use vless_config::{Settings, parse_padding_range};

/// A string of ASCII `'0'` whose length is drawn uniformly from an
/// `"a-b"` range. Malformed ranges and `"0"` disable padding.
pub fn random_padding(range: &str) -> Option<String> {
    let (lo, hi) = parse_padding_range(range)?;
    let len = rand::rng().random_range(lo..=hi);
    Some("0".repeat(len))
}

/// A random path segment of lowercase base-36 characters.
pub fn random_path(len: usize) -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..len)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Setup instructions served while no UUID is configured.
pub fn help_page() -> String {
    let example_uuid = Uuid::new_v4();
    format!(
        "This node is not configured yet.\n\
         \n\
         Set a UUID to enable proxying, for example:\n\
         \n\
         UUID={example_uuid}\n\
         WS_PATH=/{}/\n\
         XHTTP_PATH=/{}/\n\
         DOH_QUERY_PATH=/{}/\n\
         IP_QUERY_PATH=/{}/\n\
         \n\
         Leave a path empty to disable that feature.\n",
        random_path(8),
        random_path(8),
        random_path(8),
        random_path(8),
    )
}

/// Client-facing config for the enabled transports, rendered for the host
/// the request arrived on.
pub fn config_page(settings: &Settings, uuid: &Uuid, host: &str) -> String {
    let mut out = String::new();
    if !settings.ws_path.is_empty() {
        out.push_str(&format!(
            "vless://{uuid}@{host}:443?encryption=none&security=tls&sni={host}&fp=randomized&type=ws&host={host}&path={}#{host}-ws\n",
            settings.ws_path
        ));
    }
    if !settings.xhttp_path.is_empty() {
        out.push_str(&format!(
            "vless://{uuid}@{host}:443?encryption=none&security=tls&sni={host}&fp=randomized&type=xhttp&host={host}&path={}&mode=stream-one#{host}-xhttp\n",
            settings.xhttp_path
        ));
    }
    if out.is_empty() {
        out.push_str("no transport paths configured\n");
    }
    out
}

/// JSON view of the caller: peer address plus the usual forwarding headers.
pub fn client_ip_response(peer: SocketAddr, headers: &HeaderMap) -> Response {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    };
    let peer_ip = peer.ip().to_string();
    let ip = header("x-forwarded-for")
        .split(',')
        .next()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(&peer_ip);
    Json(serde_json::json!({
        "ip": ip,
        "peer": peer.to_string(),
        "user_agent": header("user-agent"),
        "host": header("host"),
    }))
    .into_response()
}
