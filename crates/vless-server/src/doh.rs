//! DNS-over-HTTPS forwarding.
//!
//! Queries on the configured path are relayed to the upstream resolver
//! verbatim: GET carries the `dns=` query string through, POST forwards the
//! binary message body.

use axum::body::Body;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tracing::warn;

const DNS_MESSAGE: &str = "application/dns-message";

pub async fn forward(
    http: &reqwest::Client,
    upstream: &str,
    method: &Method,
    query: Option<&str>,
    body: Bytes,
) -> Response {
    let request = if *method == Method::GET {
        let url = match query {
            Some(q) if !q.is_empty() => format!("{upstream}?{q}"),
            _ => upstream.to_string(),
        };
        http.get(url).header("accept", DNS_MESSAGE)
    } else if *method == Method::POST {
        http.post(upstream)
            .header("content-type", DNS_MESSAGE)
            .body(body)
    } else {
        return crate::ingress::not_found();
    };

    match request.send().await {
        Ok(reply) => {
            let status = StatusCode::from_u16(reply.status().as_u16())
                .unwrap_or(StatusCode::BAD_GATEWAY);
            match reply.bytes().await {
                Ok(bytes) => Response::builder()
                    .status(status)
                    .header("content-type", DNS_MESSAGE)
                    .body(Body::from(bytes))
                    .unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response()),
                Err(err) => {
                    warn!("doh upstream body failed: {err}");
                    StatusCode::BAD_GATEWAY.into_response()
                }
            }
        }
        Err(err) => {
            warn!("doh upstream request failed: {err}");
            StatusCode::BAD_GATEWAY.into_response()
        }
    }
}
