//! xhttp transport: a streaming HTTP request/response pair as a duplex.
//!
//! The request body is the uplink; the downlink is an in-process byte queue
//! whose read side becomes the response body. The queue capacity is the
//! configured high-water mark, which is where xhttp backpressure comes from.

use std::io;

use axum::body::Body;
use axum::http::HeaderValue;
use axum::response::Response;
use bytes::Bytes;
use futures_util::{StreamExt, TryStreamExt, stream::BoxStream};
use tokio::io::{DuplexStream, duplex};
use tokio_util::io::{ReaderStream, StreamReader};

/// Uplink reader over the chunked request body.
pub type XhttpReader = StreamReader<BoxStream<'static, io::Result<Bytes>>, Bytes>;

/// Build the duplex for one xhttp request.
///
/// Returns the uplink reader, the downlink writer, and the body to hand
/// back as the 200 response. No abort token is produced; HTTP cancellation
/// arrives as body-stream errors.
pub fn split_body(body: Body, buffer_size: usize) -> (XhttpReader, DuplexStream, Body) {
    let uplink = body
        .into_data_stream()
        .map_err(io::Error::other)
        .boxed();
    let reader = StreamReader::new(uplink);

    let (writer, downlink) = duplex(buffer_size);
    let response_body = Body::from_stream(ReaderStream::new(downlink));
    (reader, writer, response_body)
}

/// The fixed xhttp response: 200 with anti-buffering headers and an
/// optional padding header.
pub fn response(body: Body, padding: Option<String>) -> Response {
    let mut resp = Response::new(body);
    let headers = resp.headers_mut();
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    headers.insert("cache-control", HeaderValue::from_static("no-store"));
    headers.insert("connection", HeaderValue::from_static("Keep-Alive"));
    headers.insert("content-type", HeaderValue::from_static("application/grpc"));
    headers.insert("user-agent", HeaderValue::from_static("Go-http-client/2.0"));
    if let Some(padding) = padding
        && let Ok(value) = HeaderValue::from_str(&padding)
    {
        headers.insert("x-padding", value);
    }
    resp
}
