//! WebSocket stream adapter.
//!
//! `WsIo` wraps an upgraded WebSocket and exposes it as `AsyncRead +
//! AsyncWrite` over binary frames, so the relay engine stays polymorphic
//! over transports. Close frames and transport errors fire the connection's
//! abort token in addition to surfacing as EOF/errors, which is how the
//! abort watcher learns the client went away.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::{Sink, Stream};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// WebSocket adapter exposing AsyncRead/AsyncWrite over binary frames.
///
/// - Binary and text frames become a continuous byte stream
/// - Ping frames are answered with Pong inline
/// - Close frames and stream end are EOF and fire the abort token
/// - `poll_shutdown` sends the close frame; repeated shutdowns are no-ops,
///   and because only the downlink pump ever shuts the writer down, the
///   socket is not torn down while the uplink is still draining
pub struct WsIo {
    ws: WebSocket,
    read_buf: Bytes,
    abort: CancellationToken,
    closed: bool,
}

impl WsIo {
    pub fn new(ws: WebSocket) -> Self {
        Self {
            ws,
            read_buf: Bytes::new(),
            abort: CancellationToken::new(),
            closed: false,
        }
    }

    /// The abort token fired when the socket errors or closes.
    pub fn abort_token(&self) -> CancellationToken {
        self.abort.clone()
    }

    fn fill(&mut self, data: Bytes, buf: &mut ReadBuf<'_>) {
        let to_copy = data.len().min(buf.remaining());
        buf.put_slice(&data[..to_copy]);
        self.read_buf = data.slice(to_copy..);
    }
}

impl AsyncRead for WsIo {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        // Drain any buffered remainder of the previous frame first
        if !self.read_buf.is_empty() {
            let pending = std::mem::take(&mut self.read_buf);
            self.fill(pending, buf);
            return Poll::Ready(Ok(()));
        }

        loop {
            match Pin::new(&mut self.ws).poll_next(cx) {
                Poll::Ready(Some(Ok(msg))) => match msg {
                    Message::Binary(data) => {
                        self.fill(data, buf);
                        return Poll::Ready(Ok(()));
                    }
                    Message::Text(text) => {
                        let data = Bytes::from(text);
                        self.fill(data, buf);
                        return Poll::Ready(Ok(()));
                    }
                    Message::Ping(payload) => {
                        let mut ws = Pin::new(&mut self.ws);
                        match ws.as_mut().poll_ready(cx) {
                            Poll::Ready(Ok(())) => {
                                if let Err(err) = ws.start_send(Message::Pong(payload)) {
                                    self.abort.cancel();
                                    return Poll::Ready(Err(ws_err(err)));
                                }
                                continue;
                            }
                            Poll::Ready(Err(err)) => {
                                self.abort.cancel();
                                return Poll::Ready(Err(ws_err(err)));
                            }
                            Poll::Pending => return Poll::Pending,
                        }
                    }
                    Message::Pong(_) => continue,
                    Message::Close(frame) => {
                        trace!(?frame, "websocket closed by peer");
                        self.abort.cancel();
                        return Poll::Ready(Ok(()));
                    }
                },
                Poll::Ready(Some(Err(err))) => {
                    self.abort.cancel();
                    return Poll::Ready(Err(ws_err(err)));
                }
                Poll::Ready(None) => {
                    self.abort.cancel();
                    return Poll::Ready(Ok(()));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl AsyncWrite for WsIo {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        if data.is_empty() {
            return Poll::Ready(Ok(0));
        }
        let mut ws = Pin::new(&mut self.ws);
        match ws.as_mut().poll_ready(cx) {
            Poll::Ready(Ok(())) => {
                if let Err(err) = ws.start_send(Message::Binary(Bytes::copy_from_slice(data))) {
                    self.abort.cancel();
                    return Poll::Ready(Err(ws_err(err)));
                }
                Poll::Ready(Ok(data.len()))
            }
            Poll::Ready(Err(err)) => {
                self.abort.cancel();
                Poll::Ready(Err(ws_err(err)))
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.ws).poll_flush(cx).map_err(ws_err)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if self.closed {
            return Poll::Ready(Ok(()));
        }
        match Pin::new(&mut self.ws).poll_close(cx) {
            Poll::Ready(result) => {
                self.closed = true;
                if let Err(err) = result {
                    trace!("websocket close: {err}");
                }
                Poll::Ready(Ok(()))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

fn ws_err(err: axum::Error) -> io::Error {
    io::Error::other(err)
}
