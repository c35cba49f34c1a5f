//! Per-connection proxy flow: header, dial, relay.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;
use uuid::Uuid;
use vless_core::io::{RelayConfig, RelaySetup, read_at_least, relay};
use vless_core::{CancellationToken, defaults, watch};
use vless_proto::{ParseResult, parse_request};

use crate::error::ServerError;
use crate::outbound::connect_remote;

/// A parsed client hello: where to connect and what to write first.
#[derive(Debug)]
pub struct RequestHead {
    pub hostname: String,
    pub port: u16,
    /// Uplink payload bytes already read past the header.
    pub data: Bytes,
    /// Two-byte response prefix for the first downlink write.
    pub resp: Bytes,
}

enum Step {
    Done(RequestHead),
    Need(usize),
}

fn advance_parse(buf: &[u8], uuid: &[u8; 16]) -> Result<Step, ServerError> {
    match parse_request(buf, uuid) {
        ParseResult::Complete(req) => Ok(Step::Done(RequestHead {
            hostname: req.host.to_hostname(),
            port: req.port,
            data: Bytes::copy_from_slice(req.payload),
            resp: Bytes::copy_from_slice(&req.response_prefix()),
        })),
        ParseResult::Incomplete(need) => Ok(Step::Need(need)),
        ParseResult::Invalid(err) => Err(ServerError::Proto(err)),
    }
}

/// Read the request header from the client stream in widening passes.
///
/// The header is fully consumed before any byte flows to the remote;
/// whatever arrived past it comes back as `data`.
pub async fn read_head<R>(reader: &mut R, uuid: &Uuid) -> Result<RequestHead, ServerError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(512);
    loop {
        match advance_parse(&buf, uuid.as_bytes())? {
            Step::Done(head) => return Ok(head),
            Step::Need(n) => read_at_least(reader, &mut buf, n).await?,
        }
    }
}

/// A client whose header has been consumed and whose outbound leg is open.
pub struct Established<R> {
    pub reader: R,
    pub head: RequestHead,
    pub remote: TcpStream,
}

/// Parse the header and open the outbound connection.
///
/// Errors here are setup failures; the ingress turns them into a 404 and
/// closes the client.
pub async fn establish<R>(
    mut reader: R,
    uuid: &Uuid,
    relays: &str,
) -> Result<Established<R>, ServerError>
where
    R: AsyncRead + Unpin,
{
    let head = read_head(&mut reader, uuid).await?;
    debug!(host = %head.hostname, port = head.port, "request accepted");
    let remote = connect_remote(&head.hostname, head.port, relays).await?;
    Ok(Established {
        reader,
        head,
        remote,
    })
}

/// Drive the relay until both directions settle.
///
/// When the transport produced an abort signal, the watcher is armed so a
/// stuck remote is reclaimed after the grace period; it is torn down again
/// once the relay finishes on its own.
pub async fn run_relay<R, W>(
    established: Established<R>,
    writer: W,
    signal: Option<CancellationToken>,
    cfg: RelayConfig,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let Established {
        reader,
        head,
        remote,
    } = established;
    let RequestHead {
        hostname,
        port,
        data,
        resp,
    } = head;

    let (remote_reader, remote_writer) = remote.into_split();
    let remote_guard = CancellationToken::new();

    let watcher = signal.clone().map(|signal| {
        tokio::spawn(watch::watch_abort(
            signal,
            remote_guard.clone(),
            defaults::ABORT_POLL,
            defaults::ABORT_GRACE,
        ))
    });

    let setup = RelaySetup {
        first_uplink: data,
        first_downlink: resp,
        signal,
        remote_guard,
    };
    let stats = relay(reader, writer, remote_reader, remote_writer, setup, cfg, || {
        debug!("client upload finished");
    })
    .await;

    if let Some(watcher) = watcher {
        watcher.abort();
    }
    debug!(
        host = %hostname,
        port,
        uplink = stats.uplink,
        downlink = stats.downlink,
        "connection closed"
    );
}
