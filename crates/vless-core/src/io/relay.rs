//! Bidirectional relay with two interchangeable pump strategies.
//!
//! Each direction is a `pump`: write one prepended first packet, then copy
//! source to destination until end-of-stream or abort. The `pipe` strategy
//! delegates to `tokio::io::copy` and unwinds through the abort token; the
//! `yield` strategy copies in bounded slices with an explicit pause between
//! them, trading throughput for traffic shaping and scheduler fairness.

use std::io;
use std::str::FromStr;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use crate::defaults;

/// How a pump copies its direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scheduler {
    #[default]
    Pipe,
    Yield,
}

impl FromStr for Scheduler {
    type Err = std::convert::Infallible;

    // Unknown values fall back to the pipe strategy.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "yield" => Scheduler::Yield,
            _ => Scheduler::Pipe,
        })
    }
}

/// Relay tuning shared by both pumps of a connection.
#[derive(Debug, Clone, Copy)]
pub struct RelayConfig {
    pub scheduler: Scheduler,
    /// Bytes transferred per slice before the yield pump pauses.
    pub yield_size: usize,
    /// Pause between slices. Zero means a bare yield to the scheduler.
    pub yield_delay: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            scheduler: Scheduler::Pipe,
            yield_size: defaults::DEFAULT_YIELD_KIB * defaults::KIB,
            yield_delay: Duration::from_millis(defaults::DEFAULT_YIELD_DELAY_MS),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Expected teardown via the abort token; suppressed from logs.
    #[error("aborted")]
    Aborted,
    #[error("io: {0}")]
    Io(#[from] io::Error),
}

impl RelayError {
    #[inline]
    pub fn is_abort(&self) -> bool {
        matches!(self, RelayError::Aborted)
    }
}

/// Bytes transferred in each direction during a relay session.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelayStats {
    /// Bytes from client to remote, first packet included.
    pub uplink: u64,
    /// Bytes from remote to client, response prefix included.
    pub downlink: u64,
}

impl RelayStats {
    #[inline]
    pub fn total(self) -> u64 {
        self.uplink + self.downlink
    }
}

/// Copy one direction: first packet, then the stream.
///
/// The destination is shut down on every exit path, so the peer observes
/// end-of-stream whether this direction finished, failed, or was aborted.
pub async fn pump<R, W>(
    src: &mut R,
    dst: &mut W,
    first_packet: &[u8],
    signal: Option<&CancellationToken>,
    cfg: &RelayConfig,
) -> Result<u64, RelayError>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let result = match cfg.scheduler {
        Scheduler::Pipe => pump_pipe(src, dst, first_packet, signal).await,
        Scheduler::Yield => {
            pump_yield(src, dst, first_packet, signal, cfg.yield_size, cfg.yield_delay).await
        }
    };
    let shutdown = dst.shutdown().await;
    match result {
        Ok(copied) => {
            shutdown?;
            Ok(copied)
        }
        Err(err) => Err(err),
    }
}

async fn pump_pipe<R, W>(
    src: &mut R,
    dst: &mut W,
    first_packet: &[u8],
    signal: Option<&CancellationToken>,
) -> Result<u64, RelayError>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    if !first_packet.is_empty() {
        dst.write_all(first_packet).await?;
        dst.flush().await?;
    }
    let copied = match signal {
        Some(signal) => {
            tokio::select! {
                biased;
                _ = signal.cancelled() => return Err(RelayError::Aborted),
                res = tokio::io::copy(src, dst) => res?,
            }
        }
        None => tokio::io::copy(src, dst).await?,
    };
    Ok(first_packet.len() as u64 + copied)
}

async fn pump_yield<R, W>(
    src: &mut R,
    dst: &mut W,
    first_packet: &[u8],
    signal: Option<&CancellationToken>,
    yield_size: usize,
    yield_delay: Duration,
) -> Result<u64, RelayError>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    if !first_packet.is_empty() {
        dst.write_all(first_packet).await?;
        dst.flush().await?;
    }
    let yield_size = yield_size.max(1);
    let mut buf = vec![0u8; defaults::COPY_CHUNK.min(yield_size)];
    let mut total = first_packet.len() as u64;
    loop {
        let mut sliced = 0usize;
        while sliced < yield_size {
            let n = match signal {
                Some(signal) => {
                    if signal.is_cancelled() {
                        return Err(RelayError::Aborted);
                    }
                    tokio::select! {
                        biased;
                        _ = signal.cancelled() => return Err(RelayError::Aborted),
                        res = src.read(&mut buf) => res?,
                    }
                }
                None => src.read(&mut buf).await?,
            };
            if n == 0 {
                dst.flush().await?;
                return Ok(total);
            }
            dst.write_all(&buf[..n]).await?;
            total += n as u64;
            sliced += n;
        }
        dst.flush().await?;
        if yield_delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(yield_delay).await;
        }
    }
}

/// Everything the orchestrator needs beyond the four stream halves.
pub struct RelaySetup {
    /// First uplink packet: payload bytes read past the request header.
    pub first_uplink: Bytes,
    /// First downlink packet: the two-byte response prefix.
    pub first_downlink: Bytes,
    /// The client's abort token, when the transport produces one.
    pub signal: Option<CancellationToken>,
    /// Cancelled by the abort watcher to force the remote direction down.
    pub remote_guard: CancellationToken,
}

/// Drive both directions of a proxied connection to completion.
///
/// The uploader observes the client's abort token; the downloader observes
/// `remote_guard`, which the abort watcher cancels after its grace period.
/// Aborts are expected teardown and are not logged as errors; I/O failures
/// are logged with their direction and do not disturb the other direction.
pub async fn relay<CR, CW, RR, RW, F>(
    mut client_reader: CR,
    mut client_writer: CW,
    mut remote_reader: RR,
    mut remote_writer: RW,
    setup: RelaySetup,
    cfg: RelayConfig,
    on_reading_done: F,
) -> RelayStats
where
    CR: AsyncRead + Unpin,
    CW: AsyncWrite + Unpin,
    RR: AsyncRead + Unpin,
    RW: AsyncWrite + Unpin,
    F: FnOnce(),
{
    let uplink = async {
        let res = pump(
            &mut client_reader,
            &mut remote_writer,
            &setup.first_uplink,
            setup.signal.as_ref(),
            &cfg,
        )
        .await;
        on_reading_done();
        res
    };
    let downlink = pump(
        &mut remote_reader,
        &mut client_writer,
        &setup.first_downlink,
        Some(&setup.remote_guard),
        &cfg,
    );

    let (up, down) = tokio::join!(uplink, downlink);

    let mut stats = RelayStats::default();
    match up {
        Ok(n) => stats.uplink = n,
        Err(err) => log_pump_error("upload", &err),
    }
    match down {
        Ok(n) => stats.downlink = n,
        Err(err) => log_pump_error("download", &err),
    }
    debug!(uplink = stats.uplink, downlink = stats.downlink, "relay finished");
    stats
}

fn log_pump_error(direction: &'static str, err: &RelayError) {
    if err.is_abort() {
        trace!("{direction}: aborted");
    } else {
        error!("{direction}: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::io::{AsyncWriteExt, duplex};
    use tokio::time::Instant;

    fn pipe_cfg() -> RelayConfig {
        RelayConfig::default()
    }

    fn yield_cfg(yield_size: usize, delay_ms: u64) -> RelayConfig {
        RelayConfig {
            scheduler: Scheduler::Yield,
            yield_size,
            yield_delay: Duration::from_millis(delay_ms),
        }
    }

    #[test]
    fn scheduler_parses_with_pipe_fallback() {
        assert_eq!("pipe".parse::<Scheduler>().unwrap(), Scheduler::Pipe);
        assert_eq!("yield".parse::<Scheduler>().unwrap(), Scheduler::Yield);
        assert_eq!("banana".parse::<Scheduler>().unwrap(), Scheduler::Pipe);
        assert_eq!("".parse::<Scheduler>().unwrap(), Scheduler::Pipe);
    }

    #[tokio::test]
    async fn pipe_pump_prepends_first_packet() {
        let (mut src_tx, mut src) = duplex(64);
        let (mut dst, mut dst_rx) = duplex(64);

        src_tx.write_all(b"world").await.unwrap();
        src_tx.shutdown().await.unwrap();

        let copied = pump(&mut src, &mut dst, b"hello ", None, &pipe_cfg())
            .await
            .unwrap();
        assert_eq!(copied, 11);

        let mut out = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut dst_rx, &mut out)
            .await
            .unwrap();
        assert_eq!(out, b"hello world");
    }

    #[tokio::test]
    async fn yield_pump_preserves_order_across_slices() {
        let (mut src_tx, mut src) = duplex(1024);
        let (mut dst, mut dst_rx) = duplex(1024);

        let payload: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let expected = payload.clone();
        tokio::spawn(async move {
            src_tx.write_all(&payload).await.unwrap();
            src_tx.shutdown().await.unwrap();
        });

        // tiny slices force many yield points; drain concurrently so the
        // small duplex buffer never stalls the pump
        let pump_task = tokio::spawn(async move {
            pump(&mut src, &mut dst, b"", None, &yield_cfg(256, 0)).await
        });

        let mut out = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut dst_rx, &mut out)
            .await
            .unwrap();
        assert_eq!(out, expected);
        assert_eq!(pump_task.await.unwrap().unwrap(), 4096);
    }

    #[tokio::test]
    async fn pipe_pump_aborts_on_signal() {
        let (_src_tx, mut src) = duplex(64);
        let (mut dst, _dst_rx) = duplex(64);

        let signal = CancellationToken::new();
        signal.cancel();

        let err = pump(&mut src, &mut dst, b"", Some(&signal), &pipe_cfg())
            .await
            .unwrap_err();
        assert!(err.is_abort());
    }

    #[tokio::test(start_paused = true)]
    async fn yield_pump_observes_abort_between_reads() {
        let (_src_tx, mut src) = duplex(64);
        let (mut dst, _dst_rx) = duplex(64);

        let signal = CancellationToken::new();
        let killer = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            killer.cancel();
        });

        let started = Instant::now();
        let err = pump(&mut src, &mut dst, b"", Some(&signal), &yield_cfg(1024, 10))
            .await
            .unwrap_err();
        assert!(err.is_abort());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn relay_round_trip_with_prefixes() {
        let (client, client_side) = duplex(1024);
        let (remote_side, remote) = duplex(1024);

        let (cr, cw) = tokio::io::split(client_side);
        let (rr, rw) = tokio::io::split(remote_side);

        let done = std::sync::Arc::new(AtomicBool::new(false));
        let done_flag = done.clone();
        let setup = RelaySetup {
            first_uplink: Bytes::from_static(b"PING"),
            first_downlink: Bytes::from_static(&[0x00, 0x00]),
            signal: None,
            remote_guard: CancellationToken::new(),
        };
        let relay_task = tokio::spawn(relay(cr, cw, rr, rw, setup, pipe_cfg(), move || {
            done_flag.store(true, Ordering::SeqCst);
        }));

        // mock remote: expect PING, answer PONG, close
        let (mut remote_r, mut remote_w) = tokio::io::split(remote);
        let remote_task = tokio::spawn(async move {
            let mut buf = [0u8; 4];
            tokio::io::AsyncReadExt::read_exact(&mut remote_r, &mut buf)
                .await
                .unwrap();
            assert_eq!(&buf, b"PING");
            remote_w.write_all(b"PONG").await.unwrap();
            remote_w.shutdown().await.unwrap();
            // drain to EOF so the uploader can finish
            let mut rest = Vec::new();
            tokio::io::AsyncReadExt::read_to_end(&mut remote_r, &mut rest)
                .await
                .unwrap();
        });

        // client sends nothing further
        let (mut client_r, mut client_w) = tokio::io::split(client);
        client_w.shutdown().await.unwrap();

        let mut received = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut client_r, &mut received)
            .await
            .unwrap();
        assert_eq!(received, [0x00, 0x00, b'P', b'O', b'N', b'G']);

        let stats = relay_task.await.unwrap();
        remote_task.await.unwrap();
        assert_eq!(stats.uplink, 4);
        assert_eq!(stats.downlink, 6);
        assert!(done.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn abort_settles_both_pumps_within_watcher_window() {
        let (_client, client_side) = duplex(64);
        let (remote_side, _remote) = duplex(64);

        let (cr, cw) = tokio::io::split(client_side);
        let (rr, rw) = tokio::io::split(remote_side);

        let signal = CancellationToken::new();
        let remote_guard = CancellationToken::new();
        let setup = RelaySetup {
            first_uplink: Bytes::new(),
            first_downlink: Bytes::new(),
            signal: Some(signal.clone()),
            remote_guard: remote_guard.clone(),
        };

        let watcher = tokio::spawn(crate::watch::watch_abort(
            signal.clone(),
            remote_guard,
            defaults::ABORT_POLL,
            defaults::ABORT_GRACE,
        ));

        let started = Instant::now();
        let relay_task = tokio::spawn(relay(cr, cw, rr, rw, setup, pipe_cfg(), || {}));

        signal.cancel();
        let stats = relay_task.await.unwrap();
        // neither side moved bytes; both pumps unwound via abort
        assert_eq!(stats.total(), 0);
        assert!(started.elapsed() <= Duration::from_millis(7000));
        watcher.await.unwrap();
    }
}
