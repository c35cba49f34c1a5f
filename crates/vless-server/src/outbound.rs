//! Outbound dialing with optional relay fallback.

use std::io;

use rand::Rng;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;
use vless_core::defaults;

#[derive(Debug, thiserror::Error)]
pub enum DialError {
    #[error("connect timeout")]
    Timeout,
    #[error("connect failed: {0}")]
    Connect(io::Error),
    #[error("all connect attempts failed")]
    AllAttemptsFailed,
}

/// Pick one relay host uniformly at random from a whitespace/comma
/// separated list. Empty entries are discarded.
pub fn pick_relay(list: &str) -> Option<&str> {
    let candidates: Vec<&str> = list
        .split([' ', ',', '\r', '\n'])
        .filter(|entry| !entry.is_empty())
        .collect();
    if candidates.is_empty() {
        return None;
    }
    let index = rand::rng().random_range(0..candidates.len());
    Some(candidates[index])
}

/// Open the outbound TCP leg: direct first, then a single randomly chosen
/// relay from `relays`. Each attempt has its own connect timeout.
pub async fn connect_remote(
    host: &str,
    port: u16,
    relays: &str,
) -> Result<TcpStream, DialError> {
    match timed_connect(host, port).await {
        Ok(stream) => return Ok(stream),
        Err(err) => debug!(host, port, error = %err, "direct connect failed"),
    }
    if let Some(relay) = pick_relay(relays) {
        debug!(relay, port, "falling back to relay");
        match timed_connect(relay, port).await {
            Ok(stream) => return Ok(stream),
            Err(err) => debug!(relay, port, error = %err, "relay connect failed"),
        }
    }
    Err(DialError::AllAttemptsFailed)
}

/// Race the connect against a timer; a timed-out attempt is abandoned.
async fn timed_connect(host: &str, port: u16) -> Result<TcpStream, DialError> {
    match timeout(defaults::CONNECT_TIMEOUT, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => {
            let _ = stream.set_nodelay(true);
            Ok(stream)
        }
        Ok(Err(err)) => Err(DialError::Connect(err)),
        Err(_) => Err(DialError::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn pick_relay_empty_list() {
        assert_eq!(pick_relay(""), None);
        assert_eq!(pick_relay("  , \r\n "), None);
    }

    #[test]
    fn pick_relay_single() {
        assert_eq!(pick_relay("relay.example.com"), Some("relay.example.com"));
    }

    #[test]
    fn pick_relay_stays_within_list() {
        let list = "a.example, b.example\nc.example\r\nd.example";
        for _ in 0..64 {
            let picked = pick_relay(list).unwrap();
            assert!(
                ["a.example", "b.example", "c.example", "d.example"].contains(&picked),
                "picked {picked}"
            );
        }
    }

    #[tokio::test]
    async fn direct_connect_succeeds() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let stream = connect_remote("127.0.0.1", addr.port(), "").await.unwrap();
        assert_eq!(stream.peer_addr().unwrap(), addr);
    }

    /// Bind and immediately drop a listener so its port refuses connections.
    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn relay_fallback_after_direct_failure() {
        let relay_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = relay_listener.local_addr().unwrap().port();

        // .invalid never resolves, so the direct attempt fails immediately
        // and the randomly picked relay carries the connection
        let stream = connect_remote("target.invalid", port, "127.0.0.1")
            .await
            .unwrap();
        assert_eq!(stream.peer_addr().unwrap().port(), port);
    }

    #[tokio::test]
    async fn exhausted_attempts_fail() {
        let dead = closed_port().await;
        let err = connect_remote("127.0.0.1", dead, "127.0.0.1")
            .await
            .unwrap_err();
        assert!(matches!(err, DialError::AllAttemptsFailed));
    }
}
