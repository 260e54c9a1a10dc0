//! Byte-stream transport: connect, framed JSON send/receive.
//!
//! The daemon speaks one JSON object per message over a reliable, ordered
//! stream. Responses are read incrementally and re-parsed until a complete
//! object arrives; a read timeout guards against a hung daemon.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use kpxc_common::protocol::Response;

use crate::error::{Error, Result};

const READ_CHUNK: usize = 4096;

/// Upper bound on a single response; anything larger is not a daemon talking
/// this protocol.
const MAX_RESPONSE_BYTES: usize = 1024 * 1024;

/// Connect to the daemon's local socket.
#[cfg(unix)]
pub async fn connect(path: &std::path::Path) -> Result<tokio::net::UnixStream> {
    tokio::net::UnixStream::connect(path)
        .await
        .map_err(Error::Connect)
}

pub(crate) async fn write_message<S>(stream: &mut S, bytes: &[u8]) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(bytes).await?;
    stream.flush().await?;
    Ok(())
}

/// Read one JSON response, returning both the parsed envelope and the raw
/// bytes (for wire-dump logging).
pub(crate) async fn read_response<S>(
    stream: &mut S,
    read_timeout: Duration,
) -> Result<(Response, Vec<u8>)>
where
    S: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        let n = timeout(read_timeout, stream.read(&mut chunk))
            .await
            .map_err(|_| Error::Timeout)??;
        if n == 0 {
            return Err(Error::Protocol("connection closed by daemon".into()));
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.len() > MAX_RESPONSE_BYTES {
            return Err(Error::Protocol("response exceeds size limit".into()));
        }

        match serde_json::from_slice::<Response>(&buf) {
            Ok(response) => return Ok((response, buf)),
            // Incomplete object so far, keep reading.
            Err(e) if e.is_eof() => continue,
            Err(e) => return Err(Error::Protocol(format!("malformed response: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reassembles_split_responses() {
        let (mut client, mut daemon) = tokio::io::duplex(64);

        let payload = br#"{"action":"test-associate","nonce":"bm8=","success":"true"}"#;
        let (first, rest) = payload.split_at(10);
        daemon.write_all(first).await.unwrap();

        let reader = tokio::spawn(async move {
            read_response(&mut client, Duration::from_secs(5))
                .await
                .unwrap()
        });

        tokio::task::yield_now().await;
        daemon.write_all(rest).await.unwrap();

        let (response, raw) = reader.await.unwrap();
        assert_eq!(response.action, "test-associate");
        assert_eq!(raw, payload);
    }

    #[tokio::test]
    async fn closed_stream_is_a_protocol_error() {
        let (mut client, daemon) = tokio::io::duplex(64);
        drop(daemon);

        let result = read_response(&mut client, Duration::from_secs(5)).await;
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn silent_daemon_times_out() {
        let (mut client, _daemon) = tokio::io::duplex(64);

        let result = read_response(&mut client, Duration::from_millis(50)).await;
        assert!(matches!(result, Err(Error::Timeout)));
    }

    #[tokio::test]
    async fn invalid_json_is_a_protocol_error() {
        let (mut client, mut daemon) = tokio::io::duplex(64);
        daemon.write_all(b"]]not json[[").await.unwrap();

        let result = read_response(&mut client, Duration::from_secs(5)).await;
        assert!(matches!(result, Err(Error::Protocol(_))));
    }
}
