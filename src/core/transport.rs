// src/core/transport.rs

//! The raw TCP side-channel used for bulk byte transfer, distinct from the
//! HTTP control channel. Length-unframed; closure marks EOF.
//! Both peers tee the stream into the content checksum as it passes.

use crate::core::checksum::Hasher;
use crate::core::errors::S4Error;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::sleep;

/// The idle-reset watchdog: any observed read or write resets the deadline;
/// absence of progress for this long aborts the transfer.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(5);

const CHUNK_SIZE: usize = 64 * 1024;
const DIAL_RETRIES: u32 = 10;
const DIAL_BACKOFF: Duration = Duration::from_millis(200);

/// Binds an ephemeral TCP listener for a single inbound transfer.
pub async fn bind_ephemeral(host: &str) -> Result<(TcpListener, u16), S4Error> {
    let listener = TcpListener::bind((host, 0)).await?;
    let port = listener.local_addr()?.port();
    Ok((listener, port))
}

/// Accepts exactly one connection on `listener` and copies it into `dest`,
/// tee-ing into the content checksum.
pub async fn recv_stream<W>(listener: TcpListener, mut dest: W) -> Result<String, S4Error>
where
    W: AsyncWrite + Unpin,
{
    let (socket, _addr) = tokio::time::timeout(IDLE_TIMEOUT, listener.accept())
        .await
        .map_err(|_| S4Error::Internal("timed out waiting for inbound connection".to_string()))??;
    copy_with_hash(socket, &mut dest).await
}

/// Dials `addr` with bounded retry and streams `src` into the connection,
/// tee-ing into the content checksum.
pub async fn send_stream<R>(addr: SocketAddr, mut src: R) -> Result<String, S4Error>
where
    R: AsyncRead + Unpin,
{
    let socket = dial_with_retry(addr).await?;
    copy_with_hash(&mut src, socket).await
}

async fn dial_with_retry(addr: SocketAddr) -> Result<TcpStream, S4Error> {
    let mut last_err = None;
    for attempt in 0..DIAL_RETRIES {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                last_err = Some(e);
                sleep(DIAL_BACKOFF * (attempt + 1)).await;
            }
        }
    }
    Err(S4Error::Internal(format!(
        "failed to dial {addr} after {DIAL_RETRIES} attempts: {}",
        last_err.map(|e| e.to_string()).unwrap_or_default()
    )))
}

async fn copy_with_hash<R, W>(mut reader: R, mut writer: W) -> Result<String, S4Error>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut hasher = Hasher::new();
    loop {
        let read = tokio::time::timeout(IDLE_TIMEOUT, reader.read(&mut buf))
            .await
            .map_err(|_| S4Error::Internal("transfer idle timeout".to_string()))??;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
        tokio::time::timeout(IDLE_TIMEOUT, writer.write_all(&buf[..read]))
            .await
            .map_err(|_| S4Error::Internal("transfer idle timeout".to_string()))??;
    }
    writer.flush().await?;
    Ok(hasher.finalize_hex())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufWriter;

    #[tokio::test]
    async fn round_trips_and_hashes_match() {
        let (listener, port) = bind_ephemeral("127.0.0.1").await.unwrap();
        let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();

        let data = b"the quick brown fox".to_vec();
        let sender = tokio::spawn(async move {
            let cursor = std::io::Cursor::new(data);
            send_stream(addr, cursor).await.unwrap()
        });

        let mut received = Vec::new();
        let receiver_hash = recv_stream(listener, BufWriter::new(&mut received))
            .await
            .unwrap();
        let sender_hash = sender.await.unwrap();

        assert_eq!(receiver_hash, sender_hash);
        assert_eq!(received, b"the quick brown fox");
    }
}
