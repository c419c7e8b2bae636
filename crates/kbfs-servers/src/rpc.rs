//! Framed request/response transport to a remote peer.
//!
//! Frames are a big-endian `u32` length followed by a CBOR payload. Every
//! request gets exactly one reply frame holding `Result<T, String>`.
//!
//! Constructing an [`RpcClient`] never touches the network. The connection is
//! dialed by the background reconnect task (see [`RpcClient::spawn_reconnect`])
//! or on demand by the first request, and is dropped and redialed after any
//! transport failure.

use crate::config::ReliabilityConfig;
use kbfs_core::{Codec, ServerError, ServerResult};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, Notify};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Largest frame accepted from a peer
pub const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

/// Write one frame
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> std::io::Result<()> {
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len <= MAX_FRAME_LEN)
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "frame too large"))?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await
}

/// Read one frame
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<Vec<u8>> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes).await?;
    let len = u32::from_be_bytes(len_bytes);
    if len > MAX_FRAME_LEN {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds limit"),
        ));
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Client side of the framed transport
pub struct RpcClient {
    addr: String,
    codec: Codec,
    reliability: ReliabilityConfig,
    stream: Mutex<Option<TcpStream>>,
    connected: AtomicBool,
    closed: AtomicBool,
    disconnected: Arc<Notify>,
}

impl RpcClient {
    /// Create a client for `addr` without connecting
    pub fn new(addr: impl Into<String>, codec: Codec, reliability: ReliabilityConfig) -> Self {
        Self {
            addr: addr.into(),
            codec,
            reliability,
            stream: Mutex::new(None),
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            disconnected: Arc::new(Notify::new()),
        }
    }

    /// Peer address
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Whether a connection is currently established
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Start the background reconnect task.
    ///
    /// Returns `false` when no Tokio runtime is running; the client then
    /// connects lazily on its first request. The task holds only a weak
    /// reference and exits once the client is dropped or shut down.
    pub fn spawn_reconnect(self: &Arc<Self>) -> bool {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!(addr = %self.addr, "no runtime; deferring connection to first request");
            return false;
        };
        handle.spawn(reconnect_loop(Arc::downgrade(self)));
        true
    }

    /// Dial the peer if not already connected
    pub async fn connect(&self) -> ServerResult<()> {
        self.ensure_open()?;
        let mut guard = self.stream.lock().await;
        if guard.is_none() {
            *guard = Some(self.dial().await?);
            self.connected.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Send a request and wait for its reply
    pub async fn call<Req, Resp>(&self, request: &Req) -> ServerResult<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        self.ensure_open()?;
        let payload = self.codec.encode(request).map_err(ServerError::Codec)?;

        let mut guard = self.stream.lock().await;
        if guard.is_none() {
            *guard = Some(self.dial().await?);
            self.connected.store(true, Ordering::SeqCst);
        }
        let outcome = match guard.as_mut() {
            Some(stream) => {
                timeout(self.reliability.request_timeout(), exchange(stream, &payload)).await
            }
            None => return Err(ServerError::unavailable(&self.addr, "not connected")),
        };

        let reply = match outcome {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                *guard = None;
                self.mark_disconnected();
                return Err(ServerError::unavailable(&self.addr, e.to_string()));
            }
            Err(_) => {
                *guard = None;
                self.mark_disconnected();
                return Err(ServerError::unavailable(&self.addr, "request timed out"));
            }
        };

        let decoded: Result<Resp, String> =
            self.codec.decode(&reply).map_err(ServerError::Codec)?;
        decoded.map_err(ServerError::Remote)
    }

    /// Close the connection and stop reconnecting
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        *self.stream.lock().await = None;
        self.mark_disconnected();
    }

    fn ensure_open(&self) -> ServerResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ServerError::unavailable(&self.addr, "client shut down"));
        }
        Ok(())
    }

    fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.disconnected.notify_one();
    }

    async fn dial(&self) -> ServerResult<TcpStream> {
        match timeout(self.reliability.request_timeout(), TcpStream::connect(&self.addr)).await {
            Ok(Ok(stream)) => {
                let _ = stream.set_nodelay(true);
                Ok(stream)
            }
            Ok(Err(e)) => Err(ServerError::unavailable(&self.addr, e.to_string())),
            Err(_) => Err(ServerError::unavailable(&self.addr, "connect timed out")),
        }
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.disconnected.notify_one();
    }
}

async fn exchange(stream: &mut TcpStream, payload: &[u8]) -> std::io::Result<Vec<u8>> {
    write_frame(stream, payload).await?;
    read_frame(stream).await
}

async fn reconnect_loop(client: Weak<RpcClient>) {
    let mut attempt: u32 = 0;
    loop {
        let Some(rpc) = client.upgrade() else {
            return;
        };
        if rpc.closed.load(Ordering::SeqCst) {
            return;
        }

        if rpc.is_connected() {
            attempt = 0;
            let signal = Arc::clone(&rpc.disconnected);
            drop(rpc);
            signal.notified().await;
            continue;
        }

        match rpc.connect().await {
            Ok(()) => {
                info!(addr = %rpc.addr, "connected to remote peer");
                attempt = 0;
            }
            Err(e) => {
                let delay = rpc.reliability.backoff(attempt);
                warn!(addr = %rpc.addr, error = %e, ?delay, "connection attempt failed");
                attempt = attempt.saturating_add(1);
                drop(rpc);
                tokio::time::sleep(delay).await;
            }
        }
    }
}
