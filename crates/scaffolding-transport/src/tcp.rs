//! TCP transport implementation.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

use crate::{Connection, ConnectionId, Transport, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

fn next_connection_id() -> ConnectionId {
    ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
}

/// A TCP [`Transport`] that listens for incoming connections.
pub struct TcpTransport {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpTransport {
    /// Binds a new TCP transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        Self::from_listener(listener)
    }

    /// Binds `ip:preferred`, falling back to an OS-assigned port on
    /// `ip` when the preferred port is taken.
    pub async fn bind_or_ephemeral(
        ip: IpAddr,
        preferred: u16,
    ) -> Result<Self, TransportError> {
        match TcpListener::bind((ip, preferred)).await {
            Ok(listener) => Self::from_listener(listener),
            Err(e) => {
                tracing::info!(
                    port = preferred,
                    error = %e,
                    "preferred listen port unavailable, using an ephemeral port"
                );
                let listener = TcpListener::bind((ip, 0))
                    .await
                    .map_err(TransportError::PortAllocationFailed)?;
                Self::from_listener(listener)
            }
        }
    }

    fn from_listener(listener: TcpListener) -> Result<Self, TransportError> {
        let local_addr =
            listener.local_addr().map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr = %local_addr, "TCP transport listening");
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Returns the address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Transport for TcpTransport {
    type Connection = TcpConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        let conn = TcpConnection::from_stream(stream, addr);
        tracing::debug!(id = %conn.id, %addr, "accepted TCP connection");
        Ok(conn)
    }

    async fn shutdown(&self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// A single TCP connection.
///
/// The read and write halves are locked independently, so a writer never
/// waits on a reader parked in [`Connection::recv_exact`].
pub struct TcpConnection {
    id: ConnectionId,
    peer_addr: SocketAddr,
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
    poisoned: AtomicBool,
}

impl TcpConnection {
    /// Opens a connection to `addr`, giving up after `limit`.
    pub async fn connect(
        addr: SocketAddr,
        limit: Duration,
    ) -> Result<Self, TransportError> {
        let stream = match tokio::time::timeout(limit, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(TransportError::ConnectFailed { addr, source });
            }
            Err(_) => return Err(TransportError::Timeout(limit)),
        };
        let conn = Self::from_stream(stream, addr);
        tracing::debug!(id = %conn.id, %addr, "connected");
        Ok(conn)
    }

    fn from_stream(stream: TcpStream, peer_addr: SocketAddr) -> Self {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "failed to set TCP_NODELAY");
        }
        let (reader, writer) = stream.into_split();
        Self {
            id: next_connection_id(),
            peer_addr,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            poisoned: AtomicBool::new(false),
        }
    }

    /// Returns the remote address of this connection.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}

impl Connection for TcpConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        let mut writer = self.writer.lock().await;
        writer
            .write_all(data)
            .await
            .map_err(TransportError::SendFailed)?;
        writer.flush().await.map_err(TransportError::SendFailed)
    }

    async fn recv_exact(&self, len: usize) -> Result<Option<Vec<u8>>, Self::Error> {
        if self.is_poisoned() {
            return Err(TransportError::Desynchronized);
        }
        let mut buf = vec![0u8; len];
        if len == 0 {
            return Ok(Some(buf));
        }

        let mut reader = self.reader.lock().await;
        let mut progress = PartialRead {
            poisoned: &self.poisoned,
            filled: 0,
            len,
        };
        while progress.filled < len {
            let n = reader
                .read(&mut buf[progress.filled..])
                .await
                .map_err(TransportError::ReceiveFailed)?;
            if n == 0 {
                if progress.filled == 0 {
                    return Ok(None);
                }
                return Err(TransportError::Cancelled(format!(
                    "peer closed after {} of {len} bytes",
                    progress.filled
                )));
            }
            progress.filled += n;
        }
        Ok(Some(buf))
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.writer
            .lock()
            .await
            .shutdown()
            .await
            .map_err(TransportError::SendFailed)
    }

    fn poison(&self) {
        if !self.poisoned.swap(true, Ordering::AcqRel) {
            tracing::debug!(id = %self.id, "connection poisoned");
        }
    }

    fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Acquire)
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

/// Tracks an in-progress [`TcpConnection::recv_exact`]. Dropped with some
/// but not all bytes read (cancelled, or failed midway), it poisons the
/// connection.
struct PartialRead<'a> {
    poisoned: &'a AtomicBool,
    filled: usize,
    len: usize,
}

impl Drop for PartialRead<'_> {
    fn drop(&mut self) {
        if self.filled > 0 && self.filled < self.len {
            self.poisoned.store(true, Ordering::Release);
        }
    }
}
