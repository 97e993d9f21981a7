//! Transport layer for the Scaffolding lobby protocol.
//!
//! Provides the [`Transport`] and [`Connection`] traits, a TCP
//! implementation of both, bounded waits ([`with_timeout`]), a
//! single-resolution [`Latch`] and local port allocation
//! ([`allocate_port`]).
//!
//! Unlike message-oriented transports, the lobby protocol runs over a raw
//! byte stream, so [`Connection::recv_exact`] reads an exact number of
//! bytes and leaves framing to the protocol crate.

#![allow(async_fn_in_trait)]

mod error;
mod latch;
mod port;
mod tcp;

pub use error::TransportError;
pub use latch::Latch;
pub use port::allocate_port;
pub use tcp::{TcpConnection, TcpTransport};

use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts the next incoming connection.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;

    /// Gracefully shuts down the transport, stopping new connections.
    async fn shutdown(&self) -> Result<(), Self::Error>;
}

/// A single bidirectional byte stream.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync;

    /// Writes all of `data` and flushes it.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Reads exactly `len` bytes.
    ///
    /// Returns `Ok(None)` when the peer closed the stream before the first
    /// byte arrived. A close after some but not all bytes is an error.
    async fn recv_exact(&self, len: usize) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Closes the write side of the connection.
    async fn close(&self) -> Result<(), Self::Error>;

    /// Marks the stream as out of step with the peer's framing. Every
    /// later read fails.
    fn poison(&self);

    /// Whether [`poison`](Self::poison) was called, or a read was dropped
    /// after consuming part of its bytes.
    fn is_poisoned(&self) -> bool;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}

/// Races `fut` against a timer. Exactly one outcome reaches the caller:
/// the future's own result, or [`TransportError::Timeout`] once `limit`
/// elapses (the future is dropped at that point).
///
/// Dropping a read may leave the stream mid-frame. [`TcpConnection`]
/// poisons itself when that happens, so callers that keep using a
/// connection after a timeout must check [`Connection::is_poisoned`].
pub async fn with_timeout<T, E, F>(limit: Duration, fut: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<TransportError>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout(limit).into()),
    }
}
