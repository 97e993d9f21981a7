use std::net::SocketAddr;
use std::time::Duration;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection closed while a read was waiting for more bytes.
    #[error("connection closed during a wait: {0}")]
    Cancelled(String),

    /// A bounded wait expired before the operation completed.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding or accepting connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// Opening an outbound connection failed.
    #[error("connect to {addr} failed: {source}")]
    ConnectFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Neither the preferred port nor an ephemeral port could be bound.
    #[error("failed to allocate a local port: {0}")]
    PortAllocationFailed(#[source] std::io::Error),

    /// An earlier read was abandoned partway through a frame, so the
    /// stream no longer starts at a frame boundary.
    #[error("stream out of step: a read was abandoned mid-frame")]
    Desynchronized,

    /// The transport was shut down.
    #[error("transport shut down")]
    Shutdown,
}

impl TransportError {
    /// Returns `true` for [`TransportError::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
