//! Unified error type for the Scaffolding workspace.

use scaffolding_protocol::ProtocolError;
use scaffolding_room::RoomError;
use scaffolding_session::SessionError;
use scaffolding_transport::TransportError;

use crate::mesh::MeshError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` variants let `?` lift sub-crate errors unchanged; the
/// remaining variants are failures only the client and server workflows
/// can observe.
#[derive(Debug, thiserror::Error)]
pub enum ScaffoldingError {
    /// A transport-level error (connect, send, recv, timeout, port).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (framing, buffer, JSON, room code).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The connection tried to speak for a machine it does not own.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The machine is in the room with a different profile.
    #[error(transparent)]
    Room(#[from] RoomError),

    /// The mesh overlay failed.
    #[error(transparent)]
    Mesh(#[from] MeshError),

    /// No lobby server showed up among the mesh peers.
    #[error("no lobby server found after {attempts} attempts")]
    DiscoveryTimeout { attempts: u32 },

    /// There is no live lobby connection to send on.
    #[error("not connected to a lobby server")]
    ConnectionUnavailable,

    /// The lobby server stopped answering and the client shut down.
    #[error("room closed: lobby server unresponsive")]
    RoomClosed,

    /// The server refused our `c:player_ping`.
    #[error("member conflict: {0}")]
    MemberConflict(String),

    /// A request was answered with an unexpected nonzero status.
    #[error("{kind} rejected with status {status}: {message}")]
    Rejected {
        kind: String,
        status: u8,
        message: String,
    },

    /// The room cannot be announced before the game server port is set.
    #[error("game server port is not set")]
    ServerPortUnknown,
}

impl ScaffoldingError {
    /// Returns `true` if the underlying cause is an expired timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout(),
            Self::Protocol(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// Returns `true` for every flavour of membership conflict, local or
    /// reported by the server.
    pub fn is_member_conflict(&self) -> bool {
        matches!(
            self,
            Self::Session(_) | Self::Room(_) | Self::MemberConflict(_)
        )
    }
}
