//! Error types for the session layer.

use scaffolding_transport::ConnectionId;

/// Reasons a connection may not take on an identity.
///
/// Both variants are membership conflicts: the connection is claiming a
/// machine it has no right to speak for.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Another live connection is already bound to this machine id.
    #[error("machine {machine_id} is already bound to {owner}")]
    MachineInUse {
        machine_id: String,
        owner: ConnectionId,
    },

    /// The connection is bound to a different machine id and may not
    /// switch mid-session.
    #[error("{connection} is bound to machine {bound}, not {claimed}")]
    IdentityChanged {
        connection: ConnectionId,
        bound: String,
        claimed: String,
    },
}
