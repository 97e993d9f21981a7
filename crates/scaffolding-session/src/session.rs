//! Session types: what the server remembers about an identified
//! connection.

use std::time::Instant;

use scaffolding_transport::ConnectionId;

/// One identified connection.
#[derive(Debug, Clone)]
pub struct Session {
    /// The connection speaking for the machine.
    pub connection: ConnectionId,

    /// The machine id announced in the connection's first successful
    /// `c:player_ping`.
    pub machine_id: String,

    /// When the binding was made.
    pub since: Instant,
}

/// Outcome of a successful [`bind`](crate::SessionManager::bind).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// The connection was anonymous and is now bound.
    New,
    /// The connection was already bound to the same machine.
    Confirmed,
}
