//! Client and server settings.

use std::time::Duration;

use scaffolding_protocol::{request, ReadLimits};

use crate::mesh::PUBLIC_RELAY;

/// Port a lobby server tries first.
pub const DEFAULT_LISTEN_PORT: u16 = 13452;

/// Settings for a [`Client`](crate::Client).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Bound on each request/response round trip.
    pub request_timeout: Duration,

    /// Bounds applied to every raw read of a response frame.
    pub read_limits: ReadLimits,

    /// Bound on the `c:ping` liveness probe after a heartbeat timeout.
    pub liveness_timeout: Duration,

    /// Peer-list polls before giving up on discovery.
    pub discovery_attempts: u32,

    /// Delay before each peer-list poll.
    pub discovery_interval: Duration,

    /// Bound on opening the lobby TCP connection.
    pub connect_timeout: Duration,

    /// Bootstrap peers handed to the mesh.
    pub relay_peers: Vec<String>,

    /// Open (and close) a TCP connection through the game server forward
    /// during the handshake, failing the handshake if it is refused.
    pub verify_game_server: bool,

    /// Request types announced in `c:protocols`.
    pub protocols: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            read_limits: ReadLimits::default(),
            liveness_timeout: Duration::from_secs(2),
            discovery_attempts: 15,
            discovery_interval: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(5),
            relay_peers: vec![PUBLIC_RELAY.to_owned()],
            verify_game_server: false,
            protocols: request::BUILT_IN.iter().map(|s| (*s).to_owned()).collect(),
        }
    }
}

/// Settings for a [`Server`](crate::Server).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port tried first; an OS-assigned port is used if it is taken.
    pub listen_port: u16,

    /// Bounds applied to every raw read of a request frame, idle waits
    /// between requests included. Clients heartbeat at least every 5 s, so
    /// the default 10 s drops only peers that went silent.
    pub read_limits: ReadLimits,

    /// Bootstrap peers handed to the mesh.
    pub relay_peers: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_port: DEFAULT_LISTEN_PORT,
            read_limits: ReadLimits::default(),
            relay_peers: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_default() {
        let config = ClientConfig::default();
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.liveness_timeout, Duration::from_secs(2));
        assert_eq!(config.discovery_attempts, 15);
        assert_eq!(config.read_limits.timeout, Duration::from_secs(10));
        assert!(!config.verify_game_server);
        assert_eq!(config.protocols.len(), request::BUILT_IN.len());
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.listen_port, 13452);
        assert!(config.relay_peers.is_empty());
    }
}
