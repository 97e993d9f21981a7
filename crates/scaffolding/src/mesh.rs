//! The mesh overlay seen from the lobby workflows.
//!
//! Hosts and guests never talk to each other directly: both join a
//! peer-to-peer virtual network named after the room code, the host
//! advertises its lobby port in its hostname, and guests reach it through
//! local port forwards. [`Mesh`] is the seam for that overlay;
//! [`EasyTier`](crate::EasyTier) is the production implementation.

use std::net::{Ipv4Addr, SocketAddr};

use scaffolding_protocol::RoomCode;
use serde::{Deserialize, Serialize};

/// Hostname prefix a lobby server advertises on the mesh. The listen port
/// follows it in decimal.
pub const SERVER_HOSTNAME_PREFIX: &str = "scaffolding-mc-server-";

/// Public relay guests bootstrap through when they know no other peer.
pub const PUBLIC_RELAY: &str = "tcp://public.easytier.cn:11010";

/// The hostname a lobby server listening on `port` advertises.
pub fn server_hostname(port: u16) -> String {
    format!("{SERVER_HOSTNAME_PREFIX}{port}")
}

/// Extracts the lobby port from an advertised hostname.
///
/// Returns `None` for hostnames of ordinary peers and for a suffix that is
/// not a port number.
pub fn parse_server_hostname(hostname: &str) -> Option<u16> {
    hostname.strip_prefix(SERVER_HOSTNAME_PREFIX)?.parse().ok()
}

/// Errors raised by a mesh implementation.
#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    /// The mesh daemon or its control tool could not be started.
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The control tool reported an error.
    #[error("mesh command failed: {0}")]
    Command(String),

    /// The control tool printed something we could not parse.
    #[error("unexpected mesh output: {0}")]
    Output(#[source] serde_json::Error),

    /// An operation needed a running mesh.
    #[error("mesh is not running")]
    NotRunning,

    #[error("mesh I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One node visible on the mesh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshPeer {
    /// Virtual IPv4 address, possibly with a `/prefix` suffix. Empty while
    /// the peer has none assigned.
    pub ipv4: String,
    pub hostname: String,
    pub tunnel_protocols: Vec<String>,
}

impl MeshPeer {
    /// The virtual address with any prefix length stripped.
    pub fn ipv4_addr(&self) -> Option<Ipv4Addr> {
        let addr = self.ipv4.split('/').next()?;
        addr.parse().ok()
    }

    /// The lobby port, if this peer is a lobby server.
    pub fn server_port(&self) -> Option<u16> {
        parse_server_hostname(&self.hostname)
    }
}

/// Launch parameters for one mesh instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeshOptions {
    pub network_name: String,
    pub network_secret: String,
    /// Hostname to advertise. `None` lets the daemon pick.
    pub hostname: Option<String>,
    /// Peers to bootstrap through (`tcp://host:port`).
    pub peers: Vec<String>,
    /// Local addresses to listen on for other peers.
    pub listeners: Vec<String>,
    /// TCP ports other peers may reach through this node. Empty means the
    /// daemon's default.
    pub tcp_whitelist: Vec<u16>,
    /// UDP ports other peers may reach. `[0]` blocks all of them.
    pub udp_whitelist: Vec<u16>,
    /// Run without a TUN device; traffic flows only through port forwards.
    pub no_tun: bool,
    /// Ask the network for a virtual address.
    pub dhcp: bool,
}

impl MeshOptions {
    /// Options joining the network that belongs to `code`.
    pub fn for_room(code: &RoomCode) -> Self {
        Self {
            network_name: code.network_name(),
            network_secret: code.network_secret().to_owned(),
            no_tun: true,
            dhcp: true,
            ..Self::default()
        }
    }

    /// Options for a lobby server listening on `listen_port` and fronting
    /// a game server on `game_port`.
    pub fn for_server(code: &RoomCode, listen_port: u16, game_port: u16) -> Self {
        Self {
            hostname: Some(server_hostname(listen_port)),
            listeners: vec!["tcp://0.0.0.0:0".to_owned(), "udp://0.0.0.0:0".to_owned()],
            tcp_whitelist: vec![listen_port, game_port],
            udp_whitelist: vec![0],
            ..Self::for_room(code)
        }
    }

    pub fn with_peers(mut self, peers: impl IntoIterator<Item = String>) -> Self {
        self.peers.extend(peers);
        self
    }

    /// Command-line arguments for `easytier-core`.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.no_tun {
            args.push("--no-tun".to_owned());
        }
        if self.dhcp {
            args.push("-d".to_owned());
        }
        args.extend(["--network-name".to_owned(), self.network_name.clone()]);
        args.extend(["--network-secret".to_owned(), self.network_secret.clone()]);
        if let Some(hostname) = &self.hostname {
            args.extend(["--hostname".to_owned(), hostname.clone()]);
        }
        for port in &self.tcp_whitelist {
            args.extend(["--tcp-whitelist".to_owned(), port.to_string()]);
        }
        for port in &self.udp_whitelist {
            args.extend(["--udp-whitelist".to_owned(), port.to_string()]);
        }
        for listener in &self.listeners {
            args.extend(["--listeners".to_owned(), listener.clone()]);
        }
        for peer in &self.peers {
            args.extend(["-p".to_owned(), peer.clone()]);
        }
        args
    }
}

/// A peer-to-peer overlay network.
///
/// One instance drives at most one running network. Implementations must
/// make [`launch`](Self::launch) replace a running network rather than
/// start a second one, and make [`terminate`](Self::terminate) safe to call
/// when nothing is running.
pub trait Mesh: Send + Sync + 'static {
    /// Joins (or creates) the network described by `options`.
    async fn launch(&mut self, options: &MeshOptions) -> Result<(), MeshError>;

    /// Leaves the network. No-op when not running.
    async fn terminate(&mut self) -> Result<(), MeshError>;

    /// Lists the peers currently visible.
    async fn peer_list(&self) -> Result<Vec<MeshPeer>, MeshError>;

    /// Forwards TCP connections made to local `bind` to `destination` on
    /// the mesh.
    async fn add_port_forward(
        &self,
        bind: SocketAddr,
        destination: SocketAddr,
    ) -> Result<(), MeshError>;

    /// Removes the forward listening on `bind`.
    async fn remove_port_forward(&self, bind: SocketAddr) -> Result<(), MeshError>;
}
