//! The guest side of a lobby.
//!
//! ```text
//! Idle ──connect()──→ Discovering ──→ Connected ──handshake──→ Active
//!   │                     │               │                      │
//!   └─────────────────────┴──── failure / stop() ────────────────┴──→ Stopped
//! ```
//!
//! Once [`Client::connect`] returns, the caller must invoke
//! [`Client::heartbeat`] at least every 5 seconds; the server drops
//! connections that stay silent for longer than its read timeout.
//!
//! A request that fails (usually a timeout) leaves its answer in flight.
//! The next request first resynchronises the stream with a nonce
//! `c:ping`; if that fails the client stops and reports
//! [`ScaffoldingError::RoomClosed`].

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use rand::Rng;
use scaffolding_protocol::{
    exchange, read_response, request, status, write_request, Member, ReadLimits, Request,
    Response, RoomCode,
};
use scaffolding_room::Room;
use scaffolding_transport::{
    allocate_port, with_timeout, Connection, TcpConnection, TransportError,
};

use crate::mesh::{Mesh, MeshOptions};
use crate::{ClientConfig, ScaffoldingError};

/// Where a [`Client`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Idle,
    /// Mesh launched, looking for the lobby server among the peers.
    Discovering,
    /// TCP connection open, handshake in progress.
    Connected,
    /// Handshake done; heartbeats expected.
    Active,
    Stopped,
}

/// A guest connection to one lobby.
pub struct Client<M: Mesh> {
    mesh: M,
    config: ClientConfig,
    player: Member,
    room_code: String,
    state: ClientState,
    connection: Option<TcpConnection>,
    /// False after a failed exchange until a resync succeeds.
    in_sync: bool,
    room: Room,
    server_protocols: Vec<String>,
    forwards: Vec<SocketAddr>,
    local_game_port: Option<u16>,
}

impl<M: Mesh> Client<M> {
    /// Creates an idle client for `room_code`. Nothing touches the network
    /// until [`connect`](Self::connect).
    pub fn new(mesh: M, player: Member, room_code: impl Into<String>, config: ClientConfig) -> Self {
        Self {
            mesh,
            config,
            player,
            room_code: room_code.into(),
            state: ClientState::Idle,
            connection: None,
            in_sync: true,
            room: Room::new(),
            server_protocols: Vec::new(),
            forwards: Vec::new(),
            local_game_port: None,
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    /// The roster and server port as of the last successful refresh.
    pub fn room(&self) -> &Room {
        &self.room
    }

    /// Request types the server announced in `c:protocols`.
    pub fn server_protocols(&self) -> &[String] {
        &self.server_protocols
    }

    /// Local port forwarded to the host's game server. Point the game
    /// client at `127.0.0.1:<port>`.
    pub fn local_game_port(&self) -> Option<u16> {
        self.local_game_port
    }

    pub fn player(&self) -> &Member {
        &self.player
    }

    /// Joins the room: validates the code, finds the lobby server on the
    /// mesh, connects and performs the handshake.
    ///
    /// On any failure after the mesh was launched the client is stopped
    /// before the error is returned.
    ///
    /// # Errors
    /// - [`InvalidRoomCode`](scaffolding_protocol::ProtocolError::InvalidRoomCode) without any network
    ///   activity.
    /// - [`ScaffoldingError::DiscoveryTimeout`] if no server shows up.
    /// - [`ScaffoldingError::MemberConflict`] if the server refuses us.
    /// - [`ScaffoldingError::ConnectionUnavailable`] unless the client is
    ///   idle.
    pub async fn connect(&mut self) -> Result<(), ScaffoldingError> {
        if self.state != ClientState::Idle {
            return Err(ScaffoldingError::ConnectionUnavailable);
        }
        let code = RoomCode::parse(&self.room_code)?;

        match self.establish(&code).await {
            Ok(()) => {
                self.state = ClientState::Active;
                tracing::info!(room_code = %code, members = self.room.len(), "joined room");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(room_code = %code, error = %e, "failed to join room");
                if let Err(stop_err) = self.stop().await {
                    tracing::warn!(error = %stop_err, "cleanup after failed join");
                }
                Err(e)
            }
        }
    }

    async fn establish(&mut self, code: &RoomCode) -> Result<(), ScaffoldingError> {
        self.state = ClientState::Discovering;
        let options =
            MeshOptions::for_room(code).with_peers(self.config.relay_peers.iter().cloned());
        self.mesh.launch(&options).await?;

        let server = self.discover().await?;
        tracing::info!(%server, "lobby server found");

        let lobby_addr = self.forward(server).await?;
        let conn = TcpConnection::connect(lobby_addr, self.config.connect_timeout).await?;
        self.connection = Some(conn);
        self.in_sync = true;
        self.state = ClientState::Connected;

        self.handshake(*server.ip()).await
    }

    /// Polls the peer list until a lobby server with an address appears.
    async fn discover(&self) -> Result<SocketAddrV4, ScaffoldingError> {
        let attempts = self.config.discovery_attempts;
        for attempt in 1..=attempts {
            tokio::time::sleep(self.config.discovery_interval).await;

            let peers = match self.mesh.peer_list().await {
                Ok(peers) => peers,
                Err(e) => {
                    tracing::debug!(attempt, error = %e, "peer list unavailable");
                    continue;
                }
            };
            let found = peers
                .iter()
                .find_map(|peer| Some(SocketAddrV4::new(peer.ipv4_addr()?, peer.server_port()?)));
            if let Some(server) = found {
                return Ok(server);
            }
            tracing::debug!(attempt, peers = peers.len(), "no lobby server yet");
        }
        Err(ScaffoldingError::DiscoveryTimeout { attempts })
    }

    /// Forwards a local port to `remote` and returns the local address.
    async fn forward(&mut self, remote: SocketAddrV4) -> Result<SocketAddr, ScaffoldingError> {
        let local = allocate_port(remote.port())?;
        let bind = SocketAddr::from((Ipv4Addr::LOCALHOST, local));
        self.mesh.add_port_forward(bind, remote.into()).await?;
        self.forwards.push(bind);
        Ok(bind)
    }

    async fn handshake(&mut self, server_ip: Ipv4Addr) -> Result<(), ScaffoldingError> {
        self.player_ping().await?;
        self.refresh_members().await?;

        let ours = self.config.protocols.join("\0");
        let response = self.expect_ok(request::PROTOCOLS, ours.into_bytes()).await?;
        self.server_protocols = split_protocols(&response.body);

        let response = self.expect_ok(request::SERVER_PORT, Vec::new()).await?;
        let game_port = response.body_buffer().read_u16()?;
        self.room.set_server_port(game_port);

        let game_forward = self
            .forward(SocketAddrV4::new(server_ip, game_port))
            .await?;
        self.local_game_port = Some(game_forward.port());

        if self.config.verify_game_server {
            let probe = TcpConnection::connect(game_forward, self.config.connect_timeout).await?;
            if let Err(e) = probe.close().await {
                tracing::debug!(error = %e, "closing game server probe failed");
            }
            tracing::debug!(%game_forward, "game server reachable");
        }
        Ok(())
    }

    /// Announces this player and refreshes the roster.
    ///
    /// If the announcement times out while we still know of other
    /// members, a short `c:ping` probe decides whether the server is
    /// merely slow (the heartbeat succeeds) or gone (the client stops and
    /// [`ScaffoldingError::RoomClosed`] is returned).
    pub async fn heartbeat(&mut self) -> Result<(), ScaffoldingError> {
        if self.state != ClientState::Active {
            return Err(ScaffoldingError::ConnectionUnavailable);
        }

        match self.player_ping().await {
            Ok(()) => self.refresh_members().await,
            Err(e) if e.is_timeout() && !self.room.is_empty() => {
                tracing::warn!(error = %e, "heartbeat timed out, probing server");
                self.resync().await?;
                tracing::info!("server answered liveness probe");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Sends an arbitrary request and returns the raw response, whatever
    /// its status.
    pub async fn send_request(
        &mut self,
        kind: &str,
        body: impl Into<Vec<u8>>,
    ) -> Result<Response, ScaffoldingError> {
        if self.state != ClientState::Active {
            return Err(ScaffoldingError::ConnectionUnavailable);
        }
        self.request(kind, body.into()).await
    }

    /// Leaves the room: closes the lobby connection, removes the port
    /// forwards and terminates the mesh. Safe to call repeatedly.
    pub async fn stop(&mut self) -> Result<(), ScaffoldingError> {
        if self.state == ClientState::Stopped {
            return Ok(());
        }
        self.state = ClientState::Stopped;

        if let Some(conn) = self.connection.take() {
            if let Err(e) = conn.close().await {
                tracing::debug!(error = %e, "closing lobby connection failed");
            }
        }
        for bind in self.forwards.drain(..) {
            if let Err(e) = self.mesh.remove_port_forward(bind).await {
                tracing::debug!(%bind, error = %e, "removing port forward failed");
            }
        }
        self.local_game_port = None;
        self.mesh.terminate().await?;
        tracing::info!("left room");
        Ok(())
    }

    async fn player_ping(&mut self) -> Result<(), ScaffoldingError> {
        let body = self.player.to_json()?;
        self.expect_ok(request::PLAYER_PING, body).await?;
        Ok(())
    }

    async fn refresh_members(&mut self) -> Result<(), ScaffoldingError> {
        let response = self
            .expect_ok(request::PLAYER_PROFILES_LIST, Vec::new())
            .await?;
        self.room.replace_members(Member::list_from_json(&response.body)?);
        Ok(())
    }

    /// Brings the stream back in step after a failed exchange: a `c:ping`
    /// with a random nonce, skipping stale responses until the echo
    /// arrives.
    ///
    /// A poisoned connection, a closed one or a silent server cannot be
    /// recovered; the client stops and [`ScaffoldingError::RoomClosed`]
    /// is returned.
    async fn resync(&mut self) -> Result<(), ScaffoldingError> {
        let outcome: Result<(), ScaffoldingError> = match self.connection.as_ref() {
            Some(conn) if conn.is_poisoned() => Err(TransportError::Desynchronized.into()),
            Some(conn) => {
                let nonce: [u8; 8] = rand::rng().random();
                with_timeout(
                    self.config.liveness_timeout,
                    await_echo(conn, &nonce, &self.config.read_limits),
                )
                .await
            }
            None => Err(ScaffoldingError::ConnectionUnavailable),
        };

        match outcome {
            Ok(()) => {
                self.in_sync = true;
                tracing::debug!("stream resynchronised");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "server unresponsive, leaving room");
                self.stop().await?;
                Err(ScaffoldingError::RoomClosed)
            }
        }
    }

    /// One round trip. A failed exchange marks the stream out of step, and
    /// the next call resynchronises before sending.
    async fn request(&mut self, kind: &str, body: Vec<u8>) -> Result<Response, ScaffoldingError> {
        if !self.in_sync {
            self.resync().await?;
        }
        let conn = self
            .connection
            .as_ref()
            .ok_or(ScaffoldingError::ConnectionUnavailable)?;
        let result = exchange(
            conn,
            &Request::new(kind, body),
            self.config.request_timeout,
            &self.config.read_limits,
        )
        .await;
        if let Err(e) = &result {
            tracing::debug!(kind, error = %e, "exchange failed, stream out of step");
            self.in_sync = false;
        }
        Ok(result?)
    }

    /// Like [`request`](Self::request), but a nonzero status is an error.
    async fn expect_ok(&mut self, kind: &str, body: Vec<u8>) -> Result<Response, ScaffoldingError> {
        let response = self.request(kind, body).await?;
        match response.status {
            status::OK => Ok(response),
            status::MEMBER_CONFLICT if kind == request::PLAYER_PING => Err(
                ScaffoldingError::MemberConflict(response.text().unwrap_or_default().to_owned()),
            ),
            status => Err(ScaffoldingError::Rejected {
                kind: kind.to_owned(),
                status,
                message: String::from_utf8_lossy(&response.body).into_owned(),
            }),
        }
    }
}

async fn await_echo(
    conn: &TcpConnection,
    nonce: &[u8],
    limits: &ReadLimits,
) -> Result<(), ScaffoldingError> {
    write_request(conn, &Request::new(request::PING, nonce.to_vec())).await?;
    loop {
        let response = read_response(conn, limits).await?;
        if response.is_ok() && response.body == nonce {
            return Ok(());
        }
        tracing::debug!(status = response.status, "discarding stale response");
    }
}

fn split_protocols(body: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(body)
        .split('\0')
        .filter(|p| !p.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_protocols_drops_empty_entries() {
        assert_eq!(
            split_protocols(b"c:ping\0c:protocols\0\0x:ext"),
            ["c:ping", "c:protocols", "x:ext"]
        );
        assert!(split_protocols(b"").is_empty());
    }
}
