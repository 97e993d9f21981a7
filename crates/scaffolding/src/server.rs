//! `Server` builder and accept loop.
//!
//! This is the host side of a lobby. It ties the layers together:
//! transport → protocol → dispatcher → lobby (sessions + room), and owns
//! the mesh instance that makes the listener reachable.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use scaffolding_protocol::{ByteBuffer, Member, ReadLimits, Response, RoomCode};
use scaffolding_room::Room;
use scaffolding_transport::{Connection, ConnectionId, Latch, TcpTransport, Transport};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::dispatch::{Dispatcher, RequestContext};
use crate::handler::handle_connection;
use crate::lobby::Lobby;
use crate::mesh::{Mesh, MeshOptions};
use crate::{ScaffoldingError, ServerConfig};

/// Pause after a failed accept before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Everything a request handler may touch, behind one lock.
pub(crate) struct ServerState {
    pub(crate) lobby: Lobby,
    pub(crate) dispatcher: Dispatcher,
}

/// Shared server state passed to each connection handler task.
pub(crate) struct Shared {
    pub(crate) state: Mutex<ServerState>,
    pub(crate) read_limits: ReadLimits,
}

type ConnectionTasks = Arc<Mutex<HashMap<ConnectionId, JoinHandle<()>>>>;

/// Builder for configuring and starting a lobby server.
///
/// # Example
///
/// ```rust,ignore
/// let server = ServerBuilder::new()
///     .host(Member::new("Steve", machine_id(), "my-launcher 1.0", MemberKind::Host))
///     .server_port(25565)
///     .bind(EasyTier::new(core, cli))
///     .await?;
/// server.create_room(&RoomCode::generate()).await?;
/// ```
pub struct ServerBuilder {
    config: ServerConfig,
    host: Option<Member>,
    server_port: Option<u16>,
    dispatcher: Dispatcher,
}

impl ServerBuilder {
    /// Creates a new builder with default settings and the built-in
    /// request handlers.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            host: None,
            server_port: None,
            dispatcher: Dispatcher::with_built_ins(),
        }
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the port tried first for the lobby listener.
    pub fn listen_port(mut self, port: u16) -> Self {
        self.config.listen_port = port;
        self
    }

    /// Sets the member listed first in the room, as host.
    pub fn host(mut self, host: Member) -> Self {
        self.host = Some(host);
        self
    }

    /// Sets the game server port if it is already known.
    pub fn server_port(mut self, port: u16) -> Self {
        self.server_port = Some(port);
        self
    }

    /// Registers an extension request handler.
    pub fn handler<F>(mut self, kind: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut RequestContext<'_>, &mut ByteBuffer) -> Result<Response, ScaffoldingError>
            + Send
            + Sync
            + 'static,
    {
        self.dispatcher.register(kind, handler);
        self
    }

    /// Binds the listener and starts accepting connections.
    ///
    /// The preferred listen port falls back to an OS-assigned one. The mesh
    /// is not launched until [`Server::create_room`].
    pub async fn bind<M: Mesh>(self, mesh: M) -> Result<Server<M>, ScaffoldingError> {
        let transport =
            TcpTransport::bind_or_ephemeral(Ipv4Addr::UNSPECIFIED.into(), self.config.listen_port)
                .await?;
        let local_addr = transport.local_addr();

        let mut room = self.host.as_ref().map(Room::with_host).unwrap_or_default();
        if let Some(port) = self.server_port {
            room.set_server_port(port);
        }

        let shared = Arc::new(Shared {
            state: Mutex::new(ServerState {
                lobby: Lobby::new(room),
                dispatcher: self.dispatcher,
            }),
            read_limits: self.config.read_limits,
        });
        let shutdown = Latch::new();
        let connections: ConnectionTasks = Arc::default();

        let accept_task = tokio::spawn(accept_loop(
            transport,
            Arc::clone(&shared),
            Arc::clone(&connections),
            shutdown.clone(),
        ));

        tracing::info!(addr = %local_addr, "lobby server running");

        Ok(Server {
            local_addr,
            config: self.config,
            shared,
            shutdown,
            accept_task: Mutex::new(Some(accept_task)),
            connections,
            mesh: Mutex::new(mesh),
            room_code: Mutex::new(None),
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running lobby server.
///
/// Dropping it without [`stop`](Self::stop) signals every task to finish
/// but does not wait for them.
pub struct Server<M: Mesh> {
    local_addr: SocketAddr,
    config: ServerConfig,
    shared: Arc<Shared>,
    shutdown: Latch<()>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    connections: ConnectionTasks,
    mesh: Mutex<M>,
    room_code: Mutex<Option<RoomCode>>,
}

impl<M: Mesh> Server<M> {
    /// Returns the local address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// A snapshot of the room.
    pub async fn room(&self) -> Room {
        self.shared.state.lock().await.lobby.room().clone()
    }

    /// The code the room was announced under, once [`create_room`]
    /// succeeded.
    ///
    /// [`create_room`]: Self::create_room
    pub async fn room_code(&self) -> Option<RoomCode> {
        self.room_code.lock().await.clone()
    }

    /// Number of live lobby connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.lock().await.len()
    }

    /// Registers an extension request handler on the running server.
    pub async fn register<F>(&self, kind: impl Into<String>, handler: F)
    where
        F: Fn(&mut RequestContext<'_>, &mut ByteBuffer) -> Result<Response, ScaffoldingError>
            + Send
            + Sync
            + 'static,
    {
        self.shared.state.lock().await.dispatcher.register(kind, handler);
    }

    /// Launches the mesh for `code`, advertising this listener.
    ///
    /// # Errors
    /// [`ScaffoldingError::ServerPortUnknown`] until the game server port
    /// is set, since the mesh only forwards whitelisted ports.
    pub async fn create_room(&self, code: &RoomCode) -> Result<(), ScaffoldingError> {
        let game_port = self
            .shared
            .state
            .lock()
            .await
            .lobby
            .room()
            .server_port()
            .ok_or(ScaffoldingError::ServerPortUnknown)?;

        self.launch_mesh(code, game_port).await?;
        *self.room_code.lock().await = Some(code.clone());
        tracing::info!(room_code = %code, port = self.port(), game_port, "room created");
        Ok(())
    }

    /// Records the game server port.
    ///
    /// If the room is already announced under a different port, the mesh
    /// is relaunched so the new port is whitelisted.
    pub async fn set_server_port(&self, port: u16) -> Result<(), ScaffoldingError> {
        let previous = self
            .shared
            .state
            .lock()
            .await
            .lobby
            .room_mut()
            .set_server_port(port);

        if previous == Some(port) {
            return Ok(());
        }
        let code = self.room_code.lock().await.clone();
        if let Some(code) = code {
            self.launch_mesh(&code, port).await?;
        }
        Ok(())
    }

    async fn launch_mesh(&self, code: &RoomCode, game_port: u16) -> Result<(), ScaffoldingError> {
        let options = MeshOptions::for_server(code, self.port(), game_port)
            .with_peers(self.config.relay_peers.iter().cloned());
        self.mesh.lock().await.launch(&options).await?;
        Ok(())
    }

    /// Whether [`stop`](Self::stop) has been called.
    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_resolved()
    }

    /// Stops the server: closes the listener, tears down every connection
    /// and terminates the mesh. Returns once all of that is done.
    /// Subsequent calls do nothing.
    pub async fn stop(&self) -> Result<(), ScaffoldingError> {
        if !self.shutdown.resolve(()) {
            return Ok(());
        }
        tracing::info!(port = self.port(), "stopping lobby server");

        if let Some(task) = self.accept_task.lock().await.take() {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "accept task failed");
            }
        }

        let tasks: Vec<_> = self
            .connections
            .lock()
            .await
            .drain()
            .map(|(_, task)| task)
            .collect();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "connection task failed");
            }
        }

        self.mesh.lock().await.terminate().await?;
        tracing::info!("lobby server stopped");
        Ok(())
    }
}

impl<M: Mesh> Drop for Server<M> {
    fn drop(&mut self) {
        self.shutdown.resolve(());
    }
}

async fn accept_loop(
    mut transport: TcpTransport,
    shared: Arc<Shared>,
    connections: ConnectionTasks,
    shutdown: Latch<()>,
) {
    loop {
        let accepted = tokio::select! {
            _ = shutdown.wait() => break,
            accepted = transport.accept() => accepted,
        };

        match accepted {
            Ok(conn) => {
                let conn_id = conn.id();
                // Insert under the lock so the task's own removal cannot
                // run before its entry exists.
                let mut active = connections.lock().await;
                let task = tokio::spawn({
                    let shared = Arc::clone(&shared);
                    let shutdown = shutdown.clone();
                    let connections = Arc::clone(&connections);
                    async move {
                        handle_connection(conn, shared, shutdown).await;
                        connections.lock().await.remove(&conn_id);
                    }
                });
                active.insert(conn_id, task);
                tracing::info!(%conn_id, active = active.len(), "connection accepted");
            }
            Err(e) => {
                tracing::error!(error = %e, "accept failed");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }

    if let Err(e) = transport.shutdown().await {
        tracing::debug!(error = %e, "transport shutdown failed");
    }
    tracing::debug!(addr = %transport.local_addr(), "listener closed");
}
