//! Shared helpers for the integration tests.
//!
//! [`LoopbackMesh`] stands in for EasyTier: "peers" are whatever the test
//! advertises, and a port forward is a local TCP proxy.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use scaffolding::mesh::{server_hostname, Mesh, MeshError, MeshOptions, MeshPeer};
use scaffolding::prelude::*;
use scaffolding::protocol::{exchange, ReadLimits};
use scaffolding::transport::TcpConnection;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

#[derive(Default)]
struct MeshState {
    running: bool,
    launches: Vec<MeshOptions>,
    terminations: usize,
    peers: Vec<MeshPeer>,
    forwards: HashMap<SocketAddr, JoinHandle<()>>,
}

/// In-process mesh double. Clones share state, so a test can keep one
/// handle while the workflow owns another.
#[derive(Clone, Default)]
pub struct LoopbackMesh {
    state: Arc<Mutex<MeshState>>,
}

impl LoopbackMesh {
    /// Every test builds at least one mesh, so this is also where the log
    /// subscriber gets installed.
    pub fn new() -> Self {
        init_tracing();
        Self::default()
    }

    /// A mesh on which a lobby server listening on `port` is visible at
    /// 127.0.0.1.
    pub fn with_server(port: u16) -> Self {
        let mesh = Self::new();
        mesh.advertise(MeshPeer {
            ipv4: "127.0.0.1/8".into(),
            hostname: server_hostname(port),
            tunnel_protocols: vec!["tcp".into()],
        });
        mesh
    }

    pub fn advertise(&self, peer: MeshPeer) {
        self.state.lock().unwrap().peers.push(peer);
    }

    pub fn launches(&self) -> Vec<MeshOptions> {
        self.state.lock().unwrap().launches.clone()
    }

    pub fn terminations(&self) -> usize {
        self.state.lock().unwrap().terminations
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().unwrap().running
    }

    pub fn forward_count(&self) -> usize {
        self.state.lock().unwrap().forwards.len()
    }
}

impl Mesh for LoopbackMesh {
    async fn launch(&mut self, options: &MeshOptions) -> Result<(), MeshError> {
        self.terminate().await?;
        let mut state = self.state.lock().unwrap();
        state.running = true;
        state.launches.push(options.clone());
        Ok(())
    }

    async fn terminate(&mut self) -> Result<(), MeshError> {
        let mut state = self.state.lock().unwrap();
        if state.running {
            state.running = false;
            state.terminations += 1;
        }
        for (_, task) in state.forwards.drain() {
            task.abort();
        }
        Ok(())
    }

    async fn peer_list(&self) -> Result<Vec<MeshPeer>, MeshError> {
        let state = self.state.lock().unwrap();
        if !state.running {
            return Err(MeshError::NotRunning);
        }
        Ok(state.peers.clone())
    }

    async fn add_port_forward(
        &self,
        bind: SocketAddr,
        destination: SocketAddr,
    ) -> Result<(), MeshError> {
        let listener = TcpListener::bind(bind).await?;
        let task = tokio::spawn(async move {
            while let Ok((mut inbound, _)) = listener.accept().await {
                tokio::spawn(async move {
                    if let Ok(mut outbound) = TcpStream::connect(destination).await {
                        let _ = tokio::io::copy_bidirectional(&mut inbound, &mut outbound).await;
                    }
                });
            }
        });
        self.state.lock().unwrap().forwards.insert(bind, task);
        Ok(())
    }

    async fn remove_port_forward(&self, bind: SocketAddr) -> Result<(), MeshError> {
        if let Some(task) = self.state.lock().unwrap().forwards.remove(&bind) {
            task.abort();
        }
        Ok(())
    }
}

/// Routes `tracing` output through the test harness, filtered by
/// `RUST_LOG`. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn host() -> Member {
    Member::new("Host", "abc", "v1", MemberKind::Host)
}

pub fn guest(name: &str, machine_id: &str) -> Member {
    Member::new(name, machine_id, "v2", MemberKind::Guest)
}

/// A lobby server on an ephemeral port with `host()` and game port 25565.
pub async fn start_server() -> Server<LoopbackMesh> {
    ServerBuilder::new()
        .listen_port(0)
        .host(host())
        .server_port(25565)
        .bind(LoopbackMesh::new())
        .await
        .expect("server should bind")
}

/// A raw lobby connection to `server`.
pub async fn connect<M: Mesh>(server: &Server<M>) -> TcpConnection {
    let addr = SocketAddr::from(([127, 0, 0, 1], server.port()));
    TcpConnection::connect(addr, Duration::from_secs(5))
        .await
        .expect("should connect")
}

/// One request/response round trip on a raw connection.
pub async fn call(conn: &TcpConnection, kind: &str, body: impl Into<Vec<u8>>) -> Response {
    exchange(
        conn,
        &Request::new(kind, body),
        Duration::from_secs(5),
        &ReadLimits::default(),
    )
    .await
    .expect("round trip should succeed")
}

/// Client settings that discover quickly and use no public relay.
pub fn fast_client_config() -> ClientConfig {
    ClientConfig {
        discovery_attempts: 3,
        discovery_interval: Duration::from_millis(10),
        relay_peers: Vec::new(),
        ..ClientConfig::default()
    }
}

/// Polls `check` every 20 ms for up to 2 s.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
