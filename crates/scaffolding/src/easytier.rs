//! [`Mesh`] backed by the EasyTier binaries.
//!
//! `easytier-core` is the daemon and runs as a child process for as long
//! as the network is up. `easytier-cli` is its control tool; every query
//! runs it once with `--output json` and parses stdout. Anything written to
//! stderr is treated as failure.

use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::{Child, Command};

use crate::mesh::{Mesh, MeshError, MeshOptions, MeshPeer};

/// Drives one `easytier-core` process.
#[derive(Debug)]
pub struct EasyTier {
    core: PathBuf,
    cli: PathBuf,
    log_file: Option<PathBuf>,
    process: Option<Child>,
}

impl EasyTier {
    pub fn new(core: impl Into<PathBuf>, cli: impl Into<PathBuf>) -> Self {
        Self {
            core: core.into(),
            cli: cli.into(),
            log_file: None,
            process: None,
        }
    }

    /// Appends the daemon's stdout and stderr to `path` instead of
    /// discarding them.
    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    /// Whether a daemon started by this instance is still running.
    pub fn is_running(&mut self) -> bool {
        match self.process.as_mut().map(Child::try_wait) {
            Some(Ok(None)) => true,
            Some(Ok(Some(status))) => {
                tracing::warn!(%status, "easytier-core exited");
                self.process = None;
                false
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, "failed to poll easytier-core");
                false
            }
            None => false,
        }
    }

    fn log_stdio(path: Option<&Path>) -> Result<(Stdio, Stdio), MeshError> {
        let Some(path) = path else {
            return Ok((Stdio::null(), Stdio::null()));
        };
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let err = file.try_clone()?;
        Ok((Stdio::from(file), Stdio::from(err)))
    }

    /// Runs `easytier-cli --output json <args>` and returns its stdout.
    async fn call_cli(&self, args: &[&str]) -> Result<Vec<u8>, MeshError> {
        let output = Command::new(&self.cli)
            .arg("--output")
            .arg("json")
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| MeshError::Spawn {
                program: self.cli.display().to_string(),
                source,
            })?;

        if !output.stderr.is_empty() || !output.status.success() {
            let message = String::from_utf8_lossy(&output.stderr).trim().to_owned();
            tracing::debug!(?args, status = %output.status, %message, "easytier-cli failed");
            return Err(MeshError::Command(if message.is_empty() {
                format!("easytier-cli exited with {}", output.status)
            } else {
                message
            }));
        }
        Ok(output.stdout)
    }
}

/// One row of `easytier-cli peer`.
#[derive(Debug, Deserialize)]
struct PeerRow {
    #[serde(default)]
    ipv4: String,
    #[serde(default)]
    hostname: String,
    #[serde(default)]
    tunnel_proto: String,
}

impl From<PeerRow> for MeshPeer {
    fn from(row: PeerRow) -> Self {
        MeshPeer {
            ipv4: row.ipv4,
            hostname: row.hostname,
            tunnel_protocols: row
                .tunnel_proto
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_owned)
                .collect(),
        }
    }
}

fn parse_peer_list(stdout: &[u8]) -> Result<Vec<MeshPeer>, MeshError> {
    let rows: Vec<PeerRow> = serde_json::from_slice(stdout).map_err(MeshError::Output)?;
    Ok(rows.into_iter().map(MeshPeer::from).collect())
}

impl Mesh for EasyTier {
    async fn launch(&mut self, options: &MeshOptions) -> Result<(), MeshError> {
        self.terminate().await?;

        let (stdout, stderr) = Self::log_stdio(self.log_file.as_deref())?;
        let child = Command::new(&self.core)
            .args(options.to_args())
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| MeshError::Spawn {
                program: self.core.display().to_string(),
                source,
            })?;

        tracing::info!(
            pid = ?child.id(),
            network = %options.network_name,
            hostname = ?options.hostname,
            "easytier-core started"
        );
        self.process = Some(child);
        Ok(())
    }

    async fn terminate(&mut self) -> Result<(), MeshError> {
        let Some(mut child) = self.process.take() else {
            return Ok(());
        };
        // An already-exited child makes kill fail with InvalidInput; the
        // wait below still reaps it.
        if let Err(e) = child.start_kill() {
            tracing::debug!(error = %e, "easytier-core already gone");
        }
        let status = child.wait().await?;
        tracing::info!(%status, "easytier-core stopped");
        Ok(())
    }

    async fn peer_list(&self) -> Result<Vec<MeshPeer>, MeshError> {
        if self.process.is_none() {
            return Err(MeshError::NotRunning);
        }
        parse_peer_list(&self.call_cli(&["peer"]).await?)
    }

    async fn add_port_forward(
        &self,
        bind: SocketAddr,
        destination: SocketAddr,
    ) -> Result<(), MeshError> {
        if self.process.is_none() {
            return Err(MeshError::NotRunning);
        }
        let (bind_arg, dest_arg) = (bind.to_string(), destination.to_string());
        self.call_cli(&["port-forward", "add", "tcp", &bind_arg, &dest_arg])
            .await?;
        tracing::info!(%bind, %destination, "port forward added");
        Ok(())
    }

    async fn remove_port_forward(&self, bind: SocketAddr) -> Result<(), MeshError> {
        if self.process.is_none() {
            return Err(MeshError::NotRunning);
        }
        let bind_arg = bind.to_string();
        self.call_cli(&["port-forward", "remove", "tcp", &bind_arg])
            .await?;
        tracing::debug!(%bind, "port forward removed");
        Ok(())
    }
}
