//! Per-connection handler: read a request, dispatch it, answer it.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Read one request frame (bounded by the read timeout)
//!   2. Lock the server state, dispatch, unlock
//!   3. Write exactly one response
//!   4. Repeat until the peer closes, something fails, or the server stops
//!
//! Whatever ends the loop, teardown runs: the connection's identity
//! binding and its guest entry are dropped and the stream is closed.

use std::sync::Arc;

use scaffolding_protocol::{read_request, write_response, Request};
use scaffolding_transport::{Connection, ConnectionId, Latch, TcpConnection};

use crate::server::Shared;
use crate::ScaffoldingError;

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection(
    conn: TcpConnection,
    shared: Arc<Shared>,
    shutdown: Latch<()>,
) {
    let conn_id = conn.id();
    tracing::debug!(%conn_id, peer = %conn.peer_addr(), "handling new connection");

    match serve(&conn, &shared, &shutdown).await {
        Ok(()) => tracing::debug!(%conn_id, "connection loop finished"),
        Err(e) => tracing::warn!(%conn_id, error = %e, "connection dropped"),
    }

    teardown(&conn, &shared).await;
}

/// The request/response loop. Returns `Ok` on a clean close at a frame
/// boundary or on server shutdown.
async fn serve(
    conn: &TcpConnection,
    shared: &Shared,
    shutdown: &Latch<()>,
) -> Result<(), ScaffoldingError> {
    let conn_id = conn.id();

    loop {
        let next = tokio::select! {
            _ = shutdown.wait() => {
                tracing::debug!(%conn_id, "server stopping");
                return Ok(());
            }
            next = read_request(conn, &shared.read_limits) => next?,
        };

        let Some(request) = next else {
            tracing::info!(%conn_id, "connection closed cleanly");
            return Ok(());
        };

        let response = dispatch(conn_id, shared, &request).await?;
        write_response(conn, &response).await?;
    }
}

async fn dispatch(
    conn_id: ConnectionId,
    shared: &Shared,
    request: &Request,
) -> Result<scaffolding_protocol::Response, ScaffoldingError> {
    let mut state = shared.state.lock().await;
    let state = &mut *state;
    state.dispatcher.dispatch(conn_id, &mut state.lobby, request)
}

async fn teardown(conn: &TcpConnection, shared: &Shared) {
    let conn_id = conn.id();

    let left = shared.state.lock().await.lobby.disconnect(conn_id);
    if let Some(member) = left {
        tracing::info!(%conn_id, %member, "guest removed on disconnect");
    }

    if let Err(e) = conn.close().await {
        tracing::debug!(%conn_id, error = %e, "close failed");
    }
}
