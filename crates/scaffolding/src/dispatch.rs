//! Request dispatch: type name → handler.
//!
//! Handlers are plain closures stored behind `Arc`, so extensions can be
//! registered at any time, including while the server is running. A
//! handler gets the lobby state for the duration of one call only:
//!
//! ```text
//! read_request ──→ lock lobby ──→ Dispatcher::dispatch ──→ handler(ctx, body)
//!                                                              │
//! write_response ←── unlock ←───────── Response ←──────────────┘
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use scaffolding_protocol::{request, status, ByteBuffer, Member, Request, Response};
use scaffolding_transport::ConnectionId;

use crate::lobby::Lobby;
use crate::ScaffoldingError;

/// What a handler sees besides the request body.
pub struct RequestContext<'a> {
    /// The connection the request arrived on.
    pub connection: ConnectionId,
    /// Mutable lobby state, locked for the duration of the call.
    pub lobby: &'a mut Lobby,
    protocols: &'a [String],
}

impl RequestContext<'_> {
    /// The member this connection speaks for, once it has pinged.
    pub fn member(&self) -> Option<&Member> {
        self.lobby.member_for(self.connection)
    }

    /// Every registered request type, in registration order.
    pub fn protocols(&self) -> &[String] {
        self.protocols
    }
}

/// A request handler.
///
/// Returning `Err` drops the connection, except for membership conflicts,
/// which are answered with [`status::MEMBER_CONFLICT`].
pub type Handler = Arc<
    dyn Fn(&mut RequestContext<'_>, &mut ByteBuffer) -> Result<Response, ScaffoldingError>
        + Send
        + Sync,
>;

/// Routes requests to handlers by type name.
#[derive(Clone, Default)]
pub struct Dispatcher {
    handlers: HashMap<String, Handler>,
    order: Vec<String>,
}

impl Dispatcher {
    /// A dispatcher with no handlers at all.
    pub fn new() -> Self {
        Self::default()
    }

    /// A dispatcher with the five `c:` request types registered.
    pub fn with_built_ins() -> Self {
        let mut dispatcher = Self::new();
        dispatcher.register(request::PING, handle_ping);
        dispatcher.register(request::PROTOCOLS, handle_protocols);
        dispatcher.register(request::SERVER_PORT, handle_server_port);
        dispatcher.register(request::PLAYER_PING, handle_player_ping);
        dispatcher.register(request::PLAYER_PROFILES_LIST, handle_player_profiles_list);
        dispatcher
    }

    /// Registers `handler` for `kind`, replacing any previous handler.
    pub fn register<F>(&mut self, kind: impl Into<String>, handler: F)
    where
        F: Fn(&mut RequestContext<'_>, &mut ByteBuffer) -> Result<Response, ScaffoldingError>
            + Send
            + Sync
            + 'static,
    {
        let kind = kind.into();
        if self.handlers.insert(kind.clone(), Arc::new(handler)).is_none() {
            self.order.push(kind);
        } else {
            tracing::debug!(%kind, "request handler replaced");
        }
    }

    /// Registered request types, in registration order.
    pub fn protocols(&self) -> &[String] {
        &self.order
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Runs the handler for `request`.
    ///
    /// Unknown types are answered with [`status::UNKNOWN_REQUEST`];
    /// membership conflicts with [`status::MEMBER_CONFLICT`]. Any other
    /// handler error is returned and should end the connection.
    pub fn dispatch(
        &self,
        connection: ConnectionId,
        lobby: &mut Lobby,
        request: &Request,
    ) -> Result<Response, ScaffoldingError> {
        let Some(handler) = self.handlers.get(&request.kind) else {
            tracing::debug!(%connection, kind = %request.kind, "unknown request type");
            return Ok(Response::unknown_request(&request.kind));
        };

        let mut ctx = RequestContext {
            connection,
            lobby,
            protocols: &self.order,
        };
        let mut body = ByteBuffer::from_bytes(request.body.clone());

        match handler(&mut ctx, &mut body) {
            Ok(response) => {
                tracing::debug!(
                    %connection,
                    kind = %request.kind,
                    status = response.status,
                    "request handled"
                );
                Ok(response)
            }
            Err(e) if e.is_member_conflict() => {
                tracing::warn!(%connection, error = %e, "player ping rejected");
                Ok(Response::failure(status::MEMBER_CONFLICT, &e.to_string()))
            }
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("protocols", &self.order)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Built-in handlers
// ---------------------------------------------------------------------------

fn handle_ping(
    _ctx: &mut RequestContext<'_>,
    body: &mut ByteBuffer,
) -> Result<Response, ScaffoldingError> {
    Ok(Response::ok(body.read_remaining().to_vec()))
}

fn handle_protocols(
    ctx: &mut RequestContext<'_>,
    body: &mut ByteBuffer,
) -> Result<Response, ScaffoldingError> {
    let theirs = String::from_utf8_lossy(body.read_remaining()).into_owned();
    tracing::debug!(
        connection = %ctx.connection,
        protocols = %theirs.replace('\0', ","),
        "client protocols"
    );
    Ok(Response::ok(ctx.protocols().join("\0").into_bytes()))
}

fn handle_server_port(
    ctx: &mut RequestContext<'_>,
    _body: &mut ByteBuffer,
) -> Result<Response, ScaffoldingError> {
    let Some(port) = ctx.lobby.room().server_port() else {
        return Ok(Response::failure(
            status::SERVER_PORT_UNKNOWN,
            "game server port is not known yet",
        ));
    };
    let mut buf = ByteBuffer::new();
    buf.write_u16(port);
    Ok(Response::ok(buf.into_bytes()))
}

fn handle_player_ping(
    ctx: &mut RequestContext<'_>,
    body: &mut ByteBuffer,
) -> Result<Response, ScaffoldingError> {
    let member = Member::from_json(body.read_remaining())?;
    ctx.lobby.player_ping(ctx.connection, &member)?;
    Ok(Response::ok(Vec::new()))
}

fn handle_player_profiles_list(
    ctx: &mut RequestContext<'_>,
    _body: &mut ByteBuffer,
) -> Result<Response, ScaffoldingError> {
    Ok(Response::ok(Member::list_to_json(ctx.lobby.room().members())?))
}

#[cfg(test)]
mod tests {
    use scaffolding_protocol::{MemberKind, ProtocolError};
    use scaffolding_room::Room;

    use super::*;

    fn cid(id: u64) -> ConnectionId {
        ConnectionId::new(id)
    }

    fn lobby() -> Lobby {
        let mut room = Room::with_host(&Member::new("Host", "abc", "v1", MemberKind::Host));
        room.set_server_port(25565);
        Lobby::new(room)
    }

    fn guest_ping() -> Request {
        let guest = Member::new("Guest", "xyz", "v2", MemberKind::Guest);
        Request::new(request::PLAYER_PING, guest.to_json().unwrap())
    }

    #[test]
    fn test_dispatch_ping_echoes_body() {
        let dispatcher = Dispatcher::with_built_ins();

        let response = dispatcher
            .dispatch(cid(1), &mut lobby(), &Request::new("c:ping", b"hello".to_vec()))
            .unwrap();

        assert!(response.is_ok());
        assert_eq!(response.body, b"hello");
    }

    #[test]
    fn test_dispatch_protocols_lists_registered_in_order() {
        let mut dispatcher = Dispatcher::with_built_ins();
        dispatcher.register("x:custom", |_, _| Ok(Response::ok(Vec::new())));

        let response = dispatcher
            .dispatch(cid(1), &mut lobby(), &Request::new("c:protocols", b"c:ping".to_vec()))
            .unwrap();

        assert_eq!(
            response.text().unwrap(),
            "c:ping\0c:protocols\0c:server_port\0c:player_ping\0c:player_profiles_list\0x:custom"
        );
    }

    #[test]
    fn test_dispatch_server_port_is_big_endian() {
        let dispatcher = Dispatcher::with_built_ins();

        let response = dispatcher
            .dispatch(cid(1), &mut lobby(), &Request::empty("c:server_port"))
            .unwrap();

        assert_eq!(response.status, 0);
        assert_eq!(response.body, [0x63u8, 0xDD]);
    }

    #[test]
    fn test_dispatch_server_port_unknown_is_status_32() {
        let dispatcher = Dispatcher::with_built_ins();
        let mut lobby = Lobby::default();

        let response = dispatcher
            .dispatch(cid(1), &mut lobby, &Request::empty("c:server_port"))
            .unwrap();

        assert_eq!(response.status, status::SERVER_PORT_UNKNOWN);
    }

    #[test]
    fn test_dispatch_player_ping_then_list_includes_guest() {
        let dispatcher = Dispatcher::with_built_ins();
        let mut lobby = lobby();

        let ping = dispatcher.dispatch(cid(1), &mut lobby, &guest_ping()).unwrap();
        let list = dispatcher
            .dispatch(cid(1), &mut lobby, &Request::empty("c:player_profiles_list"))
            .unwrap();

        assert!(ping.is_ok());
        assert!(ping.body.is_empty());
        let members = Member::list_from_json(&list.body).unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[1].kind(), MemberKind::Guest);
    }

    #[test]
    fn test_dispatch_player_ping_conflict_is_status_33() {
        let dispatcher = Dispatcher::with_built_ins();
        let mut lobby = lobby();
        dispatcher.dispatch(cid(1), &mut lobby, &guest_ping()).unwrap();

        let response = dispatcher.dispatch(cid(2), &mut lobby, &guest_ping()).unwrap();

        assert_eq!(response.status, status::MEMBER_CONFLICT);
        assert!(response.text().unwrap().contains("xyz"));
    }

    #[test]
    fn test_dispatch_player_ping_bad_json_is_error() {
        let dispatcher = Dispatcher::with_built_ins();

        let result = dispatcher.dispatch(
            cid(1),
            &mut lobby(),
            &Request::new("c:player_ping", b"{not json".to_vec()),
        );

        assert!(matches!(
            result,
            Err(ScaffoldingError::Protocol(ProtocolError::Decode(_)))
        ));
    }

    #[test]
    fn test_dispatch_unknown_type_is_status_255() {
        let dispatcher = Dispatcher::with_built_ins();

        let response = dispatcher
            .dispatch(cid(1), &mut lobby(), &Request::empty("x:unknown"))
            .unwrap();

        assert_eq!(response.status, status::UNKNOWN_REQUEST);
    }

    #[test]
    fn test_register_replaces_handler_without_duplicating_name() {
        let mut dispatcher = Dispatcher::with_built_ins();
        dispatcher.register("c:ping", |_, _| Ok(Response::ok(b"pong".to_vec())));

        let response = dispatcher
            .dispatch(cid(1), &mut lobby(), &Request::empty("c:ping"))
            .unwrap();

        assert_eq!(response.body, b"pong");
        assert_eq!(dispatcher.protocols().len(), 5);
    }

    #[test]
    fn test_custom_handler_sees_member_after_ping() {
        let mut dispatcher = Dispatcher::with_built_ins();
        dispatcher.register("x:whoami", |ctx, _| {
            let name = ctx.member().map(|m| m.name().to_owned()).unwrap_or_default();
            Ok(Response::ok(name.into_bytes()))
        });
        let mut lobby = lobby();

        let before = dispatcher
            .dispatch(cid(1), &mut lobby, &Request::empty("x:whoami"))
            .unwrap();
        dispatcher.dispatch(cid(1), &mut lobby, &guest_ping()).unwrap();
        let after = dispatcher
            .dispatch(cid(1), &mut lobby, &Request::empty("x:whoami"))
            .unwrap();

        assert!(before.body.is_empty());
        assert_eq!(after.body, b"Guest");
    }
}
