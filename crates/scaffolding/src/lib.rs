//! # Scaffolding
//!
//! Host or join Minecraft LAN sessions over the internet.
//!
//! Both sides join an EasyTier mesh derived from a room code. The host
//! runs a [`Server`] that keeps the member roster and tells guests where
//! its game server is; each guest runs a [`Client`] that finds the server
//! on the mesh, forwards the game port to localhost and heartbeats until
//! it leaves.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scaffolding::prelude::*;
//!
//! # async fn host() -> Result<(), ScaffoldingError> {
//! let me = Member::new("Steve", machine_id(), "scaffolding-rs", MemberKind::Host);
//! let server = ServerBuilder::new()
//!     .host(me)
//!     .server_port(25565)
//!     .bind(EasyTier::new("easytier-core", "easytier-cli"))
//!     .await?;
//! let code = RoomCode::generate();
//! server.create_room(&code).await?;
//! println!("room code: {code}");
//! # Ok(())
//! # }
//! ```

#![allow(async_fn_in_trait)]

mod client;
mod config;
mod dispatch;
mod easytier;
mod error;
mod handler;
mod lobby;
mod machine;
pub mod mesh;
mod server;

pub use client::{Client, ClientState};
pub use config::{ClientConfig, ServerConfig, DEFAULT_LISTEN_PORT};
pub use dispatch::{Dispatcher, Handler, RequestContext};
pub use easytier::EasyTier;
pub use error::ScaffoldingError;
pub use lobby::Lobby;
pub use machine::{hash_machine_id, machine_id};
pub use server::{Server, ServerBuilder};

pub use scaffolding_protocol as protocol;
pub use scaffolding_room as room;
pub use scaffolding_session as session;
pub use scaffolding_transport as transport;

/// Everything needed to host or join a room.
pub mod prelude {
    pub use crate::mesh::{Mesh, MeshError, MeshOptions, MeshPeer};
    pub use crate::{
        machine_id, Client, ClientConfig, ClientState, EasyTier, RequestContext,
        ScaffoldingError, Server, ServerBuilder, ServerConfig,
    };
    pub use scaffolding_protocol::{
        ByteBuffer, Member, MemberKind, Request, Response, RoomCode,
    };
    pub use scaffolding_room::Room;
}
