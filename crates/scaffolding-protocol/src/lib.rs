//! Wire protocol for the Scaffolding lobby.
//!
//! This crate defines what clients and servers put on the wire:
//!
//! - **Byte buffers** ([`ByteBuffer`]): cursor-based big-endian reads and
//!   writes that fail instead of running off the end.
//! - **Frames** ([`Request`], [`Response`], [`read_request`],
//!   [`exchange`], …): the length-prefixed request/response format.
//! - **Room codes** ([`RoomCode`]): the checksummed session identifier.
//! - **Members** ([`Member`], [`MemberKind`]): the JSON records exchanged
//!   by `c:player_ping` and `c:player_profiles_list`.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! ```text
//! Transport (byte stream) → Protocol (frames, members) → Session / Room
//! ```
//!
//! Nothing here knows about connections' owners or room membership rules.

mod buffer;
mod error;
mod frame;
mod room_code;
mod types;

pub use buffer::ByteBuffer;
pub use error::ProtocolError;
pub use frame::{
    exchange, read_request, read_response, write_request, write_response,
    ReadLimits, Request, Response, MAX_TYPE_NAME_LEN,
};
pub use room_code::{RoomCode, ALPHABET};
pub use types::{request, status, Member, MemberKind};
