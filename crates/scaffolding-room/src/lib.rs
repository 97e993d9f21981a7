//! Room state for Scaffolding lobbies.
//!
//! A room is the ordered member roster plus the port of the game server
//! the host is running. The server owns the authoritative copy; clients
//! keep a mirror that they overwrite from `c:player_profiles_list`.
//!
//! # Key types
//!
//! - [`Room`]: roster and server port, with the admission rules
//! - [`Admission`]: what a successful [`Room::admit`] did
//! - [`RoomError`]: membership conflicts

mod error;
mod room;

pub use error::RoomError;
pub use room::{Admission, Room};
