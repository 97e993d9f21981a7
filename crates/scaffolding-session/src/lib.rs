//! Connection identity tracking for Scaffolding lobby servers.
//!
//! A lobby connection starts anonymous. The first `c:player_ping` it sends
//! binds it to a machine identifier, and that binding lasts until the
//! connection is torn down. This crate keeps those bindings:
//!
//! 1. **Binding**: [`SessionManager::bind`] records `connection → machine`
//!    and refuses impersonation or mid-session identity changes.
//! 2. **Lookup**: which machine a connection speaks for, and which
//!    connection owns a machine.
//! 3. **Release**: [`SessionManager::release`] frees the machine id for
//!    reuse when the connection goes away.
//!
//! # How it fits in the stack
//!
//! ```text
//! Lobby (above)      ← combines sessions with the room roster
//!     ↕
//! Session (this crate)  ← who is on which connection
//!     ↕
//! Transport (below)  ← provides ConnectionId
//! ```

mod error;
mod manager;
mod session;

pub use error::SessionError;
pub use manager::SessionManager;
pub use session::{Binding, Session};
