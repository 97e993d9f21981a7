//! Protocol types: request names, status codes and member records.
//!
//! Members travel as JSON inside request and response bodies:
//!
//! ```text
//! {"name":"Steve","machine_id":"3f2a…","vendor":"PCL2 2.9.1","kind":"GUEST"}
//! ```
//!
//! `kind` is optional on the wire. Peers that predate it send only the
//! first three fields, and those records decode as guests.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Request type names
// ---------------------------------------------------------------------------

/// Names of the built-in request types.
pub mod request {
    /// Liveness probe; the body is echoed back.
    pub const PING: &str = "c:ping";
    /// Lists the request types the server understands.
    pub const PROTOCOLS: &str = "c:protocols";
    /// Returns the game server port.
    pub const SERVER_PORT: &str = "c:server_port";
    /// Announces (or re-announces) the caller as a room member.
    pub const PLAYER_PING: &str = "c:player_ping";
    /// Returns the member roster.
    pub const PLAYER_PROFILES_LIST: &str = "c:player_profiles_list";

    /// Every built-in type, in registration order.
    pub const BUILT_IN: [&str; 5] = [
        PING,
        PROTOCOLS,
        SERVER_PORT,
        PLAYER_PING,
        PLAYER_PROFILES_LIST,
    ];
}

// ---------------------------------------------------------------------------
// Status codes
// ---------------------------------------------------------------------------

/// Response status codes.
///
/// Only `OK` and `UNKNOWN_REQUEST` are fixed by the framing itself; the
/// rest are what the built-in handlers answer with.
pub mod status {
    pub const OK: u8 = 0;
    /// `c:server_port` before the game server port is known.
    pub const SERVER_PORT_UNKNOWN: u8 = 32;
    /// `c:player_ping` rejected by the membership rules.
    pub const MEMBER_CONFLICT: u8 = 33;
    /// No handler is registered for the request type.
    pub const UNKNOWN_REQUEST: u8 = 255;
}

// ---------------------------------------------------------------------------
// Member
// ---------------------------------------------------------------------------

/// Whether a member runs the room or joined it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum MemberKind {
    Host,
    #[default]
    Guest,
}

/// One participant in a room.
///
/// `machine_id` is the member's key within a room. A record is never
/// edited after construction: a second announcement with a different name
/// or vendor for the same machine is a conflict, not an update.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Member {
    name: String,
    machine_id: String,
    vendor: String,
    #[serde(default)]
    kind: MemberKind,
}

impl Member {
    pub fn new(
        name: impl Into<String>,
        machine_id: impl Into<String>,
        vendor: impl Into<String>,
        kind: MemberKind,
    ) -> Self {
        Self {
            name: name.into(),
            machine_id: machine_id.into(),
            vendor: vendor.into(),
            kind,
        }
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stable per-device identifier.
    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    /// Launcher or client that produced this record.
    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    pub fn kind(&self) -> MemberKind {
        self.kind
    }

    pub fn is_host(&self) -> bool {
        self.kind == MemberKind::Host
    }

    /// Returns a copy with `kind` replaced.
    pub fn with_kind(&self, kind: MemberKind) -> Self {
        Self {
            kind,
            ..self.clone()
        }
    }

    /// `true` when name, machine id and vendor all match. `kind` is
    /// ignored because the server decides it, not the announcer.
    pub fn same_profile(&self, other: &Member) -> bool {
        self.machine_id == other.machine_id
            && self.name == other.name
            && self.vendor == other.vendor
    }

    /// Serializes this member as a `c:player_ping` body.
    pub fn to_json(&self) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(self).map_err(ProtocolError::Encode)
    }

    pub fn from_json(data: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }

    /// Serializes a roster as a `c:player_profiles_list` body.
    pub fn list_to_json(members: &[Member]) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(members).map_err(ProtocolError::Encode)
    }

    pub fn list_from_json(data: &[u8]) -> Result<Vec<Member>, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.machine_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_json_uses_snake_case_and_upper_kind() {
        let member = Member::new("Host", "abc", "v1", MemberKind::Host);

        let json: serde_json::Value =
            serde_json::from_slice(&member.to_json().unwrap()).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "name": "Host",
                "machine_id": "abc",
                "vendor": "v1",
                "kind": "HOST",
            })
        );
    }

    #[test]
    fn test_member_from_json_missing_kind_defaults_to_guest() {
        let member = Member::from_json(
            br#"{"name":"Guest","machine_id":"xyz","vendor":"v2"}"#,
        )
        .unwrap();

        assert_eq!(member.kind(), MemberKind::Guest);
        assert_eq!(member.machine_id(), "xyz");
    }

    #[test]
    fn test_member_from_json_missing_machine_id_fails() {
        let result = Member::from_json(br#"{"name":"Guest","vendor":"v2"}"#);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_member_list_round_trip_keeps_order() {
        let members = vec![
            Member::new("Host", "abc", "v1", MemberKind::Host),
            Member::new("Guest", "xyz", "v2", MemberKind::Guest),
        ];

        let bytes = Member::list_to_json(&members).unwrap();

        assert_eq!(Member::list_from_json(&bytes).unwrap(), members);
    }

    #[test]
    fn test_same_profile_ignores_kind_but_not_name() {
        let host = Member::new("A", "m", "v", MemberKind::Host);

        assert!(host.same_profile(&host.with_kind(MemberKind::Guest)));
        assert!(!host.same_profile(&Member::new("B", "m", "v", MemberKind::Host)));
        assert!(!host.same_profile(&Member::new("A", "m", "w", MemberKind::Host)));
    }

    #[test]
    fn test_built_in_request_names_are_unique() {
        let mut names = request::BUILT_IN.to_vec();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), request::BUILT_IN.len());
    }
}
