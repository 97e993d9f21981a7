//! The room roster.
//!
//! Members are kept in join order and are unique by machine id. The roster
//! only grows through [`Room::admit`] and only shrinks through
//! [`Room::remove_guest`]; the host entry survives both.

use scaffolding_protocol::{Member, MemberKind};

use crate::RoomError;

/// Outcome of a successful [`Room::admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The member was appended to the roster.
    Joined,
    /// An identical record was already present; nothing changed.
    AlreadyPresent,
}

/// Members and game server port of one lobby.
#[derive(Debug, Clone, Default)]
pub struct Room {
    members: Vec<Member>,
    server_port: Option<u16>,
}

impl Room {
    /// An empty room with no server port.
    pub fn new() -> Self {
        Self::default()
    }

    /// A room whose first member is `host`, marked [`MemberKind::Host`].
    pub fn with_host(host: &Member) -> Self {
        Self {
            members: vec![host.with_kind(MemberKind::Host)],
            server_port: None,
        }
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn member(&self, machine_id: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.machine_id() == machine_id)
    }

    pub fn contains(&self, machine_id: &str) -> bool {
        self.member(machine_id).is_some()
    }

    /// The first member of kind host, if any.
    pub fn host(&self) -> Option<&Member> {
        self.members.iter().find(|m| m.is_host())
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn server_port(&self) -> Option<u16> {
        self.server_port
    }

    /// Records the game server port, returning the previous one.
    pub fn set_server_port(&mut self, port: u16) -> Option<u16> {
        let previous = self.server_port.replace(port);
        if previous != Some(port) {
            tracing::info!(port, ?previous, "game server port set");
        }
        previous
    }

    /// Admits `incoming` as a guest.
    ///
    /// The announcer's own `kind` is ignored: whatever joins through here
    /// is a guest. Re-announcing an identical record is a no-op.
    ///
    /// # Errors
    /// [`RoomError::ProfileMismatch`] if the machine id is present with a
    /// different name or vendor.
    pub fn admit(&mut self, incoming: &Member) -> Result<Admission, RoomError> {
        if let Some(existing) = self.member(incoming.machine_id()) {
            if existing.same_profile(incoming) {
                return Ok(Admission::AlreadyPresent);
            }
            return Err(RoomError::ProfileMismatch {
                machine_id: incoming.machine_id().to_owned(),
                existing: existing.to_string(),
            });
        }

        let member = incoming.with_kind(MemberKind::Guest);
        tracing::info!(%member, vendor = member.vendor(), "member joined");
        self.members.push(member);
        Ok(Admission::Joined)
    }

    /// Removes the guest with `machine_id`. Hosts are never removed.
    pub fn remove_guest(&mut self, machine_id: &str) -> Option<Member> {
        let index = self
            .members
            .iter()
            .position(|m| m.machine_id() == machine_id && !m.is_host())?;
        let member = self.members.remove(index);
        tracing::info!(%member, "member left");
        Some(member)
    }

    /// Overwrites the roster wholesale. Used by clients mirroring the
    /// server's `c:player_profiles_list`.
    pub fn replace_members(&mut self, members: Vec<Member>) {
        self.members = members;
    }
}
