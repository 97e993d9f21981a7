//! Server-side membership state: the room roster together with the
//! connection identity map.
//!
//! Both halves change together (a successful `c:player_ping` binds the
//! connection and admits the member; teardown undoes both), so they live
//! in one value behind one lock.

use scaffolding_protocol::Member;
use scaffolding_room::{Admission, Room};
use scaffolding_session::SessionManager;
use scaffolding_transport::ConnectionId;

use crate::ScaffoldingError;

#[derive(Debug, Default)]
pub struct Lobby {
    room: Room,
    sessions: SessionManager,
}

impl Lobby {
    pub fn new(room: Room) -> Self {
        Self {
            room,
            sessions: SessionManager::new(),
        }
    }

    pub fn room(&self) -> &Room {
        &self.room
    }

    pub fn room_mut(&mut self) -> &mut Room {
        &mut self.room
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// The member `connection` speaks for, once it has pinged.
    pub fn member_for(&self, connection: ConnectionId) -> Option<&Member> {
        let machine_id = self.sessions.machine_id(connection)?;
        self.room.member(machine_id)
    }

    /// Handles a `c:player_ping` from `connection`.
    ///
    /// 1. An anonymous connection may not claim a machine another
    ///    connection owns, and a bound connection may not change machine.
    /// 2. The connection is bound to the announced machine.
    /// 3. A known machine must re-announce the identical profile; an
    ///    unknown one joins as a guest.
    ///
    /// # Errors
    /// Every failure is a membership conflict
    /// ([`ScaffoldingError::is_member_conflict`]).
    pub fn player_ping(
        &mut self,
        connection: ConnectionId,
        incoming: &Member,
    ) -> Result<Admission, ScaffoldingError> {
        self.sessions.bind(connection, incoming.machine_id())?;
        Ok(self.room.admit(incoming)?)
    }

    /// Forgets everything tied to `connection`.
    ///
    /// Returns the guest that left the roster, if any. A connection that
    /// spoke for the host frees its binding but the host entry stays.
    pub fn disconnect(&mut self, connection: ConnectionId) -> Option<Member> {
        let session = self.sessions.release(connection)?;
        self.room.remove_guest(&session.machine_id)
    }
}

#[cfg(test)]
mod tests {
    use scaffolding_protocol::MemberKind;

    use super::*;

    fn cid(id: u64) -> ConnectionId {
        ConnectionId::new(id)
    }

    fn lobby() -> Lobby {
        Lobby::new(Room::with_host(&Member::new("Host", "abc", "v1", MemberKind::Host)))
    }

    fn guest() -> Member {
        Member::new("Guest", "xyz", "v2", MemberKind::Guest)
    }

    #[test]
    fn test_player_ping_new_guest_joins() {
        let mut lobby = lobby();

        let outcome = lobby.player_ping(cid(1), &guest()).unwrap();

        assert_eq!(outcome, Admission::Joined);
        assert_eq!(lobby.room().len(), 2);
        assert_eq!(lobby.member_for(cid(1)).unwrap().name(), "Guest");
    }

    #[test]
    fn test_player_ping_repeat_is_idempotent() {
        let mut lobby = lobby();
        lobby.player_ping(cid(1), &guest()).unwrap();

        let outcome = lobby.player_ping(cid(1), &guest()).unwrap();

        assert_eq!(outcome, Admission::AlreadyPresent);
        assert_eq!(lobby.room().len(), 2);
    }

    #[test]
    fn test_player_ping_machine_owned_by_other_connection_conflicts() {
        let mut lobby = lobby();
        lobby.player_ping(cid(1), &guest()).unwrap();

        let err = lobby.player_ping(cid(2), &guest()).unwrap_err();

        assert!(err.is_member_conflict());
        assert!(lobby.sessions().get(cid(2)).is_none());
        assert_eq!(lobby.room().len(), 2);
    }

    #[test]
    fn test_player_ping_identity_change_conflicts() {
        let mut lobby = lobby();
        lobby.player_ping(cid(1), &guest()).unwrap();

        let other = Member::new("Other", "qqq", "v2", MemberKind::Guest);
        let err = lobby.player_ping(cid(1), &other).unwrap_err();

        assert!(matches!(err, ScaffoldingError::Session(_)));
        assert!(!lobby.room().contains("qqq"));
    }

    #[test]
    fn test_player_ping_changed_profile_conflicts() {
        let mut lobby = lobby();
        lobby.player_ping(cid(1), &guest()).unwrap();

        let renamed = Member::new("Renamed", "xyz", "v2", MemberKind::Guest);
        let err = lobby.player_ping(cid(1), &renamed).unwrap_err();

        assert!(matches!(err, ScaffoldingError::Room(_)));
        assert_eq!(lobby.room().member("xyz").unwrap().name(), "Guest");
    }

    #[test]
    fn test_player_ping_impersonating_host_conflicts_and_keeps_host() {
        let mut lobby = lobby();
        let fake = Member::new("Fake", "abc", "v9", MemberKind::Host);

        let err = lobby.player_ping(cid(1), &fake).unwrap_err();

        assert!(err.is_member_conflict());
        assert_eq!(lobby.room().host().unwrap().name(), "Host");
    }

    #[test]
    fn test_disconnect_removes_guest_and_frees_machine_id() {
        let mut lobby = lobby();
        lobby.player_ping(cid(1), &guest()).unwrap();

        let left = lobby.disconnect(cid(1)).unwrap();

        assert_eq!(left.machine_id(), "xyz");
        assert_eq!(lobby.room().len(), 1);
        assert_eq!(lobby.player_ping(cid(2), &guest()).unwrap(), Admission::Joined);
    }

    #[test]
    fn test_disconnect_of_host_speaker_keeps_host_entry() {
        let mut lobby = lobby();
        let host = Member::new("Host", "abc", "v1", MemberKind::Guest);
        lobby.player_ping(cid(1), &host).unwrap();

        assert!(lobby.disconnect(cid(1)).is_none());
        assert!(lobby.room().contains("abc"));
        assert!(lobby.sessions().is_empty());
    }

    #[test]
    fn test_player_ping_second_connection_different_name_keeps_first_record() {
        let mut lobby = lobby();
        lobby.player_ping(cid(1), &guest()).unwrap();

        let imposter = Member::new("Imposter", "xyz", "v3", MemberKind::Guest);
        let err = lobby.player_ping(cid(2), &imposter).unwrap_err();

        assert!(err.is_member_conflict());
        let kept = lobby.room().member("xyz").unwrap();
        assert_eq!(kept.name(), "Guest");
        assert_eq!(kept.vendor(), "v2");
        assert_eq!(lobby.sessions().owner("xyz"), Some(cid(1)));
    }

    #[test]
    fn test_interleaved_joins_and_leaves_keep_sessions_and_roster_aligned() {
        let mut lobby = lobby();
        let member = |i: u64| Member::new(format!("P{i}"), format!("m{i}"), "v2", MemberKind::Guest);

        for i in 1..=6 {
            lobby.player_ping(cid(i), &member(i)).unwrap();
            if i % 3 == 0 {
                lobby.disconnect(cid(i - 1));
            }
        }
        lobby.disconnect(cid(6));

        // Host plus guests 1, 3 and 4.
        let ids: Vec<_> = lobby.room().members().iter().map(Member::machine_id).collect();
        assert_eq!(ids, ["abc", "m1", "m3", "m4"]);
        assert_eq!(lobby.sessions().len(), 3);
        for guest in &lobby.room().members()[1..] {
            let owner = lobby.sessions().owner(guest.machine_id()).unwrap();
            assert_eq!(lobby.member_for(owner), Some(guest));
        }
    }

    #[test]
    fn test_disconnect_anonymous_connection_is_noop() {
        let mut lobby = lobby();
        assert!(lobby.disconnect(cid(5)).is_none());
        assert_eq!(lobby.room().len(), 1);
    }
}
