//! The session manager: which connection speaks for which machine.
//!
//! # Concurrency note
//!
//! `SessionManager` is NOT thread-safe by itself; it is a pair of plain
//! `HashMap`s. The server keeps it next to the room roster behind a single
//! lock, so a binding and the roster update that follows it are observed
//! together.

use std::collections::HashMap;
use std::time::Instant;

use scaffolding_transport::ConnectionId;

use crate::{Binding, Session, SessionError};

/// Tracks the identity bound to each live connection.
///
/// ## Lifecycle
///
/// ```text
/// accept ──→ [anonymous] ──bind()──→ [bound] ──release()──→ gone
///                                       │
///                                       └─bind(same id)─→ [bound]
/// ```
#[derive(Debug, Default)]
pub struct SessionManager {
    /// Bound connections, keyed by connection.
    sessions: HashMap<ConnectionId, Session>,

    /// Reverse index: machine id → owning connection.
    ///
    /// Kept in sync with `sessions`, so "is this machine taken?" never
    /// needs a scan.
    owners: HashMap<String, ConnectionId>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `connection` to `machine_id`, or confirms an existing
    /// binding.
    ///
    /// # Errors
    /// - [`SessionError::IdentityChanged`] if the connection is already
    ///   bound to a different machine.
    /// - [`SessionError::MachineInUse`] if the connection is anonymous and
    ///   another connection owns `machine_id`.
    ///
    /// On error nothing changes.
    pub fn bind(
        &mut self,
        connection: ConnectionId,
        machine_id: &str,
    ) -> Result<Binding, SessionError> {
        if let Some(existing) = self.sessions.get(&connection) {
            if existing.machine_id != machine_id {
                return Err(SessionError::IdentityChanged {
                    connection,
                    bound: existing.machine_id.clone(),
                    claimed: machine_id.to_owned(),
                });
            }
            return Ok(Binding::Confirmed);
        }

        if let Some(&owner) = self.owners.get(machine_id) {
            return Err(SessionError::MachineInUse {
                machine_id: machine_id.to_owned(),
                owner,
            });
        }

        self.owners.insert(machine_id.to_owned(), connection);
        self.sessions.insert(
            connection,
            Session {
                connection,
                machine_id: machine_id.to_owned(),
                since: Instant::now(),
            },
        );

        tracing::debug!(%connection, machine_id, "connection bound");
        Ok(Binding::New)
    }

    /// Forgets the binding for `connection`, freeing its machine id.
    ///
    /// Returns the removed session, or `None` if the connection never
    /// bound an identity.
    pub fn release(&mut self, connection: ConnectionId) -> Option<Session> {
        let session = self.sessions.remove(&connection)?;
        self.owners.remove(&session.machine_id);
        tracing::debug!(
            %connection,
            machine_id = %session.machine_id,
            "connection released"
        );
        Some(session)
    }

    /// Machine id bound to `connection`, if any.
    pub fn machine_id(&self, connection: ConnectionId) -> Option<&str> {
        self.sessions
            .get(&connection)
            .map(|s| s.machine_id.as_str())
    }

    /// Connection that owns `machine_id`, if any.
    pub fn owner(&self, machine_id: &str) -> Option<ConnectionId> {
        self.owners.get(machine_id).copied()
    }

    pub fn get(&self, connection: ConnectionId) -> Option<&Session> {
        self.sessions.get(&connection)
    }

    /// Number of bound connections.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Naming convention: `test_{function}_{scenario}_{expected}`.

    use super::*;

    fn cid(id: u64) -> ConnectionId {
        ConnectionId::new(id)
    }

    // =====================================================================
    // bind()
    // =====================================================================

    #[test]
    fn test_bind_anonymous_connection_returns_new() {
        let mut mgr = SessionManager::new();

        assert_eq!(mgr.bind(cid(1), "abc").unwrap(), Binding::New);
        assert_eq!(mgr.machine_id(cid(1)), Some("abc"));
        assert_eq!(mgr.owner("abc"), Some(cid(1)));
    }

    #[test]
    fn test_bind_same_machine_again_returns_confirmed() {
        let mut mgr = SessionManager::new();
        mgr.bind(cid(1), "abc").unwrap();

        assert_eq!(mgr.bind(cid(1), "abc").unwrap(), Binding::Confirmed);
        assert_eq!(mgr.len(), 1);
    }

    #[test]
    fn test_bind_machine_owned_elsewhere_returns_machine_in_use() {
        let mut mgr = SessionManager::new();
        mgr.bind(cid(1), "abc").unwrap();

        let err = mgr.bind(cid(2), "abc").unwrap_err();

        assert!(matches!(
            err,
            SessionError::MachineInUse { ref machine_id, owner }
                if machine_id == "abc" && owner == cid(1)
        ));
        assert!(mgr.get(cid(2)).is_none(), "failed bind must not record");
    }

    #[test]
    fn test_bind_different_machine_on_bound_connection_returns_identity_changed() {
        let mut mgr = SessionManager::new();
        mgr.bind(cid(1), "abc").unwrap();

        let err = mgr.bind(cid(1), "xyz").unwrap_err();

        assert!(matches!(err, SessionError::IdentityChanged { .. }));
        assert_eq!(mgr.machine_id(cid(1)), Some("abc"));
        assert!(mgr.owner("xyz").is_none());
    }

    // =====================================================================
    // release()
    // =====================================================================

    #[test]
    fn test_release_bound_connection_frees_machine_id() {
        let mut mgr = SessionManager::new();
        mgr.bind(cid(1), "xyz").unwrap();

        let session = mgr.release(cid(1)).unwrap();

        assert_eq!(session.machine_id, "xyz");
        assert!(mgr.is_empty());
        assert_eq!(mgr.bind(cid(2), "xyz").unwrap(), Binding::New);
    }

    #[test]
    fn test_release_anonymous_connection_returns_none() {
        let mut mgr = SessionManager::new();
        assert!(mgr.release(cid(9)).is_none());
    }

    #[test]
    fn test_release_only_touches_its_own_binding() {
        let mut mgr = SessionManager::new();
        mgr.bind(cid(1), "a").unwrap();
        mgr.bind(cid(2), "b").unwrap();

        mgr.release(cid(1));

        assert_eq!(mgr.owner("b"), Some(cid(2)));
        assert_eq!(mgr.len(), 1);
    }
}
