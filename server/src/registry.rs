//! In-memory store of every live session
//!
//! The registry is the only shared mutable state on the server. It is owned
//! by the world actor, so each method runs to completion before the next
//! event is looked at:
//! - Structural changes (insert/remove) never interleave with field updates
//! - Every session is addressable by connection id or by identity
//! - Iteration order for snapshots follows connection id, i.e. join order

use crate::session::{ConnectionId, Session};
use log::info;
use shared::IdentityId;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("connection {0} already has a session")]
    DuplicateConnection(ConnectionId),
}

/// Live sessions keyed by connection
#[derive(Debug, Default)]
pub struct Registry {
    sessions: BTreeMap<ConnectionId, Session>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            sessions: BTreeMap::new(),
        }
    }

    /// Adds a new session
    ///
    /// A second insert for a live connection id is a programming error on
    /// the caller's side. The registry is left exactly as it was.
    pub fn insert(&mut self, session: Session) -> Result<(), RegistryError> {
        let connection_id = session.connection_id;
        if self.sessions.contains_key(&connection_id) {
            return Err(RegistryError::DuplicateConnection(connection_id));
        }

        info!(
            "Session {} ({}) registered for connection {}",
            session.identity_id, session.display_name, connection_id
        );
        self.sessions.insert(connection_id, session);
        Ok(())
    }

    pub fn get(&self, connection_id: ConnectionId) -> Option<&Session> {
        self.sessions.get(&connection_id)
    }

    /// Applies `mutator` to the session in place. Returns false when the
    /// connection has no session, in which case nothing runs.
    pub fn update<F>(&mut self, connection_id: ConnectionId, mutator: F) -> bool
    where
        F: FnOnce(&mut Session),
    {
        match self.sessions.get_mut(&connection_id) {
            Some(session) => {
                mutator(session);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, connection_id: ConnectionId) -> Option<Session> {
        self.sessions.remove(&connection_id)
    }

    pub fn find_by_identity(&self, identity_id: IdentityId) -> Option<&Session> {
        self.sessions
            .values()
            .find(|session| session.identity_id == identity_id)
    }

    /// All sessions except `connection_id`, in join order
    pub fn list_all_except(&self, connection_id: ConnectionId) -> Vec<&Session> {
        self.sessions
            .values()
            .filter(|session| session.connection_id != connection_id)
            .collect()
    }

    /// Sessions in join order
    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn contains(&self, connection_id: ConnectionId) -> bool {
        self.sessions.contains_key(&connection_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{ConnectionHandle, Vitals};
    use shared::Position;
    use tokio::sync::mpsc;

    fn session(connection_id: ConnectionId, identity_id: IdentityId) -> Session {
        let (tx, _rx) = mpsc::unbounded_channel();
        Session::new(
            connection_id,
            identity_id,
            format!("player{}", identity_id),
            Position::new(0, 0),
            Vitals::new(1, 100, 100),
            ConnectionHandle::new(tx),
        )
    }

    #[test]
    fn test_registry_creation() {
        let registry = Registry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_insert_and_get() {
        let mut registry = Registry::new();
        registry.insert(session(1, 10)).unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(1).map(|s| s.identity_id), Some(10));
        assert!(registry.get(2).is_none());
    }

    #[test]
    fn test_duplicate_insert_leaves_registry_untouched() {
        let mut registry = Registry::new();
        registry.insert(session(1, 10)).unwrap();

        let result = registry.insert(session(1, 99));
        assert_eq!(result, Err(RegistryError::DuplicateConnection(1)));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(1).map(|s| s.identity_id), Some(10));
    }

    #[test]
    fn test_update_existing_session() {
        let mut registry = Registry::new();
        registry.insert(session(1, 10)).unwrap();

        let updated = registry.update(1, |s| s.position = Position::new(5, 6));
        assert!(updated);
        assert_eq!(registry.get(1).unwrap().position, Position::new(5, 6));
    }

    #[test]
    fn test_update_missing_session_is_noop() {
        let mut registry = Registry::new();
        let mut ran = false;

        let updated = registry.update(3, |_| ran = true);
        assert!(!updated);
        assert!(!ran);
    }

    #[test]
    fn test_remove_session() {
        let mut registry = Registry::new();
        registry.insert(session(1, 10)).unwrap();

        let removed = registry.remove(1);
        assert_eq!(removed.map(|s| s.identity_id), Some(10));
        assert!(registry.is_empty());
        assert!(registry.remove(1).is_none());
    }

    #[test]
    fn test_find_by_identity() {
        let mut registry = Registry::new();
        registry.insert(session(1, 10)).unwrap();
        registry.insert(session(2, 20)).unwrap();

        assert_eq!(registry.find_by_identity(20).map(|s| s.connection_id), Some(2));
        assert!(registry.find_by_identity(30).is_none());

        registry.remove(2);
        assert!(registry.find_by_identity(20).is_none());
    }

    #[test]
    fn test_list_all_except_in_join_order() {
        let mut registry = Registry::new();
        registry.insert(session(3, 30)).unwrap();
        registry.insert(session(1, 10)).unwrap();
        registry.insert(session(2, 20)).unwrap();

        let others: Vec<IdentityId> = registry
            .list_all_except(2)
            .iter()
            .map(|s| s.identity_id)
            .collect();
        assert_eq!(others, vec![10, 30]);

        let all: Vec<ConnectionId> = registry.iter().map(|s| s.connection_id).collect();
        assert_eq!(all, vec![1, 2, 3]);
    }
}
