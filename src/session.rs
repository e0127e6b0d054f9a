//! Registry of signed-in sessions.
//!
//! `SessionRegistry` maps user names to the connection currently signed in as
//! that user. It stores non-owning weak references to [`PushHandle`]s, so a
//! session that ends without unregistering never keeps its queue alive, and
//! dead entries are pruned opportunistically or lazily at lookup time.
//!
//! A user name maps to at most one live connection at any time.
use std::sync::{Arc, Weak};

use dashmap::{DashMap, mapref::entry::Entry};
use thiserror::Error;

use crate::{
    message::Message,
    push::{FrameLike, PushHandle, PushHandleInner},
    role::RoleCell,
};

/// Identifier assigned to a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl From<u64> for ConnectionId {
    fn from(value: u64) -> Self { Self(value) }
}

impl ConnectionId {
    #[must_use]
    pub fn new(id: u64) -> Self { Self(id) }

    #[must_use]
    pub fn as_u64(&self) -> u64 { self.0 }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ConnectionId({})", self.0)
    }
}

/// Returned when a name is already bound to a live session.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{0} is already connected")]
pub struct AlreadyConnected(pub String);

struct Binding<F> {
    connection: ConnectionId,
    role: Arc<RoleCell>,
    handle: Weak<PushHandleInner<F>>,
}

/// A live session as seen by other sessions.
pub struct Peer<F = Message> {
    pub connection: ConnectionId,
    pub role: Arc<RoleCell>,
    pub handle: PushHandle<F>,
}

/// Concurrent registry of signed-in sessions keyed by user name.
pub struct SessionRegistry<F = Message>(DashMap<String, Binding<F>>);

impl<F> Default for SessionRegistry<F> {
    fn default() -> Self { Self(DashMap::new()) }
}

impl<F: FrameLike> SessionRegistry<F> {
    /// Bind `name` to a newly authenticated connection.
    ///
    /// A stale entry whose queue has been dropped is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`AlreadyConnected`] when another live connection holds `name`.
    pub fn register(
        &self,
        name: &str,
        connection: ConnectionId,
        role: Arc<RoleCell>,
        handle: &PushHandle<F>,
    ) -> Result<(), AlreadyConnected> {
        let entry = Binding {
            connection,
            role,
            handle: handle.downgrade(),
        };
        match self.0.entry(name.to_owned()) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get();
                if current.connection != connection && current.handle.strong_count() > 0 {
                    return Err(AlreadyConnected(name.to_owned()));
                }
                occupied.insert(entry);
                Ok(())
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
                Ok(())
            }
        }
    }

    /// Retrieve the live session for `name`, if any.
    pub fn get(&self, name: &str) -> Option<Peer<F>> {
        let guard = self.0.get(name);
        let peer = guard.as_ref().and_then(|entry| {
            entry.handle.upgrade().map(|inner| Peer {
                connection: entry.connection,
                role: Arc::clone(&entry.role),
                handle: PushHandle::from_arc(inner),
            })
        });
        drop(guard);
        if peer.is_none() {
            self.0.remove_if(name, |_, entry| entry.handle.strong_count() == 0);
        }
        peer
    }

    /// Returns `true` when `name` has a live session.
    #[must_use]
    pub fn is_online(&self, name: &str) -> bool { self.get(name).is_some() }

    /// Returns `true` while `name` is bound to `connection`.
    #[must_use]
    pub fn holds(&self, name: &str, connection: ConnectionId) -> bool {
        self.0
            .get(name)
            .is_some_and(|entry| entry.connection == connection)
    }

    /// Remove the binding for `name` if it still belongs to `connection`.
    ///
    /// Returns `true` when an entry was removed.
    pub fn remove(&self, name: &str, connection: ConnectionId) -> bool {
        self.0
            .remove_if(name, |_, entry| entry.connection == connection)
            .is_some()
    }

    /// Remove all stale weak references without returning any handles.
    pub fn prune(&self) { self.0.retain(|_, entry| entry.handle.strong_count() > 0); }

    /// Prune stale entries, then collect the remaining live sessions.
    ///
    /// This holds per-bucket write locks while iterating. Use [`Self::prune`]
    /// from a maintenance task when only cleanup is required.
    #[must_use]
    pub fn active_handles(&self) -> Vec<(String, Peer<F>)> {
        let mut peers = Vec::with_capacity(self.0.len());
        self.0.retain(|name, entry| {
            if let Some(inner) = entry.handle.upgrade() {
                peers.push((
                    name.clone(),
                    Peer {
                        connection: entry.connection,
                        role: Arc::clone(&entry.role),
                        handle: PushHandle::from_arc(inner),
                    },
                ));
                true
            } else {
                false
            }
        });
        peers
    }

    /// Prune stale entries, then return the names of live sessions, sorted.
    #[must_use]
    pub fn active_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.0.len());
        self.0.retain(|name, entry| {
            if entry.handle.strong_count() > 0 {
                names.push(name.clone());
                true
            } else {
                false
            }
        });
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::push::{OutboundQueue, PushPolicy};

    fn queue() -> (OutboundQueue<u8>, PushHandle<u8>) {
        OutboundQueue::builder().capacity(4).build().expect("build")
    }

    #[test]
    fn lookup_returns_live_handle() {
        let registry = SessionRegistry::<u8>::default();
        let (mut q, handle) = queue();
        registry
            .register("alice", ConnectionId::new(1), Arc::default(), &handle)
            .expect("register");

        let peer = registry.get("alice").expect("alice is online");
        assert_eq!(peer.connection, ConnectionId::new(1));
        peer.handle
            .try_push(9, PushPolicy::ReturnErrorIfFull)
            .expect("push");
        assert_eq!(q.try_recv(), Some(9));
    }

    #[test]
    fn second_live_login_is_refused() {
        let registry = SessionRegistry::<u8>::default();
        let (_q1, first) = queue();
        let (_q2, second) = queue();
        registry
            .register("alice", ConnectionId::new(1), Arc::default(), &first)
            .expect("register");
        assert_eq!(
            registry.register("alice", ConnectionId::new(2), Arc::default(), &second),
            Err(AlreadyConnected("alice".into()))
        );
    }

    #[test]
    fn dropped_session_is_pruned_and_replaceable() {
        let registry = SessionRegistry::<u8>::default();
        let (q, handle) = queue();
        registry
            .register("alice", ConnectionId::new(1), Arc::default(), &handle)
            .expect("register");
        drop(handle);
        drop(q);
        assert!(!registry.is_online("alice"));

        let (_q, fresh) = queue();
        registry
            .register("alice", ConnectionId::new(2), Arc::default(), &fresh)
            .expect("stale entry replaced");
        assert_eq!(registry.active_names(), vec!["alice".to_owned()]);
    }

    #[test]
    fn remove_ignores_other_connections() {
        let registry = SessionRegistry::<u8>::default();
        let (_q, handle) = queue();
        registry
            .register("alice", ConnectionId::new(1), Arc::default(), &handle)
            .expect("register");
        assert!(!registry.remove("alice", ConnectionId::new(7)));
        assert!(registry.holds("alice", ConnectionId::new(1)));
        assert!(registry.remove("alice", ConnectionId::new(1)));
        assert!(!registry.holds("alice", ConnectionId::new(1)));
        assert!(registry.active_handles().is_empty());
    }
}
