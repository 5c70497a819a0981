//! Concurrent actor and name registries.
//!
//! Backed by `dashmap::DashMap`; sharded locking means a `find` on one uuid
//! never blocks a `register` on another.

use std::sync::Arc;

use dashmap::DashMap;
use mesh_net::{Actor, ActorId, PeerId};

use crate::error::SystemError;

/// Maps actor uuid → the local actor instance.
///
/// Registration of a duplicate uuid silently replaces the prior binding:
/// uuids are assumed unique by construction, so a collision is a
/// programming error rather than a protocol condition worth rejecting.
#[derive(Default)]
pub struct ActorRegistry {
    actors: DashMap<String, Arc<dyn Actor>>,
}

impl ActorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, uuid: impl Into<String>, actor: Arc<dyn Actor>) {
        self.actors.insert(uuid.into(), actor);
    }

    pub fn find(&self, uuid: &str) -> Option<Arc<dyn Actor>> {
        self.actors.get(uuid).map(|entry| entry.value().clone())
    }

    pub fn unregister(&self, uuid: &str) {
        self.actors.remove(uuid);
    }

    pub fn clear(&self) {
        self.actors.clear();
    }
}

/// Maps a user-chosen name → the `ActorId` currently holding it.
///
/// A name maps to at most one `ActorId` at any moment. `register` fails with
/// `NameAlreadyTaken` rather than overwriting an existing binding, and is
/// test-and-set atomic: two concurrent calls for the same name yield exactly
/// one success and one error.
#[derive(Default)]
pub struct NameRegistry {
    names: DashMap<String, ActorId>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: &str, actor_id: ActorId) -> Result<(), SystemError> {
        match self.names.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(SystemError::NameAlreadyTaken(name.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(actor_id);
                Ok(())
            }
        }
    }

    pub fn find(&self, name: &str) -> Option<ActorId> {
        self.names.get(name).map(|entry| entry.value().clone())
    }

    pub fn unregister(&self, name: &str) {
        self.names.remove(name);
    }

    /// Removes every name currently bound to `actor_id` (used when an actor
    /// resigns).
    pub fn unregister_by_actor(&self, actor_id: &ActorId) {
        self.names.retain(|_, v| v != actor_id);
    }

    /// Removes every name bound to an actor hosted on `peer` (used when that
    /// peer's connection is lost).
    pub fn unregister_by_peer(&self, peer: &PeerId) {
        self.names.retain(|_, v| &v.peer != peer);
    }

    pub fn all_entries(&self) -> Vec<(String, ActorId)> {
        self.names
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    pub fn clear(&self) {
        self.names.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_net::ActorError;

    struct Noop;
    impl Actor for Noop {
        fn dispatch(&self, _target: &str, _args: &[u8]) -> Result<Vec<u8>, ActorError> {
            Ok(Vec::new())
        }
    }

    fn peer(name: &str) -> PeerId {
        PeerId::new(name, "127.0.0.1", 50051)
    }

    #[test]
    fn actor_registry_round_trips() {
        let reg = ActorRegistry::new();
        reg.register("u1", Arc::new(Noop));
        assert!(reg.find("u1").is_some());
        reg.unregister("u1");
        assert!(reg.find("u1").is_none());
    }

    #[test]
    fn actor_registry_duplicate_register_replaces() {
        let reg = ActorRegistry::new();
        reg.register("u1", Arc::new(Noop));
        reg.register("u1", Arc::new(Noop));
        assert!(reg.find("u1").is_some());
    }

    #[test]
    fn name_registry_rejects_duplicate_register() {
        let reg = NameRegistry::new();
        let a = ActorId::generate(peer("alice"));
        let b = ActorId::generate(peer("alice"));
        reg.register("alice", a).unwrap();
        let err = reg.register("alice", b).unwrap_err();
        assert!(matches!(err, SystemError::NameAlreadyTaken(n) if n == "alice"));
    }

    #[test]
    fn name_registry_unregister_frees_the_name() {
        let reg = NameRegistry::new();
        let a = ActorId::generate(peer("alice"));
        reg.register("alice", a).unwrap();
        reg.unregister("alice");
        assert!(reg.register("alice", ActorId::generate(peer("alice"))).is_ok());
    }

    #[test]
    fn name_registry_unregister_by_actor_clears_all_its_names() {
        let reg = NameRegistry::new();
        let a = ActorId::generate(peer("alice"));
        reg.register("alice", a.clone()).unwrap();
        reg.register("alice2", a.clone()).unwrap();
        reg.register("bob", ActorId::generate(peer("bob"))).unwrap();
        reg.unregister_by_actor(&a);
        assert_eq!(
            reg.all_entries().into_iter().map(|(n, _)| n).collect::<Vec<_>>(),
            vec!["bob".to_string()]
        );
    }

    #[test]
    fn name_registry_unregister_by_peer_clears_every_actor_on_that_peer() {
        let reg = NameRegistry::new();
        reg.register("alice", ActorId::generate(peer("alice"))).unwrap();
        reg.register("alice2", ActorId::generate(peer("alice"))).unwrap();
        reg.register("bob", ActorId::generate(peer("bob"))).unwrap();
        reg.unregister_by_peer(&peer("alice"));
        assert_eq!(
            reg.all_entries().into_iter().map(|(n, _)| n).collect::<Vec<_>>(),
            vec!["bob".to_string()]
        );
    }
}
