// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! `SystemActor` — the well-known actor every started host exposes so
//! remote callers can enumerate its members without prior discovery.

use std::sync::Arc;

use dashmap::DashMap;
use mesh_net::protocol::{cbor_decode, cbor_encode};
use mesh_net::{Actor, ActorError, ActorId, MemberInfo, PeerId};

use crate::registry::{ActorRegistry, NameRegistry};

/// A reference to an actor, local or remote, addressable through
/// `CommunitySystem::remote_call`.
#[derive(Debug, Clone)]
pub struct ActorHandle {
    pub id: ActorId,
}

impl ActorHandle {
    pub fn new(id: ActorId) -> Self {
        Self { id }
    }
}

/// Exposes `find_member`/`list_members` without making any outbound call:
/// local members are described by dispatching introspection methods
/// in-process against the `actor_registry`; remote members come from the
/// `remote_members` cache `CommunitySystem` keeps fresh via
/// `exchange_member_info`. Must stay call-free on the wire so that two
/// peers exchanging on connect cannot cycle into each other.
pub struct SystemActor {
    actor_registry: Arc<ActorRegistry>,
    name_registry: Arc<NameRegistry>,
    remote_members: Arc<DashMap<String, MemberInfo>>,
    local_peer: PeerId,
}

impl SystemActor {
    pub fn new(
        actor_registry: Arc<ActorRegistry>,
        name_registry: Arc<NameRegistry>,
        remote_members: Arc<DashMap<String, MemberInfo>>,
        local_peer: PeerId,
    ) -> Self {
        Self {
            actor_registry,
            name_registry,
            remote_members,
            local_peer,
        }
    }

    /// Best-effort metadata read. `target` methods take no arguments and
    /// return an `Option<String>`; a missing actor, dispatch error, or
    /// decode failure all collapse to `None` rather than propagating.
    fn query_optional_string(&self, uuid: &str, target: &str) -> Option<String> {
        let actor = self.actor_registry.find(uuid)?;
        let bytes = actor.dispatch(target, &[]).ok()?;
        cbor_decode::<Option<String>>(&bytes).ok().flatten()
    }

    fn describe_local(&self, name: &str, id: &ActorId) -> MemberInfo {
        MemberInfo {
            name: name.to_string(),
            actor_id: id.clone(),
            peer_id: self.local_peer.to_string(),
            transport: "tcp".to_string(),
            command: self.query_optional_string(&id.uuid, "Member.get_command:0"),
            cwd: self.query_optional_string(&id.uuid, "Member.get_cwd:0"),
            foreground_process: self
                .query_optional_string(&id.uuid, "Member.get_foreground_process:0"),
        }
    }

    pub fn local_members(&self) -> Vec<MemberInfo> {
        self.name_registry
            .all_entries()
            .into_iter()
            .filter(|(_, id)| id.peer == self.local_peer)
            .map(|(name, id)| self.describe_local(&name, &id))
            .collect()
    }
}

impl Actor for SystemActor {
    fn dispatch(&self, target: &str, args: &[u8]) -> Result<Vec<u8>, ActorError> {
        match target {
            "SystemActor.list_members:0" => {
                let mut list = self.local_members();
                list.extend(self.remote_members.iter().map(|e| e.value().clone()));
                cbor_encode(&list).map_err(|e| ActorError::new(e.to_string()))
            }
            "SystemActor.find_member:1" => {
                let name: String = cbor_decode(args).map_err(|e| ActorError::new(e.to_string()))?;
                let found = self
                    .local_members()
                    .into_iter()
                    .find(|m| m.name == name)
                    .or_else(|| {
                        self.remote_members
                            .iter()
                            .find(|e| e.value().name == name)
                            .map(|e| e.value().clone())
                    });
                cbor_encode(&found).map_err(|e| ActorError::new(e.to_string()))
            }
            other => Err(ActorError::new(format!("unknown target: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_net::ActorError as NetActorError;

    fn peer(name: &str) -> PeerId {
        PeerId::new(name, "127.0.0.1", 50051)
    }

    struct StaticMember {
        command: &'static str,
    }
    impl Actor for StaticMember {
        fn dispatch(&self, target: &str, _args: &[u8]) -> Result<Vec<u8>, NetActorError> {
            match target {
                "Member.get_command:0" => {
                    cbor_encode(&Some(self.command.to_string())).map_err(|e| ActorError::new(e.to_string()))
                }
                "Member.get_cwd:0" | "Member.get_foreground_process:0" => {
                    cbor_encode(&Option::<String>::None).map_err(|e| ActorError::new(e.to_string()))
                }
                other => Err(ActorError::new(format!("unknown target: {other}"))),
            }
        }
    }

    #[test]
    fn list_members_describes_registered_local_members() {
        let actor_registry = Arc::new(ActorRegistry::new());
        let name_registry = Arc::new(NameRegistry::new());
        let remote_members = Arc::new(DashMap::new());
        let id = ActorId::generate(peer("alice"));
        actor_registry.register(id.uuid.clone(), Arc::new(StaticMember { command: "bash" }));
        name_registry.register("shell-1", id.clone()).unwrap();

        let sys = SystemActor::new(actor_registry, name_registry, remote_members, peer("alice"));
        let bytes = sys.dispatch("SystemActor.list_members:0", &[]).unwrap();
        let decoded: Vec<MemberInfo> = cbor_decode(&bytes).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].name, "shell-1");
        assert_eq!(decoded[0].command.as_deref(), Some("bash"));
    }

    #[test]
    fn find_member_checks_remote_cache_when_not_local() {
        let actor_registry = Arc::new(ActorRegistry::new());
        let name_registry = Arc::new(NameRegistry::new());
        let remote_members = Arc::new(DashMap::new());
        let remote_id = ActorId::generate(peer("bob"));
        remote_members.insert(
            remote_id.uuid.clone(),
            MemberInfo {
                name: "shell-2".into(),
                actor_id: remote_id,
                peer_id: peer("bob").to_string(),
                transport: "tcp".into(),
                command: None,
                cwd: None,
                foreground_process: None,
            },
        );
        let sys = SystemActor::new(actor_registry, name_registry, remote_members, peer("alice"));
        let args = cbor_encode(&"shell-2".to_string()).unwrap();
        let bytes = sys.dispatch("SystemActor.find_member:1", &args).unwrap();
        let decoded: Option<MemberInfo> = cbor_decode(&bytes).unwrap();
        assert_eq!(decoded.unwrap().name, "shell-2");
    }

    #[test]
    fn find_member_returns_none_for_unknown_name() {
        let sys = SystemActor::new(
            Arc::new(ActorRegistry::new()),
            Arc::new(NameRegistry::new()),
            Arc::new(DashMap::new()),
            peer("alice"),
        );
        let args = cbor_encode(&"ghost".to_string()).unwrap();
        let bytes = sys.dispatch("SystemActor.find_member:1", &args).unwrap();
        let decoded: Option<MemberInfo> = cbor_decode(&bytes).unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn unknown_target_is_an_error() {
        let sys = SystemActor::new(
            Arc::new(ActorRegistry::new()),
            Arc::new(NameRegistry::new()),
            Arc::new(DashMap::new()),
            peer("alice"),
        );
        assert!(sys.dispatch("SystemActor.bogus:0", &[]).is_err());
    }
}
