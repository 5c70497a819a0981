// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! `CommunitySystem` — the distributed-call runtime.
//!
//! A single per-connection read loop serializes inbound frames; outgoing
//! calls are correlated to their eventual response by `call_id` via a
//! `pending_calls` table of stored `oneshot::Sender`s.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use mesh_net::protocol::{cbor_decode, cbor_encode};
use mesh_net::{
    Actor, ActorId, CallResult, Connection, Frame, InvocationEnvelope, MemberInfo, MeshError,
    PeerId, PeerNode, ResponseEnvelope, RuntimeError, TcpTransport, WELL_KNOWN_SYSTEM_UUID,
};

use crate::actor::{ActorHandle, SystemActor};
use crate::error::SystemError;
use crate::registry::{ActorRegistry, NameRegistry};

type PendingReply = oneshot::Sender<Result<ResponseEnvelope, SystemError>>;

/// Default deadline for a `remote_call`/`remote_call_void` round trip, used
/// unless [`CommunitySystem::with_timeouts`] overrides it.
const DEFAULT_REMOTE_CALL_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Default deadline for `all_members_with_status`'s per-peer refresh, used
/// unless [`CommunitySystem::with_timeouts`] overrides it.
const DEFAULT_MEMBER_EXCHANGE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(3);

/// The distributed-call runtime for one host. Construct with
/// [`CommunitySystem::new`], call [`CommunitySystem::start`], then use
/// [`CommunitySystem::remote_call`] / [`CommunitySystem::remote_call_void`]
/// to invoke methods on local or remote actors.
pub struct CommunitySystem {
    #[allow(dead_code)]
    name: String,
    node: Arc<PeerNode<TcpTransport>>,
    actor_registry: Arc<ActorRegistry>,
    name_registry: Arc<NameRegistry>,
    /// Cache of remote members learned via `exchange_member_info`, keyed by
    /// `actor_id.uuid`.
    remote_members: Arc<DashMap<String, MemberInfo>>,
    pending_calls: Arc<DashMap<String, PendingReply>>,
    outgoing_call_peers: Arc<DashMap<String, PeerId>>,
    connection_tasks: Arc<DashMap<PeerId, JoinHandle<()>>>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
    remote_call_timeout: std::time::Duration,
    member_exchange_timeout: std::time::Duration,
}

impl CommunitySystem {
    pub fn new(name: impl Into<String>, node: PeerNode<TcpTransport>) -> Arc<Self> {
        Self::with_timeouts(
            name,
            node,
            DEFAULT_REMOTE_CALL_TIMEOUT,
            DEFAULT_MEMBER_EXCHANGE_TIMEOUT,
        )
    }

    /// As [`CommunitySystem::new`], with the `remote_call`/`remote_call_void`
    /// deadline and the `all_members_with_status` per-peer refresh deadline
    /// overridden (`mesh-config`'s `TimeoutConfig` is the usual source).
    pub fn with_timeouts(
        name: impl Into<String>,
        node: PeerNode<TcpTransport>,
        remote_call_timeout: std::time::Duration,
        member_exchange_timeout: std::time::Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            node: Arc::new(node),
            actor_registry: Arc::new(ActorRegistry::new()),
            name_registry: Arc::new(NameRegistry::new()),
            remote_members: Arc::new(DashMap::new()),
            pending_calls: Arc::new(DashMap::new()),
            outgoing_call_peers: Arc::new(DashMap::new()),
            connection_tasks: Arc::new(DashMap::new()),
            accept_task: Mutex::new(None),
            started: AtomicBool::new(false),
            remote_call_timeout,
            member_exchange_timeout,
        })
    }

    pub fn local_peer_id(&self) -> PeerId {
        self.node.local_peer_id()
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────

    /// Idempotent. On first call: creates the `SystemActor`, binds the
    /// node, and spawns the accept loop.
    pub async fn start(self: &Arc<Self>) -> Result<(), SystemError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.node.start().await?;
        self.actor_registry.register(
            WELL_KNOWN_SYSTEM_UUID,
            Arc::new(SystemActor::new(
                self.actor_registry.clone(),
                self.name_registry.clone(),
                self.remote_members.clone(),
                self.local_peer_id(),
            )),
        );

        let mut incoming = self
            .node
            .incoming_connections()
            .await
            .expect("incoming_connections taken twice");
        let this = self.clone();
        let handle = tokio::spawn(async move {
            while let Some((peer_id, conn)) = incoming.recv().await {
                this.node.register_outbound(peer_id.clone(), conn.clone());
                this.spawn_connection_loop(peer_id.clone(), conn);
                let this2 = this.clone();
                let peer2 = peer_id.clone();
                tokio::spawn(async move { this2.exchange_member_info(&peer2).await });
            }
        });
        *self.accept_task.lock().await = Some(handle);
        Ok(())
    }

    /// Idempotent. Cancels the accept loop and every per-connection task,
    /// fails every pending call with `SystemStopped`, closes the node, and
    /// clears both registries.
    pub async fn stop(&self) {
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.accept_task.lock().await.take() {
            handle.abort();
        }
        for entry in self.connection_tasks.iter() {
            entry.value().abort();
        }
        self.connection_tasks.clear();
        let stuck: Vec<String> = self.pending_calls.iter().map(|e| e.key().clone()).collect();
        for call_id in stuck {
            if let Some((_, tx)) = self.pending_calls.remove(&call_id) {
                let _ = tx.send(Err(SystemError::SystemStopped));
            }
        }
        self.outgoing_call_peers.clear();
        self.node.stop().await;
        self.actor_registry.clear();
        self.name_registry.clear();
        self.remote_members.clear();
    }

    // ── Local actor lifecycle ────────────────────────────────────────────

    /// Registers a freshly created local actor and returns its `ActorId`.
    pub fn ready(&self, actor: Arc<dyn Actor>) -> ActorId {
        let id = ActorId::generate(self.local_peer_id());
        self.actor_registry.register(id.uuid.clone(), actor);
        id
    }

    /// Unregisters a local actor, releasing any names it held.
    pub fn resign(&self, id: &ActorId) {
        self.actor_registry.unregister(&id.uuid);
        self.name_registry.unregister_by_actor(id);
    }

    /// Claims `name` for `id`. Fails with `NameAlreadyTaken` if another
    /// actor already holds it.
    pub fn claim_name(&self, name: &str, id: &ActorId) -> Result<(), SystemError> {
        self.name_registry.register(name, id.clone())
    }

    /// Resolves `name` to the `ActorId` currently holding it, among this
    /// host's own locally registered names.
    pub fn find_by_name(&self, name: &str) -> Option<ActorId> {
        self.name_registry.find(name)
    }

    /// Finds `name` anywhere in the mesh by asking `peer`'s `SystemActor`.
    /// `peer` is typically a host already connected to.
    pub async fn find_member(&self, peer: &PeerId, name: &str) -> Result<Option<MemberInfo>, SystemError> {
        let handle = ActorHandle::new(ActorId::well_known(peer.clone()));
        self.remote_call(&handle, "SystemActor.find_member:1", &name.to_string())
            .await
    }

    /// Lists every member `peer`'s `SystemActor` currently knows about.
    pub async fn list_members(&self, peer: &PeerId) -> Result<Vec<MemberInfo>, SystemError> {
        let handle = ActorHandle::new(ActorId::well_known(peer.clone()));
        self.remote_call(&handle, "SystemActor.list_members:0", &())
            .await
    }

    /// Locals-first, remotes-grouped-by-peer enumeration of every member
    /// this host currently knows about. Remote groups are refreshed live
    /// under `member_exchange_timeout`, falling back to the cached
    /// snapshot on timeout or error.
    pub async fn all_members_with_status(self: &Arc<Self>) -> Vec<MemberInfo> {
        let local_registry = self.actor_registry.clone();
        let name_registry = self.name_registry.clone();
        let remote_members = self.remote_members.clone();
        let local_peer = self.local_peer_id();
        let describer = SystemActor::new(local_registry, name_registry, remote_members, local_peer.clone());
        let mut result = describer.local_members();

        let mut seen = std::collections::HashSet::new();
        let peers: Vec<PeerId> = self
            .remote_members
            .iter()
            .map(|e| e.value().actor_id.peer.clone())
            .filter(|p| seen.insert(p.clone()))
            .collect();

        for peer in peers {
            if self.connect_to_peer(&peer).await.is_err() {
                result.extend(self.cached_remote_for(&peer));
                continue;
            }
            match tokio::time::timeout(self.member_exchange_timeout, self.list_members(&peer)).await {
                Ok(Ok(fresh)) => result.extend(fresh.into_iter().filter(|m| m.peer_id != local_peer.to_string())),
                _ => result.extend(self.cached_remote_for(&peer)),
            }
        }
        result
    }

    fn cached_remote_for(&self, peer: &PeerId) -> Vec<MemberInfo> {
        self.remote_members
            .iter()
            .filter(|e| e.value().actor_id.peer == *peer)
            .map(|e| e.value().clone())
            .collect()
    }

    // ── Dispatch decision ────────────────────────────────────────────────

    pub async fn remote_call<A, R>(
        &self,
        actor: &ActorHandle,
        method: &str,
        args: &A,
    ) -> Result<R, SystemError>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        let arg_bytes = cbor_encode(args)?;
        let result = self.dispatch(actor, method, arg_bytes).await?;
        match result {
            CallResult::Void => {
                let unit_bytes = cbor_encode(&())?;
                cbor_decode(&unit_bytes).map_err(SystemError::from)
            }
            CallResult::Success { value } => cbor_decode(&value).map_err(SystemError::from),
            CallResult::Failure { error } => Err(system_error_from_runtime(error, method)),
        }
    }

    pub async fn remote_call_void<A>(
        &self,
        actor: &ActorHandle,
        method: &str,
        args: &A,
    ) -> Result<(), SystemError>
    where
        A: Serialize,
    {
        let arg_bytes = cbor_encode(args)?;
        match self.dispatch(actor, method, arg_bytes).await? {
            CallResult::Void | CallResult::Success { .. } => Ok(()),
            CallResult::Failure { error } => Err(system_error_from_runtime(error, method)),
        }
    }

    async fn dispatch(
        &self,
        actor: &ActorHandle,
        method: &str,
        arg_bytes: Vec<u8>,
    ) -> Result<CallResult, SystemError> {
        if actor.id.peer == self.local_peer_id() {
            let found = self
                .actor_registry
                .find(&actor.id.uuid)
                .ok_or_else(|| SystemError::ActorNotFound(actor.id.uuid.clone()))?;
            return Ok(match found.dispatch(method, &arg_bytes) {
                Ok(bytes) => CallResult::Success { value: bytes },
                Err(e) => CallResult::Failure {
                    error: RuntimeError::ExecutionFailed {
                        target: method.to_string(),
                        message: e.0,
                    },
                },
            });
        }

        let conn = self
            .node
            .transport_for(&actor.id.peer)
            .ok_or_else(|| SystemError::PeerNotFound(actor.id.peer.to_string()))?;
        let call_id = Uuid::new_v4().to_string();
        let envelope = InvocationEnvelope {
            call_id: call_id.clone(),
            recipient_uuid: actor.id.uuid.clone(),
            sender_peer: self.local_peer_id().to_string(),
            target: method.to_string(),
            arguments: arg_bytes,
        };

        let (tx, rx) = oneshot::channel();
        self.pending_calls.insert(call_id.clone(), tx);
        self.outgoing_call_peers
            .insert(call_id.clone(), actor.id.peer.clone());

        if let Err(e) = conn.lock().await.send(&Frame::Invocation(envelope)).await {
            self.pending_calls.remove(&call_id);
            self.outgoing_call_peers.remove(&call_id);
            return Err(e.into());
        }

        match tokio::time::timeout(self.remote_call_timeout, rx).await {
            Ok(Ok(Ok(resp))) => Ok(resp.result),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_)) => Err(SystemError::SystemStopped),
            Err(_) => {
                self.pending_calls.remove(&call_id);
                self.outgoing_call_peers.remove(&call_id);
                Err(SystemError::Timeout)
            }
        }
    }

    // ── Peer connect and member exchange ──────────────────────────────────

    /// Dials `peer`, spawns its per-connection loop, then fetches and
    /// caches its member list. Member-exchange failures are non-fatal.
    ///
    /// `peer` may be a placeholder identity the caller invented from a bare
    /// host:port (e.g. `mm tell`/`mm list`, which don't know the remote's
    /// name up front); the connection loop and member cache are keyed by
    /// the handshake-learned real identity `node.connect` resolves, since
    /// that's the peer `dispatch` looks up once it has a remote `ActorId`.
    pub async fn connect_to_peer(self: &Arc<Self>, peer: &PeerId) -> Result<(), SystemError> {
        let real = self.node.connect(peer).await?;
        if let Some(conn) = self.node.transport_for(&real) {
            self.spawn_connection_loop(real.clone(), conn);
        }
        self.exchange_member_info(&real).await;
        Ok(())
    }

    async fn exchange_member_info(self: &Arc<Self>, peer: &PeerId) {
        match self.list_members(peer).await {
            Ok(members) => {
                let local = self.local_peer_id().to_string();
                for m in members {
                    if m.peer_id != local {
                        self.remote_members.insert(m.actor_id.uuid.clone(), m);
                    }
                }
            }
            Err(e) => {
                tracing::debug!(peer = %peer, error = %e, "member exchange failed, ignoring");
            }
        }
    }

    // ── Per-connection loop ───────────────────────────────────────────────

    fn spawn_connection_loop<C: Connection + 'static>(
        self: &Arc<Self>,
        peer_id: PeerId,
        conn: Arc<tokio::sync::Mutex<C>>,
    ) {
        let this = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                let frame = { conn.lock().await.recv().await };
                match frame {
                    Ok(Frame::Invocation(env)) => {
                        let resp = this.compute_response(env);
                        if conn.lock().await.send(&Frame::Response(resp)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Frame::Response(env)) => {
                        this.outgoing_call_peers.remove(&env.call_id);
                        if let Some((_, tx)) = this.pending_calls.remove(&env.call_id) {
                            let _ = tx.send(Ok(env));
                        }
                    }
                    Err(_) => break,
                }
            }
            this.on_connection_closed(&peer_id);
        });
        self.connection_tasks.insert(peer_id, handle);
    }

    fn compute_response(&self, env: InvocationEnvelope) -> ResponseEnvelope {
        let result = match self.actor_registry.find(&env.recipient_uuid) {
            None => CallResult::Failure {
                error: RuntimeError::ActorNotFound {
                    uuid: env.recipient_uuid.clone(),
                },
            },
            Some(actor) => {
                match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    actor.dispatch(&env.target, &env.arguments)
                })) {
                    Ok(Ok(bytes)) => CallResult::Success { value: bytes },
                    Ok(Err(e)) => CallResult::Failure {
                        error: RuntimeError::ExecutionFailed {
                            target: env.target.clone(),
                            message: e.0,
                        },
                    },
                    Err(_) => CallResult::Failure {
                        error: RuntimeError::ExecutionFailed {
                            target: env.target.clone(),
                            message: "actor panicked".to_string(),
                        },
                    },
                }
            }
        };
        ResponseEnvelope {
            call_id: env.call_id,
            result,
        }
    }

    fn on_connection_closed(&self, peer: &PeerId) {
        self.connection_tasks.remove(peer);
        self.node.disconnect(peer);

        let stale: Vec<String> = self
            .outgoing_call_peers
            .iter()
            .filter(|e| e.value() == peer)
            .map(|e| e.key().clone())
            .collect();
        for call_id in stale {
            self.outgoing_call_peers.remove(&call_id);
            if let Some((_, tx)) = self.pending_calls.remove(&call_id) {
                let _ = tx.send(Err(SystemError::Mesh(MeshError::ConnectionFailed(
                    format!("connection to {peer} dropped"),
                ))));
            }
        }

        self.remote_members.retain(|_, v| v.actor_id.peer != *peer);
        self.name_registry.unregister_by_peer(peer);
    }
}

/// Converts the wire-level error a failed call carried back into the local
/// error taxonomy. `target` is the method that was invoked, used to fill in
/// `RuntimeError::unknown_tag` if the peer's error variant predates (or
/// postdates) this binary's `RuntimeError` and decoded as `Unknown`.
fn system_error_from_runtime(error: RuntimeError, target: &str) -> SystemError {
    let error = match error {
        RuntimeError::Unknown => RuntimeError::unknown_tag(target),
        other => other,
    };
    match error {
        RuntimeError::ActorNotFound { uuid } => SystemError::ActorNotFound(uuid),
        RuntimeError::ExecutionFailed { target, message } => {
            SystemError::ExecutionFailed { target, message }
        }
        RuntimeError::Unknown => unreachable!("replaced above"),
    }
}

impl From<MeshError> for SystemError {
    fn from(e: MeshError) -> Self {
        SystemError::Mesh(e)
    }
}
