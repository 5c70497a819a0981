//! `PeerNode` — the listening endpoint and outbound-connection cache for a
//! single host in the mesh.
//!
//! An accept loop feeds an internal queue of `(peer_id, connection)` pairs;
//! a map of live outbound connections is keyed by peer identity over
//! [`crate::transport::TcpTransport`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::error::MeshError;
use crate::peer::PeerId;
use crate::transport::{Transport, TcpTransport};

/// Construction parameters for a [`PeerNode`]: this host's name and the
/// address it listens on.
#[derive(Debug, Clone)]
pub struct PeerNodeConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
}

/// A shared, lockable connection handle. Reads happen from exactly one
/// task (the per-connection loop that owns the `(PeerId, SharedConn)` pair
/// handed out by [`PeerNode::incoming_connections`] or returned by
/// `connect`); writes (responses and outgoing invocations) may come from
/// several tasks, so sends are serialized through the mutex.
pub type SharedConn<C> = Arc<Mutex<C>>;

/// Owns the listening endpoint and outbound connection cache for one host.
pub struct PeerNode<T: Transport = TcpTransport> {
    config: PeerNodeConfig,
    transport: Arc<T>,
    outbound: DashMap<PeerId, SharedConn<T::Conn>>,
    /// Maps an address a caller dialed (which may be a placeholder `PeerId`
    /// it invented because it only knew a host:port) to the handshake-learned
    /// identity actually serving that connection, so a later lookup by
    /// either the dialed address or the real identity finds the same entry.
    resolved: DashMap<PeerId, PeerId>,
    incoming_tx: mpsc::Sender<(PeerId, SharedConn<T::Conn>)>,
    incoming_rx: Mutex<Option<mpsc::Receiver<(PeerId, SharedConn<T::Conn>)>>>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
}

impl PeerNode<TcpTransport> {
    /// A `PeerNode` over the reference TCP transport, using its default
    /// 5 s connect timeout.
    pub fn new(config: PeerNodeConfig) -> Self {
        Self::with_transport(config, TcpTransport::new())
    }

    /// A `PeerNode` over the reference TCP transport with a configured
    /// dial timeout.
    pub fn with_connect_timeout(config: PeerNodeConfig, connect_timeout: std::time::Duration) -> Self {
        Self::with_transport(config, TcpTransport::with_connect_timeout(connect_timeout))
    }
}

impl<T: Transport + 'static> PeerNode<T> {
    pub fn with_transport(config: PeerNodeConfig, transport: T) -> Self {
        let (incoming_tx, incoming_rx) = mpsc::channel(64);
        Self {
            config,
            transport: Arc::new(transport),
            outbound: DashMap::new(),
            resolved: DashMap::new(),
            incoming_tx,
            incoming_rx: Mutex::new(Some(incoming_rx)),
            accept_task: Mutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    /// This host's own `PeerId`, using the actually-bound port once
    /// `start()` has run; falls back to the configured port before that.
    pub fn local_peer_id(&self) -> PeerId {
        let port = self.transport.bound_port().unwrap_or(self.config.port);
        PeerId::new(self.config.name.clone(), self.config.host.clone(), port)
    }

    /// Binds the listener and spawns the accept loop. Idempotent. Fails
    /// with `MeshError::PortUnavailable` if the requested port is in use.
    pub async fn start(&self) -> Result<(), MeshError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.transport
            .bind(&self.config.host, self.config.port)
            .await?;
        let self_id = self.local_peer_id();
        let transport = self.transport.clone();
        let tx = self.incoming_tx.clone();
        let handle = tokio::spawn(async move {
            loop {
                match transport.accept(&self_id).await {
                    Ok((peer_id, conn)) => {
                        if tx
                            .send((peer_id, Arc::new(Mutex::new(conn))))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "accept loop exiting");
                        break;
                    }
                }
            }
        });
        *self.accept_task.lock().await = Some(handle);
        Ok(())
    }

    /// Cancels the accept loop and drops every outbound connection.
    /// Idempotent.
    pub async fn stop(&self) {
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.accept_task.lock().await.take() {
            handle.abort();
        }
        self.outbound.clear();
        self.resolved.clear();
    }

    /// Dials `peer` and caches the connection, keyed by both `peer` and the
    /// handshake-learned identity the remote actually reports. Returns the
    /// learned identity, which the caller should use for any further lookup
    /// (`transport_for`, `disconnect`) since that's the key `dispatch` uses
    /// once it has resolved an actor's real `ActorId.peer`. Idempotent: a
    /// second call for an address already resolved is a no-op.
    pub async fn connect(&self, peer: &PeerId) -> Result<PeerId, MeshError> {
        if let Some(real) = self.resolved.get(peer) {
            return Ok(real.clone());
        }
        let (remote, conn) = self.transport.dial(peer, &self.local_peer_id()).await?;
        let conn = Arc::new(Mutex::new(conn));
        self.outbound.insert(remote.clone(), conn.clone());
        self.resolved.insert(peer.clone(), remote.clone());
        if &remote != peer {
            self.outbound.insert(peer.clone(), conn);
            self.resolved.insert(remote.clone(), remote.clone());
        }
        Ok(remote)
    }

    /// Removes and closes the cached connection to `peer`, under both its
    /// dialed address (if any) and its resolved real identity.
    pub fn disconnect(&self, peer: &PeerId) {
        let real = self
            .resolved
            .get(peer)
            .map(|r| r.clone())
            .unwrap_or_else(|| peer.clone());
        self.outbound.remove(&real);
        self.outbound.remove(peer);
        self.resolved.retain(|k, v| k != peer && v != &real);
    }

    /// The cached connection for `peer`, if one exists (dialed via
    /// `connect`, or an accepted connection registered via
    /// [`PeerNode::register_outbound`]).
    pub fn transport_for(&self, peer: &PeerId) -> Option<SharedConn<T::Conn>> {
        self.outbound.get(peer).map(|entry| entry.value().clone())
    }

    /// Registers a connection under `peer` without dialing. Used by
    /// `CommunitySystem` so that an accepted inbound connection is also
    /// reachable for outgoing sends back to that peer.
    pub fn register_outbound(&self, peer: PeerId, conn: SharedConn<T::Conn>) {
        self.resolved.entry(peer.clone()).or_insert_with(|| peer.clone());
        self.outbound.entry(peer).or_insert(conn);
    }

    pub fn connected_peers(&self) -> Vec<PeerId> {
        self.outbound.iter().map(|e| e.key().clone()).collect()
    }

    /// Takes the single-consumer receiver of accepted `(peer_id,
    /// connection)` pairs. Returns `None` if already taken.
    pub async fn incoming_connections(
        &self,
    ) -> Option<mpsc::Receiver<(PeerId, SharedConn<T::Conn>)>> {
        self.incoming_rx.lock().await.take()
    }
}
