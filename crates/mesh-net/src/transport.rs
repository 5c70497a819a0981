//! TCP transport and framed connections.
//!
//! Plain `tokio::net::TcpStream`, no handshake encryption layer: `PeerId`
//! here is a self-reported `name@host:port` triple, not a cryptographic
//! identity, so there is nothing to authenticate against.

use async_trait::async_trait;
use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::{TcpListener, TcpStream};

use crate::error::MeshError;
use crate::peer::PeerId;
use crate::protocol::codec::{read_framed, write_framed};
use crate::protocol::types::{Frame, Handshake};

/// A framed, bidirectional connection to a single remote peer.
///
/// `send`/`recv` exchange whole [`Frame`]s; the handshake (exchanging
/// [`Handshake`] before any `Frame` flows) is performed once by
/// [`Transport::connect`] / [`Transport::accept`] and is not repeated here.
#[async_trait]
pub trait Connection: Send {
    async fn send(&mut self, frame: &Frame) -> Result<(), MeshError>;
    async fn recv(&mut self) -> Result<Frame, MeshError>;
}

/// Dials and accepts connections to other hosts in the mesh.
#[async_trait]
pub trait Transport: Send + Sync {
    type Conn: Connection;

    /// Bind a listening socket on `host:port`. Fails with
    /// `MeshError::PortUnavailable` if the port is already taken.
    async fn bind(&self, host: &str, port: u16) -> Result<(), MeshError>;

    /// The port actually bound, which may differ from the requested port
    /// if `0` (ephemeral) was requested. `None` before `bind` is called.
    fn bound_port(&self) -> Option<u16>;

    /// Accept the next inbound connection, completing the handshake and
    /// returning the remote's self-reported `PeerId` alongside the
    /// connection. Must be called after a successful `bind`.
    async fn accept(&self, self_id: &PeerId) -> Result<(PeerId, Self::Conn), MeshError>;

    /// Dial `peer`, completing the handshake with `self_id`. Returns the
    /// remote's handshake-reported `PeerId` alongside the connection, which
    /// may differ from `peer` when the caller dialed a placeholder address
    /// (e.g. `mm tell`/`mm list`, which know only a host:port, not the
    /// remote's name).
    async fn dial(&self, peer: &PeerId, self_id: &PeerId) -> Result<(PeerId, Self::Conn), MeshError>;
}

/// A [`Connection`] backed by a split plain TCP stream.
pub struct TcpConnection {
    reader: ReadHalf<TcpStream>,
    writer: WriteHalf<TcpStream>,
}

impl TcpConnection {
    fn new(stream: TcpStream) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self { reader, writer }
    }

    async fn send_handshake(&mut self, self_id: &PeerId) -> Result<(), MeshError> {
        write_framed(
            &mut self.writer,
            &Handshake {
                peer_id: self_id.to_string(),
            },
        )
        .await
    }

    async fn recv_handshake(&mut self) -> Result<PeerId, MeshError> {
        let hs: Handshake = read_framed(&mut self.reader).await?;
        hs.peer_id.parse()
    }
}

#[async_trait]
impl Connection for TcpConnection {
    async fn send(&mut self, frame: &Frame) -> Result<(), MeshError> {
        write_framed(&mut self.writer, frame).await
    }

    async fn recv(&mut self) -> Result<Frame, MeshError> {
        read_framed(&mut self.reader).await
    }
}

/// Reference [`Transport`] implementation over plain TCP.
pub struct TcpTransport {
    listener: tokio::sync::OnceCell<TcpListener>,
    bound_port: std::sync::atomic::AtomicU16,
    connect_timeout: std::time::Duration,
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpTransport {
    pub fn new() -> Self {
        Self::with_connect_timeout(std::time::Duration::from_secs(5))
    }

    pub fn with_connect_timeout(connect_timeout: std::time::Duration) -> Self {
        Self {
            listener: tokio::sync::OnceCell::new(),
            bound_port: std::sync::atomic::AtomicU16::new(0),
            connect_timeout,
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    type Conn = TcpConnection;

    async fn bind(&self, host: &str, port: u16) -> Result<(), MeshError> {
        let addr = format!("{host}:{port}");
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|_| MeshError::PortUnavailable(port))?;
        let actual = listener
            .local_addr()
            .map_err(|e| MeshError::Io(e.to_string()))?
            .port();
        self.bound_port
            .store(actual, std::sync::atomic::Ordering::SeqCst);
        self.listener
            .set(listener)
            .map_err(|_| MeshError::ConnectionFailed("transport already bound".to_string()))?;
        Ok(())
    }

    fn bound_port(&self) -> Option<u16> {
        let p = self.bound_port.load(std::sync::atomic::Ordering::SeqCst);
        if p == 0 {
            None
        } else {
            Some(p)
        }
    }

    async fn accept(&self, self_id: &PeerId) -> Result<(PeerId, Self::Conn), MeshError> {
        let listener = self
            .listener
            .get()
            .ok_or_else(|| MeshError::ConnectionFailed("transport not bound".to_string()))?;
        let (stream, _addr) = listener.accept().await?;
        stream.set_nodelay(true).ok();
        let mut conn = TcpConnection::new(stream);
        let remote = conn.recv_handshake().await?;
        conn.send_handshake(self_id).await?;
        Ok((remote, conn))
    }

    async fn dial(&self, peer: &PeerId, self_id: &PeerId) -> Result<(PeerId, Self::Conn), MeshError> {
        let addr = format!("{}:{}", peer.host, peer.port);
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| MeshError::ConnectionTimeout)?
            .map_err(|e| MeshError::ConnectionFailed(e.to_string()))?;
        stream.set_nodelay(true).ok();
        let mut conn = TcpConnection::new(stream);
        conn.send_handshake(self_id).await?;
        let remote = conn.recv_handshake().await?;
        if &remote != peer {
            tracing::debug!(
                expected = %peer,
                reported = %remote,
                "dialed peer reported a different PeerId than requested"
            );
        }
        Ok((remote, conn))
    }
}
