pub mod actor;
pub mod error;
pub mod node;
pub mod peer;
pub mod protocol;
pub mod transport;

pub use actor::{Actor, ActorError, ActorId, WELL_KNOWN_SYSTEM_UUID};
pub use error::MeshError;
pub use node::{PeerNode, PeerNodeConfig};
pub use peer::PeerId;
pub use protocol::{CallResult, Frame, InvocationEnvelope, MemberInfo, ResponseEnvelope, RuntimeError};
pub use transport::{Connection, TcpTransport, Transport};
