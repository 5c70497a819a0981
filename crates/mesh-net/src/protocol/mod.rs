pub mod codec;
pub mod types;

pub use codec::{cbor_decode, cbor_encode, decode_frame, encode_frame, read_framed, write_framed};
pub use types::{
    CallResult, Frame, Handshake, InvocationEnvelope, MemberInfo, ResponseEnvelope, RuntimeError,
};
