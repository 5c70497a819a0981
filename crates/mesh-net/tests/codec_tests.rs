//! CBOR round-trip tests for the wire-protocol types.
//!
//! Each test encodes a value to CBOR bytes and decodes it back, asserting
//! that the result is equal to the original.

use mesh_net::actor::ActorId;
use mesh_net::peer::PeerId;
use mesh_net::protocol::{
    cbor_decode, cbor_encode, decode_frame, encode_frame, CallResult, Frame, Handshake,
    InvocationEnvelope, MemberInfo, ResponseEnvelope, RuntimeError,
};

fn roundtrip<T>(value: &T) -> T
where
    T: serde::Serialize + for<'de> serde::Deserialize<'de> + std::fmt::Debug + PartialEq,
{
    let bytes = cbor_encode(value).expect("encode");
    let decoded: T = cbor_decode(&bytes).expect("decode");
    decoded
}

#[test]
fn invocation_envelope_roundtrip() {
    let env = InvocationEnvelope {
        call_id: "call-1".into(),
        recipient_uuid: "00000000-0000-0000-0000-000000000001".into(),
        sender_peer: "alice@127.0.0.1:50051".into(),
        target: "Member.tell:1".into(),
        arguments: vec![1, 2, 3, 4],
    };
    assert_eq!(env, roundtrip(&env));
}

#[test]
fn response_envelope_void_roundtrip() {
    let resp = ResponseEnvelope {
        call_id: "call-1".into(),
        result: CallResult::Void,
    };
    assert_eq!(resp, roundtrip(&resp));
}

#[test]
fn response_envelope_success_roundtrip() {
    let resp = ResponseEnvelope {
        call_id: "call-2".into(),
        result: CallResult::Success {
            value: vec![0xde, 0xad, 0xbe, 0xef],
        },
    };
    assert_eq!(resp, roundtrip(&resp));
}

#[test]
fn response_envelope_failure_roundtrip() {
    let resp = ResponseEnvelope {
        call_id: "call-3".into(),
        result: CallResult::Failure {
            error: RuntimeError::ActorNotFound {
                uuid: "missing-uuid".into(),
            },
        },
    };
    assert_eq!(resp, roundtrip(&resp));
}

#[test]
fn execution_failed_roundtrip() {
    let err = RuntimeError::ExecutionFailed {
        target: "Member.tell:1".into(),
        message: "pty closed".into(),
    };
    assert_eq!(err, roundtrip(&err));
}

#[test]
fn unknown_tag_helper_produces_execution_failed() {
    let err = RuntimeError::unknown_tag("Member.tell:1");
    match err {
        RuntimeError::ExecutionFailed { target, message } => {
            assert_eq!(target, "Member.tell:1");
            assert_eq!(message, "unknown error tag");
        }
        _ => panic!("expected ExecutionFailed"),
    }
}

#[test]
fn decoding_an_unrecognized_error_kind_does_not_fail_the_frame() {
    #[derive(serde::Serialize)]
    struct ForwardCompatError {
        kind: String,
        retry_after_ms: u64,
    }

    let bytes = cbor_encode(&ForwardCompatError {
        kind: "rate_limited".to_string(),
        retry_after_ms: 250,
    })
    .expect("encode");

    let decoded: RuntimeError = cbor_decode(&bytes).expect("an unknown kind must still decode");
    assert_eq!(decoded, RuntimeError::Unknown);
}

#[test]
fn frame_invocation_roundtrip() {
    let frame = Frame::Invocation(InvocationEnvelope {
        call_id: "call-1".into(),
        recipient_uuid: "00000000-0000-0000-0000-000000000001".into(),
        sender_peer: "alice@127.0.0.1:50051".into(),
        target: "SystemActor.list_members:0".into(),
        arguments: vec![],
    });
    assert_eq!(frame, roundtrip(&frame));
}

#[test]
fn frame_response_roundtrip() {
    let frame = Frame::Response(ResponseEnvelope {
        call_id: "call-1".into(),
        result: CallResult::Void,
    });
    assert_eq!(frame, roundtrip(&frame));
}

#[test]
fn handshake_roundtrip() {
    let hs = Handshake {
        peer_id: "bob@10.0.0.2:50051".into(),
    };
    assert_eq!(hs, roundtrip(&hs));
}

#[test]
fn member_info_roundtrip() {
    let peer = PeerId::new("alice", "127.0.0.1", 50051);
    let info = MemberInfo {
        name: "shell-1".into(),
        actor_id: ActorId::generate(peer.clone()),
        peer_id: peer.to_string(),
        transport: "tcp".into(),
        command: Some("bash".into()),
        cwd: Some("/home/alice".into()),
        foreground_process: None,
    };
    assert_eq!(info, roundtrip(&info));
}

#[test]
fn encode_frame_decode_frame_length_prefixed_roundtrip() {
    let frame = Frame::Invocation(InvocationEnvelope {
        call_id: "call-9".into(),
        recipient_uuid: "00000000-0000-0000-0000-000000000001".into(),
        sender_peer: "alice@127.0.0.1:50051".into(),
        target: "Member.tell:1".into(),
        arguments: b"hello".to_vec(),
    });
    let bytes = encode_frame(&frame).expect("encode_frame");
    let len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    assert_eq!(len, bytes.len() - 4);
    let decoded = decode_frame(&bytes).expect("decode_frame");
    assert_eq!(decoded, frame);
}

#[test]
fn decode_frame_rejects_truncated_buffer() {
    let frame = Frame::Response(ResponseEnvelope {
        call_id: "call-1".into(),
        result: CallResult::Void,
    });
    let mut bytes = encode_frame(&frame).unwrap();
    bytes.truncate(bytes.len() - 1);
    assert!(decode_frame(&bytes).is_err());
}

#[test]
fn same_value_encodes_identically() {
    let env = InvocationEnvelope {
        call_id: "call-1".into(),
        recipient_uuid: "u".into(),
        sender_peer: "p".into(),
        target: "t".into(),
        arguments: vec![1],
    };
    let a = cbor_encode(&env).unwrap();
    let b = cbor_encode(&env).unwrap();
    assert_eq!(a, b, "CBOR encoding must be deterministic for the same value");
}
