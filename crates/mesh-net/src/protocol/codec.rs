//! Length-prefixed CBOR framing.
//!
//! Wire format per message: `[4 bytes big-endian length][CBOR payload]`.
//! Max message size: 8 MiB; larger payloads are rejected outright rather
//! than silently truncated.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::MeshError;
use crate::protocol::types::Frame;

const MAX_MSG_BYTES: u32 = 8 * 1024 * 1024; // 8 MiB

/// CBOR-encode `value` to a plain byte vector (no length prefix).
pub fn cbor_encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, MeshError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)
        .map_err(|e| MeshError::MalformedFrame(e.to_string()))?;
    Ok(buf)
}

/// CBOR-decode a plain byte slice (no length prefix).
pub fn cbor_decode<T: for<'de> serde::Deserialize<'de>>(data: &[u8]) -> Result<T, MeshError> {
    ciborium::from_reader(data).map_err(|e| MeshError::MalformedFrame(e.to_string()))
}

/// Write `value` to `io` as a length-prefixed CBOR payload.
pub async fn write_framed<W, T>(io: &mut W, value: &T) -> Result<(), MeshError>
where
    W: AsyncWrite + Unpin + Send,
    T: serde::Serialize,
{
    let payload = cbor_encode(value)?;
    if payload.len() as u64 > MAX_MSG_BYTES as u64 {
        return Err(MeshError::MalformedFrame("message too large".to_string()));
    }
    let len = payload.len() as u32;
    io.write_all(&len.to_be_bytes()).await?;
    io.write_all(&payload).await?;
    io.flush().await?;
    Ok(())
}

/// Read one length-prefixed CBOR payload from `io`.
pub async fn read_framed<R, T>(io: &mut R) -> Result<T, MeshError>
where
    R: AsyncRead + Unpin + Send,
    T: for<'de> serde::Deserialize<'de>,
{
    let mut len_buf = [0u8; 4];
    io.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_MSG_BYTES {
        return Err(MeshError::MalformedFrame(
            "incoming message too large".to_string(),
        ));
    }
    let mut payload = vec![0u8; len as usize];
    io.read_exact(&mut payload).await?;
    cbor_decode(&payload)
}

/// Encode a single [`Frame`] to a self-contained length-prefixed byte
/// buffer, for callers (e.g. unit tests) that want the bytes without
/// driving an `AsyncWrite`.
pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>, MeshError> {
    let payload = cbor_encode(frame)?;
    if payload.len() as u64 > MAX_MSG_BYTES as u64 {
        return Err(MeshError::MalformedFrame("message too large".to_string()));
    }
    let mut out = Vec::with_capacity(4 + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Decode a single length-prefixed [`Frame`] from a byte buffer, requiring
/// the buffer to contain exactly one frame (no trailing bytes).
pub fn decode_frame(bytes: &[u8]) -> Result<Frame, MeshError> {
    if bytes.len() < 4 {
        return Err(MeshError::MalformedFrame("buffer too short".to_string()));
    }
    let len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    let payload = bytes
        .get(4..4 + len)
        .ok_or_else(|| MeshError::MalformedFrame("length/payload mismatch".to_string()))?;
    if payload.len() != bytes.len() - 4 {
        return Err(MeshError::MalformedFrame("trailing bytes".to_string()));
    }
    cbor_decode(payload)
}
