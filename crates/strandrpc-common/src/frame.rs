//! Frame Codec
//!
//! Every value that crosses the wire, whether an envelope or an argument
//! tuple, is a self-delimiting frame:
//!
//! ```text
//! [8-byte body length, u64 little-endian] [postcard body]
//! ```
//!
//! The length excludes the header itself. Postcard output carries no length
//! of its own, so the prefix is written here rather than relied upon from
//! the serializer.
//!
//! Readers follow a fixed protocol: read exactly [`HEADER_LEN`] bytes, turn
//! them into a body length with [`body_len`], read exactly that many more
//! bytes, and hand the whole buffer to [`decode`]. A partial frame is never
//! decoded.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ProtocolError;

/// Size of the length prefix.
pub const HEADER_LEN: usize = 8;

/// Default upper bound on a frame body (100 MB).
pub const DEFAULT_MAX_FRAME_SIZE: u64 = 100 * 1024 * 1024;

/// Encodes `value` into a complete frame.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    let buf = postcard::to_extend(value, vec![0u8; HEADER_LEN]).map_err(ProtocolError::Encode)?;
    Ok(seal(buf))
}

/// Writes the length prefix over the first [`HEADER_LEN`] bytes of `buf`.
fn seal(mut buf: Vec<u8>) -> Vec<u8> {
    let body_len = (buf.len() - HEADER_LEN) as u64;
    buf[..HEADER_LEN].copy_from_slice(&body_len.to_le_bytes());
    buf
}

/// Decodes a complete frame.
///
/// The declared length must match the bytes present and the body must be
/// consumed exactly.
pub fn decode<T: DeserializeOwned>(frame: &[u8]) -> Result<T, ProtocolError> {
    if frame.len() < HEADER_LEN {
        return Err(ProtocolError::FrameTooShort(frame.len()));
    }

    let declared = declared_len(frame);
    let actual = (frame.len() - HEADER_LEN) as u64;
    if declared != actual {
        return Err(ProtocolError::LengthMismatch { declared, actual });
    }

    let (value, rest) =
        postcard::take_from_bytes(&frame[HEADER_LEN..]).map_err(ProtocolError::Decode)?;
    if !rest.is_empty() {
        return Err(ProtocolError::TrailingBytes(rest.len()));
    }

    Ok(value)
}

/// Reads the body length out of a frame header, enforcing `max_frame_size`.
pub fn body_len(header: &[u8; HEADER_LEN], max_frame_size: u64) -> Result<usize, ProtocolError> {
    let declared = u64::from_le_bytes(*header);
    if declared > max_frame_size {
        return Err(ProtocolError::FrameTooLarge {
            declared,
            max: max_frame_size,
        });
    }
    usize::try_from(declared).map_err(|_| ProtocolError::FrameTooLarge {
        declared,
        max: max_frame_size,
    })
}

/// Allocates a frame buffer of the declared size with `header` copied in.
///
/// The caller fills `buf[HEADER_LEN..]` with exactly `body_len` bytes.
pub fn buffer_for(header: &[u8; HEADER_LEN], body_len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; HEADER_LEN + body_len];
    buf[..HEADER_LEN].copy_from_slice(header);
    buf
}

fn declared_len(frame: &[u8]) -> u64 {
    let mut header = [0u8; HEADER_LEN];
    header.copy_from_slice(&frame[..HEADER_LEN]);
    u64::from_le_bytes(header)
}
