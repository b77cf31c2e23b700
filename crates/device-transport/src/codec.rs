//! Wire framing for device protocol messages.
//!
//! Every frame is `b"?##"` magic, a big-endian u32 payload length, then the
//! payload bytes. Payload contents are opaque to this layer. Datagram
//! transports carry one frame per datagram; stream transports parse frames
//! incrementally out of a receive buffer.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// Frame magic preceding every payload.
pub const FRAME_MAGIC: &[u8; 3] = b"?##";

/// Frame header size: magic + u32 length.
pub const HEADER_LEN: usize = FRAME_MAGIC.len() + 4;

/// Largest payload accepted in a single frame.
pub const MAX_FRAME_PAYLOAD: usize = 1024 * 1024;

/// Encode a payload into a single framed buffer.
pub fn encode_frame(payload: &[u8]) -> Result<Bytes> {
    if payload.len() > MAX_FRAME_PAYLOAD {
        return Err(Error::FrameTooLarge(payload.len()));
    }
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    buf.put_slice(FRAME_MAGIC);
    buf.put_u32(payload.len() as u32);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// Decode a frame that must occupy the buffer exactly (datagram transports).
pub fn decode_datagram(datagram: &[u8]) -> Result<Bytes> {
    let mut buf = BytesMut::from(datagram);
    match try_decode_frame(&mut buf)? {
        Some(payload) if buf.is_empty() => Ok(payload),
        Some(_) => Err(Error::InvalidFrame("trailing bytes after frame".into())),
        None => Err(Error::InvalidFrame("truncated frame".into())),
    }
}

/// Try to pull one complete frame off the front of `buf` (stream transports).
///
/// Returns `Ok(None)` when more bytes are needed. On success the consumed
/// bytes are removed from `buf`, which may still hold the start of the next
/// frame.
pub fn try_decode_frame(buf: &mut BytesMut) -> Result<Option<Bytes>> {
    if buf.len() < HEADER_LEN {
        return Ok(None);
    }
    if &buf[..FRAME_MAGIC.len()] != FRAME_MAGIC {
        return Err(Error::InvalidFrame("bad frame magic".into()));
    }
    let len = u32::from_be_bytes([buf[3], buf[4], buf[5], buf[6]]) as usize;
    if len > MAX_FRAME_PAYLOAD {
        return Err(Error::FrameTooLarge(len));
    }
    if buf.len() < HEADER_LEN + len {
        return Ok(None);
    }
    buf.advance(HEADER_LEN);
    Ok(Some(buf.split_to(len).freeze()))
}
