use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::channel::{validate_channel_name, MAX_CHANNEL_NAME_LEN};
use crate::error::{FrameError, Result};

/// Frame header: magic (2) + kind (1) + id (4) + name length (2) + payload length (4) = 13 bytes.
pub const HEADER_SIZE: usize = 13;

/// Magic bytes: "CW" (0x43 0x57).
pub const MAGIC: [u8; 2] = [0x43, 0x57];

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// What a frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// A message sent to a channel; expects exactly one reply frame.
    Request,
    /// The reply to the request with the same id.
    Reply,
    /// The request with the same id produced no reply (unbound channel).
    NoReply,
    /// The reply to the request with the same id could not be sent. The
    /// payload is a UTF-8 description.
    Failure,
}

impl FrameKind {
    pub fn as_u8(self) -> u8 {
        match self {
            FrameKind::Request => 1,
            FrameKind::Reply => 2,
            FrameKind::NoReply => 3,
            FrameKind::Failure => 4,
        }
    }
}

impl TryFrom<u8> for FrameKind {
    type Error = FrameError;

    fn try_from(v: u8) -> Result<Self> {
        match v {
            1 => Ok(FrameKind::Request),
            2 => Ok(FrameKind::Reply),
            3 => Ok(FrameKind::NoReply),
            4 => Ok(FrameKind::Failure),
            other => Err(FrameError::InvalidKind(other)),
        }
    }
}

/// A framed message on a named channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    /// Correlates a reply with its request.
    pub id: u32,
    /// The channel this message belongs to.
    pub channel: String,
    /// The encoded message.
    pub payload: Bytes,
}

impl Frame {
    pub fn request(id: u32, channel: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            kind: FrameKind::Request,
            id,
            channel: channel.into(),
            payload: payload.into(),
        }
    }

    pub fn reply(id: u32, channel: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            kind: FrameKind::Reply,
            id,
            channel: channel.into(),
            payload: payload.into(),
        }
    }

    pub fn no_reply(id: u32, channel: impl Into<String>) -> Self {
        Self {
            kind: FrameKind::NoReply,
            id,
            channel: channel.into(),
            payload: Bytes::new(),
        }
    }

    pub fn failure(id: u32, channel: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            kind: FrameKind::Failure,
            id,
            channel: channel.into(),
            payload: Bytes::from(reason.into()),
        }
    }

    /// The total wire size of this frame (header + name + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.channel.len() + self.payload.len()
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌───────────┬──────┬──────────┬──────────┬──────────┬─────────┬─────────┐
/// │ Magic (2) │ Kind │ Id       │ Name len │ Body len │ Name    │ Payload │
/// │ "CW"      │ (1)  │ (4B LE)  │ (2B LE)  │ (4B LE)  │ (UTF-8) │         │
/// └───────────┴──────┴──────────┴──────────┴──────────┴─────────┴─────────┘
/// ```
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) -> Result<()> {
    validate_channel_name(&frame.channel)?;
    if frame.payload.len() > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: frame.payload.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(frame.wire_size());
    dst.put_slice(&MAGIC);
    dst.put_u8(frame.kind.as_u8());
    dst.put_u32_le(frame.id);
    dst.put_u16_le(frame.channel.len() as u16);
    dst.put_u32_le(frame.payload.len() as u32);
    dst.put_slice(frame.channel.as_bytes());
    dst.put_slice(&frame.payload);
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    if src.len() < HEADER_SIZE {
        return Ok(None); // Need more data
    }

    if src[0..2] != MAGIC {
        return Err(FrameError::InvalidMagic);
    }

    let mut header = &src[2..HEADER_SIZE];
    let kind = FrameKind::try_from(header.get_u8())?;
    let id = header.get_u32_le();
    let name_len = usize::from(header.get_u16_le());
    let payload_len = header.get_u32_le() as usize;

    if name_len > MAX_CHANNEL_NAME_LEN {
        return Err(FrameError::InvalidChannel(format!(
            "{name_len} bytes, max {MAX_CHANNEL_NAME_LEN}"
        )));
    }
    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    let total = HEADER_SIZE + name_len + payload_len;
    if src.len() < total {
        return Ok(None); // Need more data
    }

    src.advance(HEADER_SIZE);
    let name = src.split_to(name_len);
    let channel = String::from_utf8(name.to_vec())
        .map_err(|err| FrameError::InvalidChannel(err.to_string()))?;
    validate_channel_name(&channel)?;
    let payload = src.split_to(payload_len).freeze();

    Ok(Some(Frame {
        kind,
        id,
        channel,
        payload,
    }))
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}
