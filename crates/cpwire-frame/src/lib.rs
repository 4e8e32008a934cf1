//! Length-prefixed request/reply framing for named channels.
//!
//! Carries encoded channel messages across a byte stream. Every frame has:
//! - A 2-byte magic number ("CW") for stream synchronization
//! - A kind byte (request, reply, no-reply, failure)
//! - A 4-byte little-endian request id pairing replies with requests
//! - The channel name and the payload, each length-prefixed
//!
//! No partial reads, no buffer management in user code.

pub mod channel;
pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use channel::{method_channel, validate_channel_name, CHANNEL_PREFIX, MAX_CHANNEL_NAME_LEN};
pub use codec::{
    decode_frame, encode_frame, Frame, FrameConfig, FrameKind, DEFAULT_MAX_PAYLOAD, HEADER_SIZE,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
