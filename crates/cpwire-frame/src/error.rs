/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame header contains an invalid magic number.
    #[error("invalid frame magic (expected 0x4357 \"CW\")")]
    InvalidMagic,

    /// The frame kind byte is not a known kind.
    #[error("invalid frame kind {0}")]
    InvalidKind(u8),

    /// The channel name is empty, too long or not UTF-8.
    #[error("invalid channel name: {0}")]
    InvalidChannel(String),

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;

impl FrameError {
    /// True when the frame was refused before any byte reached the stream,
    /// which leaves the stream usable.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            FrameError::PayloadTooLarge { .. } | FrameError::InvalidChannel(_)
        )
    }
}
