/// Errors that can occur while encoding or decoding a message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The buffer is malformed: truncated, unknown tag, invalid UTF-8,
    /// alignment underrun, trailing bytes, or a tag that must never be decoded.
    #[error("message corrupted: {0}")]
    Corrupted(String),

    /// The value has no representation in the codec.
    #[error("unsupported value: {0}")]
    Unsupported(String),
}

impl CodecError {
    pub(crate) fn corrupted(reason: impl Into<String>) -> Self {
        Self::Corrupted(reason.into())
    }

    pub(crate) fn unsupported(reason: impl Into<String>) -> Self {
        Self::Unsupported(reason.into())
    }

    /// True for decode-side structural failures.
    pub fn is_corrupted(&self) -> bool {
        matches!(self, Self::Corrupted(_))
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;
