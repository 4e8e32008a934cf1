//! Type-tagged binary value codec for channel messages.
//!
//! Two layers:
//! - [`StandardCodec`]: the fixed base format (tags 0-13, variable-length
//!   size prefixes, little-endian integers, 8-byte aligned doubles)
//! - [`ExtendedCodec`]: wraps the base codec and adds typed attribute maps,
//!   attribute sets and resource locators (tags 132-134)
//!
//! Attribute sets and resource locators are encode-only. Decoding their tags
//! fails with [`CodecError::Corrupted`].

pub mod buffer;
pub mod config;
pub mod error;
pub mod extended;
pub mod message;
pub mod standard;
pub mod value;

pub use buffer::{MessageReader, MessageWriter};
pub use config::{CodecConfig, DEFAULT_MAX_DEPTH};
pub use error::{CodecError, Result};
pub use extended::ExtendedCodec;
pub use message::{decode_message, encode_message, ValueCodec};
pub use standard::StandardCodec;
pub use value::{AttributeSet, ResourceLocator, TypedAttributeMap, TypedValue, Value, ValueMap};
