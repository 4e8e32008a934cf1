//! Typed binary messages and remote calls over named channels.
//!
//! # Crate Structure
//!
//! - [`codec`]: the value model and the standard and extended wire codecs
//! - [`frame`]: request/reply framing for byte streams
//! - [`rpc`]: messengers, channel-per-method APIs, method channels and
//!   stream peers (behind the `rpc` feature)

/// Re-export codec types.
pub mod codec {
    pub use cpwire_codec::*;
}

/// Re-export frame types.
pub mod frame {
    pub use cpwire_frame::*;
}

/// Re-export RPC types (requires `rpc` feature).
#[cfg(feature = "rpc")]
pub mod rpc {
    pub use cpwire_rpc::*;
}

pub use cpwire_codec::{CodecError, ExtendedCodec, Value};
