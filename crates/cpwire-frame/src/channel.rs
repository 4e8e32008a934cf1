//! Channel naming.
//!
//! Every remote method is bound to its own channel, named
//! `<prefix>.<api>.<method>`. Names are opaque on the wire; only their length
//! and encoding are checked.

use crate::error::{FrameError, Result};

/// Prefix of channels bound by generated-style APIs.
pub const CHANNEL_PREFIX: &str = "cpwire";

/// Maximum channel name length in bytes.
pub const MAX_CHANNEL_NAME_LEN: usize = 1024;

/// Channel name for one method of an API.
pub fn method_channel(api: &str, method: &str) -> String {
    format!("{CHANNEL_PREFIX}.{api}.{method}")
}

/// Returns an error unless `name` is a usable channel name.
pub fn validate_channel_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(FrameError::InvalidChannel("empty name".to_string()));
    }
    if name.len() > MAX_CHANNEL_NAME_LEN {
        return Err(FrameError::InvalidChannel(format!(
            "{} bytes, max {MAX_CHANNEL_NAME_LEN}",
            name.len()
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(FrameError::InvalidChannel(
            "contains control characters".to_string(),
        ));
    }
    Ok(())
}
