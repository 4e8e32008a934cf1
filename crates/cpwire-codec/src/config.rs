/// Default limit on nested lists, maps and typed maps while decoding.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Decode limits. Encoding is unaffected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecConfig {
    /// Maximum nesting depth accepted from the wire.
    pub max_depth: usize,
}

impl CodecConfig {
    pub const fn new() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self::new()
    }
}
