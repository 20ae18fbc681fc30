//! Codec configuration

/// Tunable limits shared by encoders and decoders
#[derive(Debug, Clone)]
pub struct CodecConfig {
    /// Maximum encoded output length in bytes; exceeding it fails the
    /// encode with `StreamTooLarge`
    pub max_stream_length: usize,

    /// Maximum value nesting depth on decode
    pub max_nesting_depth: usize,

    /// Tolerate unknown markers and missing object-end markers on
    /// decode instead of failing
    pub lenient: bool,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_stream_length: 16 * 1024 * 1024,
            max_nesting_depth: 64,
            lenient: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CodecConfig::default();
        assert_eq!(config.max_stream_length, 16 * 1024 * 1024);
        assert_eq!(config.max_nesting_depth, 64);
        assert!(!config.lenient);
    }
}
