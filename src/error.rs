//! Codec error types
//!
//! Every fallible operation in the crate surfaces an [`AmfError`]. Errors
//! are fatal to the current top-level encode/decode call; partially built
//! output is discarded by dropping the codec or calling `reset`.

/// Which AMF dialect a marker belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmfVersion {
    /// AMF0
    Amf0,
    /// AMF3
    Amf3,
}

/// Which reference cache an out-of-range index pointed into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    /// Object cache (both dialects)
    Object,
    /// String cache (AMF3)
    String,
    /// Trait cache (AMF3)
    Trait,
}

/// Error type for AMF encoding and decoding
#[derive(Debug, Clone, PartialEq)]
pub enum AmfError {
    /// Read past the end of the input buffer
    TruncatedStream,
    /// Encoded output exceeded the configured maximum length
    StreamTooLarge {
        /// Length the output would have grown to
        size: usize,
        /// Configured cap
        max: usize,
    },
    /// Unknown type marker for the given dialect
    InvalidMarker {
        /// The offending marker byte
        marker: u8,
        /// Dialect being decoded
        version: AmfVersion,
    },
    /// Reference index outside the current cache
    InvalidReference {
        /// Which cache the index pointed into
        kind: RefKind,
        /// The index read off the wire
        index: usize,
        /// Cache length at the time of the lookup
        size: usize,
    },
    /// A scalar did not fit the wire field (29-bit U29 or 16/32-bit length)
    IntegerOutOfRange(i64),
    /// Non-UTF-8 bytes where UTF-8 is required
    InvalidUtf8,
    /// Nesting exceeded the configured depth limit
    NestingTooDeep,
    /// Host value has no representation in the target dialect
    UnsupportedValue(&'static str),
    /// The class mapper collaborator failed; message propagated unchanged
    Mapper(String),
}

impl std::fmt::Display for AmfError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AmfError::TruncatedStream => write!(f, "Read past end of input"),
            AmfError::StreamTooLarge { size, max } => {
                write!(f, "Encoded stream would be {} bytes, cap is {}", size, max)
            }
            AmfError::InvalidMarker { marker, version } => {
                let dialect = match version {
                    AmfVersion::Amf0 => "AMF0",
                    AmfVersion::Amf3 => "AMF3",
                };
                write!(f, "Unknown {} marker 0x{:02X}", dialect, marker)
            }
            AmfError::InvalidReference { kind, index, size } => {
                let cache = match kind {
                    RefKind::Object => "object",
                    RefKind::String => "string",
                    RefKind::Trait => "trait",
                };
                write!(f, "{} reference {} out of range (cache has {})", cache, index, size)
            }
            AmfError::IntegerOutOfRange(v) => write!(f, "Integer {} does not fit wire field", v),
            AmfError::InvalidUtf8 => write!(f, "Invalid UTF-8 in string payload"),
            AmfError::NestingTooDeep => write!(f, "Value nesting exceeds depth limit"),
            AmfError::UnsupportedValue(what) => {
                write!(f, "No wire representation for {}", what)
            }
            AmfError::Mapper(msg) => write!(f, "Class mapper error: {}", msg),
        }
    }
}

impl std::error::Error for AmfError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = AmfError::InvalidMarker {
            marker: 0xFF,
            version: AmfVersion::Amf0,
        };
        assert_eq!(err.to_string(), "Unknown AMF0 marker 0xFF");

        let err = AmfError::InvalidReference {
            kind: RefKind::String,
            index: 7,
            size: 3,
        };
        assert_eq!(err.to_string(), "string reference 7 out of range (cache has 3)");
    }

    #[test]
    fn test_error_is_std_error() {
        fn assert_error<E: std::error::Error>(_: &E) {}
        assert_error(&AmfError::TruncatedStream);
    }
}
