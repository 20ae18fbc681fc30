//! AMF0/AMF3 serialization library
//!
//! Action Message Format is the binary object-serialization format used
//! by Flash Player and Flex for wire interchange. This crate implements
//! both dialects as a bidirectional codec over in-memory buffers:
//!
//! - AMF0 ([`amf0`]): marker-dispatched values with a 16-bit object
//!   reference table and an AVM+ escape hatch into AMF3
//! - AMF3 ([`amf3`]): U29 variable-length integers plus per-stream
//!   object, string, and trait reference caches
//!
//! Values on the host side are [`AmfValue`] trees. Composite nodes are
//! reference counted, so graphs with shared nodes or cycles encode as
//! back-references and decode with identity intact. Typed objects are
//! resolved through a pluggable [`ClassMapper`]; the default
//! [`ClassRegistry`] maps wire class names to instance factories and
//! carries per-class options such as snake_case/camelCase key
//! translation.
//!
//! # Example
//!
//! ```
//! use amf_rs::{amf3, AmfValue};
//!
//! let value = AmfValue::map(vec![
//!     ("app".to_string(), "live".into()),
//!     ("count".to_string(), AmfValue::Integer(3)),
//! ]);
//!
//! let bytes = amf3::encode(&value).unwrap();
//! let decoded = amf3::decode(&bytes).unwrap();
//! assert_eq!(decoded, value);
//! ```
//!
//! Decoders and encoders are single-stream: one instance owns its
//! reference caches for the duration of a top-level call, and `reset`
//! clears them between values on the same stream. The module-level
//! `encode`/`decode` helpers build a fresh codec per call.

pub mod amf0;
pub mod amf3;
pub mod config;
pub mod error;
pub mod mapper;
pub mod value;

mod io;

pub use amf0::{Amf0Decoder, Amf0Encoder};
pub use amf3::{Amf3Decoder, Amf3Encoder};
pub use config::CodecConfig;
pub use error::{AmfError, AmfVersion, RefKind};
pub use mapper::{ClassMapper, ClassOptions, ClassRegistry, UNTYPED_OPTIONS_KEY};
pub use value::{AmfValue, Dictionary, Encodable, Object};
