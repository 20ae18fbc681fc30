//! AMF0 encoder and decoder
//!
//! AMF0 is the original Action Message Format used in Flash.
//! Reference: AMF0 File Format Specification (amf0-file-format-specification.pdf)
//!
//! Type Markers:
//! ```text
//! 0x00 - Number (IEEE 754 double)
//! 0x01 - Boolean
//! 0x02 - String (UTF-8, 16-bit length prefix)
//! 0x03 - Object (key-value pairs until 0x000009)
//! 0x04 - MovieClip (reserved, not supported)
//! 0x05 - Null
//! 0x06 - Undefined
//! 0x07 - Reference (16-bit index)
//! 0x08 - ECMA Array (associative array)
//! 0x09 - Object End (0x000009 sequence)
//! 0x0A - Strict Array (dense array)
//! 0x0B - Date (double + timezone)
//! 0x0C - Long String (UTF-8, 32-bit length prefix)
//! 0x0D - Unsupported
//! 0x0E - RecordSet (reserved, not supported)
//! 0x0F - XML Document
//! 0x10 - Typed Object (class name + properties)
//! 0x11 - AVM+ (switch to AMF3)
//! ```
//!
//! Objects and arrays enter the per-stream reference table before their
//! children are decoded, so back-references (0x07) resolve to the live
//! node and cyclic graphs reconstruct correctly. An AVM+ marker hands
//! the remainder of the value to the AMF3 decoder on the same byte
//! source.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use bytes::Bytes;

use crate::amf3::Amf3Decoder;
use crate::config::CodecConfig;
use crate::error::{AmfError, AmfVersion, RefKind};
use crate::io::{self, WriteBuf};
use crate::mapper::{
    camel_to_snake, snake_to_camel, ClassMapper, ClassRegistry, UNTYPED_OPTIONS_KEY,
};
use crate::value::{AmfValue, Object};

// AMF0 type markers
const MARKER_NUMBER: u8 = 0x00;
const MARKER_BOOLEAN: u8 = 0x01;
const MARKER_STRING: u8 = 0x02;
const MARKER_OBJECT: u8 = 0x03;
const MARKER_NULL: u8 = 0x05;
const MARKER_UNDEFINED: u8 = 0x06;
const MARKER_REFERENCE: u8 = 0x07;
const MARKER_ECMA_ARRAY: u8 = 0x08;
const MARKER_OBJECT_END: u8 = 0x09;
const MARKER_STRICT_ARRAY: u8 = 0x0A;
const MARKER_DATE: u8 = 0x0B;
const MARKER_LONG_STRING: u8 = 0x0C;
const MARKER_UNSUPPORTED: u8 = 0x0D;
const MARKER_XML_DOCUMENT: u8 = 0x0F;
const MARKER_TYPED_OBJECT: u8 = 0x10;
const MARKER_AVMPLUS: u8 = 0x11;

/// Longest string that still fits the short-string form
const SHORT_STRING_MAX: usize = 0xFFFF;

/// AMF0 decoder with a per-stream reference table
pub struct Amf0Decoder {
    /// Reference table for object references
    references: Vec<AmfValue>,
    /// Class mapping policy
    mapper: Rc<dyn ClassMapper>,
    /// Decode limits and tolerance
    config: CodecConfig,
    /// Current nesting depth
    depth: usize,
    /// Delegate for AVM+ values embedded in the stream
    amf3: Amf3Decoder,
}

impl Amf0Decoder {
    /// Create a decoder with default settings and an empty class registry
    pub fn new() -> Self {
        Self::with_mapper(Rc::new(ClassRegistry::new()))
    }

    /// Create a decoder with a custom class mapper
    pub fn with_mapper(mapper: Rc<dyn ClassMapper>) -> Self {
        Self::with_config(CodecConfig::default(), mapper)
    }

    /// Create a decoder with explicit configuration
    pub fn with_config(config: CodecConfig, mapper: Rc<dyn ClassMapper>) -> Self {
        Self {
            references: Vec::new(),
            mapper: Rc::clone(&mapper),
            config: config.clone(),
            depth: 0,
            amf3: Amf3Decoder::with_config(config, mapper),
        }
    }

    /// Reset decoder state (call between top-level values)
    pub fn reset(&mut self) {
        self.references.clear();
        self.depth = 0;
        self.amf3.reset();
    }

    /// Decode a single AMF0 value from the buffer
    pub fn decode(&mut self, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        let marker = io::read_u8(buf)?;
        self.decode_marked(marker, buf)
    }

    /// Decode all values from the buffer until exhausted
    pub fn decode_all(&mut self, buf: &mut Bytes) -> Result<Vec<AmfValue>, AmfError> {
        let mut values = Vec::new();
        while !buf.is_empty() {
            values.push(self.decode(buf)?);
        }
        Ok(values)
    }

    fn decode_marked(&mut self, marker: u8, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        self.depth += 1;
        if self.depth > self.config.max_nesting_depth {
            return Err(AmfError::NestingTooDeep);
        }
        let result = self.decode_value(marker, buf);
        self.depth -= 1;
        result
    }

    fn decode_value(&mut self, marker: u8, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        match marker {
            MARKER_NUMBER => self.decode_number(buf),
            MARKER_BOOLEAN => Ok(AmfValue::Boolean(io::read_u8(buf)? != 0)),
            MARKER_STRING => {
                let len = io::read_u16(buf)? as usize;
                Ok(AmfValue::String(io::read_utf8(buf, len)?))
            }
            MARKER_OBJECT => self.decode_object(buf),
            MARKER_NULL | MARKER_UNDEFINED | MARKER_UNSUPPORTED => Ok(AmfValue::Null),
            MARKER_REFERENCE => self.decode_reference(buf),
            MARKER_ECMA_ARRAY => self.decode_ecma_array(buf),
            MARKER_STRICT_ARRAY => self.decode_strict_array(buf),
            MARKER_DATE => self.decode_date(buf),
            MARKER_LONG_STRING => {
                let len = io::read_u32(buf)? as usize;
                Ok(AmfValue::String(io::read_utf8(buf, len)?))
            }
            MARKER_XML_DOCUMENT => {
                let len = io::read_u32(buf)? as usize;
                Ok(AmfValue::Xml(io::read_utf8(buf, len)?))
            }
            MARKER_TYPED_OBJECT => self.decode_typed_object(buf),
            MARKER_AVMPLUS => {
                // Remainder of this value is AMF3 on the same byte source
                tracing::trace!("switching to AMF3 for embedded value");
                self.amf3.decode(buf)
            }
            _ => {
                if self.config.lenient {
                    tracing::warn!(marker, "skipping unknown AMF0 marker");
                    Ok(AmfValue::Null)
                } else {
                    Err(AmfError::InvalidMarker {
                        marker,
                        version: AmfVersion::Amf0,
                    })
                }
            }
        }
    }

    fn decode_number(&mut self, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        let n = io::read_f64(buf)?;
        if n.is_nan() {
            return Ok(AmfValue::Null);
        }
        Ok(AmfValue::Double(n))
    }

    fn decode_object(&mut self, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        let obj = Rc::new(RefCell::new(Object::default()));
        self.references.push(AmfValue::Object(Rc::clone(&obj)));

        let translate = self.mapper.translate_case(UNTYPED_OPTIONS_KEY);
        let pairs = self.read_pairs(buf, translate)?;
        obj.borrow_mut().dynamic = pairs;

        Ok(AmfValue::Object(obj))
    }

    fn decode_ecma_array(&mut self, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        // Associative count hint; not trusted for sizing
        let _count = io::read_u32(buf)?;

        let entries = Rc::new(RefCell::new(Vec::new()));
        self.references.push(AmfValue::Map(Rc::clone(&entries)));

        let translate = self.mapper.translate_case(UNTYPED_OPTIONS_KEY);
        let pairs = self.read_pairs(buf, translate)?;
        *entries.borrow_mut() = pairs;

        Ok(AmfValue::Map(entries))
    }

    fn decode_strict_array(&mut self, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        let count = io::read_u32(buf)? as usize;

        let elements = Rc::new(RefCell::new(Vec::with_capacity(count.min(1024))));
        self.references.push(AmfValue::Array(Rc::clone(&elements)));

        for _ in 0..count {
            let value = self.decode(buf)?;
            elements.borrow_mut().push(value);
        }

        Ok(AmfValue::Array(elements))
    }

    fn decode_date(&mut self, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        let timestamp = io::read_f64(buf)?;
        let _timezone = io::read_i16(buf)?; // Deprecated, usually 0
        Ok(AmfValue::Date(timestamp))
    }

    fn decode_reference(&mut self, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        let index = io::read_u16(buf)? as usize;
        if index >= self.references.len() {
            return Err(AmfError::InvalidReference {
                kind: RefKind::Object,
                index,
                size: self.references.len(),
            });
        }
        Ok(self.references[index].clone())
    }

    fn decode_typed_object(&mut self, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        let class_name = self.read_key(buf)?;

        let instance = self.mapper.instance_for(&class_name);
        self.references.push(instance.clone());

        let translate = self.mapper.translate_case(&class_name);
        let pairs = self.read_pairs(buf, translate)?;
        self.mapper.populate(&instance, Vec::new(), pairs)?;

        Ok(instance)
    }

    /// Object mode: u16-length key, marker, value; the empty key plus
    /// ObjectEnd terminates.
    fn read_pairs(
        &mut self,
        buf: &mut Bytes,
        translate: bool,
    ) -> Result<Vec<(String, AmfValue)>, AmfError> {
        let mut pairs = Vec::new();

        loop {
            if self.config.lenient && buf.is_empty() {
                // Some encoders omit the end marker on the last object
                tracing::warn!("object body ended without end marker");
                break;
            }

            let key = self.read_key(buf)?;
            let marker = io::read_u8(buf)?;
            if marker == MARKER_OBJECT_END && key.is_empty() {
                break;
            }

            let value = self.decode_marked(marker, buf)?;
            let key = if translate { camel_to_snake(&key) } else { key };
            pairs.push((key, value));
        }

        Ok(pairs)
    }

    /// Read a UTF-8 string with a 16-bit length prefix (no type marker)
    fn read_key(&mut self, buf: &mut Bytes) -> Result<String, AmfError> {
        let len = io::read_u16(buf)? as usize;
        io::read_utf8(buf, len)
    }
}

impl Default for Amf0Decoder {
    fn default() -> Self {
        Self::new()
    }
}

/// AMF0 encoder with reference deduplication
pub struct Amf0Encoder {
    out: WriteBuf,
    /// Identity of already-written composites, keyed on pointer
    references: HashMap<usize, usize>,
    mapper: Rc<dyn ClassMapper>,
}

impl Amf0Encoder {
    /// Create an encoder with default settings and an empty class registry
    pub fn new() -> Self {
        Self::with_mapper(Rc::new(ClassRegistry::new()))
    }

    /// Create an encoder with a custom class mapper
    pub fn with_mapper(mapper: Rc<dyn ClassMapper>) -> Self {
        Self::with_config(CodecConfig::default(), mapper)
    }

    /// Create an encoder with explicit configuration
    pub fn with_config(config: CodecConfig, mapper: Rc<dyn ClassMapper>) -> Self {
        Self {
            out: WriteBuf::new(config.max_stream_length),
            references: HashMap::new(),
            mapper,
        }
    }

    /// Get the encoded bytes and reset encoder state
    pub fn finish(&mut self) -> Bytes {
        self.references.clear();
        self.out.finish()
    }

    /// Get current encoded length
    pub fn len(&self) -> usize {
        self.out.len()
    }

    /// Check if encoder is empty
    pub fn is_empty(&self) -> bool {
        self.out.is_empty()
    }

    /// Encode a single AMF0 value
    ///
    /// Values carrying an [`Encodable`](crate::value::Encodable) hook
    /// write themselves; everything else takes the default dispatch.
    pub fn encode(&mut self, value: &AmfValue) -> Result<(), AmfError> {
        if let AmfValue::Custom(custom) = value {
            return custom.encode_amf0(self);
        }

        if let Some(id) = value.identity() {
            if let Some(&index) = self.references.get(&id) {
                self.out.put_u8(MARKER_REFERENCE)?;
                let index =
                    u16::try_from(index).map_err(|_| AmfError::IntegerOutOfRange(index as i64))?;
                return self.out.put_u16(index);
            }
            let index = self.references.len();
            self.references.insert(id, index);
        }

        match value {
            AmfValue::Null => self.out.put_u8(MARKER_NULL),
            AmfValue::Boolean(b) => {
                self.out.put_u8(MARKER_BOOLEAN)?;
                self.out.put_u8(u8::from(*b))
            }
            AmfValue::Integer(i) => {
                // AMF0 has no integer type
                self.out.put_u8(MARKER_NUMBER)?;
                self.out.put_f64(*i as f64)
            }
            AmfValue::Double(n) => {
                self.out.put_u8(MARKER_NUMBER)?;
                self.out.put_f64(*n)
            }
            AmfValue::String(s) => self.write_string(s),
            AmfValue::Date(timestamp) => {
                self.out.put_u8(MARKER_DATE)?;
                self.out.put_f64(*timestamp)?;
                self.out.put_i16(0) // Timezone (deprecated)
            }
            AmfValue::Xml(s) => {
                self.out.put_u8(MARKER_XML_DOCUMENT)?;
                self.write_long_payload(s)
            }
            AmfValue::Array(elements) => {
                let elements = elements.borrow();
                self.out.put_u8(MARKER_STRICT_ARRAY)?;
                let count = u32::try_from(elements.len())
                    .map_err(|_| AmfError::IntegerOutOfRange(elements.len() as i64))?;
                self.out.put_u32(count)?;
                for elem in elements.iter() {
                    self.encode(elem)?;
                }
                Ok(())
            }
            AmfValue::Map(entries) => {
                let entries = entries.borrow();
                self.out.put_u8(MARKER_ECMA_ARRAY)?;
                let count = u32::try_from(entries.len())
                    .map_err(|_| AmfError::IntegerOutOfRange(entries.len() as i64))?;
                self.out.put_u32(count)?;
                let translate = self.mapper.translate_case(UNTYPED_OPTIONS_KEY);
                for (key, val) in entries.iter() {
                    self.write_pair(key, val, translate)?;
                }
                self.write_object_end()
            }
            AmfValue::Object(_) => self.write_object(value),
            AmfValue::ByteArray(_) => Err(AmfError::UnsupportedValue("byte array in AMF0")),
            AmfValue::Dictionary(_) => Err(AmfError::UnsupportedValue("dictionary in AMF0")),
            AmfValue::Custom(custom) => custom.encode_amf0(self),
        }
    }

    /// Encode multiple values back to back
    pub fn encode_all(&mut self, values: &[AmfValue]) -> Result<(), AmfError> {
        for value in values {
            self.encode(value)?;
        }
        Ok(())
    }

    fn write_object(&mut self, value: &AmfValue) -> Result<(), AmfError> {
        let class_name = self.mapper.class_name(value);

        let translate = match &class_name {
            Some(name) => self.mapper.translate_case(name),
            None => self.mapper.translate_case(UNTYPED_OPTIONS_KEY),
        };

        match &class_name {
            Some(name) => {
                self.out.put_u8(MARKER_TYPED_OBJECT)?;
                self.write_key(name)?;
            }
            None => self.out.put_u8(MARKER_OBJECT)?,
        }

        let (sealed, dynamic) = self.mapper.serializable_props(value);
        for (key, val) in sealed.iter().chain(dynamic.iter()) {
            self.write_pair(key, val, translate)?;
        }
        self.write_object_end()
    }

    fn write_pair(&mut self, key: &str, value: &AmfValue, translate: bool) -> Result<(), AmfError> {
        if translate {
            self.write_key(&snake_to_camel(key))?;
        } else {
            self.write_key(key)?;
        }
        self.encode(value)
    }

    fn write_object_end(&mut self) -> Result<(), AmfError> {
        self.out.put_u16(0)?;
        self.out.put_u8(MARKER_OBJECT_END)
    }

    fn write_string(&mut self, s: &str) -> Result<(), AmfError> {
        if s.len() > SHORT_STRING_MAX {
            self.out.put_u8(MARKER_LONG_STRING)?;
            self.write_long_payload(s)
        } else {
            self.out.put_u8(MARKER_STRING)?;
            self.out.put_u16(s.len() as u16)?;
            self.out.put_slice(s.as_bytes())
        }
    }

    fn write_long_payload(&mut self, s: &str) -> Result<(), AmfError> {
        let len =
            u32::try_from(s.len()).map_err(|_| AmfError::IntegerOutOfRange(s.len() as i64))?;
        self.out.put_u32(len)?;
        self.out.put_slice(s.as_bytes())
    }

    /// Write a UTF-8 string with a 16-bit length prefix (no type marker)
    fn write_key(&mut self, s: &str) -> Result<(), AmfError> {
        let len =
            u16::try_from(s.len()).map_err(|_| AmfError::IntegerOutOfRange(s.len() as i64))?;
        self.out.put_u16(len)?;
        self.out.put_slice(s.as_bytes())
    }
}

impl Default for Amf0Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode a single value with a fresh encoder
pub fn encode(value: &AmfValue) -> Result<Bytes, AmfError> {
    let mut encoder = Amf0Encoder::new();
    encoder.encode(value)?;
    Ok(encoder.finish())
}

/// Encode multiple values with a fresh encoder
pub fn encode_all(values: &[AmfValue]) -> Result<Bytes, AmfError> {
    let mut encoder = Amf0Encoder::new();
    encoder.encode_all(values)?;
    Ok(encoder.finish())
}

/// Decode a single value with a fresh decoder
pub fn decode(data: &[u8]) -> Result<AmfValue, AmfError> {
    let mut decoder = Amf0Decoder::new();
    let mut buf = Bytes::copy_from_slice(data);
    decoder.decode(&mut buf)
}

/// Decode all values with a fresh decoder
pub fn decode_all(data: &[u8]) -> Result<Vec<AmfValue>, AmfError> {
    let mut decoder = Amf0Decoder::new();
    let mut buf = Bytes::copy_from_slice(data);
    decoder.decode_all(&mut buf)
}
