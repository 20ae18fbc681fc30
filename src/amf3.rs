//! AMF3 encoder and decoder
//!
//! AMF3 is the ActionScript 3.0 serialization format. It's more
//! efficient than AMF0 due to string/object/trait references and a
//! native 29-bit integer type.
//!
//! Type Markers:
//! ```text
//! 0x00 - Undefined
//! 0x01 - Null
//! 0x02 - Boolean false
//! 0x03 - Boolean true
//! 0x04 - Integer (29-bit signed)
//! 0x05 - Double
//! 0x06 - String
//! 0x07 - XML Document (legacy)
//! 0x08 - Date
//! 0x09 - Array
//! 0x0A - Object
//! 0x0B - XML
//! 0x0C - ByteArray
//! 0x11 - Dictionary
//! ```
//!
//! Both directions run three per-stream caches: objects, strings, and
//! trait descriptors. Composites enter the object cache before their
//! children are visited, so shared nodes emit back-references and
//! cyclic graphs survive a round trip. The low bit of every U29 header
//! distinguishes inline payloads from back-references; for objects the
//! next bit distinguishes inline traits from trait references.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use bytes::Bytes;

use crate::config::CodecConfig;
use crate::error::{AmfError, AmfVersion, RefKind};
use crate::io::{self, WriteBuf, S29_MAX, S29_MIN, U29_MAX};
use crate::mapper::{
    camel_to_snake, snake_to_camel, ClassMapper, ClassRegistry, UNTYPED_OPTIONS_KEY,
};
use crate::value::{AmfValue, Dictionary};

// AMF3 type markers
const MARKER_UNDEFINED: u8 = 0x00;
const MARKER_NULL: u8 = 0x01;
const MARKER_FALSE: u8 = 0x02;
const MARKER_TRUE: u8 = 0x03;
const MARKER_INTEGER: u8 = 0x04;
const MARKER_DOUBLE: u8 = 0x05;
const MARKER_STRING: u8 = 0x06;
const MARKER_XML_DOC: u8 = 0x07;
const MARKER_DATE: u8 = 0x08;
const MARKER_ARRAY: u8 = 0x09;
const MARKER_OBJECT: u8 = 0x0A;
const MARKER_XML: u8 = 0x0B;
const MARKER_BYTE_ARRAY: u8 = 0x0C;
const MARKER_DICTIONARY: u8 = 0x11;

// Object header bits: 0x01 inline value, 0x02 inline traits,
// 0x04 externalizable, 0x08 dynamic; sealed member count above bit 3
const HEADER_INLINE: u32 = 0x01;
const HEADER_INLINE_TRAITS: u32 = 0x02;
const HEADER_EXTERNALIZABLE: u32 = 0x04;
const HEADER_DYNAMIC: u32 = 0x08;

/// Wire class name of the transparent Flex list wrapper
const ARRAY_COLLECTION: &str = "flex.messaging.io.ArrayCollection";

/// Trait descriptor for typed objects
#[derive(Clone, Debug)]
struct TraitDef {
    class_name: String,
    members: Vec<String>,
    dynamic: bool,
    externalizable: bool,
}

/// Turn a payload length into an inline U29 header
fn size_header(len: usize) -> Result<u32, AmfError> {
    if len > (U29_MAX >> 1) as usize {
        return Err(AmfError::IntegerOutOfRange(len as i64));
    }
    Ok(((len as u32) << 1) | 1)
}

/// Turn a cache index into a back-reference U29 header
fn reference_header(index: usize, shift: u32) -> Result<u32, AmfError> {
    let header = (index as u64) << shift;
    if header > U29_MAX as u64 {
        return Err(AmfError::IntegerOutOfRange(index as i64));
    }
    Ok(header as u32)
}

/// AMF3 decoder with object, string, and trait reference tables
pub struct Amf3Decoder {
    string_refs: Vec<String>,
    object_refs: Vec<AmfValue>,
    trait_refs: Vec<TraitDef>,
    mapper: Rc<dyn ClassMapper>,
    config: CodecConfig,
    depth: usize,
}

impl Amf3Decoder {
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
            string_refs: Vec::new(),
            object_refs: Vec::new(),
            trait_refs: Vec::new(),
            mapper,
            config,
            depth: 0,
        }
    }

    /// Reset decoder state (call between top-level values)
    pub fn reset(&mut self) {
        self.string_refs.clear();
        self.object_refs.clear();
        self.trait_refs.clear();
        self.depth = 0;
    }

    /// Decode a single AMF3 value from the buffer
    pub fn decode(&mut self, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        self.depth += 1;
        if self.depth > self.config.max_nesting_depth {
            return Err(AmfError::NestingTooDeep);
        }
        let marker = io::read_u8(buf)?;
        let result = self.decode_value(marker, buf);
        self.depth -= 1;
        result
    }

    fn decode_value(&mut self, marker: u8, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        match marker {
            MARKER_UNDEFINED | MARKER_NULL => Ok(AmfValue::Null),
            MARKER_FALSE => Ok(AmfValue::Boolean(false)),
            MARKER_TRUE => Ok(AmfValue::Boolean(true)),
            MARKER_INTEGER => {
                let value = io::read_u29(buf)?;
                Ok(AmfValue::Integer(io::sign_extend_u29(value)))
            }
            MARKER_DOUBLE => Ok(AmfValue::Double(io::read_f64(buf)?)),
            MARKER_STRING => Ok(AmfValue::String(self.read_string(buf)?)),
            MARKER_XML | MARKER_XML_DOC => self.decode_xml(buf),
            MARKER_DATE => self.decode_date(buf),
            MARKER_ARRAY => self.decode_array(buf),
            MARKER_OBJECT => self.decode_object(buf),
            MARKER_BYTE_ARRAY => self.decode_byte_array(buf),
            MARKER_DICTIONARY => self.decode_dictionary(buf),
            _ => {
                if self.config.lenient {
                    tracing::warn!(marker, "skipping unknown AMF3 marker");
                    Ok(AmfValue::Null)
                } else {
                    Err(AmfError::InvalidMarker {
                        marker,
                        version: AmfVersion::Amf3,
                    })
                }
            }
        }
    }

    fn lookup_object(&self, index: usize) -> Result<AmfValue, AmfError> {
        self.object_refs
            .get(index)
            .cloned()
            .ok_or(AmfError::InvalidReference {
                kind: RefKind::Object,
                index,
                size: self.object_refs.len(),
            })
    }

    fn decode_date(&mut self, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        let header = io::read_u29(buf)?;
        if header & HEADER_INLINE == 0 {
            return self.lookup_object((header >> 1) as usize);
        }

        let timestamp = io::read_f64(buf)?;
        let value = AmfValue::Date(timestamp);
        self.object_refs.push(value.clone());
        Ok(value)
    }

    fn decode_xml(&mut self, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        let header = io::read_u29(buf)?;
        if header & HEADER_INLINE == 0 {
            return self.lookup_object((header >> 1) as usize);
        }

        let len = (header >> 1) as usize;
        let value = AmfValue::Xml(io::read_utf8(buf, len)?);
        self.object_refs.push(value.clone());
        Ok(value)
    }

    fn decode_byte_array(&mut self, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        let header = io::read_u29(buf)?;
        if header & HEADER_INLINE == 0 {
            return self.lookup_object((header >> 1) as usize);
        }

        let len = (header >> 1) as usize;
        let data = io::take_bytes(buf, len)?.to_vec();
        let value = AmfValue::byte_array(data);
        self.object_refs.push(value.clone());
        Ok(value)
    }

    fn decode_array(&mut self, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        let header = io::read_u29(buf)?;
        if header & HEADER_INLINE == 0 {
            return self.lookup_object((header >> 1) as usize);
        }

        let dense_len = (header >> 1) as usize;

        // The first associative key decides the shape: an immediate
        // empty key means a dense sequence, anything else folds the
        // whole array into a string-keyed mapping.
        let first_key = self.read_string(buf)?;

        if first_key.is_empty() {
            let elements = Rc::new(RefCell::new(Vec::with_capacity(dense_len.min(1024))));
            self.object_refs.push(AmfValue::Array(Rc::clone(&elements)));

            for _ in 0..dense_len {
                let value = self.decode(buf)?;
                elements.borrow_mut().push(value);
            }
            return Ok(AmfValue::Array(elements));
        }

        let entries = Rc::new(RefCell::new(Vec::new()));
        self.object_refs.push(AmfValue::Map(Rc::clone(&entries)));

        let mut key = first_key;
        loop {
            let value = self.decode(buf)?;
            entries.borrow_mut().push((key, value));
            key = self.read_string(buf)?;
            if key.is_empty() {
                break;
            }
        }
        for i in 0..dense_len {
            let value = self.decode(buf)?;
            entries.borrow_mut().push((i.to_string(), value));
        }
        Ok(AmfValue::Map(entries))
    }

    fn decode_object(&mut self, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        let header = io::read_u29(buf)?;
        if header & HEADER_INLINE == 0 {
            return self.lookup_object((header >> 1) as usize);
        }

        let traits = if header & HEADER_INLINE_TRAITS == 0 {
            let index = (header >> 2) as usize;
            self.trait_refs
                .get(index)
                .cloned()
                .ok_or(AmfError::InvalidReference {
                    kind: RefKind::Trait,
                    index,
                    size: self.trait_refs.len(),
                })?
        } else {
            let externalizable = header & HEADER_EXTERNALIZABLE != 0;
            let dynamic = header & HEADER_DYNAMIC != 0;
            let sealed_count = (header >> 4) as usize;

            let class_name = self.read_string(buf)?;
            let mut members = Vec::with_capacity(sealed_count.min(1024));
            for _ in 0..sealed_count {
                members.push(self.read_string(buf)?);
            }

            let def = TraitDef {
                class_name,
                members,
                dynamic,
                externalizable,
            };
            self.trait_refs.push(def.clone());
            def
        };

        // The Flex list wrapper is transparent: the wrapped value takes
        // the next cache slot and the collection the one after, both
        // resolving to the same node.
        if traits.class_name == ARRAY_COLLECTION {
            let inner = self.decode(buf)?;
            self.object_refs.push(inner.clone());
            return Ok(inner);
        }

        let instance = self.mapper.instance_for(&traits.class_name);
        self.object_refs.push(instance.clone());

        if traits.externalizable {
            let mapper = Rc::clone(&self.mapper);
            mapper.read_external(&traits.class_name, &instance, self, buf)?;
            return Ok(instance);
        }

        let translate = if traits.class_name.is_empty() {
            self.mapper.translate_case(UNTYPED_OPTIONS_KEY)
        } else {
            self.mapper.translate_case(&traits.class_name)
        };

        let mut sealed = Vec::with_capacity(traits.members.len());
        for name in &traits.members {
            let value = self.decode(buf)?;
            let key = if translate {
                camel_to_snake(name)
            } else {
                name.clone()
            };
            sealed.push((key, value));
        }

        let mut dynamic = Vec::new();
        if traits.dynamic {
            loop {
                let key = self.read_string(buf)?;
                if key.is_empty() {
                    break;
                }
                let value = self.decode(buf)?;
                let key = if translate { camel_to_snake(&key) } else { key };
                dynamic.push((key, value));
            }
        }

        self.mapper.populate(&instance, sealed, dynamic)?;
        Ok(instance)
    }

    fn decode_dictionary(&mut self, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        let header = io::read_u29(buf)?;
        if header & HEADER_INLINE == 0 {
            return self.lookup_object((header >> 1) as usize);
        }

        let len = (header >> 1) as usize;
        let weak_keys = io::read_u29(buf)? != 0;

        let dict = Rc::new(RefCell::new(Dictionary {
            weak_keys,
            entries: Vec::new(),
        }));
        self.object_refs.push(AmfValue::Dictionary(Rc::clone(&dict)));

        for _ in 0..len {
            let key = self.decode(buf)?;
            let value = self.decode(buf)?;
            dict.borrow_mut().entries.push((key, value));
        }
        Ok(AmfValue::Dictionary(dict))
    }

    /// Read an AMF3 string via the string-reference scheme. Non-empty
    /// inline strings enter the string cache; the empty string never
    /// does.
    fn read_string(&mut self, buf: &mut Bytes) -> Result<String, AmfError> {
        let header = io::read_u29(buf)?;

        if header & HEADER_INLINE == 0 {
            let index = (header >> 1) as usize;
            return self
                .string_refs
                .get(index)
                .cloned()
                .ok_or(AmfError::InvalidReference {
                    kind: RefKind::String,
                    index,
                    size: self.string_refs.len(),
                });
        }

        let len = (header >> 1) as usize;
        if len == 0 {
            return Ok(String::new());
        }

        let s = io::read_utf8(buf, len)?;
        self.string_refs.push(s.clone());
        Ok(s)
    }
}

impl Default for Amf3Decoder {
    fn default() -> Self {
        Self::new()
    }
}

/// AMF3 encoder with object, string, and trait reference tables
pub struct Amf3Encoder {
    out: WriteBuf,
    /// Previously written non-empty strings
    string_refs: HashMap<String, usize>,
    /// Identity of already-written composites, keyed on pointer
    object_refs: HashMap<usize, usize>,
    /// Object-cache slots consumed so far, including identity-less
    /// values (dates, XML) that can never be referenced again
    object_count: usize,
    /// Previously written trait descriptors, keyed on class name
    trait_refs: HashMap<String, usize>,
    /// Trait-cache slots consumed so far; anonymous inline traits take
    /// a slot on the far side without being reusable here
    trait_count: usize,
    mapper: Rc<dyn ClassMapper>,
}

impl Amf3Encoder {
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
            string_refs: HashMap::new(),
            object_refs: HashMap::new(),
            object_count: 0,
            trait_refs: HashMap::new(),
            trait_count: 0,
            mapper,
        }
    }

    /// Get the encoded bytes and reset encoder state
    pub fn finish(&mut self) -> Bytes {
        self.string_refs.clear();
        self.object_refs.clear();
        self.object_count = 0;
        self.trait_refs.clear();
        self.trait_count = 0;
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

    /// Encode a single AMF3 value
    ///
    /// Values carrying an [`Encodable`](crate::value::Encodable) hook
    /// write themselves; everything else takes the default dispatch.
    pub fn encode(&mut self, value: &AmfValue) -> Result<(), AmfError> {
        match value {
            AmfValue::Custom(custom) => custom.encode_amf3(self),
            AmfValue::Null => self.out.put_u8(MARKER_NULL),
            AmfValue::Boolean(true) => self.out.put_u8(MARKER_TRUE),
            AmfValue::Boolean(false) => self.out.put_u8(MARKER_FALSE),
            AmfValue::Integer(i) if (S29_MIN..=S29_MAX).contains(i) => {
                self.out.put_u8(MARKER_INTEGER)?;
                self.out.put_u29((*i as u32) & U29_MAX)
            }
            AmfValue::Integer(i) => {
                // Outside the 29-bit window the integer form is not
                // representable
                self.out.put_u8(MARKER_DOUBLE)?;
                self.out.put_f64(*i as f64)
            }
            AmfValue::Double(n) => {
                self.out.put_u8(MARKER_DOUBLE)?;
                self.out.put_f64(*n)
            }
            AmfValue::String(s) => {
                self.out.put_u8(MARKER_STRING)?;
                self.write_string(s)
            }
            AmfValue::Date(timestamp) => {
                self.out.put_u8(MARKER_DATE)?;
                if self.write_reference(value)? {
                    return Ok(());
                }
                self.out.put_u29(1)?;
                self.out.put_f64(*timestamp)
            }
            AmfValue::Xml(s) => {
                self.out.put_u8(MARKER_XML)?;
                if self.write_reference(value)? {
                    return Ok(());
                }
                self.out.put_u29(size_header(s.len())?)?;
                self.out.put_slice(s.as_bytes())
            }
            AmfValue::Array(elements) => {
                self.out.put_u8(MARKER_ARRAY)?;
                if self.write_reference(value)? {
                    return Ok(());
                }
                let elements = elements.borrow();
                self.out.put_u29(size_header(elements.len())?)?;
                self.write_string("")?; // No associative portion
                for elem in elements.iter() {
                    self.encode(elem)?;
                }
                Ok(())
            }
            AmfValue::Map(entries) => {
                // A plain mapping goes out as an anonymous dynamic object
                self.out.put_u8(MARKER_OBJECT)?;
                if self.write_reference(value)? {
                    return Ok(());
                }
                self.write_traits("", &[], true, false)?;
                let translate = self.mapper.translate_case(UNTYPED_OPTIONS_KEY);
                let entries = entries.borrow();
                for (key, val) in entries.iter() {
                    self.write_translated_key(key, translate)?;
                    self.encode(val)?;
                }
                self.write_string("")
            }
            AmfValue::Object(_) => {
                self.out.put_u8(MARKER_OBJECT)?;
                if self.write_reference(value)? {
                    return Ok(());
                }
                self.write_object_body(value)
            }
            AmfValue::ByteArray(data) => {
                self.out.put_u8(MARKER_BYTE_ARRAY)?;
                if self.write_reference(value)? {
                    return Ok(());
                }
                let data = data.borrow();
                self.out.put_u29(size_header(data.len())?)?;
                self.out.put_slice(&data)
            }
            AmfValue::Dictionary(dict) => {
                self.out.put_u8(MARKER_DICTIONARY)?;
                if self.write_reference(value)? {
                    return Ok(());
                }
                let dict = dict.borrow();
                self.out.put_u29(size_header(dict.entries.len())?)?;
                self.out.put_u29(u32::from(dict.weak_keys))?;
                for (key, val) in dict.entries.iter() {
                    self.encode(key)?;
                    self.encode(val)?;
                }
                Ok(())
            }
        }
    }

    fn write_object_body(&mut self, value: &AmfValue) -> Result<(), AmfError> {
        let class_name = self.mapper.class_name(value).unwrap_or_default();

        if self.mapper.is_externalizable(&class_name) {
            self.write_traits(&class_name, &[], false, true)?;
            let mapper = Rc::clone(&self.mapper);
            return mapper.write_external(&class_name, value, self);
        }

        let (sealed, dynamic) = self.mapper.serializable_props(value);
        let translate = if class_name.is_empty() {
            self.mapper.translate_case(UNTYPED_OPTIONS_KEY)
        } else {
            self.mapper.translate_case(&class_name)
        };

        let member_names: Vec<String> = sealed
            .iter()
            .map(|(key, _)| {
                if translate {
                    snake_to_camel(key)
                } else {
                    key.clone()
                }
            })
            .collect();

        // An object without sealed members is fully dynamic, matching
        // the anonymous-mapping encoding
        let dynamic_flag = !dynamic.is_empty() || sealed.is_empty();

        self.write_traits(&class_name, &member_names, dynamic_flag, false)?;

        for (_, val) in sealed.iter() {
            self.encode(val)?;
        }
        if dynamic_flag {
            for (key, val) in dynamic.iter() {
                self.write_translated_key(key, translate)?;
                self.encode(val)?;
            }
            self.write_string("")?;
        }
        Ok(())
    }

    /// Emit a back-reference header if this composite was written
    /// before; otherwise consume the next object-cache slot. Values
    /// without pointer identity (dates, XML) always inline but still
    /// take a slot, keeping encoder indices aligned with what a
    /// decoder builds.
    fn write_reference(&mut self, value: &AmfValue) -> Result<bool, AmfError> {
        if let Some(id) = value.identity() {
            if let Some(&index) = self.object_refs.get(&id) {
                self.out.put_u29(reference_header(index, 1)?)?;
                return Ok(true);
            }
            self.object_refs.insert(id, self.object_count);
        }
        self.object_count += 1;
        Ok(false)
    }

    /// Write a trait reference for a previously seen class, or an
    /// inline trait descriptor. Anonymous traits are never reused
    /// (their shape varies per value), but every inline descriptor
    /// still consumes a trait-cache slot on the far side, so the slot
    /// counter runs over all of them.
    fn write_traits(
        &mut self,
        class_name: &str,
        members: &[String],
        dynamic: bool,
        externalizable: bool,
    ) -> Result<(), AmfError> {
        if !class_name.is_empty() {
            if let Some(&index) = self.trait_refs.get(class_name) {
                return self.out.put_u29(reference_header(index, 2)? | HEADER_INLINE);
            }
            self.trait_refs
                .insert(class_name.to_string(), self.trait_count);
        }
        self.trait_count += 1;

        let count = u32::try_from(members.len())
            .map_err(|_| AmfError::IntegerOutOfRange(members.len() as i64))?;
        let mut header = (count << 4) | HEADER_INLINE_TRAITS | HEADER_INLINE;
        if dynamic {
            header |= HEADER_DYNAMIC;
        }
        if externalizable {
            header |= HEADER_EXTERNALIZABLE;
        }
        self.out.put_u29(header)?;
        self.write_string(class_name)?;
        for member in members {
            self.write_string(member)?;
        }
        Ok(())
    }

    fn write_translated_key(&mut self, key: &str, translate: bool) -> Result<(), AmfError> {
        if translate {
            self.write_string(&snake_to_camel(key))
        } else {
            self.write_string(key)
        }
    }

    /// Write a string via the string-reference scheme. The empty
    /// string has its own single-byte inline form and never enters the
    /// cache.
    fn write_string(&mut self, s: &str) -> Result<(), AmfError> {
        if s.is_empty() {
            return self.out.put_u29(1);
        }

        if let Some(&index) = self.string_refs.get(s) {
            return self.out.put_u29(reference_header(index, 1)?);
        }

        self.string_refs.insert(s.to_string(), self.string_refs.len());
        self.out.put_u29(size_header(s.len())?)?;
        self.out.put_slice(s.as_bytes())
    }
}

impl Default for Amf3Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode a single value with a fresh encoder
pub fn encode(value: &AmfValue) -> Result<Bytes, AmfError> {
    let mut encoder = Amf3Encoder::new();
    encoder.encode(value)?;
    Ok(encoder.finish())
}

/// Decode a single value with a fresh decoder
pub fn decode(data: &[u8]) -> Result<AmfValue, AmfError> {
    let mut decoder = Amf3Decoder::new();
    let mut buf = Bytes::copy_from_slice(data);
    decoder.decode(&mut buf)
}
