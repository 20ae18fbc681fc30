//! Class mapping policy
//!
//! The codec never hardcodes how wire class names relate to host
//! values; it consults an injected [`ClassMapper`]. The default
//! implementation, [`ClassRegistry`], keeps a registry of class-name
//! to instance-factory associations plus per-class [`ClassOptions`].
//! Custom mappers can override any part of the policy, including the
//! externalizable read/write hooks.

use std::collections::HashMap;

use bytes::Bytes;

use crate::amf3::{Amf3Decoder, Amf3Encoder};
use crate::error::AmfError;
use crate::value::AmfValue;

/// Options for untyped mappings are registered under this name
pub const UNTYPED_OPTIONS_KEY: &str = "Hash";

/// Per-class serialization options
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassOptions {
    /// Translate property names between snake_case (host side) and
    /// camelCase (wire side)
    pub translate_case: bool,
}

/// Policy collaborator between wire class names and host values.
///
/// The defaults implement the generic behavior: class names come from
/// the value itself, decoded instances are generic objects or maps,
/// and externalizable classes are rejected.
pub trait ClassMapper {
    /// Wire class name for a host value; `None` selects anonymous
    /// encoding.
    fn class_name(&self, value: &AmfValue) -> Option<String> {
        match value {
            AmfValue::Object(obj) => obj.borrow().class_name.clone(),
            _ => None,
        }
    }

    /// Fresh host instance for a decoded class name. The empty name
    /// yields a plain mapping; unregistered names yield a generic
    /// object carrying the name.
    fn instance_for(&self, class_name: &str) -> AmfValue {
        if class_name.is_empty() {
            AmfValue::map(Vec::new())
        } else {
            AmfValue::typed_object(class_name, Vec::new())
        }
    }

    /// Properties to serialize for an object value, split into sealed
    /// members (declared order) and dynamic members.
    fn serializable_props(
        &self,
        value: &AmfValue,
    ) -> (Vec<(String, AmfValue)>, Vec<(String, AmfValue)>) {
        match value {
            AmfValue::Object(obj) => {
                let obj = obj.borrow();
                (obj.sealed.clone(), obj.dynamic.clone())
            }
            AmfValue::Map(entries) => (Vec::new(), entries.borrow().clone()),
            _ => (Vec::new(), Vec::new()),
        }
    }

    /// Install decoded fields into an instance produced by
    /// [`ClassMapper::instance_for`].
    fn populate(
        &self,
        instance: &AmfValue,
        sealed: Vec<(String, AmfValue)>,
        dynamic: Vec<(String, AmfValue)>,
    ) -> Result<(), AmfError> {
        match instance {
            AmfValue::Object(obj) => {
                let mut obj = obj.borrow_mut();
                obj.sealed = sealed;
                obj.dynamic = dynamic;
                Ok(())
            }
            AmfValue::Map(entries) => {
                let mut entries = entries.borrow_mut();
                entries.extend(sealed);
                entries.extend(dynamic);
                Ok(())
            }
            _ => Err(AmfError::Mapper("cannot populate a scalar value".to_string())),
        }
    }

    /// Whether property names of this class translate between
    /// snake_case and camelCase. The codec queries
    /// [`UNTYPED_OPTIONS_KEY`] for untyped mappings.
    fn translate_case(&self, _class_name: &str) -> bool {
        false
    }

    /// Whether this class reads and writes its own body
    fn is_externalizable(&self, _class_name: &str) -> bool {
        false
    }

    /// Read the body of an externalizable object into `instance`,
    /// consuming bytes from the decoder's current position.
    fn read_external(
        &self,
        class_name: &str,
        _instance: &AmfValue,
        _decoder: &mut Amf3Decoder,
        _buf: &mut Bytes,
    ) -> Result<(), AmfError> {
        Err(AmfError::Mapper(format!(
            "externalizable class {} has no registered reader",
            class_name
        )))
    }

    /// Write the body of an externalizable object
    fn write_external(
        &self,
        class_name: &str,
        _value: &AmfValue,
        _encoder: &mut Amf3Encoder,
    ) -> Result<(), AmfError> {
        Err(AmfError::Mapper(format!(
            "externalizable class {} has no registered writer",
            class_name
        )))
    }
}

/// Factory producing a fresh host instance for a registered class
pub type InstanceFactory = Box<dyn Fn() -> AmfValue>;

/// Default [`ClassMapper`]: registered factories plus per-class options
#[derive(Default)]
pub struct ClassRegistry {
    factories: HashMap<String, InstanceFactory>,
    options: HashMap<String, ClassOptions>,
}

impl ClassRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate a wire class name with an instance factory
    pub fn register<F>(&mut self, wire_name: &str, factory: F)
    where
        F: Fn() -> AmfValue + 'static,
    {
        self.factories.insert(wire_name.to_string(), Box::new(factory));
    }

    /// Set options for a class name (use [`UNTYPED_OPTIONS_KEY`] for
    /// untyped mappings)
    pub fn set_options(&mut self, class_name: &str, options: ClassOptions) {
        self.options.insert(class_name.to_string(), options);
    }

    /// Options for a class name, defaulting when unregistered
    pub fn options(&self, class_name: &str) -> ClassOptions {
        self.options.get(class_name).copied().unwrap_or_default()
    }
}

impl ClassMapper for ClassRegistry {
    fn instance_for(&self, class_name: &str) -> AmfValue {
        if let Some(factory) = self.factories.get(class_name) {
            return factory();
        }
        if class_name.is_empty() {
            AmfValue::map(Vec::new())
        } else {
            AmfValue::typed_object(class_name, Vec::new())
        }
    }

    fn translate_case(&self, class_name: &str) -> bool {
        self.options(class_name).translate_case
    }
}

/// Translate a snake_case property name to camelCase for the wire:
/// each underscore is stripped and the following letter uppercased.
/// ASCII-only; non-ASCII characters pass through unchanged.
pub fn snake_to_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for c in name.chars() {
        if c == '_' {
            upper_next = true;
            continue;
        }
        if upper_next {
            out.push(c.to_ascii_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Translate a camelCase wire property name to snake_case: every ASCII
/// uppercase letter becomes an underscore plus its lowercase form.
/// Non-ASCII characters pass through unchanged.
pub fn camel_to_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snake_to_camel() {
        assert_eq!(snake_to_camel("a_b"), "aB");
        assert_eq!(snake_to_camel("c_d_e"), "cDE");
        assert_eq!(snake_to_camel("already"), "already");
        assert_eq!(snake_to_camel(""), "");
    }

    #[test]
    fn test_camel_to_snake() {
        assert_eq!(camel_to_snake("aB"), "a_b");
        assert_eq!(camel_to_snake("cDE"), "c_d_e");
        assert_eq!(camel_to_snake("plain"), "plain");
    }

    #[test]
    fn test_case_translation_is_ascii_only() {
        assert_eq!(snake_to_camel("é_x"), "éX");
        assert_eq!(camel_to_snake("éX"), "é_x");
        // Non-ASCII uppercase is left alone
        assert_eq!(camel_to_snake("Éx"), "Éx");
    }

    #[test]
    fn test_registry_factory() {
        let mut registry = ClassRegistry::new();
        registry.register("com.example.Point", || {
            AmfValue::typed_object(
                "com.example.Point",
                vec![("x".to_string(), AmfValue::Null), ("y".to_string(), AmfValue::Null)],
            )
        });

        let instance = registry.instance_for("com.example.Point");
        match &instance {
            AmfValue::Object(obj) => {
                assert_eq!(obj.borrow().sealed.len(), 2);
            }
            _ => panic!("Expected object"),
        }

        // Unregistered names fall back to a generic object
        let generic = registry.instance_for("com.example.Unknown");
        match &generic {
            AmfValue::Object(obj) => {
                assert_eq!(obj.borrow().class_name.as_deref(), Some("com.example.Unknown"));
            }
            _ => panic!("Expected object"),
        }

        // The empty name yields a plain mapping
        assert!(matches!(registry.instance_for(""), AmfValue::Map(_)));
    }

    #[test]
    fn test_registry_options() {
        let mut registry = ClassRegistry::new();
        registry.set_options(
            "com.example.Point",
            ClassOptions { translate_case: true },
        );
        assert!(registry.translate_case("com.example.Point"));
        assert!(!registry.translate_case("com.example.Other"));
        assert!(!registry.translate_case(UNTYPED_OPTIONS_KEY));
    }

    #[test]
    fn test_default_populate() {
        let registry = ClassRegistry::new();
        let instance = registry.instance_for("com.example.Point");
        registry
            .populate(
                &instance,
                vec![("x".to_string(), 1.into())],
                vec![("extra".to_string(), "y".into())],
            )
            .unwrap();
        assert_eq!(instance.get_number("x"), Some(1.0));
        assert_eq!(instance.get_string("extra"), Some("y".to_string()));
    }

    #[test]
    fn test_populate_rejects_scalars() {
        let registry = ClassRegistry::new();
        let result = registry.populate(&AmfValue::Null, Vec::new(), Vec::new());
        assert!(matches!(result, Err(AmfError::Mapper(_))));
    }
}
