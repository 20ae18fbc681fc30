//! AMF value types
//!
//! Both AMF0 and AMF3 share a common value representation. Composite
//! variants (arrays, maps, objects, byte arrays, dictionaries) are
//! reference counted: encoders key the per-stream object cache on the
//! `Rc` pointer, and decoders insert the live `Rc` into the cache before
//! descending into children, so shared nodes and cycles survive a
//! round trip with their identity intact.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::amf0::Amf0Encoder;
use crate::amf3::Amf3Encoder;
use crate::error::AmfError;

/// A value that writes its own wire representation.
///
/// Both encoders dispatch to this hook for [`AmfValue::Custom`] before
/// any default dispatch, handing the value the active encoder.
pub trait Encodable: fmt::Debug {
    /// Write this value to an AMF0 stream.
    fn encode_amf0(&self, encoder: &mut Amf0Encoder) -> Result<(), AmfError>;
    /// Write this value to an AMF3 stream.
    fn encode_amf3(&self, encoder: &mut Amf3Encoder) -> Result<(), AmfError>;
}

/// An anonymous or typed object.
///
/// Sealed entries keep their declaration order; dynamic entries keep
/// insertion order. AMF0 has no trait concept, so objects decoded from
/// AMF0 carry everything in `dynamic`.
#[derive(Debug, Default, PartialEq)]
pub struct Object {
    /// Wire class name; `None` for anonymous objects
    pub class_name: Option<String>,
    /// Sealed members in declared order
    pub sealed: Vec<(String, AmfValue)>,
    /// Dynamic members in insertion order
    pub dynamic: Vec<(String, AmfValue)>,
}

/// An AMF3 dictionary: arbitrary-typed keys, preserved weak-keys flag
#[derive(Debug, Default, PartialEq)]
pub struct Dictionary {
    /// Weak-keys flag, read and written as a U29 boolean
    pub weak_keys: bool,
    /// Entries in insertion order
    pub entries: Vec<(AmfValue, AmfValue)>,
}

/// Unified AMF value representation
///
/// This enum represents all value types supported by AMF0 and AMF3.
/// Some types (ByteArray, Dictionary) are AMF3-only; encoding them to
/// AMF0 fails with [`AmfError::UnsupportedValue`].
#[derive(Debug, Clone)]
pub enum AmfValue {
    /// The absent value (AMF0: 0x05/0x06/0x0D, AMF3: 0x00/0x01)
    Null,

    /// Boolean (AMF0: 0x01, AMF3: 0x02/0x03)
    Boolean(bool),

    /// 29-bit signed integer (AMF3: 0x04); out-of-range values encode
    /// as doubles
    Integer(i32),

    /// IEEE 754 double-precision floating point (AMF0: 0x00, AMF3: 0x05)
    Double(f64),

    /// UTF-8 string (AMF0: 0x02/0x0C, AMF3: 0x06)
    String(String),

    /// Milliseconds since Unix epoch, UTC (AMF0: 0x0B, AMF3: 0x08)
    Date(f64),

    /// XML document carried as an opaque string (AMF0: 0x0F, AMF3: 0x07/0x0B)
    Xml(String),

    /// Ordered sequence (AMF0: 0x0A, AMF3: 0x09)
    Array(Rc<RefCell<Vec<AmfValue>>>),

    /// Insertion-ordered string-keyed mapping
    /// (AMF0: 0x08, AMF3: anonymous dynamic object)
    Map(Rc<RefCell<Vec<(String, AmfValue)>>>),

    /// Anonymous or typed object (AMF0: 0x03/0x10, AMF3: 0x0A)
    Object(Rc<RefCell<Object>>),

    /// Raw byte buffer (AMF3 only: 0x0C)
    ByteArray(Rc<RefCell<Vec<u8>>>),

    /// Mapping with arbitrary-typed keys (AMF3 only: 0x11)
    Dictionary(Rc<RefCell<Dictionary>>),

    /// A value that encodes itself via [`Encodable`]
    Custom(Rc<dyn Encodable>),
}

impl AmfValue {
    /// Build an array value from its elements
    pub fn array(elements: Vec<AmfValue>) -> Self {
        AmfValue::Array(Rc::new(RefCell::new(elements)))
    }

    /// Build a string-keyed mapping from its entries
    pub fn map(entries: Vec<(String, AmfValue)>) -> Self {
        AmfValue::Map(Rc::new(RefCell::new(entries)))
    }

    /// Build an anonymous object with only dynamic members
    pub fn object(dynamic: Vec<(String, AmfValue)>) -> Self {
        AmfValue::Object(Rc::new(RefCell::new(Object {
            class_name: None,
            sealed: Vec::new(),
            dynamic,
        })))
    }

    /// Build a typed object with sealed members in declared order
    pub fn typed_object(class_name: &str, sealed: Vec<(String, AmfValue)>) -> Self {
        AmfValue::Object(Rc::new(RefCell::new(Object {
            class_name: Some(class_name.to_string()),
            sealed,
            dynamic: Vec::new(),
        })))
    }

    /// Build a byte array value
    pub fn byte_array(data: Vec<u8>) -> Self {
        AmfValue::ByteArray(Rc::new(RefCell::new(data)))
    }

    /// Build a dictionary value
    pub fn dictionary(weak_keys: bool, entries: Vec<(AmfValue, AmfValue)>) -> Self {
        AmfValue::Dictionary(Rc::new(RefCell::new(Dictionary { weak_keys, entries })))
    }

    /// Try to get this value as a string reference
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AmfValue::String(s) => Some(s),
            AmfValue::Xml(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get this value as a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            AmfValue::Double(n) => Some(*n),
            AmfValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get this value as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AmfValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get this value as a shared array handle
    pub fn as_array(&self) -> Option<Rc<RefCell<Vec<AmfValue>>>> {
        match self {
            AmfValue::Array(a) => Some(Rc::clone(a)),
            _ => None,
        }
    }

    /// Check if this value is the absent value
    pub fn is_null(&self) -> bool {
        matches!(self, AmfValue::Null)
    }

    /// Get a named property from a map or object value
    pub fn get(&self, key: &str) -> Option<AmfValue> {
        match self {
            AmfValue::Map(entries) => entries
                .borrow()
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone()),
            AmfValue::Object(obj) => {
                let obj = obj.borrow();
                obj.sealed
                    .iter()
                    .chain(obj.dynamic.iter())
                    .find(|(k, _)| k == key)
                    .map(|(_, v)| v.clone())
            }
            _ => None,
        }
    }

    /// Get a string property from a map or object value
    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            AmfValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get a number property from a map or object value
    pub fn get_number(&self, key: &str) -> Option<f64> {
        self.get(key)?.as_number()
    }

    /// Pointer identity of a composite value, used as the object-cache
    /// key by the encoders. Scalar variants have no identity.
    pub(crate) fn identity(&self) -> Option<usize> {
        match self {
            AmfValue::Array(rc) => Some(Rc::as_ptr(rc) as *const () as usize),
            AmfValue::Map(rc) => Some(Rc::as_ptr(rc) as *const () as usize),
            AmfValue::Object(rc) => Some(Rc::as_ptr(rc) as *const () as usize),
            AmfValue::ByteArray(rc) => Some(Rc::as_ptr(rc) as *const () as usize),
            AmfValue::Dictionary(rc) => Some(Rc::as_ptr(rc) as *const () as usize),
            _ => None,
        }
    }
}

impl Default for AmfValue {
    fn default() -> Self {
        AmfValue::Null
    }
}

impl PartialEq for AmfValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (AmfValue::Null, AmfValue::Null) => true,
            (AmfValue::Boolean(a), AmfValue::Boolean(b)) => a == b,
            (AmfValue::Integer(a), AmfValue::Integer(b)) => a == b,
            (AmfValue::Double(a), AmfValue::Double(b)) => a == b,
            (AmfValue::String(a), AmfValue::String(b)) => a == b,
            (AmfValue::Date(a), AmfValue::Date(b)) => a == b,
            (AmfValue::Xml(a), AmfValue::Xml(b)) => a == b,
            // Identity short-circuit keeps `==` from recursing through a
            // node into itself; distinct cyclic graphs must be compared
            // by identity, not with this impl.
            (AmfValue::Array(a), AmfValue::Array(b)) => {
                Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow()
            }
            (AmfValue::Map(a), AmfValue::Map(b)) => {
                Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow()
            }
            (AmfValue::Object(a), AmfValue::Object(b)) => {
                Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow()
            }
            (AmfValue::ByteArray(a), AmfValue::ByteArray(b)) => {
                Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow()
            }
            (AmfValue::Dictionary(a), AmfValue::Dictionary(b)) => {
                Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow()
            }
            (AmfValue::Custom(a), AmfValue::Custom(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for AmfValue {
    fn from(v: bool) -> Self {
        AmfValue::Boolean(v)
    }
}

impl From<f64> for AmfValue {
    fn from(v: f64) -> Self {
        AmfValue::Double(v)
    }
}

impl From<i32> for AmfValue {
    fn from(v: i32) -> Self {
        AmfValue::Integer(v)
    }
}

impl From<String> for AmfValue {
    fn from(v: String) -> Self {
        AmfValue::String(v)
    }
}

impl From<&str> for AmfValue {
    fn from(v: &str) -> Self {
        AmfValue::String(v.to_string())
    }
}

impl<V: Into<AmfValue>> From<Vec<V>> for AmfValue {
    fn from(v: Vec<V>) -> Self {
        AmfValue::array(v.into_iter().map(|x| x.into()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_accessors() {
        let s = AmfValue::String("test".into());
        assert_eq!(s.as_str(), Some("test"));
        assert_eq!(s.as_number(), None);

        let n = AmfValue::Double(42.0);
        assert_eq!(n.as_number(), Some(42.0));
        assert_eq!(n.as_str(), None);

        let o = AmfValue::map(vec![("key".to_string(), "value".into())]);
        assert_eq!(o.get_string("key"), Some("value".to_string()));
    }

    #[test]
    fn test_from_conversions() {
        let v: AmfValue = "test".into();
        assert!(matches!(v, AmfValue::String(_)));

        let v: AmfValue = 42.0.into();
        assert!(matches!(v, AmfValue::Double(_)));

        let v: AmfValue = 7.into();
        assert!(matches!(v, AmfValue::Integer(7)));

        let v: AmfValue = true.into();
        assert!(matches!(v, AmfValue::Boolean(true)));
    }

    #[test]
    fn test_from_vec() {
        let v: AmfValue = vec![1.0f64, 2.0, 3.0].into();
        let arr = v.as_array().expect("array");
        assert_eq!(arr.borrow().len(), 3);
    }

    #[test]
    fn test_get_on_object() {
        let typed = AmfValue::typed_object("Point", vec![("x".to_string(), 10.0.into())]);
        assert_eq!(typed.get_number("x"), Some(10.0));
        assert_eq!(typed.get_number("y"), None);
    }

    #[test]
    fn test_get_on_non_container() {
        assert!(AmfValue::Null.get("key").is_none());
        assert!(AmfValue::Double(42.0).get("key").is_none());
        assert!(AmfValue::array(vec![]).get("0").is_none());
    }

    #[test]
    fn test_structural_equality() {
        assert_eq!(AmfValue::array(vec![1.into(), 2.into()]), AmfValue::array(vec![1.into(), 2.into()]));
        assert_ne!(AmfValue::array(vec![1.into()]), AmfValue::array(vec![2.into()]));
        assert_ne!(AmfValue::Null, AmfValue::Boolean(false));
        assert_ne!(AmfValue::Integer(1), AmfValue::Double(1.0));
    }

    #[test]
    fn test_shared_identity() {
        let shared = AmfValue::array(vec!["x".into()]);
        let outer = AmfValue::array(vec![shared.clone(), shared.clone()]);

        let elems = outer.as_array().expect("array");
        let elems = elems.borrow();
        match (&elems[0], &elems[1]) {
            (AmfValue::Array(a), AmfValue::Array(b)) => assert!(Rc::ptr_eq(a, b)),
            _ => panic!("Expected arrays"),
        }
    }

    #[test]
    fn test_self_referential_equality_terminates() {
        let arr = Rc::new(RefCell::new(Vec::new()));
        arr.borrow_mut().push(AmfValue::Array(Rc::clone(&arr)));
        let a = AmfValue::Array(Rc::clone(&arr));
        let b = AmfValue::Array(arr);
        // ptr_eq short-circuit, no infinite descent
        assert_eq!(a, b);
    }

    #[test]
    fn test_identity_keys() {
        let a = AmfValue::array(vec![]);
        let b = a.clone();
        let c = AmfValue::array(vec![]);
        assert_eq!(a.identity(), b.identity());
        assert_ne!(a.identity(), c.identity());
        assert_eq!(AmfValue::Double(1.0).identity(), None);
    }

    #[test]
    fn test_default_value() {
        assert_eq!(AmfValue::default(), AmfValue::Null);
    }
}
