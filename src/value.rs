//! Dynamically typed values carried by frames and field ports.

use std::any::{Any, TypeId};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// An RGBA8 image held in host memory.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bitmap {
    /// Width in pixels.
    pub width: usize,
    /// Height in pixels.
    pub height: usize,
    /// Pixel data, 4 bytes per pixel, row-major.
    pub pixels: Vec<u8>,
}

impl Bitmap {
    /// Bytes per RGBA8 pixel.
    pub const BYTES_PER_PIXEL: usize = 4;

    /// Create a zeroed bitmap.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width * height * Self::BYTES_PER_PIXEL],
        }
    }

    /// Wrap existing pixel data. Returns `None` if the length does not match.
    pub fn from_pixels(width: usize, height: usize, pixels: Vec<u8>) -> Option<Self> {
        (pixels.len() == width * height * Self::BYTES_PER_PIXEL).then_some(Self {
            width,
            height,
            pixels,
        })
    }

    /// Size of the pixel data in bytes.
    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }
}

/// Runtime class of an object value.
///
/// Object-class constraints on formats compare by [`TypeId`]; the name is
/// informational only.
#[derive(Clone, Copy)]
pub struct ObjectClass {
    id: TypeId,
    name: &'static str,
}

impl ObjectClass {
    /// The class of `T`.
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub(crate) fn from_any(value: &(dyn Any + Send + Sync)) -> Self {
        Self {
            id: value.type_id(),
            name: "object",
        }
    }

    /// Type name of the class.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether a value of class `other` may be stored where `self` is required.
    pub fn is_assignable_from(&self, other: &ObjectClass) -> bool {
        self.id == other.id
    }
}

impl PartialEq for ObjectClass {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ObjectClass {}

impl fmt::Debug for ObjectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectClass({})", self.name)
    }
}

/// A value stored in a frame or assigned to a field port.
#[derive(Clone)]
pub enum Value {
    /// Boolean scalar.
    Bool(bool),
    /// Integer scalar.
    Int(i64),
    /// Floating-point scalar.
    Float(f64),
    /// Text.
    Text(String),
    /// 32-bit integer array.
    Ints(Vec<i32>),
    /// 32-bit float array.
    Floats(Vec<f32>),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// RGBA8 image.
    Bitmap(Bitmap),
    /// Opaque shared object.
    Object(Arc<dyn Any + Send + Sync>),
}

impl Value {
    /// Wrap an arbitrary object.
    pub fn object<T: Any + Send + Sync>(value: T) -> Self {
        Value::Object(Arc::new(value))
    }

    /// Class of the contained value.
    pub fn object_class(&self) -> ObjectClass {
        match self {
            Value::Bool(_) => ObjectClass::of::<bool>(),
            Value::Int(_) => ObjectClass::of::<i64>(),
            Value::Float(_) => ObjectClass::of::<f64>(),
            Value::Text(_) => ObjectClass::of::<String>(),
            Value::Ints(_) => ObjectClass::of::<Vec<i32>>(),
            Value::Floats(_) => ObjectClass::of::<Vec<f32>>(),
            Value::Bytes(_) => ObjectClass::of::<Vec<u8>>(),
            Value::Bitmap(_) => ObjectClass::of::<Bitmap>(),
            Value::Object(obj) => ObjectClass::from_any(&**obj),
        }
    }

    /// Short variant name, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Ints(_) => "int array",
            Value::Floats(_) => "float array",
            Value::Bytes(_) => "bytes",
            Value::Bitmap(_) => "bitmap",
            Value::Object(_) => "object",
        }
    }

    /// Try to get as an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Try to get as a float.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Try to get as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            Value::Text(s) => match s.to_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Get as a string, converting scalars if necessary.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Text(s) => Some(s.clone()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Downcast an object value.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        match self {
            Value::Object(obj) => Arc::clone(obj).downcast::<T>().ok(),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Ints(a), Value::Ints(b)) => a == b,
            (Value::Floats(a), Value::Floats(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Bitmap(a), Value::Bitmap(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Text(s) => write!(f, "Text({s:?})"),
            Value::Ints(v) => write!(f, "Ints(len={})", v.len()),
            Value::Floats(v) => write!(f, "Floats(len={})", v.len()),
            Value::Bytes(v) => write!(f, "Bytes(len={})", v.len()),
            Value::Bitmap(b) => write!(f, "Bitmap({}x{})", b.width, b.height),
            Value::Object(_) => write!(f, "Object(..)"),
        }
    }
}

macro_rules! impl_from_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$variant(v.into())
            }
        })*
    };
}

impl_from_value! {
    bool => Bool,
    i64 => Int,
    i32 => Int,
    u32 => Int,
    f64 => Float,
    f32 => Float,
    String => Text,
    &str => Text,
    Vec<i32> => Ints,
    Vec<f32> => Floats,
    Vec<u8> => Bytes,
    Bitmap => Bitmap,
}

/// Conversion between [`Value`] and typed field storage.
///
/// Conversions are lenient the way assignment strings need them to be:
/// integers widen to floats and text parses into numbers and booleans.
pub trait FieldValue: Clone + Send + 'static {
    /// Convert from a dynamic value.
    fn from_value(value: &Value) -> Option<Self>;

    /// Convert into a dynamic value.
    fn to_value(&self) -> Value;
}

impl FieldValue for bool {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }
    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }
}

impl FieldValue for i64 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_i64()
    }
    fn to_value(&self) -> Value {
        Value::Int(*self)
    }
}

impl FieldValue for i32 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_i64().and_then(|i| i32::try_from(i).ok())
    }
    fn to_value(&self) -> Value {
        Value::Int(i64::from(*self))
    }
}

impl FieldValue for usize {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_i64().and_then(|i| usize::try_from(i).ok())
    }
    fn to_value(&self) -> Value {
        Value::Int(*self as i64)
    }
}

impl FieldValue for f64 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_f64()
    }
    fn to_value(&self) -> Value {
        Value::Float(*self)
    }
}

impl FieldValue for f32 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_f64().map(|f| f as f32)
    }
    fn to_value(&self) -> Value {
        Value::Float(f64::from(*self))
    }
}

impl FieldValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_text()
    }
    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }
}

impl FieldValue for Vec<i32> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Ints(v) => Some(v.clone()),
            _ => None,
        }
    }
    fn to_value(&self) -> Value {
        Value::Ints(self.clone())
    }
}

impl FieldValue for Vec<f32> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Floats(v) => Some(v.clone()),
            _ => None,
        }
    }
    fn to_value(&self) -> Value {
        Value::Floats(self.clone())
    }
}

impl FieldValue for Vec<u8> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bytes(v) => Some(v.clone()),
            _ => None,
        }
    }
    fn to_value(&self) -> Value {
        Value::Bytes(self.clone())
    }
}

impl FieldValue for Bitmap {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bitmap(b) => Some(b.clone()),
            _ => None,
        }
    }
    fn to_value(&self) -> Value {
        Value::Bitmap(self.clone())
    }
}

impl FieldValue for Value {
    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
    fn to_value(&self) -> Value {
        self.clone()
    }
}

/// Value of a format metadata entry.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    /// String value.
    String(String),
    /// Integer value.
    Int(i64),
    /// Floating-point value.
    Float(f64),
    /// Boolean value.
    Bool(bool),
    /// Raw bytes.
    Bytes(Vec<u8>),
}

/// Ordered key/value map used for initial filter values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueMap {
    entries: BTreeMap<String, Value>,
}

impl ValueMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.entries.insert(key.into(), value.into())
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Look up a value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Whether the key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Remove a value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for ValueMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = ValueMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}
