//! Opaque serialized store for cross-thread hand-off.
//!
//! Values are written with rkyv into an aligned byte buffer and read back by
//! deserializing, so readers never share backing memory with the writer.

use crate::error::{Error, Result};
use crate::value::{Bitmap, Value};
use rkyv::rancor;
use rkyv::util::AlignedVec;

const VALUE_TAG: &str = "framegraph::Value";

#[derive(rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
enum SerializedValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Ints(Vec<i32>),
    Floats(Vec<f32>),
    Bytes(Vec<u8>),
    Bitmap {
        width: u64,
        height: u64,
        pixels: Vec<u8>,
    },
}

impl TryFrom<&Value> for SerializedValue {
    type Error = Error;

    fn try_from(value: &Value) -> Result<Self> {
        Ok(match value {
            Value::Bool(v) => SerializedValue::Bool(*v),
            Value::Int(v) => SerializedValue::Int(*v),
            Value::Float(v) => SerializedValue::Float(*v),
            Value::Text(v) => SerializedValue::Text(v.clone()),
            Value::Ints(v) => SerializedValue::Ints(v.clone()),
            Value::Floats(v) => SerializedValue::Floats(v.clone()),
            Value::Bytes(v) => SerializedValue::Bytes(v.clone()),
            Value::Bitmap(b) => SerializedValue::Bitmap {
                width: b.width as u64,
                height: b.height as u64,
                pixels: b.pixels.clone(),
            },
            Value::Object(_) => {
                return Err(Error::UnsupportedValue(
                    "object values must be serialized with Frame::store_serialized".into(),
                ));
            }
        })
    }
}

impl From<SerializedValue> for Value {
    fn from(value: SerializedValue) -> Self {
        match value {
            SerializedValue::Bool(v) => Value::Bool(v),
            SerializedValue::Int(v) => Value::Int(v),
            SerializedValue::Float(v) => Value::Float(v),
            SerializedValue::Text(v) => Value::Text(v),
            SerializedValue::Ints(v) => Value::Ints(v),
            SerializedValue::Floats(v) => Value::Floats(v),
            SerializedValue::Bytes(v) => Value::Bytes(v),
            SerializedValue::Bitmap {
                width,
                height,
                pixels,
            } => Value::Bitmap(Bitmap {
                width: width as usize,
                height: height as usize,
                pixels,
            }),
        }
    }
}

#[derive(Default)]
pub(crate) struct SerializedStore {
    bytes: AlignedVec,
    type_name: Option<&'static str>,
}

impl SerializedStore {
    pub(crate) fn store_value(&mut self, value: &Value) -> Result<()> {
        let value = SerializedValue::try_from(value)?;
        let bytes = rkyv::to_bytes::<rancor::Error>(&value)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        self.store_bytes(bytes, VALUE_TAG);
        Ok(())
    }

    pub(crate) fn load_value(&self) -> Result<Value> {
        let bytes = self.bytes_for(VALUE_TAG)?;
        rkyv::from_bytes::<SerializedValue, rancor::Error>(bytes)
            .map(Value::from)
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    pub(crate) fn store_bytes(&mut self, bytes: AlignedVec, type_name: &'static str) {
        self.bytes = bytes;
        self.type_name = Some(type_name);
    }

    /// Serialized bytes, if they were written for `type_name`.
    pub(crate) fn bytes_for(&self, type_name: &str) -> Result<&[u8]> {
        match self.type_name {
            Some(stored) if stored == type_name => Ok(&self.bytes),
            Some(stored) => Err(Error::FormatMismatch(format!(
                "serialized frame holds {stored}, not {type_name}"
            ))),
            None => Err(Error::UnsupportedValue("serialized frame is empty".into())),
        }
    }

    pub(crate) fn copy_from(&mut self, source: &SerializedStore) {
        let mut bytes: AlignedVec = AlignedVec::new();
        bytes.extend_from_slice(&source.bytes);
        self.bytes = bytes;
        self.type_name = source.type_name;
    }
}
