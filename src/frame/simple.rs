//! Host-memory store holding a typed value.

use crate::error::{Error, Result};
use crate::format::{BaseType, FrameFormat};
use crate::value::Value;

pub(crate) struct SimpleStore {
    value: Option<Value>,
}

impl SimpleStore {
    /// Zero-filled array matching the format's base type, or empty.
    pub(crate) fn new(format: &FrameFormat) -> Self {
        let len = format.length();
        let value = match format.base_type() {
            BaseType::Int32 => Some(Value::Ints(vec![0; len])),
            BaseType::Float => Some(Value::Floats(vec![0.0; len])),
            BaseType::Byte | BaseType::Bit => Some(Value::Bytes(vec![0; format.size()])),
            _ => None,
        };
        Self { value }
    }

    pub(crate) fn with_value(value: Value) -> Self {
        Self { value: Some(value) }
    }

    pub(crate) fn set_value(&mut self, format: &FrameFormat, value: &Value) -> Result<()> {
        if let Some(class) = format.object_class() {
            let actual = value.object_class();
            if !class.is_assignable_from(&actual) {
                return Err(Error::FormatMismatch(format!(
                    "cannot store a {} value in a frame of class {}",
                    value.kind_name(),
                    class.name()
                )));
            }
        }
        self.value = Some(value.clone());
        Ok(())
    }

    pub(crate) fn value(&self) -> Result<Value> {
        self.value
            .clone()
            .ok_or_else(|| Error::UnsupportedValue("frame holds no value".into()))
    }

    pub(crate) fn copy_from(&mut self, format: &FrameFormat, source: &SimpleStore) -> Result<()> {
        match &source.value {
            Some(value) => self.set_value(format, value),
            None => {
                self.value = None;
                Ok(())
            }
        }
    }
}
