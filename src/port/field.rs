//! Typed handles for field and program ports.

use crate::error::{Error, Result};
use crate::gpu::ShaderProgram;
use crate::value::{FieldValue, Value};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Shared storage for a filter parameter fed by a field port.
///
/// The filter keeps one clone and reads it during processing; the port keeps
/// another and writes into it when a pending value is transferred.
pub struct FieldHandle<T> {
    value: Arc<Mutex<T>>,
}

impl<T> Clone for FieldHandle<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
        }
    }
}

impl<T: Clone> FieldHandle<T> {
    /// Create an unbound handle holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            value: Arc::new(Mutex::new(value)),
        }
    }

    /// Current value.
    pub fn get(&self) -> T {
        self.value.lock().clone()
    }

    /// Borrow the current value.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.value.lock())
    }

    pub(crate) fn set(&self, value: T) {
        *self.value.lock() = value;
    }
}

impl<T: Clone + Default> Default for FieldHandle<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for FieldHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FieldHandle").field(&*self.value.lock()).finish()
    }
}

/// Destination of a field or program port's transferred value.
pub(crate) trait ValueTarget: Send {
    /// Validate that `value` can be assigned.
    fn check(&self, value: &Value) -> Result<()>;

    /// Apply `value`.
    fn assign(&self, value: &Value) -> Result<()>;

    /// Value currently held by the target.
    fn current(&self) -> Option<Value>;
}

pub(crate) struct FieldTarget<T> {
    pub(crate) name: String,
    pub(crate) handle: FieldHandle<T>,
}

impl<T: FieldValue> FieldTarget<T> {
    fn convert(&self, value: &Value) -> Result<T> {
        T::from_value(value).ok_or_else(|| {
            Error::UnsupportedValue(format!(
                "cannot assign {} value to field port '{}' of type {}",
                value.kind_name(),
                self.name,
                std::any::type_name::<T>()
            ))
        })
    }
}

impl<T: FieldValue> ValueTarget for FieldTarget<T> {
    fn check(&self, value: &Value) -> Result<()> {
        self.convert(value).map(drop)
    }

    fn assign(&self, value: &Value) -> Result<()> {
        let converted = self.convert(value)?;
        self.handle.set(converted);
        Ok(())
    }

    fn current(&self) -> Option<Value> {
        Some(self.handle.with(FieldValue::to_value))
    }
}

pub(crate) struct ProgramTarget {
    pub(crate) program: ShaderProgram,
    pub(crate) variable: String,
}

impl ValueTarget for ProgramTarget {
    fn check(&self, _value: &Value) -> Result<()> {
        Ok(())
    }

    fn assign(&self, value: &Value) -> Result<()> {
        self.program.set_host_value(&self.variable, value.clone());
        Ok(())
    }

    fn current(&self) -> Option<Value> {
        self.program.host_value(&self.variable)
    }
}
