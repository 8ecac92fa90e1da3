//! Shader program host variables.

use crate::value::Value;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// A shader program as seen by the engine: a named bag of host variables
/// that program ports write into. Compilation happens elsewhere.
#[derive(Clone, Debug)]
pub struct ShaderProgram {
    name: Arc<str>,
    variables: Arc<Mutex<HashMap<String, Value>>>,
}

impl ShaderProgram {
    /// Create a program with no variables set.
    pub fn new(name: impl Into<String>) -> Self {
        let name: String = name.into();
        Self {
            name: Arc::from(name),
            variables: Arc::default(),
        }
    }

    /// Program name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set a host variable.
    pub fn set_host_value(&self, variable: &str, value: Value) {
        self.variables.lock().insert(variable.to_string(), value);
    }

    /// Current value of a host variable.
    pub fn host_value(&self, variable: &str) -> Option<Value> {
        self.variables.lock().get(variable).cloned()
    }

    /// Whether the variable has been set.
    pub fn has_host_value(&self, variable: &str) -> bool {
        self.variables.lock().contains_key(variable)
    }
}
