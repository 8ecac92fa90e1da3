//! Filter registry for creating filters by kind name.

use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::filters::{
    CallbackFilter, FrameBranch, FrameFetch, FrameStore, NullFilter, ObjectSource, RetargetFilter,
};
use crate::value::ValueMap;
use std::collections::HashMap;

/// Constructor for a registered filter kind.
///
/// Receives the filter's initial values before its ports are declared; the
/// values themselves are assigned to ports by the node afterwards.
pub type FilterConstructor = fn(&ValueMap) -> Result<Box<dyn Filter>>;

/// Registry of filter constructors keyed by kind name.
pub struct FilterRegistry {
    constructors: HashMap<String, FilterConstructor>,
}

impl FilterRegistry {
    /// Create a registry with the built-in filters registered.
    pub fn new() -> Self {
        let mut registry = Self::empty();

        registry.register("branch", create_branch);
        registry.register("null", create_null);
        registry.register("object_source", create_object_source);
        registry.register("frame_store", create_frame_store);
        registry.register("frame_fetch", create_frame_fetch);
        registry.register("retarget", create_retarget);
        registry.register("callback", create_callback);

        registry
    }

    /// Create a registry with nothing registered.
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Register a constructor, replacing any previous one for `kind`.
    pub fn register(&mut self, kind: &str, constructor: FilterConstructor) {
        self.constructors.insert(kind.to_string(), constructor);
    }

    /// Construct a filter of `kind`.
    pub fn create(&self, kind: &str, values: &ValueMap) -> Result<Box<dyn Filter>> {
        let constructor = self
            .constructors
            .get(kind)
            .ok_or_else(|| Error::UnknownFilterKind(kind.to_string()))?;
        constructor(values)
    }

    /// Check if a kind is registered.
    pub fn is_registered(&self, kind: &str) -> bool {
        self.constructors.contains_key(kind)
    }

    /// All registered kinds, sorted.
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.constructors.keys().cloned().collect();
        kinds.sort();
        kinds
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// Built-in filter constructors

fn create_branch(_values: &ValueMap) -> Result<Box<dyn Filter>> {
    Ok(Box::new(FrameBranch::new()))
}

fn create_null(_values: &ValueMap) -> Result<Box<dyn Filter>> {
    Ok(Box::new(NullFilter::new()))
}

fn create_object_source(_values: &ValueMap) -> Result<Box<dyn Filter>> {
    Ok(Box::new(ObjectSource::new()))
}

fn create_frame_store(_values: &ValueMap) -> Result<Box<dyn Filter>> {
    Ok(Box::new(FrameStore::new()))
}

fn create_frame_fetch(_values: &ValueMap) -> Result<Box<dyn Filter>> {
    Ok(Box::new(FrameFetch::new()))
}

fn create_retarget(_values: &ValueMap) -> Result<Box<dyn Filter>> {
    Ok(Box::new(RetargetFilter::new()))
}

fn create_callback(_values: &ValueMap) -> Result<Box<dyn Filter>> {
    Ok(Box::new(CallbackFilter::new()))
}
