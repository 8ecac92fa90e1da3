//! Per-frame closure sink.

use crate::error::{Error, Result};
use crate::filter::{Filter, ProcessContext};
use crate::format::FrameFormat;
use crate::frame::Frame;
use crate::port::{FieldHandle, PortSet};
use crate::value::{FieldValue, Value};
use std::fmt;
use std::sync::Arc;

/// Closure invoked with each received frame.
pub type FrameCallback = Arc<dyn Fn(&Frame) -> Result<()> + Send + Sync>;

/// Wrap a callback as a value for the `listener` port.
///
/// # Example
///
/// ```rust
/// use framegraph::filter::FilterNode;
/// use framegraph::frame::Frame;
/// use framegraph::filters::{CallbackFilter, FrameCallback, listener_value};
/// use framegraph::value::ValueMap;
/// use std::sync::Arc;
///
/// let callback: FrameCallback = Arc::new(|frame: &Frame| {
///     println!("received frame {}", frame.id());
///     Ok(())
/// });
/// let values = ValueMap::new().with("listener", listener_value(callback));
/// let node = FilterNode::new("cb", Box::new(CallbackFilter::new()), &values).unwrap();
/// assert!(node.input("listener").is_ok());
/// ```
pub fn listener_value(callback: FrameCallback) -> Value {
    Value::object(callback)
}

#[derive(Clone, Default)]
struct Listener(Option<FrameCallback>);

impl FieldValue for Listener {
    fn from_value(value: &Value) -> Option<Self> {
        value
            .downcast::<FrameCallback>()
            .map(|callback| Listener(Some(callback.as_ref().clone())))
    }

    fn to_value(&self) -> Value {
        match &self.0 {
            Some(callback) => listener_value(callback.clone()),
            None => Value::Bool(false),
        }
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.0.is_some() { "Listener(set)" } else { "Listener(unset)" })
    }
}

/// Hands every frame on its `frame` input to the `listener` callback.
///
/// Receiving a frame with no listener set is a process error.
#[derive(Debug, Default)]
pub struct CallbackFilter {
    listener: FieldHandle<Listener>,
}

impl CallbackFilter {
    /// Create a CallbackFilter without a listener.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a CallbackFilter calling `callback`.
    pub fn with_callback<F>(callback: F) -> Self
    where
        F: Fn(&Frame) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            listener: FieldHandle::new(Listener(Some(Arc::new(callback)))),
        }
    }
}

impl Filter for CallbackFilter {
    fn setup_ports(&mut self, ports: &mut PortSet) -> Result<()> {
        ports.add_input("frame", FrameFormat::unspecified())?;
        ports.bind_field_port("listener", &self.listener, true, false)
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<()> {
        let frame = ctx.pull_input("frame")?;
        let Listener(callback) = self.listener.get();
        match callback {
            Some(callback) => callback(&frame),
            None => Err(Error::InvalidState(format!(
                "filter '{}' received a frame but has no listener",
                ctx.filter_name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FilterContext;
    use crate::filter::{FilterNode, FilterStatus};
    use crate::value::ValueMap;
    use parking_lot::Mutex;

    #[test]
    fn test_callback_receives_frames() {
        let ctx = FilterContext::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let filter = CallbackFilter::with_callback(move |frame| {
            sink.lock().push(frame.ints()?);
            Ok(())
        });
        let mut node = FilterNode::new("cb", Box::new(filter), &ValueMap::new()).unwrap();
        node.push_input_value("frame", Value::Ints(vec![3])).unwrap();
        node.perform_process(&ctx).unwrap();
        assert_eq!(*seen.lock(), vec![vec![3]]);
    }

    #[test]
    fn test_listener_assigned_as_value() {
        let ctx = FilterContext::new();
        let count = Arc::new(Mutex::new(0));
        let counter = count.clone();
        let callback: FrameCallback = Arc::new(move |_frame: &Frame| {
            *counter.lock() += 1;
            Ok(())
        });
        let values = ValueMap::new().with("listener", listener_value(callback));
        let mut node = FilterNode::new("cb", Box::new(CallbackFilter::new()), &values).unwrap();
        node.push_input_value("frame", Value::Int(1)).unwrap();
        node.perform_process(&ctx).unwrap();
        assert_eq!(*count.lock(), 1);

        assert!(matches!(
            node.set_input_value("listener", Value::Int(3)),
            Err(Error::UnsupportedValue(_))
        ));
    }

    #[test]
    fn test_missing_listener_fails_step() {
        let ctx = FilterContext::new();
        let mut node =
            FilterNode::new("cb", Box::new(CallbackFilter::new()), &ValueMap::new()).unwrap();
        node.push_input_value("frame", Value::Int(1)).unwrap();
        assert!(node.perform_process(&ctx).unwrap_err().is_execution_error());
        assert_eq!(node.status(), FilterStatus::Error);
    }
}
