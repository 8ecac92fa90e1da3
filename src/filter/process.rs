//! Per-step view handed to [`Filter::process`](super::Filter::process).

use crate::context::FilterContext;
use crate::error::{Error, Result};
use crate::format::FrameFormat;
use crate::frame::{Frame, Timestamp};
use crate::memory::FrameManager;
use crate::port::{InputPort, OutputPort, PortSet};
use crate::value::Value;
use std::sync::Arc;
use std::time::Duration;

/// Access to a filter's ports and context during one process step.
///
/// Frames returned by [`pull_input`](Self::pull_input) are released when
/// the step ends; retain them to keep them longer. Frames created with
/// [`new_frame`](Self::new_frame) belong to the caller, who releases them
/// after pushing.
pub struct ProcessContext<'a> {
    filter: &'a str,
    ports: &'a PortSet,
    context: &'a FilterContext,
    timestamp: Timestamp,
    pulled: Vec<Frame>,
    delay: Option<Duration>,
}

impl<'a> ProcessContext<'a> {
    pub(crate) fn new(filter: &'a str, ports: &'a PortSet, context: &'a FilterContext) -> Self {
        Self {
            filter,
            ports,
            context,
            timestamp: Timestamp::Unknown,
            pulled: Vec::new(),
            delay: None,
        }
    }

    /// Name of the running filter.
    pub fn filter_name(&self) -> &str {
        self.filter
    }

    /// The session context.
    pub fn filter_context(&self) -> &FilterContext {
        self.context
    }

    /// The context's frame manager.
    pub fn frame_manager(&self) -> Arc<dyn FrameManager> {
        self.context.frame_manager()
    }

    /// Allocate a frame from the context's manager.
    pub fn new_frame(&self, format: &FrameFormat) -> Result<Frame> {
        self.context.frame_manager().new_frame(format)
    }

    /// Look up an input port.
    pub fn input(&self, name: &str) -> Result<&InputPort> {
        self.ports
            .input(name)
            .ok_or_else(|| Error::unknown_input(self.filter, name))
    }

    /// Look up an output port.
    pub fn output(&self, name: &str) -> Result<&OutputPort> {
        self.ports
            .output(name)
            .ok_or_else(|| Error::unknown_output(self.filter, name))
    }

    /// All input ports.
    pub fn inputs(&self) -> &[InputPort] {
        self.ports.inputs()
    }

    /// All output ports.
    pub fn outputs(&self) -> &[OutputPort] {
        self.ports.outputs()
    }

    /// Whether input `name` holds a frame.
    pub fn input_has_frame(&self, name: &str) -> Result<bool> {
        Ok(self.input(name)?.has_frame())
    }

    /// Pull a frame from input `name`.
    ///
    /// The first pulled frame sets the step's current timestamp.
    pub fn pull_input(&mut self, name: &str) -> Result<Frame> {
        let frame = self.input(name)?.pull_frame()?;
        if self.timestamp == Timestamp::Unknown {
            self.timestamp = frame.timestamp();
        }
        self.pulled.push(frame.clone());
        Ok(frame)
    }

    /// Pull input `name` and read its value.
    pub fn pull_input_value(&mut self, name: &str) -> Result<Value> {
        self.pull_input(name)?.value()
    }

    /// Push `frame` to output `name`, stamping it with the current
    /// timestamp if it has none.
    pub fn push_output(&mut self, name: &str, frame: &Frame) -> Result<()> {
        let output = self.output(name)?;
        if frame.timestamp() == Timestamp::NotSet {
            frame.set_timestamp(self.timestamp);
        }
        output.push_frame(frame)
    }

    /// Push a value to output `name` in a transient frame.
    pub fn push_output_value(&mut self, name: &str, value: Value) -> Result<()> {
        let frame = Frame::wrap_value(value);
        self.push_output(name, &frame)
    }

    /// Close output `name`, signalling end of stream downstream.
    pub fn close_output_port(&self, name: &str) -> Result<()> {
        self.output(name)?.close();
        Ok(())
    }

    /// Sleep for `delay` before the next step.
    pub fn delay_next_process(&mut self, delay: Duration) {
        self.delay = Some(delay);
    }

    /// Timestamp of the step: the first pulled frame's, or `Unknown`.
    pub fn current_timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Override the step's timestamp.
    pub fn set_current_timestamp(&mut self, timestamp: Timestamp) {
        self.timestamp = timestamp;
    }

    pub(crate) fn finish(self) -> (Vec<Frame>, Option<Duration>) {
        (self.pulled, self.delay)
    }
}
