//! Value source.

use crate::context::FilterContext;
use crate::error::Result;
use crate::filter::{Filter, ProcessContext};
use crate::format::{FrameFormat, FrameTarget};
use crate::frame::{Frame, Timestamp};
use crate::port::{FieldHandle, PortSet};
use crate::value::Value;

/// Emits the value of its `object` port as a simple frame.
///
/// The frame is pushed once and the output closed, or pushed on every step
/// when `repeat` is true. Assigning a new `object` rebuilds the frame.
///
/// | Port | Kind | Default |
/// |------|------|---------|
/// | `object` | field | required |
/// | `repeat` | field | `false` |
/// | `frame` | output | |
pub struct ObjectSource {
    object: FieldHandle<Value>,
    repeat: FieldHandle<bool>,
    frame: Option<Frame>,
}

impl ObjectSource {
    /// Name of the output port.
    pub const OUTPUT: &'static str = "frame";

    /// Create a new ObjectSource.
    pub fn new() -> Self {
        Self {
            object: FieldHandle::new(Value::Bool(false)),
            repeat: FieldHandle::new(false),
            frame: None,
        }
    }

    fn release_frame(&mut self) -> Result<()> {
        match self.frame.take() {
            Some(frame) => frame.release(),
            None => Ok(()),
        }
    }
}

impl Default for ObjectSource {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for ObjectSource {
    fn setup_ports(&mut self, ports: &mut PortSet) -> Result<()> {
        ports.bind_field_port("object", &self.object, false, false)?;
        self.repeat = ports.declare_field_port("repeat", false, false)?;
        ports.add_output(Self::OUTPUT, FrameFormat::unspecified())?;
        Ok(())
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<()> {
        if self.frame.is_none() {
            let value = self.object.get();
            let format = FrameFormat::for_value(&value, FrameTarget::Simple);
            let frame = ctx.new_frame(&format)?;
            frame.set_value(&value)?;
            frame.set_timestamp(Timestamp::Unknown);
            self.frame = Some(frame);
        }
        if let Some(frame) = &self.frame {
            ctx.push_output(Self::OUTPUT, frame)?;
        }
        if !self.repeat.get() {
            ctx.close_output_port(Self::OUTPUT)?;
        }
        Ok(())
    }

    fn field_port_value_updated(&mut self, name: &str, _ctx: &FilterContext) -> Result<()> {
        if name == "object" {
            self.release_frame()?;
        }
        Ok(())
    }

    fn tear_down(&mut self, _ctx: &FilterContext) -> Result<()> {
        self.release_frame()
    }
}
