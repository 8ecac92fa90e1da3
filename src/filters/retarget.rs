//! Backing-store conversion.

use crate::error::{Error, Result};
use crate::filter::{Filter, ProcessContext};
use crate::format::{FrameFormat, FrameTarget};
use crate::port::{FieldHandle, PortSet};

/// Copies each frame into a new frame on another backing store.
///
/// The store is chosen by the final `target` value (`simple`, `native`,
/// `gpu` or `vertex`). The output format is the input format with the target
/// replaced; the copy goes through the frame copy table.
#[derive(Debug)]
pub struct RetargetFilter {
    target_name: FieldHandle<String>,
    target: FrameTarget,
}

impl RetargetFilter {
    /// Create a new RetargetFilter.
    pub fn new() -> Self {
        Self {
            target_name: FieldHandle::default(),
            target: FrameTarget::Unspecified,
        }
    }
}

impl Default for RetargetFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for RetargetFilter {
    fn declare_final_ports(&mut self, ports: &mut PortSet) -> Result<()> {
        ports.bind_field_port("target", &self.target_name, false, true)
    }

    fn setup_ports(&mut self, ports: &mut PortSet) -> Result<()> {
        self.target = self.target_name.get().parse()?;
        if self.target == FrameTarget::Unspecified {
            return Err(Error::UnsupportedValue(format!(
                "filter '{}' needs a concrete target",
                ports.filter_name()
            )));
        }
        ports.add_input("frame", FrameFormat::unspecified())?;
        ports.add_output_based_on_input("frame", "frame")?;
        Ok(())
    }

    fn output_format(&self, _port: &str, input_format: &FrameFormat) -> Option<FrameFormat> {
        Some(input_format.clone().with_target(self.target))
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<()> {
        let input = ctx.pull_input("frame")?;
        let format = input.format().with_target(self.target);
        let output = ctx.new_frame(&format)?;
        let pushed = output
            .set_data_from_frame(&input)
            .and_then(|()| ctx.push_output("frame", &output));
        output.release()?;
        pushed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FilterContext;
    use crate::filter::FilterNode;
    use crate::frame::FrameKind;
    use crate::port::InputPort;
    use crate::value::{Value, ValueMap};

    #[test]
    fn test_retarget_to_native() {
        let ctx = FilterContext::new();
        let values = ValueMap::new().with("target", "native");
        let mut node = FilterNode::new("retarget", Box::new(RetargetFilter::new()), &values).unwrap();
        let sink = InputPort::stream("sink", "in", FrameFormat::unspecified());
        node.output("frame").unwrap().connect_to(&sink).unwrap();
        node.open_outputs();

        node.push_input_value("frame", Value::Ints(vec![7, 8])).unwrap();
        node.perform_process(&ctx).unwrap();
        let frame = sink.pull_frame().unwrap();
        assert_eq!(frame.kind(), FrameKind::Native);
        assert_eq!(frame.format().target(), FrameTarget::Native);
        assert_eq!(frame.ints().unwrap(), vec![7, 8]);
        frame.release().unwrap();
    }

    #[test]
    fn test_target_required() {
        assert!(FilterNode::new("r", Box::new(RetargetFilter::new()), &ValueMap::new()).is_err());
        let values = ValueMap::new().with("target", "plasma");
        assert!(matches!(
            FilterNode::new("r", Box::new(RetargetFilter::new()), &values),
            Err(Error::UnsupportedValue(_))
        ));
    }
}
