//! Synchronized fan-out.

use crate::error::Result;
use crate::filter::{Filter, ProcessContext};
use crate::format::FrameFormat;
use crate::port::{FieldHandle, PortSet};

/// Forwards each input frame to every output.
///
/// A step runs only once all outputs can accept a frame, so every target
/// sees the same sequence of frames. The number of outputs comes from the
/// final `outputs` value (default 2); outputs are named `out0`, `out1`, ...
///
/// # Example
///
/// ```rust
/// use framegraph::filter::FilterNode;
/// use framegraph::filters::FrameBranch;
/// use framegraph::value::ValueMap;
///
/// let values = ValueMap::new().with("outputs", 3i64);
/// let node = FilterNode::new("split", Box::new(FrameBranch::new()), &values).unwrap();
/// assert_eq!(node.ports().outputs().len(), 3);
/// ```
#[derive(Debug)]
pub struct FrameBranch {
    outputs: FieldHandle<usize>,
}

impl FrameBranch {
    /// Name of the input port.
    pub const INPUT: &'static str = "in";
    /// Name of the final port holding the output count.
    pub const OUTPUT_COUNT: &'static str = "outputs";

    /// Create a new FrameBranch.
    pub fn new() -> Self {
        Self {
            outputs: FieldHandle::new(2),
        }
    }

    /// Name of output `index`.
    pub fn output_name(index: usize) -> String {
        format!("out{index}")
    }
}

impl Default for FrameBranch {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for FrameBranch {
    fn declare_final_ports(&mut self, ports: &mut PortSet) -> Result<()> {
        ports.bind_field_port(Self::OUTPUT_COUNT, &self.outputs, true, true)
    }

    fn setup_ports(&mut self, ports: &mut PortSet) -> Result<()> {
        ports.add_input(Self::INPUT, FrameFormat::unspecified())?;
        for i in 0..self.outputs.get() {
            ports.add_output_based_on_input(&Self::output_name(i), Self::INPUT)?;
        }
        Ok(())
    }

    fn output_format(&self, _port: &str, input_format: &FrameFormat) -> Option<FrameFormat> {
        Some(input_format.clone())
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<()> {
        let frame = ctx.pull_input(Self::INPUT)?;
        let names: Vec<String> = ctx.outputs().iter().map(|o| o.name().to_string()).collect();
        for name in names {
            ctx.push_output(&name, &frame)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FilterContext;
    use crate::filter::FilterNode;
    use crate::port::InputPort;
    use crate::value::{Value, ValueMap};

    #[test]
    fn test_branch_forwards_to_all_outputs() {
        let ctx = FilterContext::new();
        let mut node =
            FilterNode::new("branch", Box::new(FrameBranch::new()), &ValueMap::new()).unwrap();
        let sinks: Vec<InputPort> = (0..2)
            .map(|i| {
                let sink = InputPort::stream(&format!("sink{i}"), "in", FrameFormat::unspecified());
                node.output(&FrameBranch::output_name(i))
                    .unwrap()
                    .connect_to(&sink)
                    .unwrap();
                sink
            })
            .collect();
        node.open_outputs();

        node.push_input_value("in", Value::Ints(vec![4, 2])).unwrap();
        node.perform_process(&ctx).unwrap();
        let first = sinks[0].pull_frame().unwrap();
        let second = sinks[1].pull_frame().unwrap();
        assert!(first.same_frame(&second));
        assert_eq!(first.ints().unwrap(), vec![4, 2]);
    }

    #[test]
    fn test_branch_waits_for_every_output() {
        let ctx = FilterContext::new();
        let mut node =
            FilterNode::new("branch", Box::new(FrameBranch::new()), &ValueMap::new()).unwrap();
        let sinks: Vec<InputPort> = (0..2)
            .map(|i| {
                let sink = InputPort::stream("sink", "in", FrameFormat::unspecified());
                node.output(&FrameBranch::output_name(i))
                    .unwrap()
                    .connect_to(&sink)
                    .unwrap();
                sink
            })
            .collect();
        node.open_outputs();

        node.push_input_value("in", Value::Int(1)).unwrap();
        node.perform_process(&ctx).unwrap();
        sinks[0].pull_frame().unwrap();

        node.push_input_value("in", Value::Int(2)).unwrap();
        assert!(!node.can_process());
        sinks[1].pull_frame().unwrap();
        assert!(node.can_process());
    }

    #[test]
    fn test_output_count_is_final() {
        let values = ValueMap::new().with(FrameBranch::OUTPUT_COUNT, 4i64);
        let node = FilterNode::new("branch", Box::new(FrameBranch::new()), &values).unwrap();
        assert_eq!(node.ports().outputs().len(), 4);
        assert!(node.output("out3").is_ok());
        assert!(node.set_input_value("outputs", Value::Int(1)).is_err());
    }
}
