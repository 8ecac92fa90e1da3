//! Run a single filter as a function call, outside of any graph.
//!
//! ```rust
//! use framegraph::context::FilterContext;
//! use framegraph::filters::RetargetFilter;
//! use framegraph::format::FrameTarget;
//! use framegraph::function::FilterFunction;
//! use framegraph::value::{Value, ValueMap};
//!
//! let values = ValueMap::new().with("target", "native");
//! let mut function = FilterFunction::new(
//!     FilterContext::new(),
//!     "retarget",
//!     Box::new(RetargetFilter::new()),
//!     &values,
//! )
//! .unwrap();
//!
//! let frame = function
//!     .execute(&ValueMap::new().with("frame", Value::Ints(vec![1, 2])))
//!     .unwrap();
//! assert_eq!(frame.format().target(), FrameTarget::Native);
//! assert_eq!(frame.ints().unwrap(), vec![1, 2]);
//! frame.release().unwrap();
//! ```

use crate::context::FilterContext;
use crate::error::{Error, Result};
use crate::filter::{Filter, FilterNode, FilterStatus};
use crate::format::FrameFormat;
use crate::frame::Frame;
use crate::port::{InputKind, InputPort};
use crate::value::ValueMap;

/// A filter driven one step at a time by the caller.
///
/// Every output is connected to a private holder port; each execution
/// assigns the given inputs, processes the filter once and hands back the
/// frames it pushed. Returned frames belong to the caller, who must release
/// them.
pub struct FilterFunction {
    context: FilterContext,
    node: FilterNode,
    holders: Vec<InputPort>,
}

impl FilterFunction {
    /// Wrap `filter`, assigning its initial values.
    pub fn new(
        context: FilterContext,
        name: &str,
        filter: Box<dyn Filter>,
        values: &ValueMap,
    ) -> Result<Self> {
        let node = FilterNode::new(name, filter, values)?;
        Self::from_node(context, node)
    }

    /// Wrap an initialized node.
    pub fn from_node(context: FilterContext, node: FilterNode) -> Result<Self> {
        let holder_owner = format!("{}.result", node.name());
        let mut holders = Vec::with_capacity(node.ports().outputs().len());
        for output in node.ports().outputs() {
            let holder = InputPort::stream(&holder_owner, output.name(), FrameFormat::unspecified());
            output.connect_to(&holder)?;
            holders.push(holder);
        }
        let function = Self {
            context,
            node,
            holders,
        };
        function.open_ports();
        Ok(function)
    }

    fn open_ports(&self) {
        self.node.open_outputs();
        for input in self.node.ports().inputs() {
            if input.kind() != InputKind::Stream {
                input.open();
            }
        }
    }

    /// Name of the wrapped filter.
    pub fn name(&self) -> &str {
        self.node.name()
    }

    /// The context the filter runs in.
    pub fn context(&self) -> &FilterContext {
        &self.context
    }

    /// The wrapped node.
    pub fn node(&self) -> &FilterNode {
        &self.node
    }

    /// Names of the outputs, in declaration order.
    pub fn output_names(&self) -> Vec<String> {
        self.holders.iter().map(|h| h.name().to_string()).collect()
    }

    /// Push a frame on an input before the next execution.
    pub fn push_input_frame(&self, name: &str, frame: &Frame) -> Result<()> {
        self.node.push_input_frame(name, frame)
    }

    // ------------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------------

    /// Process once and return the frame pushed to the only output.
    ///
    /// Fails if the filter does not have exactly one output or pushed
    /// nothing to it.
    pub fn execute(&mut self, inputs: &ValueMap) -> Result<Frame> {
        if self.holders.len() != 1 {
            return Err(Error::UnsupportedOperation(format!(
                "filter '{}' has {} outputs; use execute_multi",
                self.name(),
                self.holders.len()
            )));
        }
        self.run_once(inputs)?;
        self.holders[0].pull_frame()
    }

    /// Process once and return the frames pushed, keyed by output name.
    ///
    /// Outputs the step pushed nothing to are left out.
    pub fn execute_multi(&mut self, inputs: &ValueMap) -> Result<Vec<(String, Frame)>> {
        self.run_once(inputs)?;
        let mut results = Vec::with_capacity(self.holders.len());
        for holder in &self.holders {
            if holder.has_frame() {
                results.push((holder.name().to_string(), holder.pull_frame()?));
            }
        }
        Ok(results)
    }

    fn run_once(&mut self, inputs: &ValueMap) -> Result<()> {
        if self.node.status() >= FilterStatus::Finished {
            return Err(Error::InvalidState(format!(
                "filter '{}' is {}",
                self.name(),
                self.node.status()
            )));
        }
        // No scheduler drives wake-ups here; a requested delay is dropped.
        self.node.wake();
        for (key, value) in inputs.iter() {
            self.node.push_input_value(key, value.clone())?;
        }
        if !self.node.can_process() {
            return Err(Error::InvalidState(format!(
                "filter '{}' is not ready to process",
                self.name()
            )));
        }

        let env = self.context.gpu_environment();
        let activated = match &env {
            Some(env) if !env.is_current() => {
                env.activate()?;
                true
            }
            _ => false,
        };
        let result = self.node.perform_process(&self.context);
        if let (Some(env), true) = (&env, activated) {
            env.deactivate();
        }
        result
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Close the filter. A later execution opens it again.
    pub fn close(&mut self) -> Result<()> {
        for holder in &self.holders {
            holder.clear()?;
        }
        self.node.perform_close(&self.context)?;
        self.node.reset_for_run();
        self.open_ports();
        Ok(())
    }

    /// Release the filter and any frames left in its ports.
    pub fn tear_down(&mut self) -> Result<()> {
        for holder in &self.holders {
            holder.clear()?;
        }
        self.node.perform_tear_down(&self.context)
    }
}

impl std::fmt::Debug for FilterFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterFunction")
            .field("filter", &self.node.name())
            .field("status", &self.node.status())
            .field("outputs", &self.output_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::ProcessContext;
    use crate::filters::{FrameBranch, NullFilter};
    use crate::port::PortSet;
    use crate::value::Value;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Multiplies integer inputs by a field factor.
    struct Scale {
        factor: crate::port::FieldHandle<i64>,
        opened: Arc<AtomicUsize>,
    }

    impl Scale {
        fn new(opened: Arc<AtomicUsize>) -> Self {
            Self {
                factor: crate::port::FieldHandle::new(2),
                opened,
            }
        }
    }

    impl Filter for Scale {
        fn setup_ports(&mut self, ports: &mut PortSet) -> crate::error::Result<()> {
            ports.add_input("in", FrameFormat::unspecified())?;
            ports.add_output("out", FrameFormat::unspecified())?;
            ports.bind_field_port("factor", &self.factor, true, false)
        }

        fn open(&mut self, _ctx: &FilterContext) -> crate::error::Result<()> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn process(&mut self, ctx: &mut ProcessContext<'_>) -> crate::error::Result<()> {
            let Value::Int(v) = ctx.pull_input_value("in")? else {
                return Err(Error::UnsupportedValue("expected an integer".into()));
            };
            ctx.push_output_value("out", Value::Int(v * self.factor.get()))
        }
    }

    fn scale() -> (FilterFunction, Arc<AtomicUsize>) {
        let opened = Arc::new(AtomicUsize::new(0));
        let function = FilterFunction::new(
            FilterContext::new(),
            "scale",
            Box::new(Scale::new(Arc::clone(&opened))),
            &ValueMap::new(),
        )
        .unwrap();
        (function, opened)
    }

    #[test]
    fn test_execute_returns_output() {
        let (mut function, opened) = scale();
        let frame = function.execute(&ValueMap::new().with("in", 21i64)).unwrap();
        assert_eq!(frame.value().unwrap(), Value::Int(42));
        frame.release().unwrap();

        let frame = function
            .execute(&ValueMap::new().with("in", 5i64).with("factor", 3i64))
            .unwrap();
        assert_eq!(frame.value().unwrap(), Value::Int(15));
        frame.release().unwrap();
        assert_eq!(opened.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_missing_input_is_not_ready() {
        let (mut function, _) = scale();
        assert!(matches!(
            function.execute(&ValueMap::new()),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_close_then_execute_reopens() {
        let (mut function, opened) = scale();
        function
            .execute(&ValueMap::new().with("in", 1i64))
            .unwrap()
            .release()
            .unwrap();
        function.close().unwrap();
        function
            .execute(&ValueMap::new().with("in", 1i64))
            .unwrap()
            .release()
            .unwrap();
        assert_eq!(opened.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_multiple_outputs() {
        let values = ValueMap::new().with("outputs", 3i64);
        let mut function =
            FilterFunction::new(FilterContext::new(), "fan", Box::new(FrameBranch::new()), &values)
                .unwrap();
        assert!(matches!(
            function.execute(&ValueMap::new().with("in", 1i64)),
            Err(Error::UnsupportedOperation(_))
        ));

        let results = function
            .execute_multi(&ValueMap::new().with("in", 7i64))
            .unwrap();
        let names: Vec<&str> = results.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["out0", "out1", "out2"]);
        for (_, frame) in results {
            assert_eq!(frame.value().unwrap(), Value::Int(7));
            frame.release().unwrap();
        }
    }

    #[test]
    fn test_no_outputs_and_tear_down() {
        let mut function = FilterFunction::new(
            FilterContext::new(),
            "sink",
            Box::new(NullFilter::new()),
            &ValueMap::new(),
        )
        .unwrap();
        let results = function
            .execute_multi(&ValueMap::new().with("frame", 1i64))
            .unwrap();
        assert!(results.is_empty());

        function.tear_down().unwrap();
        assert_eq!(function.node().status(), FilterStatus::Released);
        assert!(function.execute_multi(&ValueMap::new()).is_err());
    }
}
