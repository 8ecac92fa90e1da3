//! Named-frame storage in the filter context.

use crate::error::Result;
use crate::filter::{Filter, ProcessContext};
use crate::format::FrameFormat;
use crate::port::{FieldHandle, PortSet};
use std::time::Duration;

/// Stores every incoming frame in the context under `key`.
///
/// A later frame replaces (and releases) the earlier one.
#[derive(Debug, Default)]
pub struct FrameStore {
    key: FieldHandle<String>,
}

impl FrameStore {
    /// Create a new FrameStore.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Filter for FrameStore {
    fn setup_ports(&mut self, ports: &mut PortSet) -> Result<()> {
        ports.add_input("frame", FrameFormat::unspecified())?;
        self.key = ports.declare_required_field_port("key", false)?;
        Ok(())
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<()> {
        let frame = ctx.pull_input("frame")?;
        let key = self.key.get();
        ctx.filter_context().store_frame(&key, &frame)
    }
}

/// Emits the frame stored in the context under `key`.
///
/// Until the key is present the filter sleeps and retries. Once found, the
/// frame is pushed and the output closed, unless `repeat` is set.
#[derive(Debug)]
pub struct FrameFetch {
    key: FieldHandle<String>,
    repeat: FieldHandle<bool>,
    retry_delay: Duration,
}

impl FrameFetch {
    /// Delay between lookups of a missing key.
    pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(250);

    /// Create a new FrameFetch.
    pub fn new() -> Self {
        Self {
            key: FieldHandle::default(),
            repeat: FieldHandle::new(false),
            retry_delay: Self::DEFAULT_RETRY_DELAY,
        }
    }

    /// Set the delay between lookups of a missing key.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

impl Default for FrameFetch {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for FrameFetch {
    fn setup_ports(&mut self, ports: &mut PortSet) -> Result<()> {
        self.key = ports.declare_required_field_port("key", false)?;
        self.repeat = ports.declare_field_port("repeat", false, false)?;
        ports.add_output("frame", FrameFormat::unspecified())?;
        Ok(())
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<()> {
        let key = self.key.get();
        match ctx.filter_context().fetch_frame(&key) {
            Some(frame) => {
                ctx.push_output("frame", &frame)?;
                if !self.repeat.get() {
                    ctx.close_output_port("frame")?;
                }
            }
            None => {
                tracing::trace!(filter = %ctx.filter_name(), %key, "frame not stored yet");
                ctx.delay_next_process(self.retry_delay);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FilterContext;
    use crate::filter::{FilterNode, FilterStatus};
    use crate::port::InputPort;
    use crate::value::{Value, ValueMap};

    #[test]
    fn test_store_then_fetch() {
        let ctx = FilterContext::new();
        let values = ValueMap::new().with("key", "last");
        let mut store = FilterNode::new("store", Box::new(FrameStore::new()), &values).unwrap();
        store.push_input_value("frame", Value::Floats(vec![0.5])).unwrap();
        store.perform_process(&ctx).unwrap();
        assert_eq!(ctx.stored_frame_count(), 1);

        let mut fetch = FilterNode::new("fetch", Box::new(FrameFetch::new()), &values).unwrap();
        let sink = InputPort::stream("sink", "in", FrameFormat::unspecified());
        fetch.output("frame").unwrap().connect_to(&sink).unwrap();
        fetch.open_outputs();
        fetch.perform_process(&ctx).unwrap();

        assert_eq!(fetch.status(), FilterStatus::Finished);
        let frame = sink.pull_frame().unwrap();
        assert_eq!(frame.floats().unwrap(), vec![0.5]);
        frame.release().unwrap();
    }

    #[test]
    fn test_fetch_sleeps_while_missing() {
        let ctx = FilterContext::new();
        let fetch = FrameFetch::new().with_retry_delay(Duration::from_millis(10));
        let values = ValueMap::new().with("key", "absent");
        let mut node = FilterNode::new("fetch", Box::new(fetch), &values).unwrap();
        let sink = InputPort::stream("sink", "in", FrameFormat::unspecified());
        node.output("frame").unwrap().connect_to(&sink).unwrap();
        node.open_outputs();

        node.perform_process(&ctx).unwrap();
        assert_eq!(node.status(), FilterStatus::Sleeping);
        assert_eq!(node.sleep_delay(), Some(Duration::from_millis(10)));
        assert!(!sink.has_frame());
    }
}
