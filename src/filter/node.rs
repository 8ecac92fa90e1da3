//! Engine-side wrapper driving a filter's status machine.

use super::{Filter, FilterStatus, ProcessContext};
use crate::context::FilterContext;
use crate::error::{Error, Result};
use crate::frame::{Frame, Timestamp};
use crate::observability::FilterMetrics;
use crate::port::{InputKind, InputPort, OutputPort, PortSet};
use crate::value::{Value, ValueMap};
use std::fmt;
use std::time::Duration;

/// A filter together with its ports and lifecycle state.
pub struct FilterNode {
    name: String,
    filter: Box<dyn Filter>,
    ports: PortSet,
    status: FilterStatus,
    is_open: bool,
    current_timestamp: Timestamp,
    sleep_delay: Option<Duration>,
    error: Option<Error>,
    metrics: FilterMetrics,
}

impl FilterNode {
    /// Wrap `filter`, declare its ports and assign initial values.
    ///
    /// Final ports are declared and assigned first, then the remaining ports
    /// are declared and assigned. Keys that name no input port are rejected.
    pub fn new(name: &str, filter: Box<dyn Filter>, values: &ValueMap) -> Result<Self> {
        let mut node = Self {
            name: name.to_string(),
            filter,
            ports: PortSet::new(name),
            status: FilterStatus::PreInit,
            is_open: false,
            current_timestamp: Timestamp::NotSet,
            sleep_delay: None,
            error: None,
            metrics: FilterMetrics::new(name),
        };

        node.filter.declare_final_ports(&mut node.ports)?;
        let mut assigned = Vec::new();
        for (key, value) in values.iter() {
            if node.ports.input(key).is_some() {
                node.set_input_value(key, value.clone())?;
                assigned.push(key);
            }
        }

        node.filter.setup_ports(&mut node.ports)?;
        let (finals, rest): (Vec<_>, Vec<_>) = values
            .iter()
            .filter(|(key, _)| !assigned.contains(key))
            .partition(|(key, _)| {
                node.ports
                    .input(key)
                    .is_some_and(|p| p.kind() == InputKind::Final)
            });
        for (key, value) in finals.into_iter().chain(rest) {
            node.set_input_value(key, value.clone())?;
        }

        node.status = FilterStatus::Unprepared;
        tracing::debug!(
            filter = %node.name,
            inputs = node.ports.inputs().len(),
            outputs = node.ports.outputs().len(),
            "filter initialized"
        );
        Ok(node)
    }

    /// Filter name, unique within its graph.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current status.
    pub fn status(&self) -> FilterStatus {
        self.status
    }

    /// Error recorded by the last failed step.
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Whether the filter has been opened and not closed since.
    pub fn is_open(&self) -> bool {
        self.is_open
    }

    /// Delay requested by the last step, if the filter is sleeping.
    pub fn sleep_delay(&self) -> Option<Duration> {
        self.sleep_delay
    }

    /// The filter's ports.
    pub fn ports(&self) -> &PortSet {
        &self.ports
    }

    /// The wrapped filter.
    pub fn filter(&self) -> &dyn Filter {
        self.filter.as_ref()
    }

    /// Look up an input port.
    pub fn input(&self, name: &str) -> Result<&InputPort> {
        self.ports
            .input(name)
            .ok_or_else(|| Error::unknown_input(&self.name, name))
    }

    /// Look up an output port.
    pub fn output(&self, name: &str) -> Result<&OutputPort> {
        self.ports
            .output(name)
            .ok_or_else(|| Error::unknown_output(&self.name, name))
    }

    /// Number of inputs with an upstream connection.
    pub fn connected_input_count(&self) -> usize {
        self.ports.inputs().iter().filter(|p| p.is_connected()).count()
    }

    // ------------------------------------------------------------------
    // Frame exchange
    // ------------------------------------------------------------------

    fn writable_input(&self, name: &str) -> Result<&InputPort> {
        let port = self.input(name)?;
        if port.kind() == InputKind::Final && self.status != FilterStatus::PreInit {
            return Err(Error::FinalPortModified(port.describe()));
        }
        if !port.is_open() {
            port.open();
        }
        Ok(port)
    }

    /// Set a persistent frame on input `name`, opening the port if needed.
    pub fn set_input_frame(&self, name: &str, frame: &Frame) -> Result<()> {
        self.writable_input(name)?.set_frame(frame)
    }

    /// Push a one-shot frame on input `name`, opening the port if needed.
    pub fn push_input_frame(&self, name: &str, frame: &Frame) -> Result<()> {
        self.writable_input(name)?.push_frame(frame)
    }

    /// Set a persistent value on input `name`.
    pub fn set_input_value(&self, name: &str, value: Value) -> Result<()> {
        self.writable_input(name)?.set_value(value)
    }

    /// Push a one-shot value on input `name`.
    pub fn push_input_value(&self, name: &str, value: Value) -> Result<()> {
        self.writable_input(name)?.push_value(value)
    }

    // ------------------------------------------------------------------
    // Readiness
    // ------------------------------------------------------------------

    /// Status allows a step and every port is ready.
    pub fn can_process(&self) -> bool {
        self.status.can_step()
            && self.ports.inputs().iter().all(InputPort::is_ready)
            && self.ports.outputs().iter().all(OutputPort::is_ready)
    }

    fn must_close(&self) -> bool {
        self.ports.inputs().iter().any(InputPort::filter_must_close)
            || self.ports.outputs().iter().any(OutputPort::filter_must_close)
    }

    /// Open every output port (and with it the connected inputs).
    pub fn open_outputs(&self) {
        for output in self.ports.outputs() {
            output.open();
        }
    }

    /// Release frames held by input ports.
    pub fn clear_inputs(&self) -> Result<()> {
        for input in self.ports.inputs() {
            input.clear()?;
        }
        Ok(())
    }

    /// Release frames held by the inputs downstream of this filter.
    pub fn clear_outputs(&self) -> Result<()> {
        for output in self.ports.outputs() {
            if let Some(target) = output.target() {
                target.clear()?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Run one process step.
    ///
    /// Errors from the process body mark the filter [`FilterStatus::Error`]
    /// and come back as [`Error::FilterFailed`]; all other errors are
    /// returned unchanged.
    pub fn perform_process(&mut self, ctx: &FilterContext) -> Result<()> {
        if self.status == FilterStatus::Released {
            return Err(Error::InvalidState(format!(
                "filter '{}' is released",
                self.name
            )));
        }
        self.transfer_inputs(ctx)?;
        if self.status < FilterStatus::Processing {
            self.perform_open(ctx)?;
        }
        self.current_timestamp = Timestamp::Unknown;

        let mut process_ctx = ProcessContext::new(&self.name, &self.ports, ctx);
        let result = {
            let _timer = self.metrics.start_timer();
            self.filter.process(&mut process_ctx)
        };
        self.current_timestamp = process_ctx.current_timestamp();
        let (pulled, delay) = process_ctx.finish();
        for frame in pulled {
            frame.release()?;
        }

        if let Err(source) = result {
            tracing::error!(filter = %self.name, error = %source, "filter process failed");
            self.status = FilterStatus::Error;
            self.error = Some(source.clone());
            return Err(Error::FilterFailed {
                filter: self.name.clone(),
                source: Box::new(source),
            });
        }

        if let Some(delay) = delay {
            tracing::trace!(filter = %self.name, ?delay, "filter sleeping");
            self.status = FilterStatus::Sleeping;
            self.sleep_delay = Some(delay);
        }
        if self.must_close() {
            self.perform_close(ctx)?;
        }
        Ok(())
    }

    fn transfer_inputs(&mut self, ctx: &FilterContext) -> Result<()> {
        let notify = matches!(
            self.status,
            FilterStatus::Prepared | FilterStatus::Processing
        );
        for port in self.ports.inputs() {
            if port.transfer()? && notify {
                self.filter.field_port_value_updated(port.name(), ctx)?;
            }
        }
        Ok(())
    }

    /// Prepare (once) and open the filter.
    pub fn perform_open(&mut self, ctx: &FilterContext) -> Result<()> {
        if self.is_open {
            return Ok(());
        }
        if self.status == FilterStatus::Unprepared {
            self.filter.prepare(ctx)?;
            self.status = FilterStatus::Prepared;
        }
        if self.status != FilterStatus::Prepared {
            return Err(Error::InvalidState(format!(
                "filter '{}' cannot open from status {}",
                self.name, self.status
            )));
        }
        self.filter.open(ctx)?;
        self.status = FilterStatus::Processing;
        self.is_open = true;
        tracing::debug!(filter = %self.name, "filter opened");
        Ok(())
    }

    /// Close the filter and all of its ports.
    pub fn perform_close(&mut self, ctx: &FilterContext) -> Result<()> {
        if !self.is_open {
            return Ok(());
        }
        self.is_open = false;
        if self.status != FilterStatus::Error {
            self.status = FilterStatus::Finished;
        }
        let result = self.filter.close(ctx);
        for input in self.ports.inputs() {
            input.close();
        }
        for output in self.ports.outputs() {
            output.close();
        }
        tracing::debug!(filter = %self.name, status = %self.status, "filter closed");
        result
    }

    /// Close an open filter whose ports signal end of stream without a step.
    ///
    /// Returns whether the filter was closed.
    pub fn close_if_drained(&mut self, ctx: &FilterContext) -> Result<bool> {
        if !self.is_open || self.status == FilterStatus::Sleeping || !self.must_close() {
            return Ok(false);
        }
        self.perform_close(ctx)?;
        Ok(true)
    }

    /// Close, run the tear-down hook and release held frames.
    pub fn perform_tear_down(&mut self, ctx: &FilterContext) -> Result<()> {
        if self.status == FilterStatus::Released {
            return Ok(());
        }
        self.perform_close(ctx)?;
        self.clear_inputs()?;
        self.filter.tear_down(ctx)?;
        self.status = FilterStatus::Released;
        Ok(())
    }

    /// Return a finished or failed filter to `Prepared` so it can run again.
    pub(crate) fn reset_for_run(&mut self) {
        if matches!(self.status, FilterStatus::Finished | FilterStatus::Error) {
            self.status = FilterStatus::Prepared;
            self.error = None;
        }
    }

    /// Leave the sleeping state after the requested delay.
    pub(crate) fn wake(&mut self) {
        if self.status == FilterStatus::Sleeping {
            self.status = FilterStatus::Processing;
            self.sleep_delay = None;
        }
    }

    /// Timestamp of the last step.
    pub fn current_timestamp(&self) -> Timestamp {
        self.current_timestamp
    }
}

impl fmt::Debug for FilterNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterNode")
            .field("name", &self.name)
            .field("status", &self.status)
            .field("ports", &self.ports)
            .finish_non_exhaustive()
    }
}
