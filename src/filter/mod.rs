//! Filters: graph nodes with ports and a processing step.
//!
//! A filter author implements [`Filter`]: declare ports in
//! [`setup_ports`](Filter::setup_ports), then pull inputs and push outputs in
//! [`process`](Filter::process). The engine wraps each filter in a
//! [`FilterNode`] that owns its ports and drives the status machine:
//!
//! ```text
//! PreInit -> Unprepared -> Prepared -> Processing <-> Sleeping
//!                                          |
//!                                          v
//!                                  Finished / Error
//!                   (any state) -> Released
//! ```

mod node;
mod process;

pub use node::FilterNode;
pub use process::ProcessContext;

use crate::context::FilterContext;
use crate::error::Result;
use crate::format::FrameFormat;
use crate::port::PortSet;

// ============================================================================
// Filter Trait
// ============================================================================

/// User-defined processing step.
///
/// Only `setup_ports` and `process` are required; the lifecycle hooks default
/// to no-ops.
pub trait Filter: Send + 'static {
    /// Declare final field ports whose values shape the remaining ports.
    ///
    /// Runs before `setup_ports`; initial values for these ports are assigned
    /// in between, so `setup_ports` can read them.
    fn declare_final_ports(&mut self, _ports: &mut PortSet) -> Result<()> {
        Ok(())
    }

    /// Declare ports. Called once, when the node is created.
    fn setup_ports(&mut self, ports: &mut PortSet) -> Result<()>;

    /// Format of output `port` given the upstream format of the input it is
    /// based on. Returning `None` is a configuration error.
    fn output_format(&self, _port: &str, _input_format: &FrameFormat) -> Option<FrameFormat> {
        None
    }

    /// Called once before the first `open`.
    fn prepare(&mut self, _ctx: &FilterContext) -> Result<()> {
        Ok(())
    }

    /// Called when the filter starts processing, and again after a close.
    fn open(&mut self, _ctx: &FilterContext) -> Result<()> {
        Ok(())
    }

    /// Pull inputs, compute, push outputs.
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<()>;

    /// Called when the filter stops processing.
    fn close(&mut self, _ctx: &FilterContext) -> Result<()> {
        Ok(())
    }

    /// Called once when the node is released.
    fn tear_down(&mut self, _ctx: &FilterContext) -> Result<()> {
        Ok(())
    }

    /// A field port value was transferred while prepared or processing.
    fn field_port_value_updated(&mut self, _name: &str, _ctx: &FilterContext) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// Status
// ============================================================================

/// Lifecycle status of a filter, ordered by progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FilterStatus {
    /// Ports declared, final values being assigned.
    PreInit,
    /// Initialized, not yet prepared.
    Unprepared,
    /// Prepared, not yet opened.
    Prepared,
    /// Open and processing.
    Processing,
    /// Waiting for a requested delay to elapse.
    Sleeping,
    /// Closed after end of stream or on request.
    Finished,
    /// Process body failed.
    Error,
    /// Torn down; terminal.
    Released,
}

impl FilterStatus {
    /// Whether a process step may run from this status.
    pub fn can_step(self) -> bool {
        matches!(
            self,
            FilterStatus::Unprepared | FilterStatus::Prepared | FilterStatus::Processing
        )
    }
}

impl std::fmt::Display for FilterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FilterStatus::PreInit => "preinit",
            FilterStatus::Unprepared => "unprepared",
            FilterStatus::Prepared => "prepared",
            FilterStatus::Processing => "processing",
            FilterStatus::Sleeping => "sleeping",
            FilterStatus::Finished => "finished",
            FilterStatus::Error => "error",
            FilterStatus::Released => "released",
        };
        f.write_str(name)
    }
}
