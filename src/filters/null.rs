//! Discard sink.

use crate::error::Result;
use crate::filter::{Filter, ProcessContext};
use crate::format::FrameFormat;
use crate::port::PortSet;

/// A sink that pulls and drops every frame.
///
/// Inserted by graph setup on unconnected outputs when discarding is
/// enabled.
#[derive(Debug, Default)]
pub struct NullFilter;

impl NullFilter {
    /// Name of the input port.
    pub const INPUT: &'static str = "frame";

    /// Create a new NullFilter.
    pub fn new() -> Self {
        Self
    }
}

impl Filter for NullFilter {
    fn setup_ports(&mut self, ports: &mut PortSet) -> Result<()> {
        ports.add_input(Self::INPUT, FrameFormat::unspecified())?;
        Ok(())
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<()> {
        ctx.pull_input(Self::INPUT)?;
        Ok(())
    }
}
